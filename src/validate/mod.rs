mod aggregate;
mod engine;

use std::fmt;

use indexmap::IndexMap;
use serde_json::Value;

use crate::field::{rules_for_action, FieldError, FieldValueState, Rule};
use crate::store::FieldsStore;

pub use aggregate::FieldErrorEntry;
pub use engine::{EngineOptions, RuleEngine, Violation};

pub(crate) use aggregate::aggregate;

/// Options for one validation pass.
#[derive(Debug, Clone, Default)]
pub struct ValidateOptions {
    /// Validate every field in the batch, dirty or not.
    pub force: bool,
    /// Paths for which the engine should stop at the first failing rule.
    /// When absent, batch validation derives the set from `validate_first`
    /// metadata.
    pub first_fields: Option<Vec<String>>,
    /// Stop at the first failing rule for every path.
    pub first: bool,
}

impl ValidateOptions {
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_first_fields(mut self, first_fields: Vec<String>) -> Self {
        self.first_fields = Some(first_fields);
        self
    }

    pub fn with_first(mut self, first: bool) -> Self {
        self.first = first;
        self
    }
}

/// What gets handed to the rule engine for one attempt.
#[derive(Debug, Clone)]
pub struct ValidationRequest {
    pub rules: IndexMap<String, Vec<Rule>>,
    pub values: IndexMap<String, Value>,
    pub options: EngineOptions,
}

/// Aggregated per-path errors for one attempt, skipped-field carryovers
/// included.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub entries: IndexMap<String, FieldErrorEntry>,
}

impl ValidationReport {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn errors_for(&self, path: &str) -> Option<&[FieldError]> {
        self.entries.get(path).map(|entry| entry.errors.as_slice())
    }

    /// Whether the attempt's result for `path` was discarded as stale.
    pub fn is_expired(&self, path: &str) -> bool {
        self.entries.get(path).is_some_and(|entry| entry.expired)
    }

    /// Nested rendering keyed by path segments, the way callers that think
    /// in value trees expect it.
    pub fn to_value(&self) -> Value {
        aggregate::entries_to_value(&self.entries)
    }
}

/// Non-empty outcome of a validation pass. Not a fault: rule violations
/// travel the same channel as success, distinguished by this carrier.
#[derive(Debug, Clone)]
pub struct ValidationFailure {
    pub report: ValidationReport,
    /// Resolved values for the requested names, same as the success payload.
    pub values: Value,
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "validation failed for {} field(s)",
            self.report.entries.len()
        )
    }
}

impl std::error::Error for ValidationFailure {}

/// Resolved values on success, report plus values otherwise.
pub type ValidationOutcome = Result<Value, ValidationFailure>;

/// An attempt between request submission and result reconciliation. The
/// store stays free for further synchronous writes in the meantime; the
/// staleness check in [`PendingValidation::finish`] sorts out what those
/// writes invalidated.
#[derive(Debug)]
pub struct PendingValidation {
    request: ValidationRequest,
    carried: IndexMap<String, FieldErrorEntry>,
    field_names: Option<Vec<String>>,
}

impl PendingValidation {
    pub fn request(&self) -> &ValidationRequest {
        &self.request
    }

    /// Nothing to send: every batched field was skipped (or the batch was
    /// empty), so the engine call can be elided.
    pub fn is_settled(&self) -> bool {
        self.request.rules.is_empty()
    }

    /// Reconcile the engine's result against the store. For every path that
    /// was sent: if its stored value still deep-equals the snapshot, commit
    /// `validating=false, dirty=false` plus the aggregated errors; otherwise
    /// discard the result as expired — the field keeps its newer value,
    /// stays dirty, and the report carries a revalidation marker instead.
    pub fn finish(self, store: &mut FieldsStore, violations: Vec<Violation>) -> ValidationOutcome {
        let mut entries = aggregate(violations, &self.request.rules, self.carried);

        let mut now_fields = IndexMap::new();
        let mut expired = Vec::new();
        for (name, snapshot) in &self.request.values {
            let mut now = store.get_field(name);
            let current = now.value.clone().unwrap_or(Value::Null);
            if current != *snapshot {
                expired.push(name.clone());
            } else {
                now.errors = entries
                    .get(name)
                    .map(|entry| entry.errors.clone())
                    .filter(|errors| !errors.is_empty());
                now.value = Some(snapshot.clone());
                now.validating = false;
                now.dirty = false;
                now_fields.insert(name.clone(), now);
            }
        }
        store.set_fields(now_fields);

        for name in expired {
            let marker = FieldError {
                field: name.clone(),
                message: format!("{name} need to revalidate"),
            };
            entries.insert(
                name,
                FieldErrorEntry {
                    errors: vec![marker],
                    expired: true,
                },
            );
        }

        let names: Option<Vec<&str>> = self
            .field_names
            .as_ref()
            .map(|names| names.iter().map(String::as_str).collect());
        let values = store.get_fields_value(names.as_deref());
        if entries.is_empty() {
            Ok(values)
        } else {
            Err(ValidationFailure {
                report: ValidationReport { entries },
                values,
            })
        }
    }
}

/// Shared validation core, steps one to four: decide which batched fields
/// proceed (dirty or forced; skipped ones carry their stored errors
/// forward), commit the intermediate `validating` state, then snapshot the
/// authoritative post-commit values for the engine.
pub fn begin_validation(
    store: &mut FieldsStore,
    batch: IndexMap<String, FieldValueState>,
    field_names: Option<Vec<String>>,
    action: Option<&str>,
    options: &ValidateOptions,
    messages: Option<Value>,
) -> PendingValidation {
    let mut all_rules = IndexMap::new();
    let mut all_values = IndexMap::new();
    let mut all_fields = IndexMap::new();
    let mut carried = IndexMap::new();

    for (name, field) in batch {
        if !options.force && !field.dirty {
            if let Some(errors) = field.errors {
                if !errors.is_empty() {
                    carried.insert(
                        name,
                        FieldErrorEntry {
                            errors,
                            expired: false,
                        },
                    );
                }
            }
            continue;
        }
        let rules = rules_for_action(&store.get_field_meta(&name).validate, action);
        let mut next = field;
        next.errors = None;
        next.validating = true;
        next.dirty = true;
        all_values.insert(name.clone(), next.value.clone().unwrap_or(Value::Null));
        all_rules.insert(name.clone(), rules);
        all_fields.insert(name, next);
    }

    store.set_fields(all_fields);
    // a normalizer may have rewritten what was just committed
    for (name, value) in all_values.iter_mut() {
        *value = store.get_field_value(name);
    }

    let engine_options = EngineOptions {
        first_fields: options.first_fields.clone().unwrap_or_default(),
        first: options.first,
        messages,
    };
    PendingValidation {
        request: ValidationRequest {
            rules: all_rules,
            values: all_values,
            options: engine_options,
        },
        carried,
        field_names,
    }
}

/// Convenience driver for callers with nothing to interleave: begin, run
/// the engine, finish.
pub fn validate_with(
    store: &mut FieldsStore,
    engine: &dyn RuleEngine,
    batch: IndexMap<String, FieldValueState>,
    field_names: Option<Vec<String>>,
    action: Option<&str>,
    options: &ValidateOptions,
    messages: Option<Value>,
) -> ValidationOutcome {
    let pending = begin_validation(store, batch, field_names, action, options, messages);
    let violations = if pending.is_settled() {
        Vec::new()
    } else {
        let request = pending.request();
        engine.validate(&request.rules, &request.values, &request.options)
    };
    pending.finish(store, violations)
}
