mod options;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::error::StoreError;
use crate::field::{
    normalize_validate_rules, validate_triggers, FieldMeta, FieldValueState, DEFAULT_TRIGGER,
    DEFAULT_VALUE_PROP,
};
use crate::path::{self, FieldTree};
use crate::store::FieldsStore;
use crate::validate::{
    begin_validation, PendingValidation, RuleEngine, ValidateOptions, ValidationOutcome, Violation,
};

pub use options::{FieldOptions, FieldsChangedHook, FormOptions, ValuesChangedHook};

/// Externally relevant binding for one registered field: the resolved value
/// prop plus the action names the rendering collaborator must route back
/// into [`FormController::collect`] / [`FormController::collect_validate`].
#[derive(Debug, Clone)]
pub struct FieldProps {
    pub name: String,
    pub value_props: IndexMap<String, Value>,
    /// Actions that commit a value without scheduling validation.
    pub collect_actions: Vec<String>,
    /// Actions that commit a value and start validation.
    pub validate_actions: Vec<String>,
}

#[derive(Debug, Clone)]
struct ClearedField {
    field: FieldValueState,
    meta: FieldMeta,
}

/// Coordinates the field store, registration lifecycle, change hooks, and
/// validation passes. The rendering layer is a collaborator: it calls
/// `register_field`, attaches the returned props, and routes trigger
/// actions back in.
#[derive(Debug, Default)]
pub struct FormController {
    store: FieldsStore,
    options: FormOptions,
    cleared_cache: IndexMap<String, ClearedField>,
}

impl FormController {
    pub fn new(options: FormOptions) -> Self {
        Self {
            store: FieldsStore::new(),
            options,
            cleared_cache: IndexMap::new(),
        }
    }

    /// Externally controlled mode: seed the whole field set from the
    /// caller's state instead of starting empty.
    pub fn with_fields(options: FormOptions, fields: &FieldTree) -> Self {
        Self {
            store: FieldsStore::from_fields(fields),
            options,
            cleared_cache: IndexMap::new(),
        }
    }

    /// Replace the whole field set from the caller's state.
    pub fn update_fields(&mut self, fields: &FieldTree) {
        self.store.update_fields(fields);
    }

    pub fn store(&self) -> &FieldsStore {
        &self.store
    }

    /// Register a field and return its binding props. Rejects structural
    /// path conflicts before touching any state.
    pub fn register_field(
        &mut self,
        name: &str,
        options: FieldOptions,
    ) -> Result<FieldProps, StoreError> {
        if name.is_empty() {
            return Err(StoreError::EmptyFieldName);
        }
        if let Some(existing) = self.store.find_nesting_conflict(name) {
            return Err(StoreError::NestingConflict {
                path: name.to_string(),
                existing,
            });
        }
        self.cleared_cache.shift_remove(name);

        let trigger = options
            .trigger
            .clone()
            .unwrap_or_else(|| DEFAULT_TRIGGER.to_string());
        let validate_trigger = options
            .validate_trigger
            .clone()
            .unwrap_or_else(|| vec![trigger.clone()]);
        let validate = normalize_validate_rules(options.validate, options.rules, &validate_trigger);

        {
            let meta = self.store.get_field_meta(name);
            meta.name = name.to_string();
            if options.initial_value.is_some() {
                meta.initial_value = options.initial_value;
            }
            meta.trigger = trigger.clone();
            meta.value_prop_name = options
                .value_prop_name
                .unwrap_or_else(|| DEFAULT_VALUE_PROP.to_string());
            meta.normalize = options.normalize;
            meta.value_props = options.value_props;
            meta.event_value = options.event_value;
            meta.preserve = options.preserve;
            meta.hidden = options.hidden;
            meta.validate_first = options.validate_first;
            meta.validate = validate;
        }

        let meta = self
            .store
            .peek_field_meta(name)
            .cloned()
            .unwrap_or_else(|| FieldMeta::named(name));
        let validate_actions = validate_triggers(&meta.validate);
        let mut collect_actions = Vec::new();
        if !trigger.is_empty() && !validate_actions.contains(&trigger) {
            collect_actions.push(trigger);
        }
        Ok(FieldProps {
            name: name.to_string(),
            value_props: self.store.get_field_value_prop_value(&meta),
            collect_actions,
            validate_actions,
        })
    }

    /// A trigger action fired: extract the value from the event, commit it,
    /// and mark rule-carrying fields dirty. No validation is scheduled.
    pub fn collect(&mut self, name: &str, event: &Value) -> Result<(), StoreError> {
        let (mut field, has_rules) = self.collect_common(name, event)?;
        self.store.set_fields_as_dirty();
        field.dirty = has_rules;
        self.apply_fields(IndexMap::from([(name.to_string(), field)]));
        Ok(())
    }

    /// A validate-trigger action fired: commit like [`FormController::collect`]
    /// and run a one-field validation batch filtered by that action.
    pub fn collect_validate(
        &mut self,
        engine: &dyn RuleEngine,
        name: &str,
        action: &str,
        event: &Value,
    ) -> Result<ValidationOutcome, StoreError> {
        let (mut field, _) = self.collect_common(name, event)?;
        field.dirty = true;
        self.store.set_fields_as_dirty();

        let first = self
            .store
            .peek_field_meta(name)
            .is_some_and(|meta| meta.validate_first);
        let options = ValidateOptions::default().with_first(first);
        let batch = IndexMap::from([(name.to_string(), field)]);
        let pending = begin_validation(
            &mut self.store,
            batch,
            None,
            Some(action),
            &options,
            self.options.validate_messages.clone(),
        );
        self.fire_fields_change(pending.request().rules.keys().cloned().collect());
        let violations = self.run_engine(engine, &pending);
        Ok(self.finish_validation(pending, violations))
    }

    /// Batch validation over possibly partial names, or every valid field.
    pub fn validate_fields(
        &mut self,
        engine: &dyn RuleEngine,
        names: Option<&[&str]>,
        options: ValidateOptions,
    ) -> ValidationOutcome {
        let pending = self.begin_validate_fields(names, options);
        let violations = self.run_engine(engine, &pending);
        self.finish_validation(pending, violations)
    }

    /// First half of a batch validation for callers that interleave store
    /// writes with the engine's evaluation. Hand the request to the engine,
    /// then reconcile with [`FormController::finish_validation`].
    pub fn begin_validate_fields(
        &mut self,
        names: Option<&[&str]>,
        mut options: ValidateOptions,
    ) -> PendingValidation {
        let field_names = match names {
            Some(partials) => {
                for partial in partials {
                    if self.store.get_valid_fields_full_name(&[partial]).is_empty() {
                        self.options.diagnostics.warn(&format!(
                            "cannot validate `{partial}`: no registered field matches it"
                        ));
                    }
                }
                self.store.get_valid_fields_full_name(partials)
            }
            None => self.store.get_valid_fields_name(),
        };

        let mut batch = IndexMap::new();
        for name in &field_names {
            if !self
                .store
                .peek_field_meta(name)
                .is_some_and(FieldMeta::has_rules)
            {
                continue;
            }
            let mut field = self.store.get_field(name);
            field.value = Some(self.store.get_field_value(name));
            batch.insert(name.clone(), field);
        }
        if options.first_fields.is_none() {
            options.first_fields = Some(
                field_names
                    .iter()
                    .filter(|name| {
                        self.store
                            .peek_field_meta(name)
                            .is_some_and(|meta| meta.validate_first)
                    })
                    .cloned()
                    .collect(),
            );
        }

        let pending = begin_validation(
            &mut self.store,
            batch,
            Some(field_names),
            None,
            &options,
            self.options.validate_messages.clone(),
        );
        self.fire_fields_change(pending.request().rules.keys().cloned().collect());
        pending
    }

    /// Reconcile an attempt begun with [`FormController::begin_validate_fields`].
    pub fn finish_validation(
        &mut self,
        pending: PendingValidation,
        violations: Vec<Violation>,
    ) -> ValidationOutcome {
        let sent: Vec<String> = pending.request().rules.keys().cloned().collect();
        let outcome = pending.finish(&mut self.store, violations);
        let committed: Vec<String> = match &outcome {
            Ok(_) => sent,
            Err(failure) => sent
                .into_iter()
                .filter(|name| !failure.report.is_expired(name))
                .collect(),
        };
        self.fire_fields_change(committed);
        outcome
    }

    /// Commit a partial field-state patch. Every path must be registered.
    pub fn set_fields(
        &mut self,
        fields: IndexMap<String, FieldValueState>,
    ) -> Result<(), StoreError> {
        for name in fields.keys() {
            if self.store.peek_field_meta(name).is_none() {
                self.options
                    .diagnostics
                    .warn(&format!("cannot set field `{name}` before registering it"));
                return Err(StoreError::Unregistered { path: name.clone() });
            }
        }
        self.apply_fields(fields);
        Ok(())
    }

    /// Commit a partial nested value tree addressed by registered paths.
    pub fn set_fields_value(&mut self, values: &Value) -> Result<(), StoreError> {
        let flat = self.store.flatten_registered_values(values)?;
        let patch: IndexMap<String, FieldValueState> = flat
            .into_iter()
            .map(|(name, value)| (name, FieldValueState::with_value(value)))
            .collect();
        self.apply_fields(patch);
        if let Some(on_values_change) = self.options.on_values_change.clone() {
            on_values_change(values, &self.store.get_all_values());
        }
        Ok(())
    }

    /// Store initial values on already registered fields.
    pub fn set_fields_initial_value(&mut self, values: &Value) -> Result<(), StoreError> {
        self.store.set_fields_initial_value(values)
    }

    /// Clear targeted fields (all when omitted) back to their initial
    /// values, and drop their cleared-field cache entries.
    pub fn reset_fields(&mut self, names: Option<&[&str]>) {
        let patch = self.store.reset_fields(names);
        if !patch.is_empty() {
            self.apply_fields(patch);
        }
        match names {
            Some(names) => {
                for name in names {
                    self.cleared_cache.shift_remove(*name);
                }
            }
            None => self.cleared_cache.clear(),
        }
    }

    /// The field stopped being rendered. Unless `preserve` is set, its
    /// state and metadata move to the cleared-field cache for a possible
    /// verbatim restore.
    pub fn unregister_field(&mut self, name: &str) {
        let Some(meta) = self.store.peek_field_meta(name).cloned() else {
            return;
        };
        if meta.preserve {
            return;
        }
        let cached = ClearedField {
            field: self.store.get_field(name),
            meta,
        };
        self.cleared_cache.insert(name.to_string(), cached);
        self.store.clear_field(name);
    }

    /// Restore a cached field verbatim if it reappeared before a cleanup
    /// pass collected it.
    pub fn recover_field(&mut self, name: &str) -> bool {
        let Some(cached) = self.cleared_cache.shift_remove(name) else {
            return false;
        };
        self.store
            .set_fields(IndexMap::from([(name.to_string(), cached.field)]));
        self.store.set_field_meta(name, cached.meta);
        true
    }

    /// Explicit cleanup pass: drop every registered field not named in
    /// `active` whose metadata does not ask to be preserved.
    pub fn sweep_unused(&mut self, active: &[&str]) {
        let removed: Vec<String> = self
            .store
            .get_all_fields_name()
            .into_iter()
            .filter(|name| !active.contains(&name.as_str()))
            .filter(|name| {
                !self
                    .store
                    .peek_field_meta(name)
                    .is_some_and(|meta| meta.preserve)
            })
            .collect();
        for name in removed {
            self.store.clear_field(&name);
        }
    }

    pub fn get_fields_value(&self, names: Option<&[&str]>) -> Value {
        self.store.get_fields_value(names)
    }

    pub fn get_field_value(&self, name: &str) -> Value {
        self.store.get_field_value(name)
    }

    pub fn get_fields_error(&self, names: Option<&[&str]>) -> Value {
        self.store.get_fields_error(names)
    }

    pub fn get_field_error(&self, name: &str) -> Value {
        self.store.get_field_error(name)
    }

    pub fn is_fields_touched(&self, names: Option<&[&str]>) -> bool {
        self.store.is_fields_touched(names)
    }

    pub fn is_fields_validating(&self, names: Option<&[&str]>) -> bool {
        self.store.is_fields_validating(names)
    }

    fn collect_common(
        &mut self,
        name: &str,
        event: &Value,
    ) -> Result<(FieldValueState, bool), StoreError> {
        let Some(meta) = self.store.peek_field_meta(name) else {
            self.options
                .diagnostics
                .warn(&format!("collecting `{name}` before registering it"));
            return Err(StoreError::Unregistered {
                path: name.to_string(),
            });
        };
        let has_rules = meta.has_rules();
        let value = match meta.event_value.clone() {
            Some(hook) => hook.value_from_event(event),
            None => event.clone(),
        };

        if let Some(on_values_change) = self.options.on_values_change.clone() {
            if value != self.store.get_field_value(name) {
                let mut changed = Value::Object(Map::new());
                path::set_path(&mut changed, name, value.clone());
                let mut all = self.store.get_all_values();
                path::set_path(&mut all, name, value.clone());
                on_values_change(&changed, &all);
            }
        }

        let mut field = self.store.get_field(name);
        field.value = Some(value);
        field.touched = true;
        Ok((field, has_rules))
    }

    fn apply_fields(&mut self, fields: IndexMap<String, FieldValueState>) {
        let names: Vec<String> = fields.keys().cloned().collect();
        self.store.set_fields(fields);
        self.fire_fields_change(names);
    }

    fn fire_fields_change(&self, names: Vec<String>) {
        if names.is_empty() {
            return;
        }
        let Some(hook) = &self.options.on_fields_change else {
            return;
        };
        let changed = FieldTree::from_flat(
            names
                .into_iter()
                .map(|name| (name.clone(), self.store.get_field(&name))),
        );
        hook(&changed, &self.store.get_nested_all_fields());
    }

    fn run_engine(&self, engine: &dyn RuleEngine, pending: &PendingValidation) -> Vec<Violation> {
        if pending.is_settled() {
            return Vec::new();
        }
        let request = pending.request();
        engine.validate(&request.rules, &request.values, &request.options)
    }
}
