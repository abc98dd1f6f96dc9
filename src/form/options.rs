use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::field::{EventValue, Normalize, Rule, ValidateRule, ValueProps};
use crate::observe::{DiagnosticSink, NoopSink};
use crate::path::FieldTree;

/// Fired after any committed field-state write: the changed patch and a
/// snapshot of every field.
pub type FieldsChangedHook = dyn Fn(&FieldTree, &FieldTree) + Send + Sync;

/// Fired on a value-affecting commit: the changed values and all current
/// values, both as nested trees.
pub type ValuesChangedHook = dyn Fn(&Value, &Value) + Send + Sync;

/// Controller-wide configuration.
#[derive(Clone)]
pub struct FormOptions {
    /// Message templates forwarded to the rule engine with every request.
    pub validate_messages: Option<Value>,
    pub on_fields_change: Option<Arc<FieldsChangedHook>>,
    pub on_values_change: Option<Arc<ValuesChangedHook>>,
    pub diagnostics: Arc<dyn DiagnosticSink>,
}

impl Default for FormOptions {
    fn default() -> Self {
        Self {
            validate_messages: None,
            on_fields_change: None,
            on_values_change: None,
            diagnostics: Arc::new(NoopSink),
        }
    }
}

impl FormOptions {
    pub fn with_validate_messages(mut self, messages: Value) -> Self {
        self.validate_messages = Some(messages);
        self
    }

    pub fn with_on_fields_change(
        mut self,
        hook: impl Fn(&FieldTree, &FieldTree) + Send + Sync + 'static,
    ) -> Self {
        self.on_fields_change = Some(Arc::new(hook));
        self
    }

    pub fn with_on_values_change(
        mut self,
        hook: impl Fn(&Value, &Value) + Send + Sync + 'static,
    ) -> Self {
        self.on_values_change = Some(Arc::new(hook));
        self
    }

    pub fn with_diagnostics(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = sink;
        self
    }
}

impl fmt::Debug for FormOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormOptions")
            .field("validate_messages", &self.validate_messages)
            .field("on_fields_change", &self.on_fields_change.is_some())
            .field("on_values_change", &self.on_values_change.is_some())
            .finish()
    }
}

/// Per-field registration options.
#[derive(Clone, Default)]
pub struct FieldOptions {
    /// Shorthand rule list, bound to the validate-trigger set.
    pub rules: Vec<Rule>,
    /// Explicit trigger-grouped rules.
    pub validate: Vec<ValidateRule>,
    /// Action that commits a value. Defaults to `change`.
    pub trigger: Option<String>,
    /// Actions that additionally start validation. Defaults to the trigger.
    pub validate_trigger: Option<Vec<String>>,
    /// Prop that carries the resolved value. Defaults to `value`.
    pub value_prop_name: Option<String>,
    pub initial_value: Option<Value>,
    pub normalize: Option<Arc<dyn Normalize>>,
    pub value_props: Option<Arc<dyn ValueProps>>,
    pub event_value: Option<Arc<dyn EventValue>>,
    /// Keep state after the field stops being rendered.
    pub preserve: bool,
    pub hidden: bool,
    /// Report only the first failing rule for this field.
    pub validate_first: bool,
}

impl FieldOptions {
    pub fn with_rules(mut self, rules: Vec<Rule>) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_validate(mut self, validate: Vec<ValidateRule>) -> Self {
        self.validate = validate;
        self
    }

    pub fn with_trigger(mut self, trigger: impl Into<String>) -> Self {
        self.trigger = Some(trigger.into());
        self
    }

    pub fn with_validate_trigger(mut self, triggers: Vec<String>) -> Self {
        self.validate_trigger = Some(triggers);
        self
    }

    pub fn with_value_prop_name(mut self, name: impl Into<String>) -> Self {
        self.value_prop_name = Some(name.into());
        self
    }

    pub fn with_initial_value(mut self, value: Value) -> Self {
        self.initial_value = Some(value);
        self
    }

    pub fn with_normalize(mut self, normalize: impl Normalize + 'static) -> Self {
        self.normalize = Some(Arc::new(normalize));
        self
    }

    pub fn with_value_props(mut self, hook: impl ValueProps + 'static) -> Self {
        self.value_props = Some(Arc::new(hook));
        self
    }

    pub fn with_event_value(mut self, hook: impl EventValue + 'static) -> Self {
        self.event_value = Some(Arc::new(hook));
        self
    }

    pub fn with_preserve(mut self, preserve: bool) -> Self {
        self.preserve = preserve;
        self
    }

    pub fn with_hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    pub fn with_validate_first(mut self, validate_first: bool) -> Self {
        self.validate_first = validate_first;
        self
    }
}

impl fmt::Debug for FieldOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldOptions")
            .field("rules", &self.rules)
            .field("validate", &self.validate)
            .field("trigger", &self.trigger)
            .field("validate_trigger", &self.validate_trigger)
            .field("value_prop_name", &self.value_prop_name)
            .field("initial_value", &self.initial_value)
            .field("normalize", &self.normalize.is_some())
            .field("value_props", &self.value_props.is_some())
            .field("event_value", &self.event_value.is_some())
            .field("preserve", &self.preserve)
            .field("hidden", &self.hidden)
            .field("validate_first", &self.validate_first)
            .finish()
    }
}
