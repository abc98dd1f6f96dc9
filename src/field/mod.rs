use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Action name that commits a value when no trigger is configured.
pub const DEFAULT_TRIGGER: &str = "change";

/// Prop name that carries the resolved value when none is configured.
pub const DEFAULT_VALUE_PROP: &str = "value";

/// One violation attached to a field, in engine emission order. `field`
/// keeps the literal path the engine reported, which may be an indexed
/// child of the path the error was rolled up to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Per-path value and validation state. `value: None` means "no explicit
/// value committed yet"; reads then fall back to the meta's initial value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldValueState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
    #[serde(default)]
    pub touched: bool,
    #[serde(default)]
    pub dirty: bool,
    #[serde(default)]
    pub validating: bool,
}

impl FieldValueState {
    pub fn with_value(value: Value) -> Self {
        Self {
            value: Some(value),
            ..Default::default()
        }
    }
}

/// Opaque validation rule descriptor, interpreted by the external rule
/// engine. The optional `type` tag is the only part the coordinator looks
/// at: `"array"` enables indexed-violation rollup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(flatten)]
    pub config: Map<String, Value>,
}

impl Rule {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            config: Map::new(),
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }

    pub fn is_array(&self) -> bool {
        self.kind.as_deref() == Some("array")
    }
}

/// Rules grouped by the validate-trigger actions that schedule them.
/// An empty trigger set means the group only runs in full-batch passes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidateRule {
    #[serde(default)]
    pub triggers: Vec<String>,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

pub fn has_rules(validate: &[ValidateRule]) -> bool {
    validate.iter().any(|group| !group.rules.is_empty())
}

/// Fold a `rules` shorthand and explicit trigger groups into one list,
/// binding the shorthand to the field's validate-trigger set.
pub fn normalize_validate_rules(
    validate: Vec<ValidateRule>,
    rules: Vec<Rule>,
    default_triggers: &[String],
) -> Vec<ValidateRule> {
    let mut groups = validate;
    if !rules.is_empty() {
        groups.push(ValidateRule {
            triggers: default_triggers.to_vec(),
            rules,
        });
    }
    groups
}

/// Distinct trigger names across all non-empty rule groups, first-seen order.
pub fn validate_triggers(validate: &[ValidateRule]) -> Vec<String> {
    let mut triggers = Vec::new();
    for group in validate {
        if group.rules.is_empty() {
            continue;
        }
        for trigger in &group.triggers {
            if !triggers.contains(trigger) {
                triggers.push(trigger.clone());
            }
        }
    }
    triggers
}

/// Rules that apply when `action` fired. `None` selects every rule, which
/// is what a full batch run uses.
pub fn rules_for_action(validate: &[ValidateRule], action: Option<&str>) -> Vec<Rule> {
    validate
        .iter()
        .filter(|group| match action {
            Some(action) => group.triggers.iter().any(|trigger| trigger == action),
            None => true,
        })
        .flat_map(|group| group.rules.iter().cloned())
        .collect()
}

/// Recompute a field's value after a batch commit. Runs with the full set
/// of sibling candidate values, not just the field's own.
pub trait Normalize: Send + Sync {
    fn normalize(&self, value: &Value, previous: &Value, all: &IndexMap<String, Value>) -> Value;
}

impl<F> Normalize for F
where
    F: Fn(&Value, &Value, &IndexMap<String, Value>) -> Value + Send + Sync,
{
    fn normalize(&self, value: &Value, previous: &Value, all: &IndexMap<String, Value>) -> Value {
        self(value, previous, all)
    }
}

/// Turn a resolved field value into the externally visible prop map,
/// replacing the default single `value_prop_name` entry.
pub trait ValueProps: Send + Sync {
    fn value_props(&self, value: &Value) -> IndexMap<String, Value>;
}

impl<F> ValueProps for F
where
    F: Fn(&Value) -> IndexMap<String, Value> + Send + Sync,
{
    fn value_props(&self, value: &Value) -> IndexMap<String, Value> {
        self(value)
    }
}

/// Extract the committed value from a trigger event payload. The default
/// treats the payload itself as the value.
pub trait EventValue: Send + Sync {
    fn value_from_event(&self, event: &Value) -> Value;
}

impl<F> EventValue for F
where
    F: Fn(&Value) -> Value + Send + Sync,
{
    fn value_from_event(&self, event: &Value) -> Value {
        self(event)
    }
}

/// Registration-time metadata, with a lifetime independent of the field's
/// value state.
#[derive(Clone)]
pub struct FieldMeta {
    pub name: String,
    pub initial_value: Option<Value>,
    pub validate: Vec<ValidateRule>,
    pub trigger: String,
    pub value_prop_name: String,
    pub normalize: Option<Arc<dyn Normalize>>,
    pub value_props: Option<Arc<dyn ValueProps>>,
    pub event_value: Option<Arc<dyn EventValue>>,
    pub preserve: bool,
    pub hidden: bool,
    pub validate_first: bool,
}

impl Default for FieldMeta {
    fn default() -> Self {
        Self {
            name: String::new(),
            initial_value: None,
            validate: Vec::new(),
            trigger: DEFAULT_TRIGGER.to_string(),
            value_prop_name: DEFAULT_VALUE_PROP.to_string(),
            normalize: None,
            value_props: None,
            event_value: None,
            preserve: false,
            hidden: false,
            validate_first: false,
        }
    }
}

impl FieldMeta {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn has_rules(&self) -> bool {
        has_rules(&self.validate)
    }
}

impl fmt::Debug for FieldMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldMeta")
            .field("name", &self.name)
            .field("initial_value", &self.initial_value)
            .field("validate", &self.validate)
            .field("trigger", &self.trigger)
            .field("value_prop_name", &self.value_prop_name)
            .field("normalize", &self.normalize.is_some())
            .field("value_props", &self.value_props.is_some())
            .field("event_value", &self.event_value.is_some())
            .field("preserve", &self.preserve)
            .field("hidden", &self.hidden)
            .field("validate_first", &self.validate_first)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn shorthand_rules_bind_to_default_triggers() {
        let groups = normalize_validate_rules(
            vec![ValidateRule {
                triggers: vec!["blur".into()],
                rules: vec![Rule::new("string")],
            }],
            vec![Rule::default()],
            &["change".to_string()],
        );
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[1].triggers, vec!["change".to_string()]);
        assert_eq!(
            validate_triggers(&groups),
            vec!["blur".to_string(), "change".to_string()]
        );
    }

    #[test]
    fn rules_filter_by_firing_action() {
        let groups = vec![
            ValidateRule {
                triggers: vec!["blur".into()],
                rules: vec![Rule::new("string")],
            },
            ValidateRule {
                triggers: vec!["change".into()],
                rules: vec![Rule::new("number")],
            },
            ValidateRule {
                triggers: Vec::new(),
                rules: vec![Rule::new("array")],
            },
        ];
        let on_blur = rules_for_action(&groups, Some("blur"));
        assert_eq!(on_blur.len(), 1);
        assert_eq!(on_blur[0].kind.as_deref(), Some("string"));
        // Untriggered groups only participate in full batch runs.
        assert_eq!(rules_for_action(&groups, None).len(), 3);
    }

    #[test]
    fn rule_descriptor_round_trips_through_serde() {
        let rule: Rule =
            serde_json::from_value(json!({"type": "array", "required": true, "max": 3})).unwrap();
        assert!(rule.is_array());
        assert_eq!(rule.config.get("max"), Some(&json!(3)));
        assert_eq!(
            serde_json::to_value(&rule).unwrap(),
            json!({"type": "array", "required": true, "max": 3})
        );
    }
}
