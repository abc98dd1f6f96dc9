use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::field::{Rule, ValidateRule};
use crate::form::FieldOptions;

/// Parse a JSON document into a `serde_json::Value`.
pub fn parse_document_str(contents: &str) -> Result<Value> {
    serde_json::from_str::<Value>(contents).context("failed to parse JSON document")
}

/// Declarative field registrations, the file-based counterpart of calling
/// `register_field` by hand.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldSpecDoc {
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub validate: Vec<ValidateRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validate_trigger: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_value: Option<Value>,
    #[serde(default)]
    pub preserve: bool,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub validate_first: bool,
}

impl FieldSpec {
    pub fn into_options(self) -> (String, FieldOptions) {
        let mut options = FieldOptions::default()
            .with_rules(self.rules)
            .with_validate(self.validate)
            .with_preserve(self.preserve)
            .with_hidden(self.hidden)
            .with_validate_first(self.validate_first);
        if let Some(trigger) = self.trigger {
            options = options.with_trigger(trigger);
        }
        if let Some(triggers) = self.validate_trigger {
            options = options.with_validate_trigger(triggers);
        }
        if let Some(value) = self.initial_value {
            options = options.with_initial_value(value);
        }
        (self.name, options)
    }
}

/// Parse a field-spec document from JSON text.
pub fn parse_field_specs_str(contents: &str) -> Result<FieldSpecDoc> {
    serde_json::from_str(contents).context("failed to parse field-spec document")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_json_documents() {
        let raw = "{\"enabled\":true}";
        let parsed = parse_document_str(raw).unwrap();
        assert_eq!(parsed["enabled"], Value::Bool(true));
    }

    #[test]
    fn parse_errors_carry_context() {
        let err = parse_document_str("{not json").unwrap_err();
        assert!(err.to_string().contains("failed to parse JSON document"));
    }

    #[test]
    fn field_specs_accept_sparse_entries() {
        let raw = r#"{
            "fields": [
                {"name": "user.name", "rules": [{"required": true}]},
                {"name": "tags", "rules": [{"type": "array"}], "initial_value": []}
            ]
        }"#;
        let doc = parse_field_specs_str(raw).unwrap();
        assert_eq!(doc.fields.len(), 2);
        assert_eq!(doc.fields[0].name, "user.name");
        assert_eq!(
            doc.fields[0].rules[0].config.get("required"),
            Some(&json!(true))
        );
        assert!(doc.fields[1].rules[0].is_array());
        assert_eq!(doc.fields[1].initial_value, Some(json!([])));
    }

    #[test]
    fn spec_converts_to_registration_options() {
        let spec = FieldSpec {
            name: "a".to_string(),
            trigger: Some("input".to_string()),
            validate_trigger: Some(vec!["blur".to_string()]),
            initial_value: Some(json!(1)),
            preserve: true,
            ..Default::default()
        };
        let (name, options) = spec.into_options();
        assert_eq!(name, "a");
        assert_eq!(options.trigger.as_deref(), Some("input"));
        assert_eq!(options.validate_trigger, Some(vec!["blur".to_string()]));
        assert_eq!(options.initial_value, Some(json!(1)));
        assert!(options.preserve);
    }
}
