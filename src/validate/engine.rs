use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::field::Rule;

/// One failure reported by the rule engine, in emission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub field: String,
    pub message: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl Violation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            kind: None,
        }
    }
}

/// Options forwarded to the rule engine alongside the rule and value maps.
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// Paths for which only the first failing rule should be reported.
    pub first_fields: Vec<String>,
    /// Report only the first failing rule for every path.
    pub first: bool,
    /// Message templates the engine may substitute into its failures.
    pub messages: Option<Value>,
}

impl EngineOptions {
    pub fn with_first_fields(mut self, first_fields: Vec<String>) -> Self {
        self.first_fields = first_fields;
        self
    }

    pub fn with_first(mut self, first: bool) -> Self {
        self.first = first;
        self
    }

    pub fn with_messages(mut self, messages: Value) -> Self {
        self.messages = Some(messages);
        self
    }
}

/// The consumed rule-evaluation capability. Given path→rules and
/// path→value maps it returns the ordered failures, empty when everything
/// passed. Evaluation may complete on another thread or executor; the
/// coordinator only sees the finished list.
pub trait RuleEngine {
    fn validate(
        &self,
        rules: &IndexMap<String, Vec<Rule>>,
        values: &IndexMap<String, Value>,
        options: &EngineOptions,
    ) -> Vec<Violation>;
}

impl<F> RuleEngine for F
where
    F: Fn(&IndexMap<String, Vec<Rule>>, &IndexMap<String, Value>, &EngineOptions) -> Vec<Violation>,
{
    fn validate(
        &self,
        rules: &IndexMap<String, Vec<Rule>>,
        values: &IndexMap<String, Value>,
        options: &EngineOptions,
    ) -> Vec<Violation> {
        self(rules, values, options)
    }
}
