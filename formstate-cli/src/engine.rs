use formstate::{EngineOptions, Rule, RuleEngine, Violation};
use serde_json::Value;

/// Built-in rule engine covering the common descriptor vocabulary:
/// `required`, the `type` tag, `len`/`min`/`max`, and `enum`. Message
/// templates from the options override the defaults, with `%s` standing
/// in for the field name.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicRuleEngine;

impl RuleEngine for BasicRuleEngine {
    fn validate(
        &self,
        rules: &indexmap::IndexMap<String, Vec<Rule>>,
        values: &indexmap::IndexMap<String, Value>,
        options: &EngineOptions,
    ) -> Vec<Violation> {
        let mut violations = Vec::new();
        for (name, rule_list) in rules {
            let value = values.get(name).cloned().unwrap_or(Value::Null);
            let stop_at_first =
                options.first || options.first_fields.iter().any(|field| field == name);
            for rule in rule_list {
                let before = violations.len();
                check_rule(name, rule, &value, options, &mut violations);
                if stop_at_first && violations.len() > before {
                    break;
                }
            }
        }
        violations
    }
}

fn check_rule(
    name: &str,
    rule: &Rule,
    value: &Value,
    options: &EngineOptions,
    violations: &mut Vec<Violation>,
) {
    let required = rule.config.get("required") == Some(&Value::Bool(true));
    if is_empty(value) {
        if required {
            violations.push(violation(name, rule, options, "required", || {
                format!("{name} is required")
            }));
        }
        // empty non-required values satisfy every other constraint
        return;
    }

    if let Some(kind) = rule.kind.as_deref() {
        if !matches_type(value, kind) {
            violations.push(violation(name, rule, options, "type", || {
                format!("{name} is not a {kind}")
            }));
            return;
        }
        // indexed members of an array group get their own violations
        if kind == "array" {
            if let (Some(member), Value::Array(items)) =
                (rule.config.get("defaultField"), value)
            {
                let member_rule = Rule {
                    kind: member
                        .get("type")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    config: member.as_object().cloned().unwrap_or_default(),
                };
                for (index, item) in items.iter().enumerate() {
                    check_rule(
                        &format!("{name}.{index}"),
                        &member_rule,
                        item,
                        options,
                        violations,
                    );
                }
            }
        }
    }

    if let Some(expected) = rule.config.get("len").and_then(Value::as_u64) {
        if measure(value).is_some_and(|actual| actual != expected) {
            violations.push(violation(name, rule, options, "len", || {
                format!("{name} must be exactly {expected} in length")
            }));
        }
    }
    if let Some(min) = rule.config.get("min").and_then(Value::as_f64) {
        if magnitude(value).is_some_and(|actual| actual < min) {
            violations.push(violation(name, rule, options, "min", || {
                format!("{name} cannot be less than {min}")
            }));
        }
    }
    if let Some(max) = rule.config.get("max").and_then(Value::as_f64) {
        if magnitude(value).is_some_and(|actual| actual > max) {
            violations.push(violation(name, rule, options, "max", || {
                format!("{name} cannot be greater than {max}")
            }));
        }
    }
    if let Some(allowed) = rule.config.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            violations.push(violation(name, rule, options, "enum", || {
                format!("{name} must be one of the enumerated values")
            }));
        }
    }
}

fn violation(
    name: &str,
    rule: &Rule,
    options: &EngineOptions,
    kind: &str,
    default: impl FnOnce() -> String,
) -> Violation {
    let message = rule
        .config
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| {
            options
                .messages
                .as_ref()
                .and_then(|messages| messages.get(kind))
                .and_then(Value::as_str)
                .map(|template| template.replace("%s", name))
        })
        .unwrap_or_else(default);
    Violation {
        field: name.to_string(),
        message,
        kind: Some(kind.to_string()),
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn matches_type(value: &Value, kind: &str) -> bool {
    match kind {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "float" => value.is_f64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    }
}

fn measure(value: &Value) -> Option<u64> {
    match value {
        Value::String(s) => Some(s.chars().count() as u64),
        Value::Array(items) => Some(items.len() as u64),
        _ => None,
    }
}

fn magnitude(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => Some(s.chars().count() as f64),
        Value::Array(items) => Some(items.len() as f64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use serde_json::json;

    fn run(rule: Value, value: Value) -> Vec<Violation> {
        let rule: Rule = serde_json::from_value(rule).unwrap();
        let rules = IndexMap::from([("field".to_string(), vec![rule])]);
        let values = IndexMap::from([("field".to_string(), value)]);
        BasicRuleEngine.validate(&rules, &values, &EngineOptions::default())
    }

    #[test]
    fn required_catches_null_empty_string_and_empty_array() {
        for value in [json!(null), json!(""), json!([])] {
            let violations = run(json!({"required": true}), value);
            assert_eq!(violations.len(), 1);
            assert_eq!(violations[0].message, "field is required");
        }
        assert!(run(json!({"required": true}), json!("x")).is_empty());
    }

    #[test]
    fn type_mismatch_stops_further_checks() {
        let violations = run(json!({"type": "number", "min": 3}), json!("abc"));
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind.as_deref(), Some("type"));
    }

    #[test]
    fn length_bounds_apply_to_strings_and_arrays() {
        assert!(run(json!({"min": 3}), json!("ab")).len() == 1);
        assert!(run(json!({"max": 2}), json!([1, 2, 3])).len() == 1);
        assert!(run(json!({"len": 2}), json!("ab")).is_empty());
    }

    #[test]
    fn array_members_report_at_indexed_paths() {
        let violations = run(
            json!({"type": "array", "defaultField": {"type": "number"}}),
            json!([1, "two", 3]),
        );
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field, "field.1");
    }

    #[test]
    fn message_templates_substitute_the_field_name() {
        let rule: Rule = serde_json::from_value(json!({"required": true})).unwrap();
        let rules = IndexMap::from([("age".to_string(), vec![rule])]);
        let values = IndexMap::from([("age".to_string(), json!(null))]);
        let options =
            EngineOptions::default().with_messages(json!({"required": "%s is mandatory"}));
        let violations = BasicRuleEngine.validate(&rules, &values, &options);
        assert_eq!(violations[0].message, "age is mandatory");
    }

    #[test]
    fn first_fields_stop_after_one_violation() {
        let rule: Rule = serde_json::from_value(json!({"required": true, "min": 3})).unwrap();
        let rules = IndexMap::from([("a".to_string(), vec![rule.clone(), rule])]);
        let values = IndexMap::from([("a".to_string(), json!(null))]);
        let options = EngineOptions::default().with_first_fields(vec!["a".to_string()]);
        let violations = BasicRuleEngine.validate(&rules, &values, &options);
        assert_eq!(violations.len(), 1);
    }
}
