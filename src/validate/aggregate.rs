use indexmap::IndexMap;

use serde_json::Value;

use crate::field::{FieldError, Rule};

use super::engine::Violation;

/// Errors resolved onto one field path for a single validation attempt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldErrorEntry {
    pub errors: Vec<FieldError>,
    /// The attempt's result for this path was superseded by a newer value
    /// and discarded; the errors hold the synthetic revalidation marker.
    pub expired: bool,
}

/// Map the engine's flat violation list back onto field paths, merging in
/// errors carried over from skipped fields. Emission order is preserved.
pub(crate) fn aggregate(
    violations: Vec<Violation>,
    rules: &IndexMap<String, Vec<Rule>>,
    carried: IndexMap<String, FieldErrorEntry>,
) -> IndexMap<String, FieldErrorEntry> {
    let mut group = carried;
    for violation in violations {
        let resolved = resolve_field(&violation.field, rules);
        group.entry(resolved).or_default().errors.push(FieldError {
            field: violation.field,
            message: violation.message,
        });
    }
    group
}

/// Exact rule-map match wins. Otherwise an indexed violation under a key
/// holding an array-typed rule rolls up to that key; anything else reports
/// at its literal path.
fn resolve_field(field: &str, rules: &IndexMap<String, Vec<Rule>>) -> String {
    for (name, rule_list) in rules {
        if name == field {
            return name.clone();
        }
        if !rule_list.iter().any(Rule::is_array) {
            continue;
        }
        let Some(rest) = field
            .strip_prefix(name.as_str())
            .and_then(|rest| rest.strip_prefix('.'))
        else {
            continue;
        };
        if !rest.is_empty() && rest.bytes().all(|byte| byte.is_ascii_digit()) {
            return name.clone();
        }
    }
    field.to_string()
}

/// Nested rendering of an aggregated error group, matching the shape the
/// path segments describe.
pub(crate) fn entries_to_value(entries: &IndexMap<String, FieldErrorEntry>) -> Value {
    let mut acc = Value::Object(serde_json::Map::new());
    for (name, entry) in entries {
        let errors: Vec<Value> = entry
            .errors
            .iter()
            .map(|error| {
                serde_json::json!({"field": error.field, "message": error.message})
            })
            .collect();
        let mut node = serde_json::json!({ "errors": errors });
        if entry.expired {
            node["expired"] = Value::Bool(true);
        }
        crate::path::set_path(&mut acc, name, node);
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn array_rules() -> IndexMap<String, Vec<Rule>> {
        IndexMap::from([("list".to_string(), vec![Rule::new("array")])])
    }

    #[test]
    fn indexed_violations_roll_up_to_array_rules() {
        let group = aggregate(
            vec![Violation::new("list.2", "m")],
            &array_rules(),
            IndexMap::new(),
        );
        let entry = group.get("list").expect("rolled up to the group path");
        assert_eq!(entry.errors.len(), 1);
        assert_eq!(entry.errors[0].field, "list.2");
        assert_eq!(entry.errors[0].message, "m");
        assert!(!group.contains_key("list.2"));
    }

    #[test]
    fn rollup_requires_a_pure_integer_remainder() {
        let group = aggregate(
            vec![
                Violation::new("list.2x", "not an index"),
                Violation::new("list.2.name", "nested"),
            ],
            &array_rules(),
            IndexMap::new(),
        );
        assert!(group.contains_key("list.2x"));
        assert!(group.contains_key("list.2.name"));
        assert!(!group.contains_key("list"));
    }

    #[test]
    fn rollup_requires_an_array_typed_rule() {
        let rules = IndexMap::from([("list".to_string(), vec![Rule::new("string")])]);
        let group = aggregate(vec![Violation::new("list.2", "m")], &rules, IndexMap::new());
        assert!(group.contains_key("list.2"));
    }

    #[test]
    fn same_path_appends_in_emission_order() {
        let rules = IndexMap::from([("name".to_string(), vec![Rule::default()])]);
        let group = aggregate(
            vec![
                Violation::new("name", "first"),
                Violation::new("name", "second"),
            ],
            &rules,
            IndexMap::new(),
        );
        let messages: Vec<&str> = group["name"]
            .errors
            .iter()
            .map(|error| error.message.as_str())
            .collect();
        assert_eq!(messages, vec!["first", "second"]);
    }

    #[test]
    fn nested_rendering_follows_path_segments() {
        let entries = IndexMap::from([(
            "user.name".to_string(),
            FieldErrorEntry {
                errors: vec![FieldError {
                    field: "user.name".to_string(),
                    message: "required".to_string(),
                }],
                expired: false,
            },
        )]);
        assert_eq!(
            entries_to_value(&entries),
            json!({"user": {"name": {"errors": [{"field": "user.name", "message": "required"}]}}})
        );
    }
}
