use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::error::StoreError;
use crate::field::{FieldMeta, FieldValueState};
use crate::path::{self, FieldTree};

/// Single source of truth for field values and metadata, keyed by flat
/// dotted/bracketed paths. Owned by one caller; every operation is either
/// a pure read or an explicit `&mut` mutation, and synchronous operations
/// never observe partial state.
#[derive(Debug, Clone, Default)]
pub struct FieldsStore {
    fields: IndexMap<String, FieldValueState>,
    meta: IndexMap<String, FieldMeta>,
}

impl FieldsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the value side of the store from an externally supplied tree.
    /// Metadata still comes from registration.
    pub fn from_fields(tree: &FieldTree) -> Self {
        Self {
            fields: tree.flatten(),
            meta: IndexMap::new(),
        }
    }

    /// Replace every field value state wholesale. This is the externally
    /// controlled mode: the caller owns the truth, the store mirrors it.
    pub fn update_fields(&mut self, tree: &FieldTree) {
        self.fields = tree.flatten();
    }

    /// Existing metadata for `name`, lazily creating an empty record on
    /// first read. Never fails.
    pub fn get_field_meta(&mut self, name: &str) -> &mut FieldMeta {
        self.meta
            .entry(name.to_string())
            .or_insert_with(|| FieldMeta::named(name))
    }

    pub fn peek_field_meta(&self, name: &str) -> Option<&FieldMeta> {
        self.meta.get(name)
    }

    pub fn set_field_meta(&mut self, name: &str, meta: FieldMeta) {
        self.meta.insert(name.to_string(), meta);
    }

    /// Merge a partial field-state patch, then re-derive the current value
    /// of every registered field and give each `normalize` hook a pass over
    /// the merged picture. Two passes so a normalizer sees sibling values
    /// from the same batch, not just its own.
    pub fn set_fields(&mut self, fields: IndexMap<String, FieldValueState>) {
        let mut now_fields = self.fields.clone();
        for (name, state) in fields {
            now_fields.insert(name, state);
        }

        let mut now_values: IndexMap<String, Value> = IndexMap::new();
        for name in self.meta.keys() {
            let value = value_in(&now_fields, &self.meta, name).unwrap_or(Value::Null);
            now_values.insert(name.clone(), value);
        }

        let mut normalized: Vec<(String, Value)> = Vec::new();
        for (name, value) in &now_values {
            let Some(normalize) = self.meta.get(name).and_then(|meta| meta.normalize.clone())
            else {
                continue;
            };
            let previous = value_in(&self.fields, &self.meta, name).unwrap_or(Value::Null);
            let next = normalize.normalize(value, &previous, &now_values);
            if next != *value {
                normalized.push((name.clone(), next));
            }
        }
        for (name, value) in normalized {
            now_fields.entry(name).or_default().value = Some(value);
        }

        self.fields = now_fields;
    }

    /// Patch that clears every targeted field holding an explicit value
    /// back to empty state, so reads fall through to the initial value.
    /// The caller applies the patch through `set_fields`.
    pub fn reset_fields(&self, names: Option<&[&str]>) -> IndexMap<String, FieldValueState> {
        let names = match names {
            Some(partials) => self.get_valid_fields_full_name(partials),
            None => self.get_all_fields_name(),
        };
        names
            .into_iter()
            .filter(|name| self.fields.get(name).is_some_and(|field| field.value.is_some()))
            .map(|name| (name, FieldValueState::default()))
            .collect()
    }

    /// Store initial values into the metadata of already registered fields.
    /// Unregistered leaves in the tree fail the whole write.
    pub fn set_fields_initial_value(&mut self, values: &Value) -> Result<(), StoreError> {
        let flat = self.flatten_registered_values(values)?;
        for (name, value) in flat {
            if let Some(meta) = self.meta.get_mut(&name) {
                meta.initial_value = Some(value);
            }
        }
        Ok(())
    }

    pub fn get_all_fields_name(&self) -> Vec<String> {
        self.meta.keys().cloned().collect()
    }

    /// Registered paths minus the ones whose metadata marks them hidden.
    pub fn get_valid_fields_name(&self) -> Vec<String> {
        self.meta
            .iter()
            .filter(|(_, meta)| !meta.hidden)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Expand possibly partial group names to every full path that matches
    /// exactly or continues past a `.`/`[` boundary.
    pub fn get_valid_fields_full_name(&self, partials: &[&str]) -> Vec<String> {
        self.get_valid_fields_name()
            .into_iter()
            .filter(|full| {
                partials
                    .iter()
                    .any(|partial| full == partial || path::is_part_of(partial, full))
            })
            .collect()
    }

    /// Mark every collected field carrying validation rules as dirty, so
    /// results computed against pre-update values get discarded.
    pub fn set_fields_as_dirty(&mut self) {
        for (name, field) in self.fields.iter_mut() {
            if self.meta.get(name).is_some_and(FieldMeta::has_rules) {
                field.dirty = true;
            }
        }
    }

    /// Resolve the externally visible prop map for a field: the
    /// `value_props` hook when present, otherwise a single entry keyed by
    /// the configured value prop name.
    pub fn get_field_value_prop_value(&self, meta: &FieldMeta) -> IndexMap<String, Value> {
        let value = value_in(&self.fields, &self.meta, &meta.name).unwrap_or(Value::Null);
        match &meta.value_props {
            Some(hook) => hook.value_props(&value),
            None => IndexMap::from([(meta.value_prop_name.clone(), value)]),
        }
    }

    /// `a` and `a.b` cannot be registered in the same store.
    pub fn is_valid_nested_field_name(&self, name: &str) -> bool {
        self.find_nesting_conflict(name).is_none()
    }

    /// The registered path `name` structurally overlaps, if any.
    pub fn find_nesting_conflict(&self, name: &str) -> Option<String> {
        self.meta
            .keys()
            .find(|registered| {
                path::is_part_of(registered, name) || path::is_part_of(name, registered)
            })
            .cloned()
    }

    /// Delete both value state and metadata for a path.
    pub fn clear_field(&mut self, name: &str) {
        self.fields.shift_remove(name);
        self.meta.shift_remove(name);
    }

    pub fn get_field(&self, name: &str) -> FieldValueState {
        self.fields.get(name).cloned().unwrap_or_default()
    }

    pub fn has_field_state(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Current value for one full path: explicit state wins, then the
    /// metadata's initial value, then null.
    fn full_name_value(&self, name: &str) -> Value {
        value_in(&self.fields, &self.meta, name).unwrap_or(Value::Null)
    }

    /// Value for a possibly partial name: group names rebuild the nested
    /// object or sequence their registered leaves span.
    pub fn get_field_value(&self, name: &str) -> Value {
        self.get_nested_field(name, |full| self.full_name_value(full))
    }

    pub fn get_fields_value(&self, names: Option<&[&str]>) -> Value {
        self.get_nested_fields(names, |name| self.get_field_value(name))
    }

    fn field_error_value(&self, name: &str) -> Value {
        match self.fields.get(name).and_then(|field| field.errors.as_ref()) {
            Some(errors) => Value::Array(
                errors
                    .iter()
                    .map(|error| Value::String(error.message.clone()))
                    .collect(),
            ),
            None => Value::Null,
        }
    }

    /// Error messages for a possibly partial name, `null` where a field has
    /// none.
    pub fn get_field_error(&self, name: &str) -> Value {
        self.get_nested_field(name, |full| self.field_error_value(full))
    }

    pub fn get_fields_error(&self, names: Option<&[&str]>) -> Value {
        self.get_nested_fields(names, |name| self.get_field_error(name))
    }

    pub fn is_field_touched(&self, name: &str) -> bool {
        self.fields.get(name).is_some_and(|field| field.touched)
    }

    pub fn is_fields_touched(&self, names: Option<&[&str]>) -> bool {
        match names {
            Some(names) => names.iter().any(|name| self.is_field_touched(name)),
            None => self
                .get_valid_fields_name()
                .iter()
                .any(|name| self.is_field_touched(name)),
        }
    }

    pub fn is_field_validating(&self, name: &str) -> bool {
        self.fields.get(name).is_some_and(|field| field.validating)
    }

    pub fn is_fields_validating(&self, names: Option<&[&str]>) -> bool {
        match names {
            Some(names) => names.iter().any(|name| self.is_field_validating(name)),
            None => self
                .get_valid_fields_name()
                .iter()
                .any(|name| self.is_field_validating(name)),
        }
    }

    /// Every registered field's current value as one nested tree.
    pub fn get_all_values(&self) -> Value {
        let mut acc = Value::Object(Map::new());
        for name in self.meta.keys() {
            path::set_path(&mut acc, name, self.full_name_value(name));
        }
        acc
    }

    /// Registered fields that never received state, seeded from their
    /// initial values.
    fn get_not_collected_fields(&self) -> IndexMap<String, FieldValueState> {
        self.get_valid_fields_name()
            .into_iter()
            .filter(|name| !self.fields.contains_key(name))
            .map(|name| {
                let initial = self.meta.get(&name).and_then(|meta| meta.initial_value.clone());
                (
                    name,
                    FieldValueState {
                        value: initial,
                        ..Default::default()
                    },
                )
            })
            .collect()
    }

    /// Snapshot of every field, collected or not, as a marker-leaf tree.
    pub fn get_nested_all_fields(&self) -> FieldTree {
        let mut flat = self.get_not_collected_fields();
        flat.extend(self.fields.clone());
        FieldTree::from_flat(flat)
    }

    /// Flatten a plain nested value tree down to registered paths. A leaf
    /// that lands outside the registered set rejects the whole tree.
    pub fn flatten_registered_values(
        &self,
        tree: &Value,
    ) -> Result<IndexMap<String, Value>, StoreError> {
        path::flatten_values(tree, |path| self.meta.contains_key(path))
    }

    fn get_nested_field<F>(&self, name: &str, getter: F) -> Value
    where
        F: Fn(&str) -> Value,
    {
        let full_names = self.get_valid_fields_full_name(&[name]);
        // Not registered, or the name already is a full name.
        if full_names.is_empty() || (full_names.len() == 1 && full_names[0] == name) {
            return getter(name);
        }
        let is_array = full_names[0].as_bytes().get(name.len()) == Some(&b'[');
        let suffix_start = if is_array { name.len() } else { name.len() + 1 };
        let mut acc = if is_array {
            Value::Array(Vec::new())
        } else {
            Value::Object(Map::new())
        };
        for full in &full_names {
            path::set_path(&mut acc, &full[suffix_start..], getter(full));
        }
        acc
    }

    fn get_nested_fields<F>(&self, names: Option<&[&str]>, getter: F) -> Value
    where
        F: Fn(&str) -> Value,
    {
        let names: Vec<String> = match names {
            Some(names) => names.iter().map(|name| name.to_string()).collect(),
            None => self.get_valid_fields_name(),
        };
        let mut acc = Value::Object(Map::new());
        for name in &names {
            path::set_path(&mut acc, name, getter(name));
        }
        acc
    }
}

fn value_in(
    fields: &IndexMap<String, FieldValueState>,
    meta: &IndexMap<String, FieldMeta>,
    name: &str,
) -> Option<Value> {
    fields
        .get(name)
        .and_then(|field| field.value.clone())
        .or_else(|| meta.get(name).and_then(|meta| meta.initial_value.clone()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::field::{Normalize, Rule, ValidateRule, ValueProps};
    use serde_json::json;

    fn register(store: &mut FieldsStore, name: &str) {
        store.get_field_meta(name);
    }

    fn ruled_meta(name: &str) -> FieldMeta {
        FieldMeta {
            validate: vec![ValidateRule {
                triggers: vec!["change".into()],
                rules: vec![Rule::default()],
            }],
            ..FieldMeta::named(name)
        }
    }

    #[test]
    fn lazy_meta_is_created_on_first_read() {
        let mut store = FieldsStore::new();
        assert!(store.peek_field_meta("a").is_none());
        assert_eq!(store.get_field_meta("a").name, "a");
        assert!(store.peek_field_meta("a").is_some());
    }

    #[test]
    fn value_precedence_is_state_then_initial() {
        let mut store = FieldsStore::new();
        let meta = store.get_field_meta("a");
        meta.initial_value = Some(json!("seed"));
        assert_eq!(store.get_field_value("a"), json!("seed"));
        store.set_fields(IndexMap::from([(
            "a".to_string(),
            FieldValueState::with_value(json!("typed")),
        )]));
        assert_eq!(store.get_field_value("a"), json!("typed"));
    }

    #[test]
    fn normalize_sees_sibling_values_from_the_same_batch() {
        let mut store = FieldsStore::new();
        register(&mut store, "a");
        register(&mut store, "b");
        let total = store.get_field_meta("total");
        total.normalize = Some(Arc::new(
            |_: &Value, _: &Value, all: &IndexMap<String, Value>| {
                let a = all.get("a").and_then(Value::as_i64).unwrap_or(0);
                let b = all.get("b").and_then(Value::as_i64).unwrap_or(0);
                json!(a + b)
            },
        ) as Arc<dyn Normalize>);

        store.set_fields(IndexMap::from([(
            "b".to_string(),
            FieldValueState::with_value(json!(4)),
        )]));
        store.set_fields(IndexMap::from([(
            "a".to_string(),
            FieldValueState::with_value(json!(3)),
        )]));
        assert_eq!(store.get_field_value("total"), json!(7));
    }

    #[test]
    fn reset_patch_targets_only_explicit_values() {
        let mut store = FieldsStore::new();
        register(&mut store, "a");
        register(&mut store, "b");
        store.set_fields(IndexMap::from([(
            "a".to_string(),
            FieldValueState::with_value(json!(1)),
        )]));
        let patch = store.reset_fields(None);
        assert_eq!(patch.len(), 1);
        assert_eq!(patch.get("a"), Some(&FieldValueState::default()));
    }

    #[test]
    fn partial_names_expand_on_segment_boundaries() {
        let mut store = FieldsStore::new();
        register(&mut store, "user.name");
        register(&mut store, "user.mail");
        register(&mut store, "username");
        assert_eq!(
            store.get_valid_fields_full_name(&["user"]),
            vec!["user.name".to_string(), "user.mail".to_string()]
        );
    }

    #[test]
    fn hidden_fields_are_excluded_from_valid_names() {
        let mut store = FieldsStore::new();
        register(&mut store, "shown");
        store.get_field_meta("ghost").hidden = true;
        assert_eq!(store.get_valid_fields_name(), vec!["shown".to_string()]);
        assert_eq!(store.get_all_fields_name().len(), 2);
    }

    #[test]
    fn nesting_conflicts_are_detected_both_ways() {
        let mut store = FieldsStore::new();
        register(&mut store, "a");
        assert!(!store.is_valid_nested_field_name("a.b"));
        assert_eq!(store.find_nesting_conflict("a[0]"), Some("a".to_string()));
        assert!(store.is_valid_nested_field_name("ab"));

        let mut store = FieldsStore::new();
        register(&mut store, "a.b");
        assert!(!store.is_valid_nested_field_name("a"));
    }

    #[test]
    fn dirty_marking_skips_fields_without_rules() {
        let mut store = FieldsStore::new();
        store.set_field_meta("ruled", ruled_meta("ruled"));
        register(&mut store, "plain");
        store.set_fields(IndexMap::from([
            ("ruled".to_string(), FieldValueState::with_value(json!(1))),
            ("plain".to_string(), FieldValueState::with_value(json!(2))),
        ]));
        store.set_fields_as_dirty();
        assert!(store.get_field("ruled").dirty);
        assert!(!store.get_field("plain").dirty);
    }

    #[test]
    fn group_reads_rebuild_arrays_and_objects() {
        let mut store = FieldsStore::new();
        register(&mut store, "list[0]");
        register(&mut store, "list[1]");
        register(&mut store, "user.name");
        store.set_fields(IndexMap::from([
            ("list[0]".to_string(), FieldValueState::with_value(json!("x"))),
            ("list[1]".to_string(), FieldValueState::with_value(json!("y"))),
            (
                "user.name".to_string(),
                FieldValueState::with_value(json!("ann")),
            ),
        ]));
        assert_eq!(store.get_field_value("list"), json!(["x", "y"]));
        assert_eq!(
            store.get_fields_value(Some(&["user"])),
            json!({"user": {"name": "ann"}})
        );
        assert_eq!(
            store.get_fields_value(None),
            json!({"list": ["x", "y"], "user": {"name": "ann"}})
        );
    }

    #[test]
    fn value_prop_resolution_honours_the_hook() {
        let mut store = FieldsStore::new();
        {
            let meta = store.get_field_meta("plain");
            meta.value_prop_name = "checked".to_string();
            meta.initial_value = Some(json!(true));
        }
        let meta = store.peek_field_meta("plain").unwrap().clone();
        assert_eq!(
            store.get_field_value_prop_value(&meta),
            IndexMap::from([("checked".to_string(), json!(true))])
        );

        let mut hooked = FieldMeta::named("hooked");
        hooked.value_props = Some(Arc::new(|value: &Value| {
            IndexMap::from([("text".to_string(), json!(value.to_string()))])
        }) as Arc<dyn ValueProps>);
        store.set_field_meta("hooked", hooked.clone());
        let props = store.get_field_value_prop_value(&hooked);
        assert_eq!(props.get("text"), Some(&json!("null")));
    }

    #[test]
    fn nested_all_fields_includes_uncollected_initials() {
        let mut store = FieldsStore::new();
        store.get_field_meta("seeded").initial_value = Some(json!(9));
        register(&mut store, "typed");
        store.set_fields(IndexMap::from([(
            "typed".to_string(),
            FieldValueState::with_value(json!("v")),
        )]));
        let tree = store.get_nested_all_fields();
        assert_eq!(tree.get("seeded").unwrap().value, Some(json!(9)));
        assert_eq!(tree.get("typed").unwrap().value, Some(json!("v")));
    }

    #[test]
    fn registered_flatten_rejects_unknown_leaves() {
        let mut store = FieldsStore::new();
        register(&mut store, "a.b");
        assert!(store.flatten_registered_values(&json!({"a": {"b": 1}})).is_ok());
        let err = store
            .flatten_registered_values(&json!({"a": {"c": 1}}))
            .unwrap_err();
        assert!(matches!(err, StoreError::Unregistered { .. }));
    }

    #[test]
    fn clear_field_removes_state_and_meta() {
        let mut store = FieldsStore::new();
        register(&mut store, "gone");
        store.set_fields(IndexMap::from([(
            "gone".to_string(),
            FieldValueState::with_value(json!(1)),
        )]));
        store.clear_field("gone");
        assert!(store.peek_field_meta("gone").is_none());
        assert!(!store.has_field_state("gone"));
    }
}
