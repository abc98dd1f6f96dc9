use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::error::StoreError;
use crate::field::FieldValueState;

/// One step of a dotted/bracketed field path such as `a.b[0]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// Split a path string into segments. Bracketed segments that do not parse
/// as a non-negative integer are treated as plain keys.
pub fn parse_segments(path: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut buf = String::new();
    let mut chars = path.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '.' => {
                if !buf.is_empty() {
                    segments.push(Segment::Key(std::mem::take(&mut buf)));
                }
            }
            '[' => {
                if !buf.is_empty() {
                    segments.push(Segment::Key(std::mem::take(&mut buf)));
                }
                let mut inner = String::new();
                for next in chars.by_ref() {
                    if next == ']' {
                        break;
                    }
                    inner.push(next);
                }
                match inner.parse::<usize>() {
                    Ok(index) => segments.push(Segment::Index(index)),
                    Err(_) => segments.push(Segment::Key(inner)),
                }
            }
            _ => buf.push(c),
        }
    }
    if !buf.is_empty() {
        segments.push(Segment::Key(buf));
    }
    segments
}

/// `child` addresses something inside the group named by `parent`:
/// it starts with `parent` followed immediately by `.` or `[`.
pub fn is_part_of(parent: &str, child: &str) -> bool {
    if parent.is_empty() || child.len() <= parent.len() || !child.starts_with(parent) {
        return false;
    }
    matches!(child.as_bytes()[parent.len()], b'.' | b'[')
}

fn push_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

/// Write `value` at `path` inside `root`, coercing intermediate nodes to
/// objects or arrays as the segments demand. Array holes are null-padded.
pub fn set_path(root: &mut Value, path: &str, value: Value) {
    set_segments(root, &parse_segments(path), value);
}

fn set_segments(root: &mut Value, segments: &[Segment], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        *root = value;
        return;
    };
    match head {
        Segment::Key(key) => {
            if !root.is_object() {
                *root = Value::Object(Map::new());
            }
            if let Value::Object(map) = root {
                let entry = map.entry(key.clone()).or_insert(Value::Null);
                set_segments(entry, rest, value);
            }
        }
        Segment::Index(index) => {
            if !root.is_array() {
                *root = Value::Array(Vec::new());
            }
            if let Value::Array(items) = root {
                while items.len() <= *index {
                    items.push(Value::Null);
                }
                set_segments(&mut items[*index], rest, value);
            }
        }
    }
}

/// Read the value at `path` inside `root`, if every segment resolves.
pub fn get_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in parse_segments(path) {
        current = match (&segment, current) {
            (Segment::Key(key), Value::Object(map)) => map.get(key)?,
            (Segment::Index(index), Value::Array(items)) => items.get(*index)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Nested field-state structure with an explicit leaf marker. A node is a
/// field exactly when it is tagged `Leaf`; plain mappings and sequences are
/// grouping structure, never field state.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldTree {
    Leaf(FieldValueState),
    Node(IndexMap<String, FieldTree>),
    Items(Vec<FieldTree>),
}

impl FieldTree {
    pub fn node() -> Self {
        FieldTree::Node(IndexMap::new())
    }

    /// Flatten to a path-keyed map, insertion order preserved.
    pub fn flatten(&self) -> IndexMap<String, FieldValueState> {
        let mut out = IndexMap::new();
        self.walk("", &mut out);
        out
    }

    fn walk(&self, prefix: &str, out: &mut IndexMap<String, FieldValueState>) {
        match self {
            FieldTree::Leaf(state) => {
                out.insert(prefix.to_string(), state.clone());
            }
            FieldTree::Node(children) => {
                for (key, child) in children {
                    child.walk(&push_key(prefix, key), out);
                }
            }
            FieldTree::Items(items) => {
                for (index, child) in items.iter().enumerate() {
                    child.walk(&format!("{prefix}[{index}]"), out);
                }
            }
        }
    }

    /// Inverse of [`FieldTree::flatten`]: dotted segments rebuild mappings,
    /// indexed segments rebuild sequences.
    pub fn from_flat<I>(flat: I) -> Self
    where
        I: IntoIterator<Item = (String, FieldValueState)>,
    {
        let mut root = FieldTree::node();
        for (path, state) in flat {
            root.insert(&path, state);
        }
        root
    }

    pub fn insert(&mut self, path: &str, state: FieldValueState) {
        insert_segments(self, &parse_segments(path), state);
    }

    pub fn get(&self, path: &str) -> Option<&FieldValueState> {
        let mut current = self;
        for segment in parse_segments(path) {
            current = match (&segment, current) {
                (Segment::Key(key), FieldTree::Node(children)) => children.get(key)?,
                (Segment::Index(index), FieldTree::Items(items)) => items.get(*index)?,
                _ => return None,
            };
        }
        match current {
            FieldTree::Leaf(state) => Some(state),
            _ => None,
        }
    }
}

fn insert_segments(tree: &mut FieldTree, segments: &[Segment], state: FieldValueState) {
    let Some((head, rest)) = segments.split_first() else {
        *tree = FieldTree::Leaf(state);
        return;
    };
    match head {
        Segment::Key(key) => {
            if !matches!(tree, FieldTree::Node(_)) {
                *tree = FieldTree::node();
            }
            if let FieldTree::Node(children) = tree {
                let entry = children.entry(key.clone()).or_insert_with(FieldTree::node);
                insert_segments(entry, rest, state);
            }
        }
        Segment::Index(index) => {
            if !matches!(tree, FieldTree::Items(_)) {
                *tree = FieldTree::Items(Vec::new());
            }
            if let FieldTree::Items(items) = tree {
                while items.len() <= *index {
                    items.push(FieldTree::node());
                }
                insert_segments(&mut items[*index], rest, state);
            }
        }
    }
}

/// Flatten a plain nested value tree down to the paths accepted by
/// `is_leaf`. Reaching a scalar on a path `is_leaf` does not accept is a
/// write to an unaddressable location and fails the whole operation.
pub fn flatten_values<F>(tree: &Value, is_leaf: F) -> Result<IndexMap<String, Value>, StoreError>
where
    F: Fn(&str) -> bool,
{
    let mut out = IndexMap::new();
    flatten_values_at("", tree, &is_leaf, &mut out)?;
    Ok(out)
}

fn flatten_values_at<F>(
    prefix: &str,
    node: &Value,
    is_leaf: &F,
    out: &mut IndexMap<String, Value>,
) -> Result<(), StoreError>
where
    F: Fn(&str) -> bool,
{
    if !prefix.is_empty() && is_leaf(prefix) {
        out.insert(prefix.to_string(), node.clone());
        return Ok(());
    }
    match node {
        Value::Object(map) => {
            for (key, child) in map {
                flatten_values_at(&push_key(prefix, key), child, is_leaf, out)?;
            }
            Ok(())
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                flatten_values_at(&format!("{prefix}[{index}]"), child, is_leaf, out)?;
            }
            Ok(())
        }
        _ => Err(StoreError::Unregistered {
            path: prefix.to_string(),
        }),
    }
}

/// Rebuild a nested value tree from a path-keyed map.
pub fn unflatten_values(flat: &IndexMap<String, Value>) -> Value {
    let mut root = Value::Null;
    for (path, value) in flat {
        set_path(&mut root, path, value.clone());
    }
    if root.is_null() {
        Value::Object(Map::new())
    } else {
        root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn leaf(value: Value) -> FieldTree {
        FieldTree::Leaf(FieldValueState {
            value: Some(value),
            ..Default::default()
        })
    }

    #[test]
    fn parses_mixed_segments() {
        assert_eq!(
            parse_segments("a.b[2].c"),
            vec![
                Segment::Key("a".into()),
                Segment::Key("b".into()),
                Segment::Index(2),
                Segment::Key("c".into()),
            ]
        );
        assert_eq!(parse_segments("[0]"), vec![Segment::Index(0)]);
    }

    #[test]
    fn part_of_requires_a_boundary() {
        assert!(is_part_of("a", "a.b"));
        assert!(is_part_of("a", "a[0]"));
        assert!(!is_part_of("a", "ab"));
        assert!(!is_part_of("a.b", "a"));
        assert!(!is_part_of("a", "a"));
    }

    #[test]
    fn set_and_get_round_trip() {
        let mut root = Value::Null;
        set_path(&mut root, "user.tags[1]", json!("x"));
        set_path(&mut root, "user.name", json!("n"));
        assert_eq!(root, json!({"user": {"tags": [null, "x"], "name": "n"}}));
        assert_eq!(get_path(&root, "user.tags[1]"), Some(&json!("x")));
        assert_eq!(get_path(&root, "user.tags[7]"), None);
        assert_eq!(get_path(&root, "user.name.deep"), None);
    }

    #[test]
    fn field_tree_flatten_unflatten_round_trip() {
        let tree = FieldTree::Node(IndexMap::from([
            (
                "account".to_string(),
                FieldTree::Node(IndexMap::from([
                    ("name".to_string(), leaf(json!("ann"))),
                    (
                        "tags".to_string(),
                        FieldTree::Items(vec![leaf(json!("a")), leaf(json!("b"))]),
                    ),
                ])),
            ),
            ("active".to_string(), leaf(json!(true))),
        ]));
        let flat = tree.flatten();
        assert_eq!(
            flat.keys().collect::<Vec<_>>(),
            vec!["account.name", "account.tags[0]", "account.tags[1]", "active"]
        );
        assert_eq!(FieldTree::from_flat(flat), tree);
    }

    #[test]
    fn flatten_values_rejects_unaddressable_scalars() {
        let registered = ["a.b".to_string()];
        let ok = flatten_values(&json!({"a": {"b": 1}}), |path| {
            registered.contains(&path.to_string())
        })
        .unwrap();
        assert_eq!(ok.get("a.b"), Some(&json!(1)));

        let err = flatten_values(&json!({"a": {"c": 1}}), |path| {
            registered.contains(&path.to_string())
        })
        .unwrap_err();
        assert_eq!(
            err,
            StoreError::Unregistered {
                path: "a.c".to_string()
            }
        );
    }

    #[test]
    fn unflatten_rebuilds_sequences_and_mappings() {
        let flat = IndexMap::from([
            ("list[0]".to_string(), json!(1)),
            ("list[2]".to_string(), json!(3)),
            ("meta.kind".to_string(), json!("k")),
        ]);
        assert_eq!(
            unflatten_values(&flat),
            json!({"list": [1, null, 3], "meta": {"kind": "k"}})
        );
    }
}
