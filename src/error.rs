use std::fmt;

/// Data-integrity failure raised synchronously by store or controller
/// operations. The offending operation is rejected without mutating state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A write targeted a path that was never registered.
    Unregistered { path: String },
    /// A path structurally overlaps an already registered path
    /// (`a` and `a.b` cannot coexist).
    NestingConflict { path: String, existing: String },
    /// Registration requires a non-empty field name.
    EmptyFieldName,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Unregistered { path } => {
                write!(f, "cannot write to `{path}` before registering a field for it")
            }
            StoreError::NestingConflict { path, existing } => {
                write!(
                    f,
                    "field name `{path}` cannot be part of field `{existing}` (or vice versa)"
                )
            }
            StoreError::EmptyFieldName => write!(f, "field name must not be empty"),
        }
    }
}

impl std::error::Error for StoreError {}
