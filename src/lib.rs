#![deny(rust_2018_idioms)]

mod error;
mod field;
mod form;
mod observe;
mod path;
mod store;
mod validate;

pub mod io;

pub use error::StoreError;
pub use field::{
    EventValue, FieldError, FieldMeta, FieldValueState, Normalize, Rule, ValidateRule, ValueProps,
    DEFAULT_TRIGGER, DEFAULT_VALUE_PROP,
};
pub use form::{
    FieldOptions, FieldProps, FieldsChangedHook, FormController, FormOptions, ValuesChangedHook,
};
pub use io::{
    emit, parse_document_str, parse_field_specs_str, FieldSpec, FieldSpecDoc, OutputDestination,
    OutputOptions,
};
pub use observe::{DiagnosticSink, LogSink, NoopSink};
pub use path::{
    flatten_values, get_path, is_part_of, parse_segments, set_path, unflatten_values, FieldTree,
    Segment,
};
pub use store::FieldsStore;
pub use validate::{
    begin_validation, validate_with, EngineOptions, FieldErrorEntry, PendingValidation,
    RuleEngine, ValidateOptions, ValidationFailure, ValidationOutcome, ValidationReport,
    ValidationRequest, Violation,
};

pub mod prelude {
    pub use super::{
        FieldOptions, FieldTree, FormController, FormOptions, Rule, RuleEngine, ValidateOptions,
        ValidateRule, Violation,
    };
}
