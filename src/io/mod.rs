//! Boundary between the coordinator and the filesystem: field-spec
//! documents in, resolved values and error reports out.

mod input;
mod output;

pub use input::{parse_document_str, parse_field_specs_str, FieldSpec, FieldSpecDoc};
pub use output::{emit, OutputDestination, OutputOptions};
