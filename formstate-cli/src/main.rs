mod engine;

use std::fmt::Write as FmtWrite;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use clap::{ArgAction, Parser};
use color_eyre::eyre::{eyre, Report, Result, WrapErr};
use serde_json::{json, Value};

use formstate::{
    emit, parse_document_str, parse_field_specs_str, FieldSpecDoc, FormController, FormOptions,
    LogSink, OutputDestination, OutputOptions, ValidateOptions,
};

use engine::BasicRuleEngine;

#[derive(Debug, Parser)]
#[command(
    name = "formstate",
    version,
    about = "Validate value documents against declarative field specs"
)]
struct Cli {
    /// Field spec: file path, inline payload, or "-" for stdin
    #[arg(short = 's', long = "fields", value_name = "SPEC")]
    fields: String,

    /// Values document: file path, inline payload, or "-" for stdin
    #[arg(short = 'c', long = "values", value_name = "SPEC")]
    values: Option<String>,

    /// Validation message templates ("%s" stands in for the field name)
    #[arg(long = "messages", value_name = "SPEC")]
    messages: Option<String>,

    /// Restrict validation to these field names (prefixes select groups)
    #[arg(long = "only", value_name = "NAME", num_args = 1.., action = ArgAction::Append)]
    only: Vec<String>,

    /// Output destinations ("-" writes to stdout). Accepts multiple values per flag use.
    #[arg(short = 'o', long = "output", value_name = "DEST", num_args = 1.., action = ArgAction::Append)]
    outputs: Vec<String>,

    /// Emit compact JSON rather than pretty formatting
    #[arg(long = "no-pretty")]
    no_pretty: bool,

    /// Validate every field even when its value has not changed
    #[arg(short = 'f', long = "force")]
    force: bool,

    /// Stop at the first failing rule for every field
    #[arg(long = "first")]
    first: bool,
}

#[derive(Debug)]
enum InputSource {
    File(PathBuf),
    Stdin,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let mut diagnostics = DiagnosticCollector::default();

    let fields_stdin = cli.fields == "-";
    let values_stdin = cli.values.as_deref() == Some("-");
    if fields_stdin && values_stdin {
        diagnostics.push_input(
            "fields/values",
            "cannot read fields and values from stdin simultaneously; provide inline content or files",
        );
    }

    let spec_doc = load_field_specs(&cli.fields, fields_stdin && values_stdin, &mut diagnostics);
    let values_doc = load_optional_value(cli.values.as_deref(), "values", &mut diagnostics);
    let messages = load_optional_value(cli.messages.as_deref(), "messages", &mut diagnostics);

    let output_options = build_output_options(&cli, &mut diagnostics);
    diagnostics.into_result()?;

    let spec_doc = spec_doc.unwrap_or_default();
    let mut options = FormOptions::default().with_diagnostics(std::sync::Arc::new(LogSink));
    if let Some(messages) = messages {
        options = options.with_validate_messages(messages);
    }

    let mut form = FormController::new(options);
    for spec in spec_doc.fields {
        let (name, field_options) = spec.into_options();
        form.register_field(&name, field_options)
            .map_err(|err| eyre!("cannot register field `{name}`: {err}"))?;
    }
    if let Some(values) = values_doc.as_ref() {
        form.set_fields_value(values)
            .map_err(|err| Report::msg(err.to_string()))?;
    }

    let names: Vec<&str> = cli.only.iter().map(String::as_str).collect();
    let names = (!names.is_empty()).then_some(names.as_slice());
    let validate_options = ValidateOptions::default()
        .with_force(cli.force || values_doc.is_some())
        .with_first(cli.first);

    match form.validate_fields(&BasicRuleEngine, names, validate_options) {
        Ok(values) => {
            emit(&json!({"ok": true, "values": values}), &output_options)
                .map_err(|err| Report::msg(err.to_string()))?;
            Ok(())
        }
        Err(failure) => {
            emit(
                &json!({
                    "ok": false,
                    "errors": failure.report.to_value(),
                    "values": failure.values,
                }),
                &output_options,
            )
            .map_err(|err| Report::msg(err.to_string()))?;
            std::process::exit(1);
        }
    }
}

fn load_field_specs(
    spec: &str,
    skip: bool,
    diagnostics: &mut DiagnosticCollector,
) -> Option<FieldSpecDoc> {
    if skip {
        return None;
    }
    match load_contents(spec, "fields").and_then(|contents| {
        parse_field_specs_str(&contents).map_err(|err| Report::msg(err.to_string()))
    }) {
        Ok(doc) => Some(doc),
        Err(err) => {
            diagnostics.push_input("fields", err.to_string());
            None
        }
    }
}

fn load_optional_value(
    spec: Option<&str>,
    label: &str,
    diagnostics: &mut DiagnosticCollector,
) -> Option<Value> {
    let raw = spec?;
    match load_contents(raw, label).and_then(|contents| {
        parse_document_str(&contents).map_err(|err| Report::msg(err.to_string()))
    }) {
        Ok(value) => Some(value),
        Err(err) => {
            diagnostics.push_input(label, err.to_string());
            None
        }
    }
}

/// Resolve a spec argument: stdin for "-", then a file path, then inline
/// JSON when no such file exists.
fn load_contents(spec: &str, label: &str) -> Result<String> {
    if spec == "-" {
        return read_from_source(&InputSource::Stdin);
    }
    let path = PathBuf::from(spec);
    match read_from_source(&InputSource::File(path.clone())) {
        Ok(contents) => Ok(contents),
        Err(err) => {
            if is_not_found(&err) {
                return Ok(spec.to_string());
            }
            Err(err.wrap_err(format!("failed to load {label} from {}", path.display())))
        }
    }
}

fn read_from_source(source: &InputSource) -> Result<String> {
    match source {
        InputSource::Stdin => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .wrap_err("failed to read from stdin")?;
            Ok(buffer)
        }
        InputSource::File(path) => fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read file {}", path.display())),
    }
}

fn is_not_found(err: &Report) -> bool {
    err.downcast_ref::<io::Error>()
        .is_some_and(|io_err| io_err.kind() == io::ErrorKind::NotFound)
}

fn build_output_options(cli: &Cli, diagnostics: &mut DiagnosticCollector) -> OutputOptions {
    let mut destinations = Vec::new();
    for raw in &cli.outputs {
        if raw.trim().is_empty() {
            diagnostics.push_output("output destination cannot be empty");
            continue;
        }
        if raw == "-" {
            destinations.push(OutputDestination::Stdout);
        } else {
            destinations.push(OutputDestination::file(raw));
        }
    }
    if destinations.is_empty() {
        destinations.push(OutputDestination::Stdout);
    }
    OutputOptions::default()
        .with_pretty(!cli.no_pretty)
        .with_destinations(destinations)
}

#[derive(Default)]
struct DiagnosticCollector {
    messages: Vec<String>,
}

impl DiagnosticCollector {
    fn push_input(&mut self, label: &str, message: impl Into<String>) {
        self.messages
            .push(format!("input ({label}): {}", message.into()));
    }

    fn push_output(&mut self, message: impl Into<String>) {
        self.messages.push(format!("output: {}", message.into()));
    }

    fn into_result(self) -> Result<()> {
        if self.messages.is_empty() {
            return Ok(());
        }
        let mut body = String::from("encountered input/output issues:\n");
        for (idx, msg) in self.messages.iter().enumerate() {
            let _ = writeln!(body, "  {}. {}", idx + 1, msg);
        }
        Err(eyre!(body))
    }
}
