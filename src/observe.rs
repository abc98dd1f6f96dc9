/// Advisory diagnostics for API misuse. Warnings are informational only
/// and never alter control flow.
pub trait DiagnosticSink: Send + Sync {
    fn warn(&self, message: &str);
}

/// Default sink: swallow everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl DiagnosticSink for NoopSink {
    fn warn(&self, _message: &str) {}
}

/// Forward warnings to the `log` facade at warn level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn warn(&self, message: &str) {
        log::warn!("{message}");
    }
}
