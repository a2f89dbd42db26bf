//! Diagnostic line sinks.
//!
//! The pipeline writes one line per request attempt: successes go to
//! `info`, failures to `error`. Lines carry no structured fields.

use std::fmt;

/// Receives the pipeline's per-request diagnostic lines.
pub trait DiagnosticSink: Send + Sync {
    fn info(&self, line: &str);
    fn error(&self, line: &str);
}

/// Discards every line. The default for a new `Client`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl DiagnosticSink for NoopSink {
    fn info(&self, _line: &str) {}
    fn error(&self, _line: &str) {}
}

/// Forwards lines to `tracing` under the `accounts_client` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn info(&self, line: &str) {
        tracing::info!(target: "accounts_client", "{line}");
    }

    fn error(&self, line: &str) {
        tracing::error!(target: "accounts_client", "{line}");
    }
}

/// Formats a diagnostic line: `{method} -> {url} -> {outcome}`.
pub(crate) fn line(method: impl fmt::Display, url: &str, outcome: impl fmt::Display) -> String {
    format!("{method} -> {url} -> {outcome}")
}
