//! The install commentary sink.
//!
//! Installers narrate what they are doing (downloads started, skipped,
//! attempts failed) through an [`InstallLog`]. Callers that do not care
//! pass no sink and the commentary is suppressed. Structured operational
//! diagnostics go through `tracing` separately; this sink is the
//! user-facing, line-oriented account of a single resolution run.

use std::sync::Mutex;

/// Append-only line logger for install commentary.
pub trait InstallLog: Send + Sync {
    /// Append one line.
    fn println(&self, line: &str);
}

/// An [`InstallLog`] that collects lines in memory.
#[derive(Default)]
pub struct MemoryLog {
    lines: Mutex<Vec<String>>,
}

impl MemoryLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the collected lines.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

impl InstallLog for MemoryLog {
    fn println(&self, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line.to_string());
        }
    }
}

/// An [`InstallLog`] that forwards lines to `tracing` at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLog;

impl InstallLog for TracingLog {
    fn println(&self, line: &str) {
        tracing::info!("{line}");
    }
}
