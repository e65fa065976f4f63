//! Soft-failure reporting
//!
//! Advisory OS hints, teardown-time unmaps and best-effort page locking can
//! fail without failing the load. Those failures are reported as
//! [`Diagnostic`] events to a [`DiagnosticSink`]. The default sink forwards
//! them to `tracing`; [`RecordingSink`] keeps them for inspection.

use std::fmt;
use std::sync::{Arc, Mutex};

/// A soft failure observed while mapping, unmapping or locking memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// An access-pattern hint was rejected by the OS
    AdviseFailed { advice: &'static str, message: String },
    /// A hint has no equivalent on this platform
    HintUnsupported { hint: &'static str },
    /// Unmapping a fragment during teardown failed
    UnmapFailed { offset: usize, len: usize, message: String },
    /// Pinning more pages failed; locking is disabled from now on
    LockFailed {
        len: usize,
        previously_locked: usize,
        message: String,
        suggestion: Option<&'static str>,
    },
    /// Unpinning pages failed
    UnlockFailed { len: usize, message: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::AdviseFailed { advice, message } => {
                write!(f, "{} failed: {}", advice, message)
            }
            Diagnostic::HintUnsupported { hint } => {
                write!(f, "{} is not supported on this platform", hint)
            }
            Diagnostic::UnmapFailed { offset, len, message } => {
                write!(f, "munmap of {} bytes at offset {} failed: {}", len, offset, message)
            }
            Diagnostic::LockFailed { len, previously_locked, message, suggestion } => {
                write!(
                    f,
                    "failed to lock {}-byte buffer (after previously locking {} bytes): {}",
                    len, previously_locked, message
                )?;
                if let Some(suggestion) = suggestion {
                    write!(f, "\n{}", suggestion)?;
                }
                Ok(())
            }
            Diagnostic::UnlockFailed { len, message } => {
                write!(f, "failed to unlock {}-byte buffer: {}", len, message)
            }
        }
    }
}

/// Receiver for soft-failure events
pub trait DiagnosticSink: Send + Sync {
    /// Record one event
    fn emit(&self, diagnostic: Diagnostic);
}

/// Forwards every diagnostic to `tracing` at warn level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn emit(&self, diagnostic: Diagnostic) {
        match &diagnostic {
            Diagnostic::HintUnsupported { hint } => {
                tracing::debug!(hint = *hint, "{}", diagnostic);
            }
            Diagnostic::LockFailed { len, previously_locked, .. } => {
                tracing::warn!(len = *len, previously_locked = *previously_locked, "{}", diagnostic);
            }
            _ => tracing::warn!("{}", diagnostic),
        }
    }
}

/// Keeps every diagnostic in memory
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Diagnostic>>,
}

impl RecordingSink {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded events, oldest first
    pub fn events(&self) -> Vec<Diagnostic> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    /// Number of recorded events
    pub fn len(&self) -> usize {
        self.events.lock().map(|events| events.len()).unwrap_or(0)
    }

    /// Check if nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DiagnosticSink for RecordingSink {
    fn emit(&self, diagnostic: Diagnostic) {
        if let Ok(mut events) = self.events.lock() {
            events.push(diagnostic);
        }
    }
}

/// The sink used when none is supplied
pub fn default_sink() -> Arc<dyn DiagnosticSink> {
    Arc::new(TracingSink)
}
