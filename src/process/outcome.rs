//! Severity ratchet for a single process run

use crate::types::Severity;

/// Outcome of one run; only ever moves up the [`Severity`] order
///
/// Several detectors (stdout phases, stderr classification, exit code, stop
/// requests) report into the same outcome. A less severe verdict never replaces
/// a more severe one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Outcome {
    severity: Severity,
}

impl Outcome {
    /// A fresh outcome at [`Severity::Ok`]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the outcome to `severity` if that is more severe
    ///
    /// Returns `true` when the outcome changed.
    pub fn raise(&mut self, severity: Severity) -> bool {
        if severity > self.severity {
            self.severity = severity;
            true
        } else {
            false
        }
    }

    /// Current severity
    pub fn severity(&self) -> Severity {
        self.severity
    }
}
