//! Non-fatal findings collected during a meshing run.

use crate::error::MeshGenError;
use serde::{Deserialize, Serialize};

/// Severity of a diagnostic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// The run continued but a result is known to be incomplete.
    Warning,
    /// Informational quality metric.
    Info,
}

/// A diagnostic message with severity and the pipeline stage that raised it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// How serious the finding is.
    pub severity: Severity,
    /// Pipeline stage, e.g. `"sampler"` or `"improve"`.
    pub stage: String,
    /// Human readable description.
    pub message: String,
    /// Optional remedy.
    pub hint: Option<String>,
}

impl Diagnostic {
    /// Creates a diagnostic.
    pub fn new(severity: Severity, stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            stage: stage.into(),
            message: message.into(),
            hint: None,
        }
    }

    /// Attaches a hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Creates a warning.
    pub fn warning(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, stage, message)
    }

    /// Creates an informational diagnostic.
    pub fn info(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, stage, message)
    }

    /// Downgrades a recoverable error into a warning.
    pub fn from_error(stage: impl Into<String>, error: &MeshGenError) -> Self {
        Self::warning(stage, error.to_string())
    }
}
