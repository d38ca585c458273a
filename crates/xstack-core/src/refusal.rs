//! Refusal codes and the structured refusal value
//!
//! Every gate outcome that is not a pass maps to exactly one
//! [`RefusalCode`], and every code maps to one process exit code.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Exit code of a passing gate
pub const EXIT_PASS: i32 = 0;

/// Exit code of a mechanical gate failure
pub const EXIT_MECHANICAL: i32 = 1;

/// Exit code of a refusal or invalid input
pub const EXIT_REFUSAL: i32 = 2;

/// Exit code of a semantic escalation
pub const EXIT_SEMANTIC: i32 = 3;

/// Stable refusal codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefusalCode {
    /// Malformed request, registry or ledger
    #[serde(rename = "REFUSE_INVALID_INPUT")]
    InvalidInput,
    /// A gate tool could not be resolved
    #[serde(rename = "REFUSE_TOOL_MISSING")]
    ToolMissing,
    /// A CANONICAL artifact carries run metadata
    #[serde(rename = "REFUSE_CANONICAL_DRIFT")]
    CanonicalDrift,
    /// A write landed outside the mutation allow-list
    #[serde(rename = "REFUSE_WORKSPACE_ESCAPE")]
    WorkspaceEscape,
    /// Overrides present on a release branch
    #[serde(rename = "REFUSE_OVERRIDE_FORBIDDEN")]
    OverrideForbidden,
    /// Needs a human decision
    SemanticEscalationRequired,
    /// Ordinary gate failure
    MechanicalFailure,
}

impl RefusalCode {
    /// Wire form
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidInput => "REFUSE_INVALID_INPUT",
            Self::ToolMissing => "REFUSE_TOOL_MISSING",
            Self::CanonicalDrift => "REFUSE_CANONICAL_DRIFT",
            Self::WorkspaceEscape => "REFUSE_WORKSPACE_ESCAPE",
            Self::OverrideForbidden => "REFUSE_OVERRIDE_FORBIDDEN",
            Self::SemanticEscalationRequired => "SEMANTIC_ESCALATION_REQUIRED",
            Self::MechanicalFailure => "MECHANICAL_FAILURE",
        }
    }

    /// Process exit code
    #[must_use]
    pub fn exit_code(self) -> i32 {
        match self {
            Self::InvalidInput
            | Self::CanonicalDrift
            | Self::WorkspaceEscape
            | Self::OverrideForbidden => EXIT_REFUSAL,
            Self::SemanticEscalationRequired => EXIT_SEMANTIC,
            Self::ToolMissing | Self::MechanicalFailure => EXIT_MECHANICAL,
        }
    }
}

impl fmt::Display for RefusalCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A refusal with context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Refusal {
    /// Code
    pub code: RefusalCode,
    /// Human-readable message
    pub message: String,
    /// Structured details (object or null)
    #[serde(default)]
    pub details: Value,
}

impl Refusal {
    /// Refusal without details
    pub fn new(code: RefusalCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: Value::Null,
        }
    }

    /// Attach details
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    /// Process exit code
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.code.exit_code()
    }
}

impl fmt::Display for Refusal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}
