//! Structured error types shared across the virial crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`VirialError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (parameter names, sizes, paths).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Optional hint that may help the caller resolve the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Creates a new error payload with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Adds a context entry to the payload.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Sets a human readable hint for remediation.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Canonical error type for the virial sampler.
///
/// Rejected Monte Carlo proposals are never reported through this type; only
/// failures that make the run meaningless reach the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum VirialError {
    /// Invalid parameter combination detected at construction time.
    #[error("configuration error: {0}")]
    Configuration(ErrorInfo),
    /// The sampler cannot produce a statistically meaningful estimate.
    #[error("degenerate sampling: {0}")]
    DegenerateSampling(ErrorInfo),
    /// Reference-weight checkpoint and run manifest I/O.
    #[error("checkpoint error: {0}")]
    Checkpoint(ErrorInfo),
    /// A cooperative stop arrived before the run had anything to report.
    #[error("interrupted: {0}")]
    Interrupted(ErrorInfo),
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)?;
        if !self.context.is_empty() {
            write!(f, " | context: [")?;
            for (idx, (key, value)) in self.context.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            write!(f, "]")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " | hint: {hint}")?;
        }
        Ok(())
    }
}

impl VirialError {
    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            VirialError::Configuration(info)
            | VirialError::DegenerateSampling(info)
            | VirialError::Checkpoint(info)
            | VirialError::Interrupted(info) => info,
        }
    }

    /// Shorthand for a configuration error with a code and message.
    pub fn configuration(code: impl Into<String>, message: impl Into<String>) -> Self {
        VirialError::Configuration(ErrorInfo::new(code, message))
    }

    /// Shorthand for a degenerate-sampling error with a code and message.
    pub fn degenerate(code: impl Into<String>, message: impl Into<String>) -> Self {
        VirialError::DegenerateSampling(ErrorInfo::new(code, message))
    }

    /// Returns true for the fatal degenerate-sampling family.
    pub fn is_degenerate(&self) -> bool {
        matches!(self, VirialError::DegenerateSampling(_))
    }

    /// Returns true when the error only reflects a requested stop.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, VirialError::Interrupted(_))
    }
}
