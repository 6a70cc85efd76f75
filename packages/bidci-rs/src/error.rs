use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// A single problem found while validating a configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Dotted path of the offending field, e.g. `preprocessing.bandpass`.
    pub field: String,
    pub reason: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

fn join_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid configuration ({} problem(s)): {}", .0.len(), join_field_errors(.0))]
    Invalid(Vec<FieldError>),

    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration document: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ConfigError {
    /// Field-level problems, empty for I/O and syntax failures.
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            ConfigError::Invalid(errors) => errors,
            _ => &[],
        }
    }

    /// Whether `field` is among the reported problems.
    pub fn mentions(&self, field: &str) -> bool {
        self.field_errors().iter().any(|e| e.field == field)
    }
}

#[derive(Error, Debug)]
pub enum BidciError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Recording not found: {0}")]
    NotFound(String),

    #[error("Precondition not met: {0}")]
    Precondition(String),

    #[error("Backend call '{call}' failed: {message}")]
    Backend { call: String, message: String },

    #[error("Bridge executable not found at: {0}")]
    BridgeNotFound(String),

    #[error("Bridge process error: {0}")]
    Bridge(String),

    #[error("Bridge protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BidciError {
    pub fn backend(call: impl Into<String>, message: impl Into<String>) -> Self {
        BidciError::Backend {
            call: call.into(),
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, BidciError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, BidciError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_lists_every_field() {
        let err = ConfigError::Invalid(vec![
            FieldError::new("bids_root", "missing required field"),
            FieldError::new("task", "expected string, found integer"),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("2 problem(s)"));
        assert!(msg.contains("bids_root: missing required field"));
        assert!(msg.contains("task: expected string"));
        assert!(err.mentions("task"));
        assert!(!err.mentions("runs"));
    }
}
