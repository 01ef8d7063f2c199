//! Error types for Sortie

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using SortieError
pub type Result<T> = std::result::Result<T, SortieError>;

/// Main error type for Sortie operations
#[derive(Debug, Error)]
pub enum SortieError {
    /// Configuration-related errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Run-level errors that abort a whole batch
    #[error(transparent)]
    Run(#[from] RunError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found at {0}")]
    NotFound(PathBuf),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {message}")]
    InvalidValue { field: String, message: String },

    /// Missing required field
    #[error("Missing required configuration field: {0}")]
    MissingField(String),

    /// Override expression that is not `key=value` or names an unknown key
    #[error("Invalid override '{expr}': {message}")]
    InvalidOverride { expr: String, message: String },

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// IO error
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that stop a run as a whole (as opposed to a single task)
#[derive(Debug, Error)]
pub enum RunError {
    /// The input file could not be opened
    #[error("Input file not found at {0}")]
    InputNotFound(PathBuf),

    /// The output journal could not be opened or closed
    #[error("Output journal {path} unavailable: {reason}")]
    JournalUnavailable { path: PathBuf, reason: String },

    /// No solver is configured
    #[error("No solver configured (set solver.command)")]
    NoSolver,
}

impl SortieError {
    /// Create a new "other" error with a message
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Self::Other(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidValue {
            field: "run.concurrency".to_string(),
            message: "must be at least 1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid configuration: run.concurrency - must be at least 1"
        );
    }

    #[test]
    fn test_transparent_wrapping() {
        let err: SortieError = RunError::NoSolver.into();
        assert_eq!(err.to_string(), "No solver configured (set solver.command)");
    }
}
