//! # Core Error Types
//!
//! Error definitions shared by the spammer crates.
//! All errors implement `std::error::Error` and `std::fmt::Display`.

use thiserror::Error;

/// Configuration-related errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Parse error in {path}: {msg}")]
    ParseError { path: String, msg: String },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("I/O error reading {path}: {msg}")]
    IoError { path: String, msg: String },
}

impl ConfigError {
    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::invalid("increment_delay_ms", "must be at least 1");
        assert_eq!(
            err.to_string(),
            "Invalid value for 'increment_delay_ms': must be at least 1"
        );
    }

    #[test]
    fn test_config_error_display_names_path() {
        let err = ConfigError::FileNotFound {
            path: "spam.toml".to_string(),
        };
        assert_eq!(err.to_string(), "File not found: spam.toml");
    }
}
