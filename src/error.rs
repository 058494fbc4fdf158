//! Errors raised at the public boundary.
//!
//! Internally everything is accumulated into [`crate::validation::Validated`];
//! only the outermost calls turn that into a [`ConfigError`].

use crate::validation::{ValidationError, describe_errors};
use std::fmt;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NoSources,
    Load,
    Validation,
    Conversion,
    UnknownSource,
    InvalidSettings,
    Io,
    Parse,
    Watch,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::NoSources => "NO_SOURCES",
            ErrorCode::Load => "LOAD",
            ErrorCode::Validation => "VALIDATION",
            ErrorCode::Conversion => "CONVERSION",
            ErrorCode::UnknownSource => "UNKNOWN_SOURCE",
            ErrorCode::InvalidSettings => "INVALID_SETTINGS",
            ErrorCode::Io => "IO",
            ErrorCode::Parse => "PARSE",
            ErrorCode::Watch => "WATCH",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No sources provided, unable to load any configs")]
    NoSources,

    #[error("Failed to {stage} config sources, with errors: {message}")]
    Load { stage: String, message: String },

    #[error("Failed getting config path: {path}, with errors: {message}")]
    Validation { path: String, message: String },

    #[error("Unable to convert decoded value for path: {path}, reason: {reason}")]
    Conversion { path: String, reason: String },

    #[error("Unknown config source: {0}")]
    UnknownSource(String),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),
}

impl ConfigError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ConfigError::NoSources => ErrorCode::NoSources,
            ConfigError::Load { .. } => ErrorCode::Load,
            ConfigError::Validation { .. } => ErrorCode::Validation,
            ConfigError::Conversion { .. } => ErrorCode::Conversion,
            ConfigError::UnknownSource(_) => ErrorCode::UnknownSource,
            ConfigError::InvalidSettings(_) => ErrorCode::InvalidSettings,
            ConfigError::Io(_) => ErrorCode::Io,
            ConfigError::Json(_) | ConfigError::Yaml(_) => ErrorCode::Parse,
            ConfigError::Watch(_) => ErrorCode::Watch,
        }
    }

    /// Failure while loading or reloading sources, as opposed to a lookup.
    pub fn load(stage: &str, errors: &[ValidationError]) -> Self {
        ConfigError::Load {
            stage: stage.to_string(),
            message: describe_errors(errors),
        }
    }

    pub fn conversion(path: &str, reason: impl fmt::Display) -> Self {
        ConfigError::Conversion {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for public operations.
pub type Result<T> = std::result::Result<T, ConfigError>;
