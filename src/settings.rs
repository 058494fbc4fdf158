//! Policy settings consumed by the engine.

use crate::error::Result;
use crate::lexer::{DEFAULT_DELIMITER, DEFAULT_MAX_ARRAY_INDEX, PathLexer};
use crate::validation::ValidationLevel;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Engine policy flags and format settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSettings {
    /// WARN diagnostics fail public calls.
    #[serde(default)]
    pub treat_warnings_as_errors: bool,

    /// A missing array slot is an ERROR instead of a WARN.
    #[serde(default)]
    pub treat_missing_array_index_as_error: bool,

    /// A missing required object field is an ERROR instead of a WARN.
    #[serde(default)]
    pub treat_missing_values_as_errors: bool,

    /// A missing optional or defaulted field is an ERROR instead of a DEBUG.
    #[serde(default)]
    pub treat_missing_discretionary_values_as_errors: bool,

    /// Regex separating path elements.
    #[serde(default = "default_sentence_delimiter")]
    pub sentence_delimiter: String,

    /// Lowercase paths and loaded keys.
    #[serde(default = "default_true")]
    pub normalize_case: bool,

    /// Maximum substitution passes over a single leaf.
    #[serde(default = "default_max_nested_depth")]
    pub max_substitution_nested_depth: usize,

    /// Largest array index a path or source key may use.
    #[serde(default = "default_max_array_index")]
    pub max_array_index: usize,

    #[serde(default = "default_substitution_open")]
    pub substitution_open: String,

    #[serde(default = "default_substitution_close")]
    pub substitution_close: String,

    /// chrono format for date leaves.
    #[serde(default = "default_date_format")]
    pub date_format: String,

    /// chrono format for naive date-time leaves. RFC 3339 is always accepted.
    #[serde(default = "default_date_time_format")]
    pub date_time_format: String,
}

impl Default for ConfigSettings {
    fn default() -> Self {
        Self {
            treat_warnings_as_errors: false,
            treat_missing_array_index_as_error: false,
            treat_missing_values_as_errors: false,
            treat_missing_discretionary_values_as_errors: false,
            sentence_delimiter: default_sentence_delimiter(),
            normalize_case: true,
            max_substitution_nested_depth: default_max_nested_depth(),
            max_array_index: default_max_array_index(),
            substitution_open: default_substitution_open(),
            substitution_close: default_substitution_close(),
            date_format: default_date_format(),
            date_time_format: default_date_time_format(),
        }
    }
}

fn default_sentence_delimiter() -> String {
    DEFAULT_DELIMITER.to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_array_index() -> usize {
    DEFAULT_MAX_ARRAY_INDEX
}

fn default_max_nested_depth() -> usize {
    5
}

fn default_substitution_open() -> String {
    "${".to_string()
}

fn default_substitution_close() -> String {
    "}".to_string()
}

fn default_date_format() -> String {
    "%Y-%m-%d".to_string()
}

fn default_date_time_format() -> String {
    "%Y-%m-%dT%H:%M:%S".to_string()
}

impl ConfigSettings {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Load settings from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn lexer(&self) -> Result<PathLexer> {
        Ok(PathLexer::new(&self.sentence_delimiter, self.normalize_case)?
            .with_max_array_index(self.max_array_index))
    }

    pub fn missing_array_index_level(&self) -> ValidationLevel {
        if self.treat_missing_array_index_as_error {
            ValidationLevel::Error
        } else {
            ValidationLevel::Warn
        }
    }

    pub fn missing_value_level(&self) -> ValidationLevel {
        if self.treat_missing_values_as_errors {
            ValidationLevel::Error
        } else {
            ValidationLevel::Warn
        }
    }

    pub fn missing_discretionary_value_level(&self) -> ValidationLevel {
        if self.treat_missing_discretionary_values_as_errors {
            ValidationLevel::Error
        } else {
            ValidationLevel::Debug
        }
    }
}
