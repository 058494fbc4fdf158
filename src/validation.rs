//! Diagnostic accumulation.
//!
//! Every core operation returns a [`Validated`]: an optional value plus an
//! ordered list of [`ValidationError`]s. A value may be present together with
//! errors (partial success), so callers decide at the outer boundary whether
//! the diagnostics are acceptable.

use crate::error::ConfigError;
use crate::node::NodeKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a diagnostic, ordered so that `Fatal > Error > Warn > Info > Debug`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationLevel {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl ValidationLevel {
    /// Whether a diagnostic at this level fails a public call.
    pub fn is_failure(self, treat_warnings_as_errors: bool) -> bool {
        match self {
            ValidationLevel::Fatal | ValidationLevel::Error => true,
            ValidationLevel::Warn => treat_warnings_as_errors,
            ValidationLevel::Info | ValidationLevel::Debug => false,
        }
    }
}

impl fmt::Display for ValidationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationLevel::Fatal => write!(f, "FATAL"),
            ValidationLevel::Error => write!(f, "ERROR"),
            ValidationLevel::Warn => write!(f, "WARN"),
            ValidationLevel::Info => write!(f, "INFO"),
            ValidationLevel::Debug => write!(f, "DEBUG"),
        }
    }
}

/// A single diagnostic produced while tokenizing, merging, navigating or decoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    // Path lexing
    #[error("Empty path provided")]
    EmptyPath,

    #[error("Empty element for path: {path}")]
    EmptyElement { path: String },

    #[error("Unable to tokenize element {element} for path: {path}")]
    FailedToTokenizeElement { element: String, path: String },

    #[error("Unable to parse array index {index} of element {element} for path: {path}")]
    InvalidArrayIndex {
        index: String,
        element: String,
        path: String,
    },

    // Tree merge
    #[error("Unable to merge different nodes at path: {path}, {left} and {right}")]
    UnableToMergeDifferentNodes {
        path: String,
        left: NodeKind,
        right: NodeKind,
    },

    #[error("Leaf nodes are both empty, unable to merge at path: {path}")]
    LeafNodesHaveNoValues { path: String },

    #[error("Empty key for map node at path: {path}, entry dropped")]
    EmptyMapKey { path: String },

    #[error("Missing array index: {index} for path: {path}")]
    ArrayMissingIndex {
        path: String,
        index: usize,
        level: ValidationLevel,
    },

    #[error("Unable to find source {source_id} to reload")]
    UnknownSourceForReload { source_id: String },

    // Navigation
    #[error("No configuration roots available for tags: {tags}")]
    NoConfigRoots { tags: String },

    #[error("Mismatched node for path: {path}, expected {expected} but found {found}")]
    MismatchedObjectNodeForPath {
        path: String,
        expected: NodeKind,
        found: NodeKind,
    },

    #[error("Unable to find array node for path: {path}, at index: {index}")]
    NoResultsFoundForArrayNode { path: String, index: usize },

    #[error("Unable to find object node for path: {path}, at token: {name}")]
    NoResultsFoundForObjectNode { path: String, name: String },

    // Decoding
    #[error("No decoders found for type: {type_name} on path: {path}")]
    NoDecodersFound { path: String, type_name: String },

    #[error("Leaf on path: {path}, missing value, decoder: {decoder}")]
    DecodingLeafMissingValue { path: String, decoder: String },

    #[error("Expected a leaf on path: {path}, received node type: {found}, decoder: {decoder}")]
    DecodingExpectedLeafNodeType {
        path: String,
        found: NodeKind,
        decoder: String,
    },

    #[error("Expected an array or leaf on path: {path}, received node type: {found}, decoder: {decoder}")]
    DecodingExpectedArrayNodeType {
        path: String,
        found: NodeKind,
        decoder: String,
    },

    #[error("Expected a map on path: {path}, received node type: {found}, decoder: {decoder}")]
    DecodingExpectedMapNodeType {
        path: String,
        found: NodeKind,
        decoder: String,
    },

    #[error("Unable to parse a number on path: {path}, from value: {value}, for type: {target}, reason: {reason}")]
    DecodingNumberParsing {
        path: String,
        value: String,
        target: String,
        reason: String,
    },

    #[error("Unable to decode a {target} on path: {path}, from value: {value}, reason: {reason}")]
    DecodingValueParsing {
        path: String,
        value: String,
        target: String,
        reason: String,
    },

    #[error("Expected a char on path: {path}, but received a string of length {length}: {value}")]
    DecodingCharWrongSize {
        path: String,
        value: String,
        length: usize,
    },

    #[error("Unable to find enum value: {value} on path: {path}, for enum: {enum_name}")]
    EnumValueNotFound {
        path: String,
        value: String,
        enum_name: String,
    },

    #[error("Map key was empty on path: {path}")]
    DecodingMapKeyMissing { path: String },

    #[error("Map value was missing on path: {path}, for key: {key}")]
    DecodingMapValueMissing { path: String, key: String },

    #[error("Missing field {field} for object {object} on path: {path}")]
    MissingObjectField {
        path: String,
        field: String,
        object: String,
        level: ValidationLevel,
    },

    // Post-processing and sources
    #[error("Unable to find transformer: {name} on path: {path}")]
    TransformerNotFound { path: String, name: String },

    #[error("Transformer {name} failed for key {key} on path: {path}, reason: {reason}")]
    TransformerFailed {
        path: String,
        name: String,
        key: String,
        reason: String,
    },

    #[error("Exceeded maximum nested substitution depth of {depth} on path: {path}")]
    ExceededMaxNestedDepth { path: String, depth: usize },

    #[error("Unable to load source {source_name}: {reason}")]
    SourceLoadFailed { source_name: String, reason: String },
}

impl ValidationError {
    /// Severity of this diagnostic.
    pub fn level(&self) -> ValidationLevel {
        use ValidationError::*;
        match self {
            ArrayMissingIndex { level, .. } | MissingObjectField { level, .. } => *level,
            EmptyMapKey { .. } | DecodingMapValueMissing { .. } => ValidationLevel::Warn,
            NoDecodersFound { .. } | SourceLoadFailed { .. } => ValidationLevel::Fatal,
            _ => ValidationLevel::Error,
        }
    }

    /// Whether this diagnostic reports that nothing exists at the requested path.
    pub fn is_missing_node(&self) -> bool {
        matches!(
            self,
            ValidationError::NoResultsFoundForArrayNode { .. }
                | ValidationError::NoResultsFoundForObjectNode { .. }
                | ValidationError::NoConfigRoots { .. }
        )
    }
}

/// A value, a partial value, or no value, together with ordered diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct Validated<T> {
    value: Option<T>,
    errors: Vec<ValidationError>,
}

impl<T> Validated<T> {
    pub fn valid(value: T) -> Self {
        Self {
            value: Some(value),
            errors: Vec::new(),
        }
    }

    pub fn invalid(error: ValidationError) -> Self {
        Self {
            value: None,
            errors: vec![error],
        }
    }

    pub fn invalid_all(errors: Vec<ValidationError>) -> Self {
        Self {
            value: None,
            errors,
        }
    }

    pub fn of(value: Option<T>, errors: Vec<ValidationError>) -> Self {
        Self { value, errors }
    }

    pub fn has_results(&self) -> bool {
        self.value.is_some()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// True if any diagnostic is at or above `level`.
    pub fn has_errors_at(&self, level: ValidationLevel) -> bool {
        self.errors.iter().any(|e| e.level() >= level)
    }

    pub fn results(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    pub fn into_parts(self) -> (Option<T>, Vec<ValidationError>) {
        (self.value, self.errors)
    }

    pub fn into_results(self) -> Option<T> {
        self.value
    }

    pub fn push_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn extend_errors(&mut self, errors: impl IntoIterator<Item = ValidationError>) {
        self.errors.extend(errors);
    }

    /// Map the value, keeping diagnostics.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Validated<U> {
        Validated {
            value: self.value.map(f),
            errors: self.errors,
        }
    }

    /// Chain a computation on the value, concatenating diagnostics in order.
    pub fn and_then<U>(self, f: impl FnOnce(T) -> Validated<U>) -> Validated<U> {
        match self.value {
            Some(value) => {
                let next = f(value);
                let mut errors = self.errors;
                errors.extend(next.errors);
                Validated {
                    value: next.value,
                    errors,
                }
            }
            None => Validated {
                value: None,
                errors: self.errors,
            },
        }
    }

    /// Take the value out, moving the diagnostics into `sink`.
    pub fn drain_into(self, sink: &mut Vec<ValidationError>) -> Option<T> {
        sink.extend(self.errors);
        self.value
    }

    /// Convert to a `Result` at the public boundary.
    ///
    /// Fails when there is no value, or when any diagnostic is severe enough
    /// under the given policy. The error message carries every diagnostic.
    pub fn into_result(self, treat_warnings_as_errors: bool, path: &str) -> Result<T, ConfigError> {
        let failed = self
            .errors
            .iter()
            .any(|e| e.level().is_failure(treat_warnings_as_errors));
        match self.value {
            Some(value) if !failed => Ok(value),
            _ => Err(ConfigError::Validation {
                path: path.to_string(),
                message: describe_errors(&self.errors),
            }),
        }
    }
}

/// Join diagnostics into one message, `level: description` per entry.
pub fn describe_errors(errors: &[ValidationError]) -> String {
    if errors.is_empty() {
        return "no results found".to_string();
    }
    errors
        .iter()
        .map(|e| format!("level: {}, message: {}", e.level(), e))
        .collect::<Vec<_>>()
        .join(", ")
}
