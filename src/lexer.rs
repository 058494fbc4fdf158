//! Path tokenization.
//!
//! A path is a sequence of elements split by the sentence delimiter
//! (default `\.`). Each element is either `name` or `name[index]`.

use crate::error::ConfigError;
use crate::validation::{Validated, ValidationError};
use regex_lite::Regex;
use std::fmt;

/// Default sentence delimiter regex.
pub const DEFAULT_DELIMITER: &str = r"\.";

/// Largest array index accepted in a path unless configured otherwise.
pub const DEFAULT_MAX_ARRAY_INDEX: usize = 100_000;

const ELEMENT_PATTERN: &str = r"^(?P<name>[^\[\]]+)(?:\[(?P<index>[^\[\]]*)\])?$";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Token {
    Object(String),
    Array(usize),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Object(name) => write!(f, "{}", name),
            Token::Array(index) => write!(f, "[{}]", index),
        }
    }
}

/// Splits path strings into tokens.
#[derive(Debug, Clone)]
pub struct PathLexer {
    delimiter: Regex,
    element: Regex,
    normalize_case: bool,
    max_array_index: usize,
}

impl PathLexer {
    /// Build a lexer for the given delimiter regex.
    pub fn new(delimiter: &str, normalize_case: bool) -> Result<Self, ConfigError> {
        let delimiter = Regex::new(delimiter).map_err(|e| {
            ConfigError::InvalidSettings(format!("sentence delimiter '{}': {}", delimiter, e))
        })?;
        let element = Regex::new(ELEMENT_PATTERN)
            .map_err(|e| ConfigError::InvalidSettings(e.to_string()))?;
        Ok(Self {
            delimiter,
            element,
            normalize_case,
            max_array_index: DEFAULT_MAX_ARRAY_INDEX,
        })
    }

    /// Reject array indexes above `max`. Sources size arrays by their
    /// largest index, so this bounds what one key can allocate.
    pub fn with_max_array_index(mut self, max: usize) -> Self {
        self.max_array_index = max;
        self
    }

    pub fn max_array_index(&self) -> usize {
        self.max_array_index
    }

    /// Normalize a path or key before tokenizing or storing it.
    pub fn normalize(&self, sentence: &str) -> String {
        if self.normalize_case {
            sentence.trim().to_lowercase()
        } else {
            sentence.trim().to_string()
        }
    }

    /// Split `path` into tokens. Any bad element fails the whole path.
    pub fn tokenize(&self, path: &str) -> Validated<Vec<Token>> {
        if path.trim().is_empty() {
            return Validated::invalid(ValidationError::EmptyPath);
        }

        let mut tokens = Vec::new();
        let mut errors = Vec::new();
        for element in self.delimiter.split(path) {
            let element = element.trim();
            if element.is_empty() {
                errors.push(ValidationError::EmptyElement {
                    path: path.to_string(),
                });
                continue;
            }
            match self.tokenize_element(element, path) {
                Ok(mut element_tokens) => tokens.append(&mut element_tokens),
                Err(error) => errors.push(error),
            }
        }

        if errors.is_empty() {
            Validated::valid(tokens)
        } else {
            Validated::invalid_all(errors)
        }
    }

    fn tokenize_element(&self, element: &str, path: &str) -> Result<Vec<Token>, ValidationError> {
        let captures =
            self.element
                .captures(element)
                .ok_or_else(|| ValidationError::FailedToTokenizeElement {
                    element: element.to_string(),
                    path: path.to_string(),
                })?;

        let name = captures
            .name("name")
            .map(|m| m.as_str().trim())
            .unwrap_or_default();
        let mut tokens = vec![Token::Object(name.to_string())];

        if let Some(index) = captures.name("index") {
            let index_text = index.as_str().trim();
            let index = index_text
                .parse::<usize>()
                .ok()
                .filter(|index| *index <= self.max_array_index)
                .ok_or_else(|| ValidationError::InvalidArrayIndex {
                    index: index_text.to_string(),
                    element: element.to_string(),
                    path: path.to_string(),
                })?;
            tokens.push(Token::Array(index));
        }

        Ok(tokens)
    }
}

impl Default for PathLexer {
    fn default() -> Self {
        Self {
            delimiter: Regex::new(DEFAULT_DELIMITER).expect("default delimiter is a valid regex"),
            element: Regex::new(ELEMENT_PATTERN).expect("element pattern is a valid regex"),
            normalize_case: true,
            max_array_index: DEFAULT_MAX_ARRAY_INDEX,
        }
    }
}

/// Extend a path with an object key (`path.key`, or `key` at the root).
pub fn join_object(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}

/// Extend a path with an array index (`path[index]`).
pub fn join_array(path: &str, index: usize) -> String {
    format!("{}[{}]", path, index)
}

/// Render tokens back into a path string.
pub fn tokens_to_path(tokens: &[Token]) -> String {
    tokens.iter().fold(String::new(), |path, token| match token {
        Token::Object(name) => join_object(&path, name),
        Token::Array(index) => join_array(&path, *index),
    })
}
