//! `${transformer:key}` substitution in leaf values.
//!
//! Each source's tree is rewritten before it is registered. A token without
//! a transformer name (`${KEY}`) is an environment lookup. Substitution runs
//! in passes so a token may expand into further tokens, up to the configured
//! nested depth.

use crate::error::{ConfigError, Result};
use crate::lexer::{join_array, join_object};
use crate::node::{ConfigNode, NodeRef};
use crate::settings::ConfigSettings;
use crate::validation::{Validated, ValidationError};
use base64::{Engine, engine::general_purpose::STANDARD};
use regex_lite::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub const ENV_TRANSFORMER: &str = "env";

/// Turns a key into its substituted text.
pub trait Transformer: Send + Sync {
    fn name(&self) -> &str;

    fn process(&self, path: &str, key: &str) -> Validated<String>;
}

fn failed(path: &str, name: &str, key: &str, reason: impl ToString) -> Validated<String> {
    Validated::invalid(ValidationError::TransformerFailed {
        path: path.to_string(),
        name: name.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    })
}

/// Environment variable lookup.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentTransformer {
    vars: Option<HashMap<String, String>>,
}

impl EnvironmentTransformer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up in the given variables instead of the process environment.
    pub fn from_vars<K: Into<String>, V: Into<String>>(vars: impl IntoIterator<Item = (K, V)>) -> Self {
        Self {
            vars: Some(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect()),
        }
    }
}

impl Transformer for EnvironmentTransformer {
    fn name(&self) -> &str {
        ENV_TRANSFORMER
    }

    fn process(&self, path: &str, key: &str) -> Validated<String> {
        let value = match &self.vars {
            Some(vars) => vars.get(key).cloned(),
            None => std::env::var(key).ok(),
        };
        match value {
            Some(value) => Validated::valid(value),
            None => failed(path, self.name(), key, "variable not set"),
        }
    }
}

pub struct Base64DecodeTransformer;

impl Transformer for Base64DecodeTransformer {
    fn name(&self) -> &str {
        "base64Decode"
    }

    fn process(&self, path: &str, key: &str) -> Validated<String> {
        match STANDARD.decode(key.trim()) {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(text) => Validated::valid(text),
                Err(e) => failed(path, self.name(), key, e),
            },
            Err(e) => failed(path, self.name(), key, e),
        }
    }
}

pub struct Base64EncodeTransformer;

impl Transformer for Base64EncodeTransformer {
    fn name(&self) -> &str {
        "base64Encode"
    }

    fn process(&self, _path: &str, key: &str) -> Validated<String> {
        Validated::valid(STANDARD.encode(key))
    }
}

pub fn default_transformers() -> Vec<Arc<dyn Transformer>> {
    vec![
        Arc::new(EnvironmentTransformer::new()),
        Arc::new(Base64DecodeTransformer),
        Arc::new(Base64EncodeTransformer),
    ]
}

/// Rewrites substitution tokens in every leaf of a tree.
pub struct TransformerPostProcessor {
    transformers: Vec<Arc<dyn Transformer>>,
    token: Regex,
    max_depth: usize,
}

impl TransformerPostProcessor {
    pub fn new(settings: &ConfigSettings, transformers: Vec<Arc<dyn Transformer>>) -> Result<Self> {
        let open = &settings.substitution_open;
        let close = &settings.substitution_close;
        let (Some(open_first), Some(close_first)) = (open.chars().next(), close.chars().next()) else {
            return Err(ConfigError::InvalidSettings(
                "substitution delimiters must not be empty".to_string(),
            ));
        };
        // Keys exclude the delimiters' first characters so the innermost token matches first.
        let pattern = format!(
            r"{}(?:(?P<name>[A-Za-z0-9_\-]+):)?(?P<key>[^{}{}]*){}",
            regex_lite::escape(open),
            regex_lite::escape(&open_first.to_string()),
            regex_lite::escape(&close_first.to_string()),
            regex_lite::escape(close),
        );
        let token = Regex::new(&pattern).map_err(|e| ConfigError::InvalidSettings(e.to_string()))?;
        Ok(Self {
            transformers,
            token,
            max_depth: settings.max_substitution_nested_depth,
        })
    }

    pub fn with_defaults(settings: &ConfigSettings) -> Result<Self> {
        Self::new(settings, default_transformers())
    }

    /// Later registrations shadow earlier ones with the same name.
    pub fn add_transformer(&mut self, transformer: Arc<dyn Transformer>) {
        self.transformers.insert(0, transformer);
    }

    fn transformer(&self, name: &str) -> Option<&Arc<dyn Transformer>> {
        self.transformers
            .iter()
            .find(|t| t.name().eq_ignore_ascii_case(name))
    }

    /// Rewrite every leaf under `node`.
    pub fn process(&self, node: &NodeRef) -> Validated<NodeRef> {
        let mut errors = Vec::new();
        let processed = self.process_node("", node, &mut errors);
        Validated::of(Some(processed), errors)
    }

    fn process_node(&self, path: &str, node: &NodeRef, errors: &mut Vec<ValidationError>) -> NodeRef {
        match node.as_ref() {
            ConfigNode::Leaf {
                value: Some(value),
                metadata,
            } if self.token.is_match(value) => {
                let substituted = self.substitute(path, value).drain_into(errors);
                Arc::new(ConfigNode::Leaf {
                    value: substituted.or_else(|| Some(value.clone())),
                    metadata: metadata.clone(),
                })
            }
            ConfigNode::Leaf { .. } => Arc::clone(node),
            ConfigNode::Map { entries, metadata } => Arc::new(ConfigNode::Map {
                entries: entries
                    .iter()
                    .map(|(key, child)| {
                        (key.clone(), self.process_node(&join_object(path, key), child, errors))
                    })
                    .collect(),
                metadata: metadata.clone(),
            }),
            ConfigNode::Array { elements, metadata } => Arc::new(ConfigNode::Array {
                elements: elements
                    .iter()
                    .enumerate()
                    .map(|(index, slot)| {
                        slot.as_ref()
                            .map(|child| self.process_node(&join_array(path, index), child, errors))
                    })
                    .collect(),
                metadata: metadata.clone(),
            }),
        }
    }

    /// Expand tokens in `value`. Tokens that fail are left as written.
    pub fn substitute(&self, path: &str, value: &str) -> Validated<String> {
        let mut current = value.to_string();
        let mut errors = Vec::new();
        let mut failed_tokens: HashSet<String> = HashSet::new();

        for _ in 0..self.max_depth {
            let mut changed = false;
            let mut output = String::with_capacity(current.len());
            let mut last = 0;
            for captures in self.token.captures_iter(&current) {
                let Some(whole) = captures.get(0) else {
                    continue;
                };
                output.push_str(&current[last..whole.start()]);
                last = whole.end();

                if failed_tokens.contains(whole.as_str()) {
                    output.push_str(whole.as_str());
                    continue;
                }
                let name = captures.name("name").map_or(ENV_TRANSFORMER, |m| m.as_str());
                let key = captures.name("key").map_or("", |m| m.as_str());
                match self.apply(path, name, key).drain_into(&mut errors) {
                    Some(replacement) => {
                        output.push_str(&replacement);
                        changed = true;
                    }
                    None => {
                        failed_tokens.insert(whole.as_str().to_string());
                        output.push_str(whole.as_str());
                    }
                }
            }
            output.push_str(&current[last..]);
            current = output;
            if !changed {
                return Validated::of(Some(current), errors);
            }
        }

        let pending = self
            .token
            .find_iter(&current)
            .any(|m| !failed_tokens.contains(m.as_str()));
        if pending {
            errors.push(ValidationError::ExceededMaxNestedDepth {
                path: path.to_string(),
                depth: self.max_depth,
            });
        }
        Validated::of(Some(current), errors)
    }

    fn apply(&self, path: &str, name: &str, key: &str) -> Validated<String> {
        match self.transformer(name) {
            Some(transformer) => transformer.process(path, key),
            None => Validated::invalid(ValidationError::TransformerNotFound {
                path: path.to_string(),
                name: name.to_string(),
            }),
        }
    }
}

impl std::fmt::Debug for TransformerPostProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.transformers.iter().map(|t| t.name()).collect();
        f.debug_struct("TransformerPostProcessor")
            .field("transformers", &names)
            .field("max_depth", &self.max_depth)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::ValidationLevel;

    fn processor(vars: &[(&str, &str)]) -> TransformerPostProcessor {
        let mut processor = TransformerPostProcessor::with_defaults(&ConfigSettings::default()).unwrap();
        processor.add_transformer(Arc::new(EnvironmentTransformer::from_vars(vars.iter().copied())));
        processor
    }

    #[test]
    fn test_env_substitution() {
        let p = processor(&[("HOST", "db.local"), ("PORT", "5432")]);
        let result = p.substitute("db.url", "jdbc://${HOST}:${env:PORT}/app");
        assert!(!result.has_errors());
        assert_eq!(result.into_results().unwrap(), "jdbc://db.local:5432/app");
    }

    #[test]
    fn test_base64() {
        let p = processor(&[]);
        assert_eq!(
            p.substitute("a", "${base64Decode:c2VjcmV0}").into_results().unwrap(),
            "secret"
        );
        assert_eq!(
            p.substitute("a", "${base64Encode:secret}").into_results().unwrap(),
            "c2VjcmV0"
        );
        let bad = p.substitute("a", "${base64Decode:!!!}");
        assert_eq!(bad.errors()[0].level(), ValidationLevel::Error);
    }

    #[test]
    fn test_nested_tokens() {
        let p = processor(&[("WHICH", "HOST"), ("HOST", "db.local")]);
        let result = p.substitute("a", "${env:${WHICH}}");
        assert!(!result.has_errors());
        assert_eq!(result.into_results().unwrap(), "db.local");
    }

    #[test]
    fn test_unknown_transformer_left_unchanged() {
        let p = processor(&[("A", "1")]);
        let result = p.substitute("path", "${nope:x}-${A}");
        assert_eq!(result.errors().len(), 1);
        assert!(matches!(
            result.errors()[0],
            ValidationError::TransformerNotFound { .. }
        ));
        assert_eq!(result.into_results().unwrap(), "${nope:x}-1");
    }

    #[test]
    fn test_missing_variable_reported_once() {
        let p = processor(&[("WHICH", "B")]);
        let result = p.substitute("path", "${MISSING} ${env:${WHICH}}");
        // MISSING fails on the first pass, B on the second.
        assert_eq!(result.errors().len(), 2);
        assert!(result.errors().iter().all(|e| matches!(e, ValidationError::TransformerFailed { .. })));
    }

    #[test]
    fn test_exceeds_max_depth() {
        let p = processor(&[("LOOP", "${LOOP}")]);
        let result = p.substitute("path", "${LOOP}");
        assert!(result.errors().iter().any(|e| matches!(
            e,
            ValidationError::ExceededMaxNestedDepth { depth: 5, .. }
        )));
    }

    #[test]
    fn test_process_tree() {
        let p = processor(&[("PASS", "123abc")]);
        let tree: NodeRef = Arc::new(ConfigNode::map([
            ("password", ConfigNode::leaf("${PASS}").secret()),
            ("name", ConfigNode::leaf("plain")),
            ("hosts", ConfigNode::array([ConfigNode::leaf("${nope:x}")])),
        ]));
        let result = p.process(&tree);
        assert_eq!(result.errors().len(), 1);
        match &result.errors()[0] {
            ValidationError::TransformerNotFound { path, .. } => assert_eq!(path, "hosts[0]"),
            other => panic!("unexpected {:?}", other),
        }
        let processed = result.into_results().unwrap();
        let password = processed.get_key("password").unwrap();
        assert_eq!(password.value(), Some("123abc"));
        assert!(password.is_secret());
        // Leaves without tokens are shared.
        assert!(Arc::ptr_eq(
            processed.get_key("name").unwrap(),
            tree.get_key("name").unwrap()
        ));
    }
}
