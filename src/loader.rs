//! Conversion of parsed documents into config trees.
//!
//! JSON and YAML documents map directly onto nodes. Flat `path=value`
//! pairs (properties files, environment variables) are tokenized with the
//! path lexer and assembled into a nested tree.

use crate::error::Result;
use crate::lexer::{PathLexer, Token, join_array, join_object};
use crate::node::{ConfigNode, NodeKind};
use crate::validation::{Validated, ValidationError};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Document formats understood by file and string sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
    Properties,
}

impl ConfigFormat {
    /// Pick a format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "json" => Some(ConfigFormat::Json),
            "yaml" | "yml" => Some(ConfigFormat::Yaml),
            "properties" | "props" | "env" => Some(ConfigFormat::Properties),
            _ => None,
        }
    }

    /// Parse `text` in this format.
    pub fn parse(self, text: &str, lexer: &PathLexer) -> Validated<ConfigNode> {
        let parsed = match self {
            ConfigFormat::Json => node_from_json_str(text, lexer),
            ConfigFormat::Yaml => node_from_yaml_str(text, lexer),
            ConfigFormat::Properties => return node_from_pairs(parse_properties(text), lexer),
        };
        match parsed {
            Ok(node) => Validated::valid(node),
            Err(e) => Validated::invalid(ValidationError::SourceLoadFailed {
                source_name: self.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigFormat::Json => write!(f, "json"),
            ConfigFormat::Yaml => write!(f, "yaml"),
            ConfigFormat::Properties => write!(f, "properties"),
        }
    }
}

/// Convert a JSON value. Object keys are normalized; `null` becomes an
/// empty leaf.
pub fn node_from_json(value: &Value, lexer: &PathLexer) -> ConfigNode {
    match value {
        Value::Object(entries) => ConfigNode::map(
            entries
                .iter()
                .map(|(key, child)| (lexer.normalize(key), node_from_json(child, lexer))),
        ),
        Value::Array(elements) => {
            ConfigNode::array(elements.iter().map(|child| node_from_json(child, lexer)))
        }
        Value::String(s) => ConfigNode::leaf(s.as_str()),
        Value::Number(n) => ConfigNode::leaf(n.to_string()),
        Value::Bool(b) => ConfigNode::leaf(b.to_string()),
        Value::Null => ConfigNode::empty_leaf(),
    }
}

/// Empty documents load as an empty map.
fn document_node(value: &Value, lexer: &PathLexer) -> ConfigNode {
    match value {
        Value::Null => ConfigNode::map(Vec::<(String, ConfigNode)>::new()),
        other => node_from_json(other, lexer),
    }
}

pub fn node_from_json_str(text: &str, lexer: &PathLexer) -> Result<ConfigNode> {
    let value: Value = if text.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(text)?
    };
    Ok(document_node(&value, lexer))
}

pub fn node_from_yaml_str(text: &str, lexer: &PathLexer) -> Result<ConfigNode> {
    let value: Value = serde_yaml::from_str(text)?;
    Ok(document_node(&value, lexer))
}

/// Split properties-style text into pairs. `#` and `!` start comments;
/// `=` or `:` separates key from value.
pub fn parse_properties(text: &str) -> Vec<(String, String)> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .map(|line| match line.find(['=', ':']) {
            Some(at) => (line[..at].trim().to_string(), line[at + 1..].trim().to_string()),
            None => (line.to_string(), String::new()),
        })
        .collect()
}

/// Tree under construction from flat pairs.
enum Draft {
    Empty,
    Leaf(String),
    Map(BTreeMap<String, Draft>),
    Array(BTreeMap<usize, Draft>),
}

impl Draft {
    fn kind(&self) -> NodeKind {
        match self {
            Draft::Empty | Draft::Leaf(_) => NodeKind::Leaf,
            Draft::Map(_) => NodeKind::Map,
            Draft::Array(_) => NodeKind::Array,
        }
    }

    fn into_node(self) -> ConfigNode {
        match self {
            Draft::Empty => ConfigNode::empty_leaf(),
            Draft::Leaf(value) => ConfigNode::leaf(value),
            Draft::Map(entries) => {
                ConfigNode::map(entries.into_iter().map(|(k, v)| (k, v.into_node())))
            }
            Draft::Array(slots) => {
                let len = slots
                    .keys()
                    .next_back()
                    .and_then(|last| last.checked_add(1))
                    .unwrap_or(0);
                let mut elements = vec![None; len];
                for (index, draft) in slots {
                    if let Some(slot) = elements.get_mut(index) {
                        *slot = Some(Arc::new(draft.into_node()));
                    }
                }
                ConfigNode::sparse_array(elements)
            }
        }
    }

    fn insert(&mut self, path: &str, tokens: &[Token], value: &str) -> std::result::Result<(), ValidationError> {
        let found = self.kind();
        let Some((token, rest)) = tokens.split_first() else {
            return match self {
                Draft::Empty | Draft::Leaf(_) => {
                    *self = Draft::Leaf(value.to_string());
                    Ok(())
                }
                _ => Err(conflict(path, found, NodeKind::Leaf)),
            };
        };

        match token {
            Token::Object(name) => {
                if matches!(self, Draft::Empty) {
                    *self = Draft::Map(BTreeMap::new());
                }
                match self {
                    Draft::Map(entries) => entries
                        .entry(name.clone())
                        .or_insert(Draft::Empty)
                        .insert(&join_object(path, name), rest, value),
                    _ => Err(conflict(path, found, NodeKind::Map)),
                }
            }
            Token::Array(index) => {
                if matches!(self, Draft::Empty) {
                    *self = Draft::Array(BTreeMap::new());
                }
                match self {
                    Draft::Array(slots) => slots
                        .entry(*index)
                        .or_insert(Draft::Empty)
                        .insert(&join_array(path, *index), rest, value),
                    _ => Err(conflict(path, found, NodeKind::Array)),
                }
            }
        }
    }
}

fn conflict(path: &str, left: NodeKind, right: NodeKind) -> ValidationError {
    ValidationError::UnableToMergeDifferentNodes {
        path: path.to_string(),
        left,
        right,
    }
}

/// Assemble flat pairs into a tree. Bad keys and conflicting shapes are
/// reported and the offending pair skipped.
pub fn node_from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>, lexer: &PathLexer) -> Validated<ConfigNode>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut root = Draft::Map(BTreeMap::new());
    let mut errors = Vec::new();
    for (key, value) in pairs {
        let key = lexer.normalize(key.as_ref());
        let Some(tokens) = lexer.tokenize(&key).drain_into(&mut errors) else {
            continue;
        };
        if let Err(error) = root.insert("", &tokens, value.as_ref()) {
            errors.push(error);
        }
    }
    Validated::of(Some(root.into_node()), errors)
}
