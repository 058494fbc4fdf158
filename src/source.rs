//! Configuration sources.
//!
//! A source knows how to produce a tree and carries the identity and tags
//! its tree is registered under. Load failures become diagnostics on the
//! returned [`Validated`], never panics.

use crate::lexer::PathLexer;
use crate::loader::{ConfigFormat, node_from_pairs};
use crate::node::{ConfigNode, ConfigNodeContainer, SourceId};
use crate::tags::Tags;
use crate::validation::{Validated, ValidationError};
use std::path::{Path, PathBuf};
use tracing::debug;

pub trait ConfigSource: Send + Sync {
    fn id(&self) -> SourceId;

    fn name(&self) -> &str;

    fn tags(&self) -> &Tags;

    /// Produce this source's tree.
    fn load(&self, lexer: &PathLexer) -> Validated<ConfigNode>;

    /// File to watch for changes, if any.
    fn watch_path(&self) -> Option<&Path> {
        None
    }

    /// Load and bind the tree to this source's identity and tags.
    fn load_container(&self, lexer: &PathLexer) -> Validated<ConfigNodeContainer> {
        self.load(lexer)
            .map(|node| ConfigNodeContainer::new(node, self.id(), self.tags().clone()))
    }
}

/// In-memory `path=value` pairs.
#[derive(Debug, Clone)]
pub struct MapConfigSource {
    id: SourceId,
    name: String,
    tags: Tags,
    entries: Vec<(String, String)>,
}

impl MapConfigSource {
    pub fn new<K: Into<String>, V: Into<String>>(entries: impl IntoIterator<Item = (K, V)>) -> Self {
        Self {
            id: SourceId::new(),
            name: "map".to_string(),
            tags: Tags::new(),
            entries: entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl ConfigSource for MapConfigSource {
    fn id(&self) -> SourceId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn tags(&self) -> &Tags {
        &self.tags
    }

    fn load(&self, lexer: &PathLexer) -> Validated<ConfigNode> {
        node_from_pairs(self.entries.iter().map(|(k, v)| (k, v)), lexer)
    }
}

/// A JSON, YAML or properties document held in memory.
#[derive(Debug, Clone)]
pub struct StringConfigSource {
    id: SourceId,
    name: String,
    tags: Tags,
    format: ConfigFormat,
    text: String,
}

impl StringConfigSource {
    pub fn new(format: ConfigFormat, text: impl Into<String>) -> Self {
        Self {
            id: SourceId::new(),
            name: format!("{} string", format),
            tags: Tags::new(),
            format,
            text: text.into(),
        }
    }

    pub fn json(text: impl Into<String>) -> Self {
        Self::new(ConfigFormat::Json, text)
    }

    pub fn yaml(text: impl Into<String>) -> Self {
        Self::new(ConfigFormat::Yaml, text)
    }

    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = tags;
        self
    }
}

impl ConfigSource for StringConfigSource {
    fn id(&self) -> SourceId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn tags(&self) -> &Tags {
        &self.tags
    }

    fn load(&self, lexer: &PathLexer) -> Validated<ConfigNode> {
        self.format.parse(&self.text, lexer)
    }
}

/// A document on disk; the format comes from the file extension.
#[derive(Debug, Clone)]
pub struct FileConfigSource {
    id: SourceId,
    name: String,
    tags: Tags,
    path: PathBuf,
    format: Option<ConfigFormat>,
    optional: bool,
}

impl FileConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            id: SourceId::new(),
            name: path.display().to_string(),
            tags: Tags::new(),
            format: ConfigFormat::from_path(&path),
            path,
            optional: false,
        }
    }

    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_format(mut self, format: ConfigFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// A missing file loads as an empty tree instead of failing.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn failed(&self, reason: impl ToString) -> Validated<ConfigNode> {
        Validated::invalid(ValidationError::SourceLoadFailed {
            source_name: self.name.clone(),
            reason: reason.to_string(),
        })
    }
}

impl ConfigSource for FileConfigSource {
    fn id(&self) -> SourceId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn tags(&self) -> &Tags {
        &self.tags
    }

    fn load(&self, lexer: &PathLexer) -> Validated<ConfigNode> {
        let Some(format) = self.format else {
            return self.failed("unknown file format");
        };
        if self.optional && !self.path.exists() {
            debug!(path = %self.path.display(), "Optional config file not found");
            return Validated::valid(ConfigNode::map(Vec::<(String, ConfigNode)>::new()));
        }
        match std::fs::read_to_string(&self.path) {
            Ok(text) => format.parse(&text, lexer),
            Err(e) => self.failed(e),
        }
    }

    fn watch_path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

/// Environment variables under a prefix. `APP_DB_NAME` with prefix `APP`
/// becomes `db.name`.
#[derive(Debug, Clone)]
pub struct EnvironmentConfigSource {
    id: SourceId,
    name: String,
    tags: Tags,
    prefix: String,
    vars: Option<Vec<(String, String)>>,
}

impl EnvironmentConfigSource {
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            id: SourceId::new(),
            name: format!("env:{}", prefix),
            tags: Tags::new(),
            prefix,
            vars: None,
        }
    }

    /// Read from the given variables instead of the process environment.
    pub fn from_vars<K: Into<String>, V: Into<String>>(
        prefix: impl Into<String>,
        vars: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        let mut source = Self::new(prefix);
        source.vars = Some(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect());
        source
    }

    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = tags;
        self
    }

    /// Config path for a variable name, if it falls under the prefix.
    fn config_key(&self, name: &str) -> Option<String> {
        let rest = if self.prefix.is_empty() {
            name
        } else {
            name.strip_prefix(&self.prefix)?.strip_prefix('_')?
        };
        if rest.is_empty() {
            return None;
        }
        Some(rest.replace('_', ".").to_lowercase())
    }
}

impl ConfigSource for EnvironmentConfigSource {
    fn id(&self) -> SourceId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn tags(&self) -> &Tags {
        &self.tags
    }

    fn load(&self, lexer: &PathLexer) -> Validated<ConfigNode> {
        let vars: Vec<(String, String)> = match &self.vars {
            Some(vars) => vars.clone(),
            None => std::env::vars().collect(),
        };
        let pairs: Vec<(String, String)> = vars
            .into_iter()
            .filter_map(|(name, value)| self.config_key(&name).map(|key| (key, value)))
            .collect();
        node_from_pairs(pairs, lexer)
    }
}
