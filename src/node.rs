//! The configuration tree.
//!
//! Nodes are immutable and shared through [`NodeRef`]; merging builds new
//! nodes only along the paths that change and reuses everything else.

use crate::tags::Tags;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Shared handle to an immutable node.
pub type NodeRef = Arc<ConfigNode>;

/// Metadata key marking a leaf as secret; rendered values are masked.
pub const IS_SECRET: &str = "isSecret";

/// Mask used when rendering secret leaves.
pub const SECRET_MASK: &str = "*****";

/// Typed metadata value attached to a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaDataValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

/// Node metadata: key to list of values, independent of node content.
pub type Metadata = BTreeMap<String, Vec<MetaDataValue>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Leaf,
    Map,
    Array,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Leaf => write!(f, "LeafNode"),
            NodeKind::Map => write!(f, "MapNode"),
            NodeKind::Array => write!(f, "ArrayNode"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigNode {
    Leaf {
        value: Option<String>,
        metadata: Metadata,
    },
    Map {
        entries: BTreeMap<String, NodeRef>,
        metadata: Metadata,
    },
    Array {
        elements: Vec<Option<NodeRef>>,
        metadata: Metadata,
    },
}

impl ConfigNode {
    pub fn leaf(value: impl Into<String>) -> Self {
        ConfigNode::Leaf {
            value: Some(value.into()),
            metadata: Metadata::new(),
        }
    }

    pub fn empty_leaf() -> Self {
        ConfigNode::Leaf {
            value: None,
            metadata: Metadata::new(),
        }
    }

    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, ConfigNode)>) -> Self {
        ConfigNode::Map {
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.into(), Arc::new(v)))
                .collect(),
            metadata: Metadata::new(),
        }
    }

    pub fn map_of_refs(entries: BTreeMap<String, NodeRef>) -> Self {
        ConfigNode::Map {
            entries,
            metadata: Metadata::new(),
        }
    }

    /// Dense array from nodes.
    pub fn array(elements: impl IntoIterator<Item = ConfigNode>) -> Self {
        ConfigNode::Array {
            elements: elements.into_iter().map(|n| Some(Arc::new(n))).collect(),
            metadata: Metadata::new(),
        }
    }

    /// Array that may contain absent slots.
    pub fn sparse_array(elements: Vec<Option<NodeRef>>) -> Self {
        ConfigNode::Array {
            elements,
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: MetaDataValue) -> Self {
        self.metadata_mut().entry(key.into()).or_default().push(value);
        self
    }

    pub fn secret(self) -> Self {
        self.with_metadata(IS_SECRET, MetaDataValue::Bool(true))
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            ConfigNode::Leaf { .. } => NodeKind::Leaf,
            ConfigNode::Map { .. } => NodeKind::Map,
            ConfigNode::Array { .. } => NodeKind::Array,
        }
    }

    /// Value of a leaf; `None` for containers and empty leaves.
    pub fn value(&self) -> Option<&str> {
        match self {
            ConfigNode::Leaf { value, .. } => value.as_deref(),
            _ => None,
        }
    }

    pub fn get_key(&self, key: &str) -> Option<&NodeRef> {
        match self {
            ConfigNode::Map { entries, .. } => entries.get(key),
            _ => None,
        }
    }

    pub fn get_index(&self, index: usize) -> Option<&NodeRef> {
        match self {
            ConfigNode::Array { elements, .. } => elements.get(index).and_then(|e| e.as_ref()),
            _ => None,
        }
    }

    /// Number of children, or 1 for a leaf.
    pub fn size(&self) -> usize {
        match self {
            ConfigNode::Leaf { .. } => 1,
            ConfigNode::Map { entries, .. } => entries.len(),
            ConfigNode::Array { elements, .. } => elements.len(),
        }
    }

    pub fn metadata(&self) -> &Metadata {
        match self {
            ConfigNode::Leaf { metadata, .. }
            | ConfigNode::Map { metadata, .. }
            | ConfigNode::Array { metadata, .. } => metadata,
        }
    }

    fn metadata_mut(&mut self) -> &mut Metadata {
        match self {
            ConfigNode::Leaf { metadata, .. }
            | ConfigNode::Map { metadata, .. }
            | ConfigNode::Array { metadata, .. } => metadata,
        }
    }

    /// Copy of this node carrying `metadata` instead of its own.
    pub fn replace_metadata(&self, metadata: Metadata) -> ConfigNode {
        let mut node = self.clone();
        *node.metadata_mut() = metadata;
        node
    }

    pub fn is_secret(&self) -> bool {
        self.metadata()
            .get(IS_SECRET)
            .is_some_and(|values| values.contains(&MetaDataValue::Bool(true)))
    }

    /// Render as `path = value` lines, masking secrets when `mask_secrets` is set.
    pub fn render(&self, mask_secrets: bool) -> String {
        let mut lines = Vec::new();
        self.render_into("", mask_secrets, &mut lines);
        lines.join("\n")
    }

    fn render_into(&self, path: &str, mask_secrets: bool, lines: &mut Vec<String>) {
        match self {
            ConfigNode::Leaf { value, .. } => {
                let shown = match value {
                    Some(_) if mask_secrets && self.is_secret() => SECRET_MASK.to_string(),
                    Some(v) => format!("'{}'", v),
                    None => "<empty>".to_string(),
                };
                lines.push(format!("{} = {}", path, shown));
            }
            ConfigNode::Map { entries, .. } => {
                for (key, child) in entries {
                    let child_path = crate::lexer::join_object(path, key);
                    child.render_into(&child_path, mask_secrets, lines);
                }
            }
            ConfigNode::Array { elements, .. } => {
                for (index, child) in elements.iter().enumerate() {
                    let child_path = crate::lexer::join_array(path, index);
                    match child {
                        Some(child) => child.render_into(&child_path, mask_secrets, lines),
                        None => lines.push(format!("{} = <missing>", child_path)),
                    }
                }
            }
        }
    }
}

/// Identity of the source a node was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(Uuid);

impl SourceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SourceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A loaded source's tree, bound to its identity and tags.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigNodeContainer {
    pub node: NodeRef,
    pub source: SourceId,
    pub tags: Tags,
}

impl ConfigNodeContainer {
    pub fn new(node: impl Into<NodeRef>, source: SourceId, tags: Tags) -> Self {
        Self {
            node: node.into(),
            source,
            tags,
        }
    }
}
