//! Tree merging.
//!
//! Combines two trees of matching shape, with the overlay taking precedence
//! over the base. Unchanged subtrees are shared rather than copied.
//!
//! - Maps are merged key by key; keys present on one side are carried over
//! - Arrays are merged index by index up to the longer length
//! - Leaves take the overlay value, falling back to the base value
//! - Different node kinds at the same path cannot be merged

use crate::lexer::{join_array, join_object};
use crate::node::{ConfigNode, Metadata, NodeRef};
use crate::settings::ConfigSettings;
use crate::validation::{Validated, ValidationError, ValidationLevel};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Merges trees, reporting conflicts as diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct NodeMerger {
    missing_index_level: ValidationLevel,
}

impl Default for NodeMerger {
    fn default() -> Self {
        Self {
            missing_index_level: ValidationLevel::Warn,
        }
    }
}

impl NodeMerger {
    pub fn new(settings: &ConfigSettings) -> Self {
        Self {
            missing_index_level: settings.missing_array_index_level(),
        }
    }

    /// Merge `overlay` onto `base` at `path`; `overlay` wins on conflict.
    pub fn merge(&self, path: &str, base: &NodeRef, overlay: &NodeRef) -> Validated<NodeRef> {
        match (base.as_ref(), overlay.as_ref()) {
            (ConfigNode::Leaf { .. }, ConfigNode::Leaf { .. }) => merge_leaves(path, base, overlay),
            (
                ConfigNode::Map {
                    entries: base_entries,
                    metadata: base_meta,
                },
                ConfigNode::Map {
                    entries: overlay_entries,
                    metadata: overlay_meta,
                },
            ) => self
                .merge_maps(path, base_entries, overlay_entries)
                .map(|entries| {
                    Arc::new(ConfigNode::Map {
                        entries,
                        metadata: merge_metadata(base_meta, overlay_meta),
                    })
                }),
            (
                ConfigNode::Array {
                    elements: base_elements,
                    metadata: base_meta,
                },
                ConfigNode::Array {
                    elements: overlay_elements,
                    metadata: overlay_meta,
                },
            ) => self
                .merge_arrays(path, base_elements, overlay_elements)
                .map(|elements| {
                    Arc::new(ConfigNode::Array {
                        elements,
                        metadata: merge_metadata(base_meta, overlay_meta),
                    })
                }),
            (left, right) => Validated::invalid(ValidationError::UnableToMergeDifferentNodes {
                path: path.to_string(),
                left: left.kind(),
                right: right.kind(),
            }),
        }
    }

    /// Fold nodes in order, later nodes taking precedence.
    ///
    /// A merge that produces no node leaves the accumulated tree unchanged.
    pub fn merge_all(&self, nodes: impl IntoIterator<Item = NodeRef>) -> Validated<NodeRef> {
        let mut errors = Vec::new();
        let mut merged: Option<NodeRef> = None;
        for node in nodes {
            merged = match merged {
                None => Some(node),
                Some(current) => {
                    let result = self.merge("", &current, &node);
                    Some(result.drain_into(&mut errors).unwrap_or(current))
                }
            };
        }
        Validated::of(merged, errors)
    }

    fn merge_maps(
        &self,
        path: &str,
        base: &BTreeMap<String, NodeRef>,
        overlay: &BTreeMap<String, NodeRef>,
    ) -> Validated<BTreeMap<String, NodeRef>> {
        let mut errors = Vec::new();
        let mut merged = BTreeMap::new();

        for (key, base_node) in base {
            if key.is_empty() {
                errors.push(ValidationError::EmptyMapKey {
                    path: path.to_string(),
                });
                continue;
            }
            match overlay.get(key) {
                Some(overlay_node) => {
                    let child_path = join_object(path, key);
                    if let Some(node) = self
                        .merge(&child_path, base_node, overlay_node)
                        .drain_into(&mut errors)
                    {
                        merged.insert(key.clone(), node);
                    }
                }
                None => {
                    merged.insert(key.clone(), Arc::clone(base_node));
                }
            }
        }

        for (key, overlay_node) in overlay {
            if base.contains_key(key) {
                continue;
            }
            if key.is_empty() {
                errors.push(ValidationError::EmptyMapKey {
                    path: path.to_string(),
                });
                continue;
            }
            merged.insert(key.clone(), Arc::clone(overlay_node));
        }

        Validated::of(Some(merged), errors)
    }

    fn merge_arrays(
        &self,
        path: &str,
        base: &[Option<NodeRef>],
        overlay: &[Option<NodeRef>],
    ) -> Validated<Vec<Option<NodeRef>>> {
        let mut errors = Vec::new();
        let length = base.len().max(overlay.len());
        let mut merged = Vec::with_capacity(length);

        for index in 0..length {
            let base_node = base.get(index).and_then(Option::as_ref);
            let overlay_node = overlay.get(index).and_then(Option::as_ref);
            let slot = match (base_node, overlay_node) {
                (Some(b), Some(o)) => self
                    .merge(&join_array(path, index), b, o)
                    .drain_into(&mut errors),
                (Some(b), None) => Some(Arc::clone(b)),
                (None, Some(o)) => Some(Arc::clone(o)),
                (None, None) => {
                    errors.push(ValidationError::ArrayMissingIndex {
                        path: path.to_string(),
                        index,
                        level: self.missing_index_level,
                    });
                    None
                }
            };
            merged.push(slot);
        }

        Validated::of(Some(merged), errors)
    }
}

/// Merge with default policy.
pub fn merge(path: &str, base: &NodeRef, overlay: &NodeRef) -> Validated<NodeRef> {
    NodeMerger::default().merge(path, base, overlay)
}

fn merge_leaves(path: &str, base: &NodeRef, overlay: &NodeRef) -> Validated<NodeRef> {
    let winner = if overlay.value().is_some() {
        overlay
    } else if base.value().is_some() {
        base
    } else {
        return Validated::invalid(ValidationError::LeafNodesHaveNoValues {
            path: path.to_string(),
        });
    };

    if base.metadata().is_empty() && overlay.metadata().is_empty() {
        return Validated::valid(Arc::clone(winner));
    }
    let metadata = merge_metadata(base.metadata(), overlay.metadata());
    Validated::valid(Arc::new(winner.replace_metadata(metadata)))
}

/// Union of both metadata maps; overlay values are appended after base values.
fn merge_metadata(base: &Metadata, overlay: &Metadata) -> Metadata {
    let mut merged = base.clone();
    for (key, values) in overlay {
        let entry = merged.entry(key.clone()).or_default();
        for value in values {
            if !entry.contains(value) {
                entry.push(value.clone());
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{MetaDataValue, NodeKind};

    fn node(n: ConfigNode) -> NodeRef {
        Arc::new(n)
    }

    fn leaf_at(root: &NodeRef, keys: &[&str]) -> Option<String> {
        let mut current = Arc::clone(root);
        for key in keys {
            current = Arc::clone(current.get_key(key)?);
        }
        current.value().map(str::to_string)
    }

    #[test]
    fn test_leaf_overlay_wins() {
        let result = merge("a", &node(ConfigNode::leaf("1")), &node(ConfigNode::leaf("2")));
        assert_eq!(result.results().unwrap().value(), Some("2"));
        assert!(!result.has_errors());
    }

    #[test]
    fn test_leaf_empty_overlay_keeps_base() {
        let result = merge("a", &node(ConfigNode::leaf("1")), &node(ConfigNode::empty_leaf()));
        assert_eq!(result.results().unwrap().value(), Some("1"));
    }

    #[test]
    fn test_leaf_both_empty() {
        let result = merge(
            "a",
            &node(ConfigNode::empty_leaf()),
            &node(ConfigNode::empty_leaf()),
        );
        assert!(!result.has_results());
        assert!(matches!(
            result.errors()[0],
            ValidationError::LeafNodesHaveNoValues { .. }
        ));
    }

    #[test]
    fn test_different_kinds() {
        let result = merge(
            "db",
            &node(ConfigNode::leaf("x")),
            &node(ConfigNode::map([("a", ConfigNode::leaf("b"))])),
        );
        assert!(!result.has_results());
        assert_eq!(
            result.errors()[0],
            ValidationError::UnableToMergeDifferentNodes {
                path: "db".to_string(),
                left: NodeKind::Leaf,
                right: NodeKind::Map,
            }
        );
    }

    #[test]
    fn test_map_union_and_override() {
        let base = node(ConfigNode::map([(
            "db",
            ConfigNode::map([
                ("name", ConfigNode::leaf("test")),
                ("port", ConfigNode::leaf("3306")),
            ]),
        )]));
        let overlay = node(ConfigNode::map([(
            "db",
            ConfigNode::map([
                ("name", ConfigNode::leaf("New Name")),
                ("password", ConfigNode::leaf("123abc")),
            ]),
        )]));
        let merged = merge("", &base, &overlay).into_results().unwrap();
        assert_eq!(leaf_at(&merged, &["db", "name"]).as_deref(), Some("New Name"));
        assert_eq!(leaf_at(&merged, &["db", "port"]).as_deref(), Some("3306"));
        assert_eq!(leaf_at(&merged, &["db", "password"]).as_deref(), Some("123abc"));
    }

    #[test]
    fn test_map_conflict_drops_key_keeps_rest() {
        let base = node(ConfigNode::map([
            ("a", ConfigNode::leaf("1")),
            ("b", ConfigNode::leaf("2")),
        ]));
        let overlay = node(ConfigNode::map([("a", ConfigNode::array([ConfigNode::leaf("x")]))]));
        let result = merge("", &base, &overlay);
        let merged = result.results().unwrap();
        assert!(merged.get_key("a").is_none());
        assert_eq!(merged.get_key("b").unwrap().value(), Some("2"));
        assert_eq!(result.errors().len(), 1);
    }

    #[test]
    fn test_map_empty_key_dropped_with_warning() {
        let base = node(ConfigNode::map([("", ConfigNode::leaf("1"))]));
        let overlay = node(ConfigNode::map([("a", ConfigNode::leaf("2"))]));
        let result = merge("", &base, &overlay);
        assert_eq!(result.results().unwrap().size(), 1);
        assert_eq!(result.errors()[0].level(), ValidationLevel::Warn);
    }

    #[test]
    fn test_unchanged_subtree_is_shared() {
        let shared = node(ConfigNode::map([("x", ConfigNode::leaf("1"))]));
        let base = node(ConfigNode::map_of_refs(BTreeMap::from([(
            "keep".to_string(),
            Arc::clone(&shared),
        )])));
        let overlay = node(ConfigNode::map([("other", ConfigNode::leaf("2"))]));
        let merged = merge("", &base, &overlay).into_results().unwrap();
        assert!(Arc::ptr_eq(merged.get_key("keep").unwrap(), &shared));
    }

    #[test]
    fn test_array_index_merge_covers_all() {
        let base = node(ConfigNode::sparse_array(vec![
            Some(node(ConfigNode::leaf("John"))),
            Some(node(ConfigNode::leaf("Steve"))),
        ]));
        let overlay = node(ConfigNode::sparse_array(vec![
            None,
            Some(node(ConfigNode::leaf("Matt"))),
            Some(node(ConfigNode::leaf("Paul"))),
        ]));
        let result = merge("admin.user", &base, &overlay);
        assert!(!result.has_errors());
        let merged = result.into_results().unwrap();
        let values: Vec<_> = (0..3)
            .map(|i| merged.get_index(i).and_then(|n| n.value().map(str::to_string)))
            .collect();
        assert_eq!(
            values,
            vec![
                Some("John".to_string()),
                Some("Matt".to_string()),
                Some("Paul".to_string())
            ]
        );
    }

    #[test]
    fn test_array_gaps_warn() {
        let base = node(ConfigNode::sparse_array(vec![
            Some(node(ConfigNode::leaf("a"))),
            None,
        ]));
        let overlay = node(ConfigNode::sparse_array(vec![
            None,
            None,
            Some(node(ConfigNode::leaf("c"))),
            None,
        ]));
        let result = merge("list", &base, &overlay);
        let merged = result.results().unwrap();
        assert_eq!(merged.size(), 4);
        assert!(merged.get_index(1).is_none());
        assert!(merged.get_index(3).is_none());
        assert_eq!(result.errors().len(), 2);
        assert!(result.errors().iter().all(|e| e.level() == ValidationLevel::Warn));
    }

    #[test]
    fn test_array_gap_error_policy() {
        let settings = ConfigSettings {
            treat_missing_array_index_as_error: true,
            ..Default::default()
        };
        let merger = NodeMerger::new(&settings);
        let base = node(ConfigNode::sparse_array(vec![None]));
        let overlay = node(ConfigNode::sparse_array(vec![None]));
        let result = merger.merge("list", &base, &overlay);
        assert_eq!(result.errors()[0].level(), ValidationLevel::Error);
    }

    #[test]
    fn test_merge_all_order_is_associative() {
        let s1 = node(ConfigNode::map([
            ("a", ConfigNode::leaf("1")),
            ("b", ConfigNode::leaf("1")),
        ]));
        let s2 = node(ConfigNode::map([
            ("b", ConfigNode::leaf("2")),
            ("c", ConfigNode::leaf("2")),
        ]));
        let s3 = node(ConfigNode::map([("c", ConfigNode::leaf("3"))]));

        let sequential = NodeMerger::default()
            .merge_all([Arc::clone(&s1), Arc::clone(&s2), Arc::clone(&s3)])
            .into_results()
            .unwrap();
        let s12 = merge("", &s1, &s2).into_results().unwrap();
        let grouped = merge("", &s12, &s3).into_results().unwrap();
        assert_eq!(sequential, grouped);
        assert_eq!(leaf_at(&sequential, &["b"]).as_deref(), Some("2"));
        assert_eq!(leaf_at(&sequential, &["c"]).as_deref(), Some("3"));
    }

    #[test]
    fn test_merge_all_empty() {
        let result = NodeMerger::default().merge_all(Vec::new());
        assert!(!result.has_results());
        assert!(!result.has_errors());
    }

    #[test]
    fn test_metadata_is_unioned() {
        let base = node(ConfigNode::leaf("a").secret());
        let overlay = node(ConfigNode::leaf("b").with_metadata("owner", MetaDataValue::Text("ops".into())));
        let merged = merge("x", &base, &overlay).into_results().unwrap();
        assert_eq!(merged.value(), Some("b"));
        assert!(merged.is_secret());
        assert!(merged.metadata().contains_key("owner"));
    }
}
