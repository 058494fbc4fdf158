//! Tag resolution strategies.
//!
//! Given the registry and the requested tags, a strategy picks the roots to
//! search. The returned order is the merge order: later roots override
//! earlier ones.

use super::RootRegistry;
use crate::node::NodeRef;
use crate::tags::Tags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub trait TagMergingStrategy: Send + Sync + fmt::Debug {
    fn roots_to_search(&self, registry: &RootRegistry, tags: &Tags) -> Vec<NodeRef>;
}

/// Empty-tags root first, then the root registered for exactly `tags`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactMatchWithFallback;

impl TagMergingStrategy for ExactMatchWithFallback {
    fn roots_to_search(&self, registry: &RootRegistry, tags: &Tags) -> Vec<NodeRef> {
        let mut roots = Vec::new();
        if let Some(root) = registry.get(&Tags::new()) {
            roots.push(Arc::clone(root));
        }
        if !tags.is_empty()
            && let Some(root) = registry.get(tags)
        {
            roots.push(Arc::clone(root));
        }
        roots
    }
}

/// Empty-tags root first, then every root whose tags are a subset of the
/// requested tags, in registration order.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubsetWithFallback;

impl TagMergingStrategy for SubsetWithFallback {
    fn roots_to_search(&self, registry: &RootRegistry, tags: &Tags) -> Vec<NodeRef> {
        let mut roots = Vec::new();
        if let Some(root) = registry.get(&Tags::new()) {
            roots.push(Arc::clone(root));
        }
        roots.extend(
            registry
                .iter()
                .filter(|(root_tags, _)| !root_tags.is_empty() && root_tags.is_subset_of(tags))
                .map(|(_, root)| Arc::clone(root)),
        );
        roots
    }
}

/// Strategy selection for configuration files and the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    ExactMatchWithFallback,
    SubsetWithFallback,
}

impl StrategyKind {
    pub fn build(self) -> Box<dyn TagMergingStrategy> {
        match self {
            StrategyKind::ExactMatchWithFallback => Box::new(ExactMatchWithFallback),
            StrategyKind::SubsetWithFallback => Box::new(SubsetWithFallback),
        }
    }
}
