//! Per-tag merged roots and their publication.
//!
//! One merged root exists per distinct [`Tags`] value. Writers build a new
//! [`RootRegistry`] completely and then swap it in with `ArcSwap`, so readers
//! always observe either the previous or the new snapshot.

mod strategy;

pub use strategy::{ExactMatchWithFallback, StrategyKind, SubsetWithFallback, TagMergingStrategy};

use crate::merge::NodeMerger;
use crate::node::{ConfigNodeContainer, NodeRef};
use crate::tags::Tags;
use crate::validation::{Validated, ValidationError};
use arc_swap::ArcSwap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

/// Insertion-ordered mapping from tags to merged root.
#[derive(Debug, Clone, Default)]
pub struct RootRegistry {
    roots: Vec<(Tags, NodeRef)>,
}

impl RootRegistry {
    pub fn get(&self, tags: &Tags) -> Option<&NodeRef> {
        self.roots.iter().find(|(t, _)| t == tags).map(|(_, r)| r)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Tags, &NodeRef)> {
        self.roots.iter().map(|(t, r)| (t, r))
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Copy of this registry with `root` set for `tags`, keeping insertion order.
    pub fn with_root(mut self, tags: Tags, root: NodeRef) -> Self {
        match self.roots.iter_mut().find(|(t, _)| *t == tags) {
            Some(entry) => entry.1 = root,
            None => self.roots.push((tags, root)),
        }
        self
    }
}

/// Holds source containers in registration order and publishes merged roots.
#[derive(Debug)]
pub struct ConfigNodeManager {
    merger: NodeMerger,
    containers: Mutex<Vec<ConfigNodeContainer>>,
    roots: ArcSwap<RootRegistry>,
}

impl ConfigNodeManager {
    pub fn new(merger: NodeMerger) -> Self {
        Self {
            merger,
            containers: Mutex::new(Vec::new()),
            roots: ArcSwap::from_pointee(RootRegistry::default()),
        }
    }

    /// Current published snapshot.
    pub fn roots(&self) -> Arc<RootRegistry> {
        self.roots.load_full()
    }

    pub fn source_count(&self) -> usize {
        self.containers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Register a new source and merge it into the root for its tags.
    /// A source registered again replaces its earlier container.
    pub fn add_node(&self, container: ConfigNodeContainer) -> Validated<NodeRef> {
        let mut containers = self
            .containers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(position) = containers.iter().position(|c| c.source == container.source) {
            debug!(source = %container.source, "Source already registered, replacing");
            return self.replace(&mut containers, position, container);
        }

        let current = self.roots.load_full();
        let merged = match current.get(&container.tags) {
            Some(existing) => self
                .merger
                .merge_all([Arc::clone(existing), Arc::clone(&container.node)]),
            None => Validated::valid(Arc::clone(&container.node)),
        };

        if let Some(root) = merged.results() {
            let next = (*current)
                .clone()
                .with_root(container.tags.clone(), Arc::clone(root));
            self.roots.store(Arc::new(next));
        }
        debug!(
            source = %container.source,
            tags = %container.tags,
            errors = merged.errors().len(),
            "Registered config node"
        );
        containers.push(container);
        merged
    }

    /// Replace the container from the same source and re-merge every root.
    pub fn reload_node(&self, container: ConfigNodeContainer) -> Validated<NodeRef> {
        let mut containers = self
            .containers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let Some(position) = containers.iter().position(|c| c.source == container.source) else {
            return Validated::invalid(ValidationError::UnknownSourceForReload {
                source_id: container.source.to_string(),
            });
        };
        let result = self.replace(&mut containers, position, container);
        info!(errors = result.errors().len(), "Reloaded config node");
        result
    }

    /// Swap in `container` at `position` and publish freshly folded roots.
    /// Called with the container lock held.
    fn replace(
        &self,
        containers: &mut [ConfigNodeContainer],
        position: usize,
        container: ConfigNodeContainer,
    ) -> Validated<NodeRef> {
        let tags = container.tags.clone();
        containers[position] = container;

        let mut errors = Vec::new();
        let next = self.fold_roots(containers, &mut errors);
        let root = next.get(&tags).cloned();
        self.roots.store(Arc::new(next));
        debug!(tags = %tags, "Published re-merged roots");
        Validated::of(root, errors)
    }

    /// Merge all containers per tag set, in registration order.
    fn fold_roots(
        &self,
        containers: &[ConfigNodeContainer],
        errors: &mut Vec<ValidationError>,
    ) -> RootRegistry {
        let mut tag_order: Vec<&Tags> = Vec::new();
        for container in containers {
            if !tag_order.contains(&&container.tags) {
                tag_order.push(&container.tags);
            }
        }

        let mut registry = RootRegistry::default();
        for tags in tag_order {
            let nodes = containers
                .iter()
                .filter(|c| &c.tags == tags)
                .map(|c| Arc::clone(&c.node));
            if let Some(root) = self.merger.merge_all(nodes).drain_into(errors) {
                registry = registry.with_root(tags.clone(), root);
            }
        }
        registry
    }
}

impl Default for ConfigNodeManager {
    fn default() -> Self {
        Self::new(NodeMerger::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{ConfigNode, SourceId};

    fn container(source: SourceId, tags: Tags, key: &str, value: &str) -> ConfigNodeContainer {
        ConfigNodeContainer::new(
            ConfigNode::map([(key, ConfigNode::leaf(value))]),
            source,
            tags,
        )
    }

    fn value_of(root: &NodeRef, key: &str) -> Option<String> {
        root.get_key(key).and_then(|n| n.value().map(str::to_string))
    }

    #[test]
    fn test_add_node_creates_root_per_tags() {
        let manager = ConfigNodeManager::default();
        manager.add_node(container(SourceId::new(), Tags::new(), "a", "1"));
        manager.add_node(container(SourceId::new(), Tags::env("prod"), "a", "2"));

        let roots = manager.roots();
        assert_eq!(roots.len(), 2);
        assert_eq!(value_of(roots.get(&Tags::new()).unwrap(), "a").as_deref(), Some("1"));
        assert_eq!(
            value_of(roots.get(&Tags::env("prod")).unwrap(), "a").as_deref(),
            Some("2")
        );
    }

    #[test]
    fn test_later_source_wins() {
        let manager = ConfigNodeManager::default();
        manager.add_node(container(SourceId::new(), Tags::new(), "a", "1"));
        let merged = manager
            .add_node(container(SourceId::new(), Tags::new(), "a", "2"))
            .into_results()
            .unwrap();
        assert_eq!(value_of(&merged, "a").as_deref(), Some("2"));
        assert_eq!(manager.source_count(), 2);
    }

    #[test]
    fn test_reload_replaces_in_sequence() {
        let manager = ConfigNodeManager::default();
        let first = SourceId::new();
        manager.add_node(container(first, Tags::new(), "a", "1"));
        manager.add_node(container(SourceId::new(), Tags::new(), "b", "2"));

        let old_snapshot = manager.roots();
        let reloaded = manager
            .reload_node(container(first, Tags::new(), "a", "changed"))
            .into_results()
            .unwrap();
        assert_eq!(value_of(&reloaded, "a").as_deref(), Some("changed"));
        assert_eq!(value_of(&reloaded, "b").as_deref(), Some("2"));

        // The earlier snapshot is untouched.
        let old_root = old_snapshot.get(&Tags::new()).unwrap();
        assert_eq!(value_of(old_root, "a").as_deref(), Some("1"));
    }

    #[test]
    fn test_reload_keeps_precedence_order() {
        let manager = ConfigNodeManager::default();
        let first = SourceId::new();
        manager.add_node(container(first, Tags::new(), "a", "1"));
        manager.add_node(container(SourceId::new(), Tags::new(), "a", "2"));
        let reloaded = manager
            .reload_node(container(first, Tags::new(), "a", "3"))
            .into_results()
            .unwrap();
        // The second source still overrides the reloaded first source.
        assert_eq!(value_of(&reloaded, "a").as_deref(), Some("2"));
    }

    #[test]
    fn test_add_same_source_replaces() {
        let manager = ConfigNodeManager::default();
        let first = SourceId::new();
        manager.add_node(container(first, Tags::new(), "a", "1"));
        manager.add_node(container(SourceId::new(), Tags::new(), "b", "2"));
        let merged = manager
            .add_node(container(first, Tags::new(), "a", "3"))
            .into_results()
            .unwrap();

        assert_eq!(manager.source_count(), 2);
        assert_eq!(value_of(&merged, "a").as_deref(), Some("3"));
        assert_eq!(value_of(&merged, "b").as_deref(), Some("2"));
    }

    #[test]
    fn test_readers_see_whole_snapshots() {
        let manager = ConfigNodeManager::default();
        let source = SourceId::new();
        let pair = |v: &str| {
            ConfigNodeContainer::new(
                ConfigNode::map([("a", ConfigNode::leaf(v)), ("b", ConfigNode::leaf(v))]),
                source,
                Tags::new(),
            )
        };
        manager.add_node(pair("0"));

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..500 {
                        let roots = manager.roots();
                        let root = roots.get(&Tags::new()).unwrap();
                        assert_eq!(value_of(root, "a"), value_of(root, "b"));
                    }
                });
            }
            for i in 1..=200 {
                manager.reload_node(pair(&i.to_string()));
            }
        });

        let roots = manager.roots();
        assert_eq!(value_of(roots.get(&Tags::new()).unwrap(), "a").as_deref(), Some("200"));
    }

    #[test]
    fn test_reload_unknown_source() {
        let manager = ConfigNodeManager::default();
        let result = manager.reload_node(container(SourceId::new(), Tags::new(), "a", "1"));
        assert!(!result.has_results());
        assert!(matches!(
            result.errors()[0],
            ValidationError::UnknownSourceForReload { .. }
        ));
    }

    #[test]
    fn test_registry_with_root_replaces() {
        let registry = RootRegistry::default()
            .with_root(Tags::new(), Arc::new(ConfigNode::leaf("a")))
            .with_root(Tags::env("prod"), Arc::new(ConfigNode::leaf("b")))
            .with_root(Tags::new(), Arc::new(ConfigNode::leaf("c")));
        assert_eq!(registry.len(), 2);
        let order: Vec<_> = registry.iter().map(|(t, _)| t.clone()).collect();
        assert_eq!(order, vec![Tags::new(), Tags::env("prod")]);
        assert_eq!(registry.get(&Tags::new()).unwrap().value(), Some("c"));
    }
}
