//! The resolution engine.
//!
//! [`ConfigEngine`] ties the pieces together:
//! - sources register trees with [`ConfigEngine::add_node`] and replace them
//!   with [`ConfigEngine::reload_node`]
//! - a lookup tokenizes the path, asks the tag strategy which roots to
//!   search, navigates each, merges what was found and decodes the result
//! - reload listeners are told synchronously after every publish
//!
//! Callers read values through the [`ConfigProvider`] trait, which the
//! cache layer implements as well.

use crate::decoder::{
    ConfigType, DecodedValue, Decoder, DecoderContext, DecoderRegistry, TypeDescriptor,
};
use crate::error::{ConfigError, Result};
use crate::lexer::{PathLexer, Token};
use crate::logging::DiagnosticLogger;
use crate::merge::NodeMerger;
use crate::navigator::navigate;
use crate::node::{ConfigNodeContainer, NodeRef};
use crate::roots::{ConfigNodeManager, ExactMatchWithFallback, RootRegistry, TagMergingStrategy};
use crate::settings::ConfigSettings;
use crate::tags::Tags;
use crate::validation::{Validated, ValidationError};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tracing::{debug, info};

/// Notified after the published roots change.
pub trait ReloadListener: Send + Sync {
    fn on_reload(&self);
}

/// Read access to resolved configuration.
pub trait ConfigProvider: Send + Sync {
    /// Tokenize, navigate and decode `path` for `tags`, keeping every diagnostic.
    fn resolve(&self, path: &str, ty: &TypeDescriptor, tags: &Tags) -> Validated<DecodedValue>;

    fn settings(&self) -> &ConfigSettings;

    fn diagnostics(&self) -> &DiagnosticLogger;

    /// Resolve and apply the failure policy.
    fn get_config_for(&self, path: &str, ty: &TypeDescriptor, tags: &Tags) -> Result<DecodedValue> {
        let resolved = self.resolve(path, ty, tags);
        self.diagnostics().log(path, resolved.errors());
        resolved.into_result(self.settings().treat_warnings_as_errors, path)
    }

    /// Resolve `path` into `T`. Fails if the value is missing or any
    /// diagnostic is severe enough under the current settings.
    fn get_config<T: ConfigType>(&self, path: &str, tags: &Tags) -> Result<T>
    where
        Self: Sized,
    {
        let value = self.get_config_for(path, &T::descriptor(), tags)?;
        T::from_decoded(value).map_err(|reason| ConfigError::conversion(path, reason))
    }

    /// Like [`ConfigProvider::get_config`], but a path that does not exist
    /// yields `Ok(None)`.
    fn get_config_optional<T: ConfigType>(&self, path: &str, tags: &Tags) -> Result<Option<T>>
    where
        Self: Sized,
    {
        let resolved = self.resolve(path, &T::descriptor(), tags);
        if !resolved.has_results() && resolved.errors().iter().all(ValidationError::is_missing_node) {
            debug!(path = %path, "No config found for optional lookup");
            return Ok(None);
        }
        self.diagnostics().log(path, resolved.errors());
        let value = resolved.into_result(self.settings().treat_warnings_as_errors, path)?;
        T::from_decoded(value)
            .map(Some)
            .map_err(|reason| ConfigError::conversion(path, reason))
    }

    /// Resolve `path`, falling back to `default` on any failure.
    fn get_config_or<T: ConfigType>(&self, path: &str, tags: &Tags, default: T) -> T
    where
        Self: Sized,
    {
        self.get_config(path, tags).unwrap_or(default)
    }
}

/// Merges registered trees per tag set and decodes values out of them.
pub struct ConfigEngine {
    settings: ConfigSettings,
    lexer: PathLexer,
    nodes: ConfigNodeManager,
    decoders: DecoderRegistry,
    strategy: Box<dyn TagMergingStrategy>,
    default_tags: Tags,
    listeners: Mutex<Vec<Weak<dyn ReloadListener>>>,
    diagnostics: DiagnosticLogger,
}

impl ConfigEngine {
    /// Engine with the built-in decoders and exact-match tag resolution.
    pub fn new(settings: ConfigSettings) -> Result<Self> {
        let lexer = settings.lexer()?;
        Ok(Self {
            nodes: ConfigNodeManager::new(NodeMerger::new(&settings)),
            lexer,
            settings,
            decoders: DecoderRegistry::with_defaults(),
            strategy: Box::new(ExactMatchWithFallback),
            default_tags: Tags::new(),
            listeners: Mutex::new(Vec::new()),
            diagnostics: DiagnosticLogger::new().with_name("engine"),
        })
    }

    pub fn with_strategy(mut self, strategy: Box<dyn TagMergingStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    /// Tags added to every lookup. Requested tags override keys they share.
    pub fn with_default_tags(mut self, tags: Tags) -> Self {
        self.default_tags = tags;
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: DiagnosticLogger) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn lexer(&self) -> &PathLexer {
        &self.lexer
    }

    pub fn default_tags(&self) -> &Tags {
        &self.default_tags
    }

    /// Snapshot of the published roots.
    pub fn roots(&self) -> Arc<RootRegistry> {
        self.nodes.roots()
    }

    pub fn source_count(&self) -> usize {
        self.nodes.source_count()
    }

    /// Register a new source tree and merge it into the root for its tags.
    pub fn add_node(&self, container: ConfigNodeContainer) -> Validated<NodeRef> {
        let result = self.nodes.add_node(container);
        self.notify_listeners();
        result
    }

    /// Replace a previously added source tree and re-merge.
    pub fn reload_node(&self, container: ConfigNodeContainer) -> Validated<NodeRef> {
        let result = self.nodes.reload_node(container);
        if result.has_results() {
            self.notify_listeners();
        }
        result
    }

    /// Register every container. Fails with [`ConfigError::NoSources`] when
    /// there are none, or when a registration produced failing diagnostics.
    pub fn load_configs(&self, containers: impl IntoIterator<Item = ConfigNodeContainer>) -> Result<usize> {
        let mut count = 0;
        let mut errors = Vec::new();
        for container in containers {
            self.add_node(container).drain_into(&mut errors);
            count += 1;
        }
        if count == 0 {
            return Err(ConfigError::NoSources);
        }

        self.diagnostics.log("load", &errors);
        let treat_warnings = self.settings.treat_warnings_as_errors;
        if errors.iter().any(|e| e.level().is_failure(treat_warnings)) {
            return Err(ConfigError::load("load", &errors));
        }
        info!(sources = count, roots = self.roots().len(), "Loaded configs");
        Ok(count)
    }

    /// Find the node at `tokens` in every root selected for `tags` and merge
    /// the hits in selection order.
    pub fn navigate_to_node(&self, path: &str, tokens: &[Token], tags: &Tags) -> Validated<NodeRef> {
        let registry = self.nodes.roots();
        let roots = self.strategy.roots_to_search(&registry, tags);
        if roots.is_empty() {
            return Validated::invalid(ValidationError::NoConfigRoots {
                tags: tags.to_string(),
            });
        }

        let mut found = Vec::new();
        let mut last_errors = Vec::new();
        for root in &roots {
            let (node, errors) = navigate(root, tokens).into_parts();
            match node {
                Some(node) => found.push(node),
                None => last_errors = errors,
            }
        }

        if found.is_empty() {
            debug!(path = %path, tags = %tags, "No node found in any root");
            return Validated::invalid_all(last_errors);
        }
        NodeMerger::new(&self.settings).merge_all(found)
    }

    pub fn add_decoders(&self, decoders: Vec<Arc<dyn Decoder>>) {
        self.decoders.add_decoders(decoders);
        self.notify_listeners();
    }

    pub fn get_decoders(&self) -> Vec<Arc<dyn Decoder>> {
        self.decoders.get_decoders()
    }

    pub fn set_decoders(&self, decoders: Vec<Arc<dyn Decoder>>) {
        self.decoders.set_decoders(decoders);
        self.notify_listeners();
    }

    /// Register a listener. Dropped listeners are pruned on the next notify.
    pub fn register_listener(&self, listener: Weak<dyn ReloadListener>) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    fn notify_listeners(&self) {
        let live: Vec<Arc<dyn ReloadListener>> = {
            let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
            listeners.retain(|l| l.strong_count() > 0);
            listeners.iter().filter_map(Weak::upgrade).collect()
        };
        for listener in live {
            listener.on_reload();
        }
    }
}

impl ConfigProvider for ConfigEngine {
    fn resolve(&self, path: &str, ty: &TypeDescriptor, tags: &Tags) -> Validated<DecodedValue> {
        let tags = self.default_tags.merged_with(tags);
        let path = self.lexer.normalize(path);
        let tokens = if path.is_empty() {
            Validated::valid(Vec::new())
        } else {
            self.lexer.tokenize(&path)
        };

        tokens
            .and_then(|tokens| {
                let found = self.navigate_to_node(&path, &tokens, &tags);
                if ty.is_optional()
                    && !found.has_results()
                    && found.errors().iter().all(ValidationError::is_missing_node)
                {
                    return Validated::valid(None);
                }
                found.map(Some)
            })
            .and_then(|node| match node {
                None => Validated::valid(DecodedValue::Null),
                Some(node) => {
                    let ctx = DecoderContext {
                        registry: &self.decoders,
                        settings: &self.settings,
                        lexer: &self.lexer,
                        tags: &tags,
                    };
                    ctx.decode(&path, &node, ty)
                }
            })
    }

    fn settings(&self) -> &ConfigSettings {
        &self.settings
    }

    fn diagnostics(&self) -> &DiagnosticLogger {
        &self.diagnostics
    }
}

impl std::fmt::Debug for ConfigEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigEngine")
            .field("settings", &self.settings)
            .field("strategy", &self.strategy)
            .field("default_tags", &self.default_tags)
            .field("sources", &self.source_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{ConfigNode, SourceId};
    use crate::roots::SubsetWithFallback;
    use crate::validation::ValidationLevel;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn engine() -> ConfigEngine {
        ConfigEngine::new(ConfigSettings::default()).unwrap()
    }

    fn db(entries: &[(&str, &str)]) -> ConfigNode {
        ConfigNode::map([(
            "db",
            ConfigNode::map(entries.iter().map(|(k, v)| (*k, ConfigNode::leaf(*v)))),
        )])
    }

    fn add(engine: &ConfigEngine, node: ConfigNode, tags: Tags) -> SourceId {
        let source = SourceId::new();
        engine.add_node(ConfigNodeContainer::new(node, source, tags));
        source
    }

    #[test]
    fn test_merged_scenario() {
        let engine = engine();
        add(&engine, db(&[("name", "test"), ("port", "3306")]), Tags::new());
        add(&engine, db(&[("name", "New Name"), ("password", "123abc")]), Tags::new());

        let none = Tags::new();
        assert_eq!(engine.get_config::<String>("db.name", &none).unwrap(), "New Name");
        assert_eq!(engine.get_config::<String>("db.port", &none).unwrap(), "3306");
        assert_eq!(engine.get_config::<i32>("db.port", &none).unwrap(), 3306);
        assert_eq!(engine.get_config::<String>("db.password", &none).unwrap(), "123abc");
    }

    #[test]
    fn test_path_is_normalized() {
        let engine = engine();
        add(&engine, db(&[("name", "test")]), Tags::new());
        assert_eq!(engine.get_config::<String>(" DB.Name ", &Tags::new()).unwrap(), "test");
    }

    #[test]
    fn test_tag_fallback() {
        let engine = engine();
        add(&engine, db(&[("name", "base")]), Tags::new());
        assert_eq!(
            engine.get_config::<String>("db.name", &Tags::env("prod")).unwrap(),
            "base"
        );

        add(&engine, db(&[("name", "prod")]), Tags::env("prod"));
        assert_eq!(
            engine.get_config::<String>("db.name", &Tags::env("prod")).unwrap(),
            "prod"
        );
        assert_eq!(engine.get_config::<String>("db.name", &Tags::new()).unwrap(), "base");
    }

    #[test]
    fn test_subset_strategy() {
        let engine = engine().with_strategy(Box::new(SubsetWithFallback));
        add(&engine, db(&[("name", "base"), ("port", "1")]), Tags::new());
        add(&engine, db(&[("port", "2")]), Tags::env("prod"));
        let requested = Tags::env("prod").with(crate::tags::Tag::new("region", "eu"));
        assert_eq!(engine.get_config::<u16>("db.port", &requested).unwrap(), 2);
        assert_eq!(engine.get_config::<String>("db.name", &requested).unwrap(), "base");
    }

    #[test]
    fn test_default_tags_apply() {
        let engine = engine().with_default_tags(Tags::env("prod"));
        add(&engine, db(&[("name", "base")]), Tags::new());
        add(&engine, db(&[("name", "prod")]), Tags::env("prod"));
        assert_eq!(engine.get_config::<String>("db.name", &Tags::new()).unwrap(), "prod");
        assert_eq!(
            engine.get_config::<String>("db.name", &Tags::env("dev")).unwrap(),
            "base"
        );
    }

    #[test]
    fn test_no_roots() {
        let engine = engine();
        let result = engine.resolve("db.name", &TypeDescriptor::String, &Tags::new());
        assert!(matches!(result.errors()[0], ValidationError::NoConfigRoots { .. }));
    }

    #[test]
    fn test_no_decoder_is_sole_error() {
        let engine = engine();
        add(&engine, db(&[("name", "test")]), Tags::new());
        let result = engine.resolve("db.name", &TypeDescriptor::Custom("Widget".into()), &Tags::new());
        assert_eq!(result.errors().len(), 1);
        assert_eq!(result.errors()[0].level(), ValidationLevel::Fatal);
        assert!(matches!(result.errors()[0], ValidationError::NoDecodersFound { .. }));

        let err = engine
            .get_config_for("db.name", &TypeDescriptor::Custom("Widget".into()), &Tags::new())
            .unwrap_err();
        assert!(err.to_string().contains("level: FATAL"));
    }

    #[test]
    fn test_optional_lookups() {
        let engine = engine();
        add(&engine, db(&[("name", "test")]), Tags::new());
        let none = Tags::new();

        assert_eq!(engine.get_config_optional::<String>("db.missing", &none).unwrap(), None);
        assert_eq!(engine.get_config::<Option<String>>("db.missing", &none).unwrap(), None);
        assert_eq!(
            engine.get_config_optional::<String>("db.name", &none).unwrap().as_deref(),
            Some("test")
        );
        assert!(engine.get_config::<String>("db.missing", &none).is_err());
        assert_eq!(engine.get_config_or("db.missing", &none, 7u8), 7);
        // A parse failure is not a missing node.
        assert!(engine.get_config_optional::<u8>("db.name", &none).is_err());
    }

    #[test]
    fn test_root_path_returns_whole_tree() {
        let engine = engine();
        add(&engine, db(&[("name", "test")]), Tags::new());
        let node = engine.get_config::<NodeRef>("", &Tags::new()).unwrap();
        assert_eq!(node.get_key("db").and_then(|d| d.get_key("name")).and_then(|n| n.value()), Some("test"));
    }

    #[test]
    fn test_load_configs_requires_sources() {
        let engine = engine();
        let err = engine.load_configs(Vec::new()).unwrap_err();
        assert!(matches!(err, ConfigError::NoSources));
        assert!(err.to_string().contains("No sources provided"));
    }

    #[test]
    fn test_load_configs_reports_merge_errors() {
        let engine = engine();
        let err = engine
            .load_configs([
                ConfigNodeContainer::new(db(&[("name", "a")]), SourceId::new(), Tags::new()),
                ConfigNodeContainer::new(
                    ConfigNode::map([("db", ConfigNode::leaf("flat"))]),
                    SourceId::new(),
                    Tags::new(),
                ),
            ])
            .unwrap_err();
        assert!(matches!(err, ConfigError::Load { .. }));
        assert!(err.to_string().contains("level: ERROR"));
    }

    struct Counter(AtomicUsize);

    impl ReloadListener for Counter {
        fn on_reload(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_reload_notifies_listeners() {
        let engine = engine();
        let source = add(&engine, db(&[("name", "before")]), Tags::new());

        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let weak: Weak<dyn ReloadListener> = Arc::downgrade(&(Arc::clone(&counter) as Arc<dyn ReloadListener>));
        engine.register_listener(weak);

        engine.reload_node(ConfigNodeContainer::new(db(&[("name", "after")]), source, Tags::new()));
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
        assert_eq!(engine.get_config::<String>("db.name", &Tags::new()).unwrap(), "after");

        // Unknown sources do not publish anything.
        engine.reload_node(ConfigNodeContainer::new(db(&[("name", "x")]), SourceId::new(), Tags::new()));
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }
}
