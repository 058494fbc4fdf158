//! Assembles sources, decoders, transformers and the engine into a [`Config`].

use crate::cache::CachedConfig;
use crate::decoder::{DecodedValue, Decoder, TypeDescriptor, default_decoders};
use crate::engine::{ConfigEngine, ConfigProvider};
use crate::error::{ConfigError, Result};
use crate::logging::DiagnosticLogger;
use crate::node::{ConfigNodeContainer, NodeRef, SourceId};
use crate::roots::{ExactMatchWithFallback, TagMergingStrategy};
use crate::settings::ConfigSettings;
use crate::source::ConfigSource;
use crate::tags::Tags;
use crate::transform::{Transformer, TransformerPostProcessor};
use crate::validation::{Validated, ValidationError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

pub struct ConfigBuilder {
    settings: ConfigSettings,
    sources: Vec<Arc<dyn ConfigSource>>,
    decoders: Vec<Arc<dyn Decoder>>,
    transformers: Vec<Arc<dyn Transformer>>,
    strategy: Box<dyn TagMergingStrategy>,
    default_tags: Tags,
    use_cache: bool,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            settings: ConfigSettings::default(),
            sources: Vec::new(),
            decoders: Vec::new(),
            transformers: Vec::new(),
            strategy: Box::new(ExactMatchWithFallback),
            default_tags: Tags::new(),
            use_cache: true,
        }
    }

    /// Sources merge in the order added; later sources win.
    pub fn add_source(mut self, source: impl ConfigSource + 'static) -> Self {
        self.sources.push(Arc::new(source));
        self
    }

    /// Custom decoders are consulted before the built-in ones.
    pub fn add_decoder(mut self, decoder: Arc<dyn Decoder>) -> Self {
        self.decoders.push(decoder);
        self
    }

    pub fn add_transformer(mut self, transformer: Arc<dyn Transformer>) -> Self {
        self.transformers.push(transformer);
        self
    }

    pub fn with_settings(mut self, settings: ConfigSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_strategy(mut self, strategy: Box<dyn TagMergingStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_default_tags(mut self, tags: Tags) -> Self {
        self.default_tags = tags;
        self
    }

    pub fn use_cache(mut self, enabled: bool) -> Self {
        self.use_cache = enabled;
        self
    }

    pub fn build(self) -> Result<Config> {
        let mut processor = TransformerPostProcessor::with_defaults(&self.settings)?;
        for transformer in self.transformers {
            processor.add_transformer(transformer);
        }

        let engine = ConfigEngine::new(self.settings)?
            .with_strategy(self.strategy)
            .with_default_tags(self.default_tags)
            .with_diagnostics(DiagnosticLogger::new().with_name("config"));
        if !self.decoders.is_empty() {
            let mut decoders = self.decoders;
            decoders.extend(default_decoders());
            engine.set_decoders(decoders);
        }

        let engine = Arc::new(engine);
        let cache = self.use_cache.then(|| CachedConfig::new(Arc::clone(&engine)));
        Ok(Config {
            engine,
            cache,
            sources: self.sources,
            processor,
            loaded: AtomicBool::new(false),
        })
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A configured pipeline: sources feeding an engine, optionally cached.
pub struct Config {
    engine: Arc<ConfigEngine>,
    cache: Option<Arc<CachedConfig>>,
    sources: Vec<Arc<dyn ConfigSource>>,
    processor: TransformerPostProcessor,
    loaded: AtomicBool,
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn engine(&self) -> &Arc<ConfigEngine> {
        &self.engine
    }

    pub fn cache(&self) -> Option<&Arc<CachedConfig>> {
        self.cache.as_ref()
    }

    pub fn sources(&self) -> &[Arc<dyn ConfigSource>] {
        &self.sources
    }

    /// Load a source and run substitution over its tree.
    fn load_source(&self, source: &dyn ConfigSource) -> Validated<ConfigNodeContainer> {
        source.load_container(self.engine.lexer()).and_then(|container| {
            self.processor.process(&container.node).map(|node| ConfigNodeContainer {
                node,
                ..container
            })
        })
    }

    fn check(&self, context: &str, errors: &[ValidationError]) -> Result<()> {
        self.engine.diagnostics().log(context, errors);
        let treat_warnings = self.engine.settings().treat_warnings_as_errors;
        if errors.iter().any(|e| e.level().is_failure(treat_warnings)) {
            return Err(ConfigError::load(context, errors));
        }
        Ok(())
    }

    /// Load every source and register its tree. A second call reloads them.
    pub fn load_configs(&self) -> Result<usize> {
        if self.sources.is_empty() {
            return Err(ConfigError::NoSources);
        }
        if self.loaded.load(Ordering::SeqCst) {
            for source in &self.sources {
                self.reload_source(source.id())?;
            }
            return Ok(self.sources.len());
        }

        let mut errors = Vec::new();
        let containers: Vec<ConfigNodeContainer> = self
            .sources
            .iter()
            .filter_map(|source| self.load_source(source.as_ref()).drain_into(&mut errors))
            .collect();
        self.check("load", &errors)?;

        // Registered even when merging reports errors; a retry reloads
        // instead of registering the sources twice.
        let result = self.engine.load_configs(containers);
        self.loaded.store(true, Ordering::SeqCst);
        result
    }

    /// Reload one source by id and re-merge.
    pub fn reload_source(&self, id: SourceId) -> Result<NodeRef> {
        let source = self
            .sources
            .iter()
            .find(|s| s.id() == id)
            .ok_or_else(|| ConfigError::UnknownSource(id.to_string()))?;

        let (container, mut errors) = self.load_source(source.as_ref()).into_parts();
        let Some(container) = container else {
            warn!(source = source.name(), "Reload failed, keeping previous config");
            self.check("reload", &errors)?;
            return Err(ConfigError::load("reload", &errors));
        };
        let root = self.engine.reload_node(container).drain_into(&mut errors);
        self.check("reload", &errors)?;
        info!(source = source.name(), "Reloaded config source");
        root.ok_or_else(|| ConfigError::load("reload", &errors))
    }
}

impl ConfigProvider for Config {
    fn resolve(&self, path: &str, ty: &TypeDescriptor, tags: &Tags) -> Validated<DecodedValue> {
        match &self.cache {
            Some(cache) => cache.resolve(path, ty, tags),
            None => self.engine.resolve(path, ty, tags),
        }
    }

    fn settings(&self) -> &ConfigSettings {
        self.engine.settings()
    }

    fn diagnostics(&self) -> &DiagnosticLogger {
        self.engine.diagnostics()
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.sources.iter().map(|s| s.name()).collect();
        f.debug_struct("Config")
            .field("engine", &self.engine)
            .field("cached", &self.cache.is_some())
            .field("sources", &names)
            .finish()
    }
}
