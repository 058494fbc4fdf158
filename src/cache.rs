//! Read-through cache in front of a [`ConfigEngine`].
//!
//! Every outcome is memoized by `(path, type, tags)`, including failures.
//! Any reload clears the whole map.

use crate::decoder::{DecodedValue, TypeDescriptor};
use crate::engine::{ConfigEngine, ConfigProvider, ReloadListener};
use crate::logging::DiagnosticLogger;
use crate::settings::ConfigSettings;
use crate::tags::Tags;
use crate::validation::Validated;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tracing::debug;

type CacheKey = (String, TypeDescriptor, Tags);

pub struct CachedConfig {
    inner: Arc<ConfigEngine>,
    cache: Mutex<HashMap<CacheKey, Validated<DecodedValue>>>,
    /// Bumped under the cache lock on every reload.
    generation: AtomicU64,
}

impl CachedConfig {
    /// Wrap `inner` and subscribe to its reloads.
    pub fn new(inner: Arc<ConfigEngine>) -> Arc<Self> {
        let cached = Arc::new(Self {
            inner,
            cache: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
        });
        let listener: Weak<dyn ReloadListener> = Arc::<Self>::downgrade(&cached);
        cached.inner.register_listener(listener);
        cached
    }

    pub fn engine(&self) -> &Arc<ConfigEngine> {
        &self.inner
    }

    pub fn len(&self) -> usize {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.clear();
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

impl ConfigProvider for CachedConfig {
    fn resolve(&self, path: &str, ty: &TypeDescriptor, tags: &Tags) -> Validated<DecodedValue> {
        let key = (path.to_string(), ty.clone(), tags.clone());
        let generation = {
            let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(hit) = cache.get(&key) {
                return hit.clone();
            }
            self.generation.load(Ordering::SeqCst)
        };

        // Resolve outside the lock. A reload in between makes the result
        // stale, so it is returned but not stored.
        let resolved = self.inner.resolve(path, ty, tags);
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if self.generation.load(Ordering::SeqCst) == generation {
            cache.insert(key, resolved.clone());
        } else {
            debug!(path = %path, "Config reloaded during lookup, not caching");
        }
        resolved
    }

    fn settings(&self) -> &ConfigSettings {
        self.inner.settings()
    }

    fn diagnostics(&self) -> &DiagnosticLogger {
        self.inner.diagnostics()
    }
}

impl ReloadListener for CachedConfig {
    fn on_reload(&self) {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        debug!(entries = cache.len(), "Clearing config cache");
        cache.clear();
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for CachedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedConfig")
            .field("entries", &self.len())
            .finish()
    }
}
