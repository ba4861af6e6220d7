//! Creates and hands out named caches.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use lazy_static::lazy_static;
use regex::Regex;
use smol_str::SmolStr;
use tracing::debug;

use crate::cache::RemokaCache;
use crate::config::{CacheConfig, RemokaProperties, parse_duration};
use crate::error::ConfigError;
use crate::node::NodeId;
use crate::writer::CacheWriter;

lazy_static! {
    /// A cache name may carry its own TTLs: `orders#L10m#R2h` expires
    /// locally after ten minutes and in the shared store after two
    /// hours.
    static ref NAME_TTL_PATTERN: Regex =
        Regex::new(r"#L(\d+\w)#R(\d+\w)").expect("name TTL pattern");
}

/// Process-wide registry of named caches.
///
/// Holds one [`RemokaCache`] per name, created eagerly from the initial
/// name list or on first access when runtime creation is allowed. The
/// name→instance map is the only shared mutable structure in the core;
/// racing first accesses for the same unseen name install exactly one
/// instance, which every racer then receives.
pub struct CacheRegistry {
    writer: Arc<dyn CacheWriter>,
    caches: DashMap<SmolStr, Arc<RemokaCache>>,
    default_config: CacheConfig,
    initial_config: HashMap<SmolStr, CacheConfig>,
    allow_runtime_creation: bool,
    node_id: NodeId,
}

impl fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheRegistry")
            .field("caches", &self.caches.len())
            .field("allow_runtime_creation", &self.allow_runtime_creation)
            .field("node_id", &self.node_id)
            .finish()
    }
}

impl CacheRegistry {
    /// Start building a registry around a shared-store writer.
    pub fn builder(writer: Arc<dyn CacheWriter>) -> CacheRegistryBuilder {
        CacheRegistryBuilder::new(writer)
    }

    /// Wire a registry from externally-bound properties.
    pub fn from_properties(
        writer: Arc<dyn CacheWriter>,
        properties: &RemokaProperties,
    ) -> Result<Self, ConfigError> {
        let mut builder = Self::builder(writer)
            .default_config(properties.cache_config()?)
            .allow_runtime_creation(properties.allow_runtime_creation)
            .initial_caches(properties.initial_cache_names());
        if let Some(node_id) = properties.node_id.as_deref() {
            builder = builder.node_id(NodeId::from(node_id));
        }
        builder.build()
    }

    /// The cache registered under `name`.
    ///
    /// Creates it on first access when runtime creation is allowed,
    /// using the per-name override configuration if one was registered
    /// and the default otherwise; returns `Ok(None)` when creation is
    /// disallowed and the name is unknown. Creation and insertion are
    /// atomic: concurrent callers all receive the same instance.
    pub fn get_cache(&self, name: &str) -> Result<Option<Arc<RemokaCache>>, ConfigError> {
        if let Some(cache) = self.caches.get(name) {
            return Ok(Some(cache.clone()));
        }
        if !self.allow_runtime_creation {
            return Ok(None);
        }
        match self.caches.entry(SmolStr::new(name)) {
            Entry::Occupied(entry) => Ok(Some(entry.get().clone())),
            Entry::Vacant(entry) => {
                let cache = Arc::new(self.create_cache(name)?);
                debug!(cache = name, "created cache");
                entry.insert(cache.clone());
                Ok(Some(cache))
            }
        }
    }

    /// The cache registered under `name`, never creating one.
    ///
    /// This is what invalidation handling uses: a message for a name
    /// this process never opened must not allocate an L1 for it.
    pub fn peek(&self, name: &str) -> Option<Arc<RemokaCache>> {
        self.caches.get(name).map(|cache| cache.clone())
    }

    /// Names of every cache currently registered.
    pub fn cache_names(&self) -> Vec<SmolStr> {
        self.caches.iter().map(|entry| entry.key().clone()).collect()
    }

    /// The identity this process publishes and filters messages with.
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    fn create_cache(&self, name: &str) -> Result<RemokaCache, ConfigError> {
        let mut config = self
            .initial_config
            .get(name)
            .unwrap_or(&self.default_config)
            .clone();
        if let Some(captures) = NAME_TTL_PATTERN.captures(name) {
            let local_ttl = parse_duration(name, &captures[1])?;
            let store_ttl = parse_duration(name, &captures[2])?;
            let mut spec = config.moka_spec.clone().unwrap_or_default();
            spec.time_to_live = Some(local_ttl);
            config.moka_spec = Some(spec);
            config.store_ttl = Some(store_ttl);
            debug!(
                cache = name,
                ?local_ttl,
                ?store_ttl,
                "applying name-embedded TTL override"
            );
        }
        Ok(RemokaCache::new(
            name,
            self.writer.clone(),
            config,
            self.node_id.clone(),
        ))
    }
}

/// Builder for [`CacheRegistry`].
pub struct CacheRegistryBuilder {
    writer: Arc<dyn CacheWriter>,
    default_config: CacheConfig,
    initial_config: HashMap<SmolStr, CacheConfig>,
    initial_caches: Vec<SmolStr>,
    allow_runtime_creation: bool,
    node_id: Option<NodeId>,
}

impl CacheRegistryBuilder {
    fn new(writer: Arc<dyn CacheWriter>) -> Self {
        Self {
            writer,
            default_config: CacheConfig::default(),
            initial_config: HashMap::new(),
            initial_caches: Vec::new(),
            allow_runtime_creation: true,
            node_id: None,
        }
    }

    /// Configuration template for caches without a per-name override.
    pub fn default_config(mut self, config: CacheConfig) -> Self {
        self.default_config = config;
        self
    }

    /// Names created eagerly when the registry is built.
    pub fn initial_caches<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SmolStr>,
    {
        self.initial_caches.extend(names.into_iter().map(Into::into));
        self
    }

    /// Register an override configuration for one cache name. The
    /// cache is also created eagerly at build time.
    pub fn initial_config(mut self, name: impl Into<SmolStr>, config: CacheConfig) -> Self {
        self.initial_config.insert(name.into(), config);
        self
    }

    /// Whether unseen names may be created on first access. When
    /// `false`, [`CacheRegistry::get_cache`] only answers for names
    /// created at build time.
    pub fn allow_runtime_creation(mut self, allow: bool) -> Self {
        self.allow_runtime_creation = allow;
        self
    }

    /// Identity published with every sync message; detected from the
    /// host's preferred outbound address when not set.
    pub fn node_id(mut self, node_id: NodeId) -> Self {
        self.node_id = Some(node_id);
        self
    }

    /// Build the registry and eagerly create every initial cache.
    ///
    /// Fails fast on configuration errors in any initial name, such as
    /// a malformed name-embedded TTL token.
    pub fn build(self) -> Result<CacheRegistry, ConfigError> {
        let registry = CacheRegistry {
            writer: self.writer,
            caches: DashMap::new(),
            default_config: self.default_config,
            initial_config: self.initial_config,
            allow_runtime_creation: self.allow_runtime_creation,
            node_id: self.node_id.unwrap_or_else(NodeId::detect),
        };
        let mut eager: Vec<SmolStr> = self.initial_caches;
        eager.extend(registry.initial_config.keys().cloned());
        for name in eager {
            if registry.caches.contains_key(&name) {
                continue;
            }
            let cache = Arc::new(registry.create_cache(&name)?);
            registry.caches.insert(name, cache);
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::WriterResult;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::time::Duration;

    struct NoopWriter;

    #[async_trait]
    impl CacheWriter for NoopWriter {
        async fn get(&self, _: &str, _: &str) -> WriterResult<Option<Bytes>> {
            Ok(None)
        }
        async fn put(&self, _: &str, _: &str, _: Bytes, _: Option<Duration>) -> WriterResult<()> {
            Ok(())
        }
        async fn put_if_absent(
            &self,
            _: &str,
            _: &str,
            _: Bytes,
            _: Option<Duration>,
        ) -> WriterResult<Option<Bytes>> {
            Ok(None)
        }
        async fn remove(&self, _: &str, _: &str) -> WriterResult<()> {
            Ok(())
        }
        async fn clean(&self, _: &str, _: &str) -> WriterResult<()> {
            Ok(())
        }
        async fn sync(&self, _: &str, _: Bytes) -> WriterResult<()> {
            Ok(())
        }
    }

    fn registry() -> CacheRegistry {
        CacheRegistry::builder(Arc::new(NoopWriter))
            .node_id(NodeId::from("test"))
            .build()
            .unwrap()
    }

    #[test]
    fn name_ttl_override_applies_to_both_levels() {
        let registry = registry();
        let cache = registry.get_cache("orders#L10m#R2h").unwrap().unwrap();
        assert_eq!(cache.config.store_ttl, Some(Duration::from_secs(7_200)));
        let spec = cache.config.moka_spec.clone().unwrap();
        assert_eq!(spec.time_to_live, Some(Duration::from_secs(600)));
    }

    #[test]
    fn name_ttl_override_keeps_other_spec_fields() {
        let spec = crate::MokaSpec::parse("max_capacity=100,time_to_live=1h").unwrap();
        let registry = CacheRegistry::builder(Arc::new(NoopWriter))
            .default_config(CacheConfig::default().moka_spec(spec))
            .node_id(NodeId::from("test"))
            .build()
            .unwrap();
        let cache = registry.get_cache("orders#L10m#R2h").unwrap().unwrap();
        let spec = cache.config.moka_spec.clone().unwrap();
        assert_eq!(spec.max_capacity, Some(100));
        assert_eq!(spec.time_to_live, Some(Duration::from_secs(600)));
    }

    #[test]
    fn malformed_name_ttl_fails_fast() {
        let registry = registry();
        let error = registry.get_cache("orders#L10x#R2h").unwrap_err();
        let rendered = error.to_string();
        assert!(rendered.contains("orders#L10x#R2h"), "{rendered}");
        assert!(rendered.contains("10x"), "{rendered}");
    }

    #[test]
    fn get_cache_is_idempotent() {
        let registry = registry();
        let first = registry.get_cache("orders").unwrap().unwrap();
        let second = registry.get_cache("orders").unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn runtime_creation_can_be_disabled() {
        let registry = CacheRegistry::builder(Arc::new(NoopWriter))
            .allow_runtime_creation(false)
            .initial_caches(["orders"])
            .node_id(NodeId::from("test"))
            .build()
            .unwrap();
        assert!(registry.get_cache("orders").unwrap().is_some());
        assert!(registry.get_cache("sessions").unwrap().is_none());
    }

    #[test]
    fn peek_never_creates() {
        let registry = registry();
        assert!(registry.peek("orders").is_none());
        registry.get_cache("orders").unwrap();
        assert!(registry.peek("orders").is_some());
    }

    #[test]
    fn initial_config_overrides_default() {
        let registry = CacheRegistry::builder(Arc::new(NoopWriter))
            .initial_config(
                "sessions",
                CacheConfig::default().store_ttl(Duration::from_secs(30)),
            )
            .node_id(NodeId::from("test"))
            .build()
            .unwrap();
        let sessions = registry.peek("sessions").unwrap();
        assert_eq!(sessions.store_ttl(), Some(Duration::from_secs(30)));
        let other = registry.get_cache("orders").unwrap().unwrap();
        assert_eq!(other.store_ttl(), None);
    }

    #[test]
    fn eager_build_fails_on_malformed_initial_name() {
        let result = CacheRegistry::builder(Arc::new(NoopWriter))
            .initial_caches(["orders#L5q#R1h"])
            .node_id(NodeId::from("test"))
            .build();
        assert!(result.is_err());
    }
}
