//! The named-cache façade combining L1, the shared store, and the sync
//! channel.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Serialize, de::DeserializeOwned};
use smol_str::SmolStr;
use tracing::{debug, trace};

use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::message::SyncMessage;
use crate::node::NodeId;
use crate::writer::CacheWriter;

/// Reserved byte sequence stored for an explicitly cached null.
///
/// Must never collide with a serialized value; neither JSON nor bincode
/// output starts with a NUL byte for any input.
pub(crate) const NULL_SENTINEL: &[u8] = b"\x00remoka:null\x00";

/// A present cache entry: a value, or an explicitly cached null.
///
/// Distinct from an absent entry — `lookup` returns
/// `Ok(Some(CacheEntry::Null))` for a stored null and `Ok(None)` for a
/// miss.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheEntry<T> {
    /// A stored value.
    Value(T),
    /// A stored null.
    Null,
}

impl<T> CacheEntry<T> {
    /// The value, if this entry holds one.
    pub fn into_value(self) -> Option<T> {
        match self {
            CacheEntry::Value(value) => Some(value),
            CacheEntry::Null => None,
        }
    }

    /// Whether this entry is a cached null.
    pub fn is_null(&self) -> bool {
        matches!(self, CacheEntry::Null)
    }
}

/// A named two-level cache.
///
/// Reads consult the local Moka cache first and fall through to the
/// shared store, populating L1 on the way back. Every mutation writes
/// the store, broadcasts a [`SyncMessage`], and only then touches L1 —
/// in that order, so a receiver reacting to the broadcast before the
/// local write lands will at worst re-read the fresh value from the
/// store.
///
/// Instances are created by the [`CacheRegistry`](crate::CacheRegistry)
/// and live for the rest of the process; L1 contents may be cleared at
/// any time without destroying the cache itself.
pub struct RemokaCache {
    pub(crate) name: SmolStr,
    pub(crate) writer: Arc<dyn CacheWriter>,
    pub(crate) config: CacheConfig,
    /// L1, keyed by physical key, holding serialized value bytes.
    pub(crate) local: moka::future::Cache<String, Bytes>,
    /// Precomputed `prefix(name)`.
    prefix: String,
    origin: NodeId,
}

impl fmt::Debug for RemokaCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemokaCache")
            .field("name", &self.name)
            .field("prefix", &self.prefix)
            .field("origin", &self.origin)
            .field("store_ttl", &self.config.store_ttl)
            .field("allow_null_values", &self.config.allow_null_values)
            .finish()
    }
}

impl RemokaCache {
    pub(crate) fn new(
        name: impl Into<SmolStr>,
        writer: Arc<dyn CacheWriter>,
        config: CacheConfig,
        origin: NodeId,
    ) -> Self {
        let name = name.into();
        let prefix = config.key_prefix.compute(&name);
        let local = config.moka_spec.clone().unwrap_or_default().build();
        Self {
            name,
            writer,
            config,
            local,
            prefix,
            origin,
        }
    }

    /// This cache's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// TTL applied to shared-store writes, when one is configured.
    pub fn store_ttl(&self) -> Option<std::time::Duration> {
        self.config.store_ttl
    }

    /// Whether null values are representable as entries.
    pub fn allows_null_values(&self) -> bool {
        self.config.allow_null_values
    }

    /// The physical key for a logical key.
    fn physical_key<K>(&self, key: &K) -> String
    where
        K: fmt::Display + ?Sized,
    {
        format!("{}:{}", self.prefix, key)
    }

    /// Look up `key`, consulting L1 first and the shared store on miss.
    ///
    /// A store hit is written back into L1 before returning. `None`
    /// means absent from both levels.
    pub async fn lookup<T, K>(&self, key: &K) -> Result<Option<CacheEntry<T>>, CacheError>
    where
        T: DeserializeOwned,
        K: fmt::Display + ?Sized,
    {
        let physical = self.physical_key(key);
        if let Some(raw) = self.local.get(&physical).await {
            trace!(cache = %self.name, key = %physical, "local cache hit");
            return Ok(Some(self.decode(&raw)?));
        }
        match self.writer.get(&self.name, &physical).await? {
            Some(raw) => {
                trace!(cache = %self.name, key = %physical, "shared store hit");
                let entry = self.decode(&raw)?;
                self.local.insert(physical, raw).await;
                Ok(Some(entry))
            }
            None => {
                trace!(cache = %self.name, key = %physical, "miss");
                Ok(None)
            }
        }
    }

    /// Return the entry for `key`, loading and caching it on a full
    /// miss.
    ///
    /// The loader runs exactly once; its result is stored through
    /// [`put`](Self::put) (so a `None` result is subject to the null
    /// policy). A loader failure is surfaced as
    /// [`CacheError::ValueRetrieval`] naming the key, and nothing is
    /// cached.
    pub async fn get_with<T, K, F, Fut, E>(&self, key: &K, loader: F) -> Result<CacheEntry<T>, CacheError>
    where
        T: Serialize + DeserializeOwned,
        K: fmt::Display + ?Sized,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
        E: std::error::Error + Send + 'static,
    {
        if let Some(entry) = self.lookup(key).await? {
            return Ok(entry);
        }
        let loaded = loader().await.map_err(|e| CacheError::ValueRetrieval {
            key: self.physical_key(key),
            source: Box::new(e),
        })?;
        self.put(key, loaded.as_ref()).await?;
        Ok(match loaded {
            Some(value) => CacheEntry::Value(value),
            None => CacheEntry::Null,
        })
    }

    /// Store `value` under `key`. `None` stores an explicit null.
    ///
    /// Fails with [`CacheError::NullValueRejected`] — before any side
    /// effect — when `value` is `None` and this cache disallows nulls.
    pub async fn put<T, K>(&self, key: &K, value: Option<&T>) -> Result<(), CacheError>
    where
        T: Serialize,
        K: fmt::Display + ?Sized,
    {
        let raw = self.encode(value)?;
        let physical = self.physical_key(key);
        self.writer
            .put(&self.name, &physical, raw.clone(), self.config.store_ttl)
            .await?;
        self.publish(Some(&physical)).await?;
        self.local.insert(physical, raw).await;
        Ok(())
    }

    /// Store `value` under `key` only if the shared store has no entry.
    ///
    /// Returns `None` when this call won the insert (broadcast sent, L1
    /// populated) or the pre-existing entry on conflict, in which case
    /// nothing is broadcast and L1 is left untouched. A `None` value
    /// against a null-rejecting cache stores nothing and answers with
    /// whatever is currently cached.
    pub async fn put_if_absent<T, K>(
        &self,
        key: &K,
        value: Option<&T>,
    ) -> Result<Option<CacheEntry<T>>, CacheError>
    where
        T: Serialize + DeserializeOwned,
        K: fmt::Display + ?Sized,
    {
        let raw = match value {
            Some(value) => self.config.value_format.serialize(value)?,
            None if self.config.allow_null_values => Bytes::from_static(NULL_SENTINEL),
            None => return self.lookup(key).await,
        };
        let physical = self.physical_key(key);
        match self
            .writer
            .put_if_absent(&self.name, &physical, raw.clone(), self.config.store_ttl)
            .await?
        {
            None => {
                self.publish(Some(&physical)).await?;
                self.local.insert(physical, raw).await;
                Ok(None)
            }
            Some(existing) => Ok(Some(self.decode(&existing)?)),
        }
    }

    /// Delete `key` from both levels and broadcast the invalidation.
    ///
    /// Succeeds on already-absent keys and still broadcasts; receivers
    /// tolerate invalidating an entry they do not hold.
    pub async fn evict<K>(&self, key: &K) -> Result<(), CacheError>
    where
        K: fmt::Display + ?Sized,
    {
        let physical = self.physical_key(key);
        self.writer.remove(&self.name, &physical).await?;
        self.publish(Some(&physical)).await?;
        self.local.invalidate(&physical).await;
        Ok(())
    }

    /// Delete every entry of this cache from both levels and broadcast
    /// a cache-wide invalidation (`key = None`).
    pub async fn clear(&self) -> Result<(), CacheError> {
        let pattern = self.physical_key("*");
        self.writer.clean(&self.name, &pattern).await?;
        self.publish(None).await?;
        self.local.invalidate_all();
        Ok(())
    }

    /// Drop one L1 entry, or all of them when `key` is `None`.
    ///
    /// This is the receiving side of a [`SyncMessage`]: it never writes
    /// the store and never publishes, which is what keeps broadcasts
    /// from echoing between processes.
    pub async fn clear_local(&self, key: Option<&str>) {
        match key {
            Some(key) => {
                trace!(cache = %self.name, key, "clearing local entry");
                self.local.invalidate(key).await;
            }
            None => {
                trace!(cache = %self.name, "clearing all local entries");
                self.local.invalidate_all();
            }
        }
    }

    fn encode<T: Serialize>(&self, value: Option<&T>) -> Result<Bytes, CacheError> {
        match value {
            Some(value) => Ok(self.config.value_format.serialize(value)?),
            None if self.config.allow_null_values => Ok(Bytes::from_static(NULL_SENTINEL)),
            None => Err(CacheError::NullValueRejected {
                name: self.name.clone(),
            }),
        }
    }

    fn decode<T: DeserializeOwned>(&self, raw: &Bytes) -> Result<CacheEntry<T>, CacheError> {
        if self.config.allow_null_values && raw.as_ref() == NULL_SENTINEL {
            return Ok(CacheEntry::Null);
        }
        Ok(CacheEntry::Value(self.config.value_format.deserialize(raw)?))
    }

    async fn publish(&self, key: Option<&str>) -> Result<(), CacheError> {
        let message = SyncMessage::new(
            self.name.clone(),
            key.map(str::to_owned),
            self.origin.as_str(),
        );
        debug!(
            cache = %self.name,
            key = ?key,
            origin = %self.origin,
            "publishing sync message"
        );
        self.writer
            .sync(&self.config.sync_channel, message.encode()?)
            .await?;
        Ok(())
    }
}
