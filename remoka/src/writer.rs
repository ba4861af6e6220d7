//! Contract between named caches and the shared store.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Result type for [`CacheWriter`] operations.
pub type WriterResult<T> = Result<T, WriterError>;

/// Error type for shared-store operations.
///
/// Store and bus connectivity failures propagate directly to the caller;
/// no operation retries on its own. Retry policy, if any, belongs to the
/// layer above.
#[derive(Debug, Error)]
pub enum WriterError {
    /// Network interaction error while talking to the shared store or bus.
    #[error(transparent)]
    Connection(Box<dyn std::error::Error + Send>),

    /// Any store error not related to network interaction.
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send>),

    /// Gave up waiting for the advisory lock of a cache.
    ///
    /// Only produced when the writer is configured with a bounded lock
    /// wait; it is fatal and non-retryable for the enclosing operation.
    #[error("timed out after {waited_ms}ms waiting to unlock cache '{name}'")]
    LockTimeout {
        /// Name of the cache whose lock was contended.
        name: String,
        /// Total time spent polling before giving up.
        waited_ms: u64,
    },
}

/// Gateway to the shared key-value store backing every named cache.
///
/// All keys passed here are physical keys (already prefixed by the
/// cache); `name` only scopes the advisory lock. Each operation is an
/// independent, non-transactional network call that blocks the calling
/// task for one round trip.
#[async_trait]
pub trait CacheWriter: Send + Sync {
    /// Read the raw bytes stored under `key`.
    async fn get(&self, name: &str, key: &str) -> WriterResult<Option<Bytes>>;

    /// Unconditional upsert. Expiry applies only when `ttl` is present
    /// and strictly positive; otherwise the entry never expires.
    async fn put(
        &self,
        name: &str,
        key: &str,
        value: Bytes,
        ttl: Option<Duration>,
    ) -> WriterResult<()>;

    /// Conditional insert. Returns `None` when the insert won (TTL is
    /// applied only then) or the pre-existing value on conflict. Runs
    /// under the advisory lock for `name` when locking is enabled.
    async fn put_if_absent(
        &self,
        name: &str,
        key: &str,
        value: Bytes,
        ttl: Option<Duration>,
    ) -> WriterResult<Option<Bytes>>;

    /// Unconditional delete; absent keys are not an error.
    async fn remove(&self, name: &str, key: &str) -> WriterResult<()>;

    /// Delete every key matching the glob-style `pattern`, scanning in
    /// bounded batches and deleting the collected set in one call. Runs
    /// under the advisory lock for `name` when locking is enabled.
    async fn clean(&self, name: &str, pattern: &str) -> WriterResult<()>;

    /// Fire-and-forget publish of `payload` on the sync channel. Never
    /// touches the advisory lock and never retries.
    async fn sync(&self, channel: &str, payload: Bytes) -> WriterResult<()>;
}

/// The TTL to actually apply for a store write: present and non-zero.
///
/// A zero TTL means "store without expiry", matching the configuration
/// default of caches that never expire in the shared store.
pub fn effective_ttl(ttl: Option<Duration>) -> Option<Duration> {
    ttl.filter(|ttl| !ttl.is_zero())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_ttl_filters_zero() {
        assert_eq!(effective_ttl(None), None);
        assert_eq!(effective_ttl(Some(Duration::ZERO)), None);
        assert_eq!(
            effective_ttl(Some(Duration::from_secs(5))),
            Some(Duration::from_secs(5))
        );
    }
}
