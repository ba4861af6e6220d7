//! Redis implementation of the shared-store gateway.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use redis::Client;
use redis::aio::ConnectionManager;
use tokio::sync::OnceCell;
use tracing::{debug, trace, warn};

use remoka::writer::{CacheWriter, WriterResult, effective_ttl};

use crate::error::Error;
use crate::lock::CacheLock;

/// Keys fetched per SCAN round trip during a bulk delete.
const SCAN_BATCH: usize = 500;

/// Shared-store writer backed by Redis.
///
/// Uses a [`ConnectionManager`] for asynchronous network interaction,
/// established lazily on the first operation. Cloning is cheap and
/// shares the connection.
///
/// [`ConnectionManager`]: redis::aio::ConnectionManager
#[derive(Clone)]
pub struct RedisCacheWriter {
    client: Client,
    connection: OnceCell<ConnectionManager>,
    lock: CacheLock,
}

impl RedisCacheWriter {
    /// Creates a new builder with default settings.
    #[must_use]
    pub fn builder() -> RedisCacheWriterBuilder {
        RedisCacheWriterBuilder::default()
    }

    /// Create lazy connection to redis via [`ConnectionManager`].
    ///
    /// [`ConnectionManager`]: redis::aio::ConnectionManager
    pub async fn connection(&self) -> WriterResult<&ConnectionManager> {
        let manager = self
            .connection
            .get_or_try_init(|| {
                trace!("initialize new redis connection manager");
                self.client.get_connection_manager()
            })
            .await
            .map_err(Error::from)?;
        Ok(manager)
    }

    async fn conditional_insert(
        connection: &mut ConnectionManager,
        key: &str,
        value: &Bytes,
        ttl: Option<Duration>,
    ) -> WriterResult<Option<Bytes>> {
        let inserted: bool = redis::cmd("SETNX")
            .arg(key)
            .arg(value.as_ref())
            .query_async(connection)
            .await
            .map_err(Error::from)?;
        if inserted {
            if let Some(ttl) = effective_ttl(ttl) {
                redis::cmd("PEXPIRE")
                    .arg(key)
                    .arg(ttl.as_millis() as u64)
                    .query_async::<()>(connection)
                    .await
                    .map_err(Error::from)?;
            }
            return Ok(None);
        }
        let existing: Option<Vec<u8>> = redis::cmd("GET")
            .arg(key)
            .query_async(connection)
            .await
            .map_err(Error::from)?;
        Ok(existing.map(Bytes::from))
    }

    /// Collect every key matching `pattern` with a cursor-based scan,
    /// then delete the set in one command. SCAN can repeat keys across
    /// rounds, so the set is deduplicated before the delete.
    async fn scan_and_delete(
        connection: &mut ConnectionManager,
        name: &str,
        pattern: &str,
    ) -> WriterResult<()> {
        let mut keys: HashSet<Vec<u8>> = HashSet::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<Vec<u8>>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(connection)
                .await
                .map_err(Error::from)?;
            keys.extend(batch);
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        if keys.is_empty() {
            return Ok(());
        }
        debug!(cache = name, count = keys.len(), "deleting matched keys");
        let mut cmd = redis::cmd("DEL");
        for key in &keys {
            cmd.arg(key.as_slice());
        }
        cmd.query_async::<()>(connection)
            .await
            .map_err(Error::from)?;
        Ok(())
    }
}

#[async_trait]
impl CacheWriter for RedisCacheWriter {
    async fn get(&self, name: &str, key: &str) -> WriterResult<Option<Bytes>> {
        let mut connection = self.connection().await?.clone();
        self.lock.wait_until_unlocked(&mut connection, name).await?;
        let data: Option<Vec<u8>> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut connection)
            .await
            .map_err(Error::from)?;
        Ok(data.map(Bytes::from))
    }

    async fn put(
        &self,
        name: &str,
        key: &str,
        value: Bytes,
        ttl: Option<Duration>,
    ) -> WriterResult<()> {
        let mut connection = self.connection().await?.clone();
        self.lock.wait_until_unlocked(&mut connection, name).await?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value.as_ref());
        if let Some(ttl) = effective_ttl(ttl) {
            cmd.arg("PX").arg(ttl.as_millis() as u64);
        }
        cmd.query_async::<()>(&mut connection)
            .await
            .map_err(Error::from)?;
        Ok(())
    }

    async fn put_if_absent(
        &self,
        name: &str,
        key: &str,
        value: Bytes,
        ttl: Option<Duration>,
    ) -> WriterResult<Option<Bytes>> {
        let mut connection = self.connection().await?.clone();
        let guard = if self.lock.is_enabled() {
            Some(self.lock.acquire(&mut connection, name).await?)
        } else {
            None
        };
        let outcome = Self::conditional_insert(&mut connection, key, &value, ttl).await;
        if let Some(guard) = guard {
            if let Err(error) = self.lock.release(&mut connection, guard).await {
                warn!(cache = name, %error, "failed to release cache lock");
            }
        }
        outcome
    }

    async fn remove(&self, name: &str, key: &str) -> WriterResult<()> {
        let mut connection = self.connection().await?.clone();
        self.lock.wait_until_unlocked(&mut connection, name).await?;
        redis::cmd("DEL")
            .arg(key)
            .query_async::<()>(&mut connection)
            .await
            .map_err(Error::from)?;
        Ok(())
    }

    async fn clean(&self, name: &str, pattern: &str) -> WriterResult<()> {
        let mut connection = self.connection().await?.clone();
        let guard = if self.lock.is_enabled() {
            Some(self.lock.acquire(&mut connection, name).await?)
        } else {
            None
        };
        let outcome = Self::scan_and_delete(&mut connection, name, pattern).await;
        if let Some(guard) = guard {
            if let Err(error) = self.lock.release(&mut connection, guard).await {
                warn!(cache = name, %error, "failed to release cache lock");
            }
        }
        outcome
    }

    async fn sync(&self, channel: &str, payload: Bytes) -> WriterResult<()> {
        // Fire and forget: no lock, no retry.
        let mut connection = self.connection().await?.clone();
        let receivers: i64 = redis::cmd("PUBLISH")
            .arg(channel)
            .arg(payload.as_ref())
            .query_async(&mut connection)
            .await
            .map_err(Error::from)?;
        trace!(channel, receivers, "published sync message");
        Ok(())
    }
}

/// Builder for [`RedisCacheWriter`].
pub struct RedisCacheWriterBuilder {
    connection_info: String,
    lock_sleep: Duration,
    lock_max_wait: Option<Duration>,
}

impl Default for RedisCacheWriterBuilder {
    fn default() -> Self {
        Self {
            connection_info: "redis://127.0.0.1/".to_owned(),
            lock_sleep: Duration::ZERO,
            lock_max_wait: None,
        }
    }
}

impl RedisCacheWriterBuilder {
    /// Set connection info (host, port, database, etc.).
    pub fn server(mut self, connection_info: impl Into<String>) -> Self {
        self.connection_info = connection_info.into();
        self
    }

    /// Poll interval while waiting for another writer's advisory lock.
    /// Zero — the default — disables locking entirely.
    pub fn lock_sleep(mut self, sleep: Duration) -> Self {
        self.lock_sleep = sleep;
        self
    }

    /// Upper bound on the total lock wait. Without one the wait polls
    /// until the sentinel disappears, however long that takes.
    pub fn lock_max_wait(mut self, max_wait: Duration) -> Self {
        self.lock_max_wait = Some(max_wait);
        self
    }

    /// Create the writer with the configured settings.
    pub fn build(self) -> Result<RedisCacheWriter, crate::error::Error> {
        Ok(RedisCacheWriter {
            client: Client::open(self.connection_info)?,
            connection: OnceCell::new(),
            lock: CacheLock::new(self.lock_sleep, self.lock_max_wait),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_disable_locking() {
        let writer = RedisCacheWriter::builder().build().unwrap();
        assert!(!writer.lock.is_enabled());
    }

    #[test]
    fn builder_enables_locking_with_sleep() {
        let writer = RedisCacheWriter::builder()
            .server("redis://localhost:6379/")
            .lock_sleep(Duration::from_millis(50))
            .lock_max_wait(Duration::from_secs(5))
            .build()
            .unwrap();
        assert!(writer.lock.is_enabled());
    }

    #[test]
    fn invalid_connection_url_fails_to_build() {
        assert!(
            RedisCacheWriter::builder()
                .server("not-a-valid-url")
                .build()
                .is_err()
        );
    }
}
