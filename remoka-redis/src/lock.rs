//! Advisory lock on the shared store.
//!
//! The lock is a sentinel key per cache name whose existence means
//! "locked". It carries no lease and no ownership token: a crashed
//! holder leaves the sentinel behind, and any writer for the same name
//! can delete it. It narrows initialization races on the store; it is
//! not a distributed lock.

use std::time::Duration;

use redis::aio::ConnectionManager;
use tokio::time::sleep;
use tracing::{trace, warn};

use remoka::{WriterError, WriterResult};

use crate::error::Error;

/// Poll-based advisory lock over a cache name.
#[derive(Clone, Debug)]
pub struct CacheLock {
    sleep: Duration,
    max_wait: Option<Duration>,
}

impl CacheLock {
    /// A lock polling every `sleep`, waiting at most `max_wait` in
    /// total (`None` polls until the sentinel disappears). A zero
    /// `sleep` disables locking entirely.
    pub fn new(sleep: Duration, max_wait: Option<Duration>) -> Self {
        Self { sleep, max_wait }
    }

    /// Whether locked operations actually lock.
    pub fn is_enabled(&self) -> bool {
        !self.sleep.is_zero()
    }

    /// The sentinel key for a cache name.
    pub(crate) fn key(name: &str) -> String {
        format!("{name}~lock")
    }

    /// Wait until no sentinel exists for `name`, without acquiring.
    ///
    /// Unlocked store operations call this so they do not interleave
    /// with a critical section already in flight. No-op when locking is
    /// disabled.
    pub(crate) async fn wait_until_unlocked(
        &self,
        connection: &mut ConnectionManager,
        name: &str,
    ) -> WriterResult<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        let key = Self::key(name);
        let mut waited = Duration::ZERO;
        loop {
            let locked: bool = redis::cmd("EXISTS")
                .arg(&key)
                .query_async(connection)
                .await
                .map_err(Error::from)?;
            if !locked {
                return Ok(());
            }
            self.backoff(name, &mut waited).await?;
        }
    }

    /// Acquire the sentinel for `name`, waiting out any current holder.
    ///
    /// The returned guard is proof of a successful acquire and must be
    /// passed back to [`release`](Self::release); pairing them is what
    /// keeps one caller from deleting a sentinel another caller set.
    pub(crate) async fn acquire(
        &self,
        connection: &mut ConnectionManager,
        name: &str,
    ) -> WriterResult<LockGuard> {
        let key = Self::key(name);
        let mut waited = Duration::ZERO;
        loop {
            let acquired: bool = redis::cmd("SETNX")
                .arg(&key)
                .arg("")
                .query_async(connection)
                .await
                .map_err(Error::from)?;
            if acquired {
                trace!(cache = name, "acquired cache lock");
                return Ok(LockGuard { key });
            }
            self.backoff(name, &mut waited).await?;
        }
    }

    /// Delete the sentinel named by `guard`.
    pub(crate) async fn release(
        &self,
        connection: &mut ConnectionManager,
        guard: LockGuard,
    ) -> WriterResult<()> {
        redis::cmd("DEL")
            .arg(&guard.key)
            .query_async::<()>(connection)
            .await
            .map_err(Error::from)?;
        trace!(key = %guard.key, "released cache lock");
        Ok(())
    }

    async fn backoff(&self, name: &str, waited: &mut Duration) -> WriterResult<()> {
        if let Some(max_wait) = self.max_wait {
            if *waited >= max_wait {
                warn!(
                    cache = name,
                    waited_ms = waited.as_millis() as u64,
                    "gave up waiting for cache lock"
                );
                return Err(WriterError::LockTimeout {
                    name: name.to_owned(),
                    waited_ms: waited.as_millis() as u64,
                });
            }
        }
        trace!(cache = name, "cache locked, sleeping");
        sleep(self.sleep).await;
        *waited += self.sleep;
        Ok(())
    }
}

/// Proof of a successful acquire; consumed on release.
#[must_use]
pub(crate) struct LockGuard {
    key: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_key_shape() {
        assert_eq!(CacheLock::key("orders"), "orders~lock");
    }

    #[test]
    fn zero_sleep_disables_locking() {
        assert!(!CacheLock::new(Duration::ZERO, None).is_enabled());
        assert!(CacheLock::new(Duration::from_millis(50), None).is_enabled());
    }

    #[tokio::test]
    async fn bounded_wait_times_out() {
        let lock = CacheLock::new(Duration::from_millis(10), Some(Duration::from_millis(25)));
        let mut waited = Duration::from_millis(30);
        let error = lock.backoff("orders", &mut waited).await.unwrap_err();
        match error {
            WriterError::LockTimeout { name, waited_ms } => {
                assert_eq!(name, "orders");
                assert_eq!(waited_ms, 30);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unbounded_wait_keeps_polling() {
        let lock = CacheLock::new(Duration::from_millis(1), None);
        let mut waited = Duration::from_secs(3600);
        lock.backoff("orders", &mut waited).await.unwrap();
        assert_eq!(waited, Duration::from_secs(3600) + Duration::from_millis(1));
    }
}
