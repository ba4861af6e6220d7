//! Full wiring of a coherent two-level cache against a local Redis.
//!
//! Run two copies of this against the same Redis and watch a `put` in
//! one process evict the matching local entry in the other:
//!
//! ```sh
//! cargo run --example two_tier
//! ```

use std::sync::Arc;
use std::time::Duration;

use remoka::{
    CacheConfig, CacheEntry, CacheRegistry, DEFAULT_SYNC_CHANNEL, MokaSpec, SyncMessageHandler,
};
use remoka_redis::{RedisCacheWriter, spawn_sync_subscription};

const REDIS_URL: &str = "redis://127.0.0.1/";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let writer = RedisCacheWriter::builder()
        .server(REDIS_URL)
        .lock_sleep(Duration::from_millis(50))
        .lock_max_wait(Duration::from_secs(10))
        .build()?;

    let registry = Arc::new(
        CacheRegistry::builder(Arc::new(writer))
            .default_config(
                CacheConfig::default()
                    .prefix_keys_with("demo")
                    .moka_spec(MokaSpec::parse("max_capacity=10000,time_to_live=5m")?),
            )
            .initial_caches(["sessions", "orders#L1m#R10m"])
            .build()?,
    );

    let handler = Arc::new(SyncMessageHandler::new(registry.clone()));
    let subscription = spawn_sync_subscription(
        redis::Client::open(REDIS_URL)?,
        DEFAULT_SYNC_CHANNEL,
        handler,
        4,
    );

    let sessions = registry.get_cache("sessions")?.ok_or("missing cache")?;

    sessions.put("user:42", Some(&"alice".to_owned())).await?;
    match sessions.lookup::<String, _>("user:42").await? {
        Some(CacheEntry::Value(name)) => println!("hit: {name}"),
        Some(CacheEntry::Null) => println!("cached null"),
        None => println!("miss"),
    }

    let profile = sessions
        .get_with("user:43", || async {
            // Stand-in for the real data source.
            Ok::<_, std::io::Error>(Some("bob".to_owned()))
        })
        .await?;
    println!("loaded: {:?}", profile.into_value());

    sessions.evict("user:42").await?;
    sessions.clear().await?;

    // Leave the subscription running for a while to observe peers.
    tokio::time::sleep(Duration::from_secs(30)).await;
    subscription.shutdown();
    Ok(())
}
