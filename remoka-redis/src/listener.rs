//! Sync-channel subscription runtime.
//!
//! One task holds a dedicated pub/sub connection and forwards every
//! payload into a queue drained by a pool of worker tasks, sized
//! independently of request-handling concurrency: slow invalidation
//! processing cannot starve foreground cache operations, and a slow
//! foreground operation cannot block message delivery.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use redis::Client;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use remoka::SyncMessageHandler;

/// Delay before re-subscribing after the pub/sub stream ends or errors.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Payloads buffered between the subscription task and the workers.
const QUEUE_CAPACITY: usize = 1024;

/// Handles for a running sync subscription.
pub struct SyncSubscription {
    subscription: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
}

impl SyncSubscription {
    /// Stop the subscription loop and its workers.
    pub fn shutdown(self) {
        self.subscription.abort();
        for worker in self.workers {
            worker.abort();
        }
    }
}

/// Subscribe to `channel` and feed every payload to `handler` on a
/// pool of `workers` tasks.
///
/// The subscription task opens its own pub/sub connection and
/// re-subscribes after a fixed delay whenever the stream ends, so a
/// bounced Redis does not permanently silence invalidations. Messages
/// published while disconnected are lost — delivery is best-effort by
/// design.
pub fn spawn_sync_subscription(
    client: Client,
    channel: impl Into<String>,
    handler: Arc<SyncMessageHandler>,
    workers: usize,
) -> SyncSubscription {
    let channel = channel.into();
    let (tx, rx) = mpsc::channel::<Vec<u8>>(QUEUE_CAPACITY);
    let rx = Arc::new(Mutex::new(rx));

    let worker_handles = (0..workers.max(1))
        .map(|id| {
            let rx = rx.clone();
            let handler = handler.clone();
            tokio::spawn(async move {
                loop {
                    let payload = rx.lock().await.recv().await;
                    match payload {
                        Some(payload) => handler.handle(&payload).await,
                        None => break,
                    }
                }
                debug!(worker = id, "sync worker stopped");
            })
        })
        .collect();

    let subscription = tokio::spawn(async move {
        loop {
            match subscribe_once(&client, &channel, &tx).await {
                Ok(()) => warn!(channel = %channel, "sync subscription stream ended"),
                Err(error) => error!(channel = %channel, %error, "sync subscription failed"),
            }
            if tx.is_closed() {
                break;
            }
            sleep(RECONNECT_DELAY).await;
        }
    });

    SyncSubscription {
        subscription,
        workers: worker_handles,
    }
}

async fn subscribe_once(
    client: &Client,
    channel: &str,
    tx: &mpsc::Sender<Vec<u8>>,
) -> Result<(), redis::RedisError> {
    let mut pubsub = client.get_async_pubsub().await?;
    pubsub.subscribe(channel).await?;
    info!(channel, "listening for sync messages");
    let mut stream = pubsub.on_message();
    while let Some(message) = stream.next().await {
        let payload = message.get_payload_bytes().to_vec();
        if tx.send(payload).await.is_err() {
            break;
        }
    }
    Ok(())
}
