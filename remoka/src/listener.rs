//! Receiving side of the invalidation protocol.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::message::SyncMessage;
use crate::registry::CacheRegistry;

/// Applies inbound sync messages to the local L1s.
///
/// One handler serves every cache in the registry. Failures are
/// isolated per message: an undecodable payload is logged and dropped,
/// never propagated — a bad message must not take down the subscription
/// or block the ones behind it.
pub struct SyncMessageHandler {
    registry: Arc<CacheRegistry>,
}

impl SyncMessageHandler {
    /// Build a handler over `registry`. Self-originated messages are
    /// recognized by the registry's node identity — the same one its
    /// caches publish with.
    pub fn new(registry: Arc<CacheRegistry>) -> Self {
        Self { registry }
    }

    /// Process one payload from the sync channel. Infallible by design.
    pub async fn handle(&self, payload: &[u8]) {
        let message = match SyncMessage::decode(payload) {
            Ok(message) => message,
            Err(error) => {
                warn!(%error, "dropping undecodable sync message");
                return;
            }
        };
        if message.origin == self.registry.node_id().as_str() {
            trace!(cache = %message.name, "skipping own sync message");
            return;
        }
        let Some(cache) = self.registry.peek(&message.name) else {
            trace!(cache = %message.name, "sync message for a cache this process never opened");
            return;
        };
        debug!(
            cache = %message.name,
            key = ?message.key,
            origin = %message.origin,
            "clearing local entries"
        );
        cache.clear_local(message.key.as_deref()).await;
    }
}
