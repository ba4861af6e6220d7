//! The invalidation payload exchanged over the sync channel.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::format::FormatError;

/// Notice that a cache mutated, published after every successful store
/// mutation.
///
/// Receivers use it to drop the matching L1 entry so their next lookup
/// falls through to the shared store. The payload is self-contained
/// JSON; a listener decodes it without any in-process object identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMessage {
    /// Name of the mutated cache.
    pub name: SmolStr,
    /// Physical key of the mutated entry; `None` means every entry of
    /// the cache must be dropped.
    pub key: Option<String>,
    /// Identity of the process that published the message, used by
    /// receivers to skip their own broadcasts.
    pub origin: String,
}

impl SyncMessage {
    /// Build a message originating from this process.
    pub fn new(name: impl Into<SmolStr>, key: Option<String>, origin: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key,
            origin: origin.into(),
        }
    }

    /// Serialize for publication on the sync channel.
    pub fn encode(&self) -> Result<Bytes, FormatError> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(|e| FormatError::Serialize(Box::new(e)))
    }

    /// Decode a payload received from the sync channel.
    pub fn decode(payload: &[u8]) -> Result<Self, FormatError> {
        serde_json::from_slice(payload).map_err(|e| FormatError::Deserialize(Box::new(e)))
    }
}
