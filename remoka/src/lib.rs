#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// The named-cache façade: two-level lookups, coherent mutations.
pub mod cache;

/// Cache configuration and the external property surface.
pub mod config;

/// Error types for cache operations and configuration.
pub mod error;

/// Value serialization formats.
pub mod format;

/// Receiving side of the invalidation protocol.
pub mod listener;

/// Declarative configuration for the local bounded cache.
pub mod local;

/// The invalidation payload exchanged over the sync channel.
pub mod message;

/// Process identity on the invalidation bus.
pub mod node;

/// Creation and lookup of named caches.
pub mod registry;

/// The shared-store gateway contract.
pub mod writer;

pub use cache::{CacheEntry, RemokaCache};
pub use config::{CacheConfig, DEFAULT_SYNC_CHANNEL, KeyPrefix, RemokaProperties};
pub use error::{CacheError, ConfigError};
pub use format::{FormatError, ValueFormat};
pub use listener::SyncMessageHandler;
pub use local::{Eviction, MokaSpec};
pub use message::SyncMessage;
pub use node::NodeId;
pub use registry::{CacheRegistry, CacheRegistryBuilder};
pub use writer::{CacheWriter, WriterError, WriterResult, effective_ttl};
