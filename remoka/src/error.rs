//! Error types for cache operations and configuration.

use smol_str::SmolStr;
use thiserror::Error;

use crate::format::FormatError;
use crate::writer::WriterError;

/// Error type for named-cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A null value was stored into a cache configured to reject them.
    ///
    /// Nothing reaches the store or the sync channel when this is
    /// returned.
    #[error("cache '{name}' does not allow null values")]
    NullValueRejected {
        /// Name of the offending cache.
        name: SmolStr,
    },

    /// The loader passed to [`get_with`](crate::RemokaCache::get_with)
    /// failed; nothing was cached.
    #[error("failed to load value for cache key '{key}'")]
    ValueRetrieval {
        /// Physical key the loader was invoked for.
        key: String,
        /// The loader's own failure.
        #[source]
        source: Box<dyn std::error::Error + Send>,
    },

    /// Shared-store or sync-channel failure.
    #[error(transparent)]
    Writer(#[from] WriterError),

    /// Value serialization failure.
    #[error(transparent)]
    Format(#[from] FormatError),
}

/// Fatal configuration error, surfaced at cache-creation time.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A duration token ended in an unknown unit suffix.
    #[error("invalid duration '{token}' for '{context}': must end with one of [dDhHmMsS]")]
    InvalidDurationUnit {
        /// Cache name or property the token came from.
        context: SmolStr,
        /// The offending token.
        token: String,
    },

    /// A duration token's amount was not an integer.
    #[error("invalid duration '{token}' for '{context}': amount must be an integer")]
    InvalidDurationAmount {
        /// Cache name or property the token came from.
        context: SmolStr,
        /// The offending token.
        token: String,
    },

    /// An entry of a local-cache spec string could not be parsed.
    #[error("invalid local cache spec entry '{token}'")]
    InvalidLocalSpec {
        /// The offending `key=value` entry.
        token: String,
    },
}
