//! Error types for the Redis cache writer.

use redis::RedisError;
use remoka::WriterError;

/// Error type for Redis writer operations.
///
/// Wraps errors from the underlying [`redis`] crate; converted into
/// [`WriterError`] before leaving the crate so callers handle one
/// store-error type regardless of backend.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An error from the underlying Redis client: connection failures,
    /// protocol errors, command execution errors.
    #[error("redis cache writer error: {0}")]
    Redis(#[from] RedisError),
}

impl From<Error> for WriterError {
    fn from(error: Error) -> Self {
        let is_io = match &error {
            Error::Redis(redis) => redis.is_io_error(),
        };
        if is_io {
            WriterError::Connection(Box::new(error))
        } else {
            WriterError::Internal(Box::new(error))
        }
    }
}
