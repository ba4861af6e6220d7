#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod error;
pub mod listener;
pub mod lock;
pub mod writer;

#[doc(inline)]
pub use crate::error::Error;
#[doc(inline)]
pub use crate::listener::{SyncSubscription, spawn_sync_subscription};
#[doc(inline)]
pub use crate::lock::CacheLock;
#[doc(inline)]
pub use crate::writer::{RedisCacheWriter, RedisCacheWriterBuilder};
