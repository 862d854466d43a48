//! sitewatch-state — the key-value seam behind the dedup layer.
//!
//! # Architecture
//!
//! ```text
//! Store (trait)
//!   ├── dedup keys      `{url}:{kind}` → millisecond timestamp
//!   ├── job log         append-only JSON site payloads
//!   └── change channel  publish / subscribe JSON site payloads
//!
//! RedbStore   embedded redb file (or in-memory), in-process pub/sub hub
//! RedisStore  shared Redis instance (feature `redis-store`)
//! ```
//!
//! The scheduler never caches store contents; every dedup decision reads
//! through, so correctness does not depend on process lifetime.

pub mod error;
pub mod redb_store;
#[cfg(feature = "redis-store")]
pub mod redis_store;
pub mod store;
pub mod tables;

pub use error::{StateError, StateResult};
pub use redb_store::RedbStore;
#[cfg(feature = "redis-store")]
pub use redis_store::RedisStore;
pub use store::{CHANGES_CHANNEL, ChangeEvent, PubSubHub, Store, Subscription, dedup_key};
