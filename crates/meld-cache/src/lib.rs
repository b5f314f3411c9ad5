//! # meld-cache — Offline Public-Key Cache
//!
//! Lets a constrained verifier authenticate previously-resolved chips with
//! no live network access. The cache is bounded (oldest `cachedAt` evicted
//! first), TTL'd (24 h by default), and can be snapshotted to a compact
//! array for persistent storage.

pub mod cache;
pub mod error;
pub mod storage;

pub use cache::{CacheConfig, CacheEntry, CompactEntry, OfflineKeyCache, DEFAULT_CAPACITY, DEFAULT_TTL};
pub use error::{CacheError, StorageError};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
