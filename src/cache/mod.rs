//! Cache layer for aggregated district summaries
//!
//! The cache is advisory: the request handler treats any failure here as a
//! miss. Entries expire only by TTL; there is no explicit invalidation. Two
//! backends are provided: a disk cache that survives restarts and an
//! in-process map for single-run use.

mod manager;
mod memory;

pub use manager::CacheManager;
pub use memory::MemoryCache;

use std::time::Duration;

use thiserror::Error;

/// Time-to-live of a summary cache entry (12 hours)
pub const SUMMARY_TTL: Duration = Duration::from_secs(43_200);

/// Errors that can occur when reading or writing the cache
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache entry could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid cache TTL: {0}")]
    InvalidTtl(String),

    #[error("cache lock poisoned")]
    Poisoned,
}

/// A string key-value store with expiry
pub trait CacheStore: Send + Sync {
    /// Returns the stored value, or `None` if absent or expired
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Stores a value that expires after `ttl`; overwrites any existing entry
    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;
}

impl<T: CacheStore + ?Sized> CacheStore for Box<T> {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        (**self).set(key, value, ttl)
    }
}

/// Absolute expiry for an entry written now
fn expiry(ttl: Duration) -> Result<chrono::DateTime<chrono::Utc>, CacheError> {
    let ttl = chrono::Duration::from_std(ttl).map_err(|e| CacheError::InvalidTtl(e.to_string()))?;
    chrono::Utc::now()
        .checked_add_signed(ttl)
        .ok_or_else(|| CacheError::InvalidTtl("expiry out of range".to_string()))
}
