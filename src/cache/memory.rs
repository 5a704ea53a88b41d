//! In-process cache with the same expiry rules as the disk cache.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::{expiry, CacheError, CacheStore};

#[derive(Debug)]
struct MemoryEntry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// A cache that lives only as long as the process
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, MemoryEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, including ones that expired since the last write
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;

        match entries.get(key) {
            Some(entry) if Utc::now() < entry.expires_at => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let entry = MemoryEntry {
            value: value.to_string(),
            expires_at: expiry(ttl)?,
        };
        let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        let now = Utc::now();
        entries.retain(|_, entry| now < entry.expires_at);
        entries.insert(key.to_string(), entry);
        Ok(())
    }
}
