//! Response cache
//!
//! Short-lived memoization of idempotent read operations. Expiry is evaluated
//! lazily at `get` time; there is no background sweeper. Write operations
//! invalidate affected entries synchronously by key prefix, regardless of
//! remaining TTL.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;

use ltk_common::Error;

/// Default entry lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

/// Cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Fixed time-to-live applied to every entry
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl: DEFAULT_TTL }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    payload: Value,
    written_at: Instant,
}

/// TTL-bound cache of read responses, keyed by operation key.
#[derive(Debug)]
pub struct ResponseCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl ResponseCache {
    /// New cache with the given configuration.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl: config.ttl,
        }
    }

    /// Get the payload stored under `key`, if present and not expired.
    ///
    /// An expired entry is removed on access and reported as a miss.
    pub fn get(&self, key: &str) -> Option<Value> {
        let written_at = {
            let entries = self.entries.read();
            let entry = entries.get(key)?;
            if entry.written_at.elapsed() < self.ttl {
                return Some(entry.payload.clone());
            }
            entry.written_at
        };

        // Expired: remove lazily. Re-check under the write lock in case the
        // entry was refreshed between the two locks.
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get(key) {
            if entry.written_at == written_at {
                entries.remove(key);
            } else if entry.written_at.elapsed() < self.ttl {
                return Some(entry.payload.clone());
            }
        }
        None
    }

    /// Get and deserialize the payload stored under `key`.
    pub fn get_as<T>(&self, key: &str) -> Result<Option<T>, Error>
    where
        T: DeserializeOwned,
    {
        self.get(key)
            .map(|payload| serde_json::from_value(payload).map_err(Error::from))
            .transpose()
    }

    /// Store `payload` under `key`, overwriting any previous entry.
    pub fn set(&self, key: &str, payload: Value) {
        self.entries.write().insert(
            key.to_string(),
            CacheEntry {
                payload,
                written_at: Instant::now(),
            },
        );
    }

    /// Serialize and store a value under `key`.
    pub fn set_value<T>(&self, key: &str, value: &T) -> Result<(), Error>
    where
        T: Serialize,
    {
        self.set(key, serde_json::to_value(value)?);
        Ok(())
    }

    /// Synchronously remove every entry whose key starts with `prefix`.
    ///
    /// Called by write-kind operations for the resource families they affect.
    pub fn invalidate_prefix(&self, prefix: &str) {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        let removed = before - entries.len();
        if removed > 0 {
            tracing::debug!("Invalidated {} cache entries under `{}`", removed, prefix);
        }
    }

    /// Number of stored entries, including not-yet-collected expired ones.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
