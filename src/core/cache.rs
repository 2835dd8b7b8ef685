//! Durable key/value cache with per-entry expiry.
//!
//! Every memoized decision of the host (update checks, network
//! classification, online module lists) lives here. The whole store is a
//! single JSON file; expired entries are dropped lazily when read.
//!
//! Storage failures never surface as errors. A failed write reports `false`,
//! a failed or corrupt read behaves like an empty store, and callers treat
//! absence as "recompute".

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Source of the current time in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    /// Current time in milliseconds.
    fn now_millis(&self) -> u64;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default, Clone)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a clock frozen at `start` milliseconds.
    pub fn new(start: u64) -> Self {
        Self { now: Arc::new(AtomicU64::new(start)) }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// A single cached value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Stored value.
    pub value: Value,
    /// Expiry in milliseconds since the epoch. `None` means the caller
    /// manages staleness.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

impl CacheEntry {
    fn is_expired(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Persistent cache backed by a JSON file.
pub struct CacheStore {
    path: Option<PathBuf>,
    entries: Mutex<HashMap<String, CacheEntry>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("path", &self.path)
            .field("entries", &self.entries.lock().len())
            .finish()
    }
}

impl CacheStore {
    /// Open the cache file at `path`, creating an empty store if it is
    /// missing or unreadable.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::open_with_clock(path, Arc::new(SystemClock))
    }

    /// Open with a custom clock.
    pub fn open_with_clock(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        let path = path.into();
        let entries = load_entries(&path);
        Self { path: Some(path), entries: Mutex::new(entries), clock }
    }

    /// A cache that never touches the disk.
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self { path: None, entries: Mutex::new(HashMap::new()), clock }
    }

    /// Path of the backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Get a live value. Expired entries are dropped and read as a miss.
    pub fn get(&self, key: &str) -> Option<Value> {
        let now = self.clock.now_millis();
        let mut entries = self.entries.lock();

        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                tracing::debug!(key, "cache entry expired");
                entries.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    /// Get and deserialize a live value. A value of the wrong shape reads as
    /// a miss.
    pub fn get_as<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key)?;
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::debug!(key, error = %e, "ignoring malformed cache entry");
                None
            }
        }
    }

    /// Store a value, replacing any previous entry and its expiry.
    pub fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> bool {
        let expires_at = ttl.map(|ttl| {
            let ttl = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
            self.clock.now_millis().saturating_add(ttl)
        });
        let mut entries = self.entries.lock();
        entries.insert(key.to_string(), CacheEntry { value, expires_at });
        self.persist(&entries)
    }

    /// Serialize and store a value.
    pub fn set_as<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) -> bool {
        match serde_json::to_value(value) {
            Ok(v) => self.set(key, v, ttl),
            Err(e) => {
                tracing::warn!(key, error = %e, "failed to serialize cache value");
                false
            }
        }
    }

    /// Remove an entry. Returns `false` only when persisting fails.
    pub fn remove(&self, key: &str) -> bool {
        let mut entries = self.entries.lock();
        if entries.remove(key).is_none() {
            return true;
        }
        self.persist(&entries)
    }

    /// Drop every entry.
    pub fn clear(&self) -> bool {
        let mut entries = self.entries.lock();
        entries.clear();
        self.persist(&entries)
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn persist(&self, entries: &HashMap<String, CacheEntry>) -> bool {
        let Some(path) = &self.path else {
            return true;
        };

        let content = match serde_json::to_string_pretty(entries) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize cache");
                return false;
            }
        };

        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                tracing::warn!(path = %parent.display(), error = %e, "failed to create cache dir");
                return false;
            }
        }

        match fs::write(path, content) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to write cache file");
                false
            }
        }
    }
}

fn load_entries(path: &Path) -> HashMap<String, CacheEntry> {
    let Ok(content) = fs::read_to_string(path) else {
        return HashMap::new();
    };

    serde_json::from_str(&content).unwrap_or_else(|e| {
        tracing::warn!(path = %path.display(), error = %e, "cache file is corrupt, starting empty");
        HashMap::new()
    })
}
