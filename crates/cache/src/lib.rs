//! File-backed response cache.
//!
//! Each entry is one JSON file named after the SHA-256 of the canonical form
//! of the request (object keys sorted recursively), so two requests that only
//! differ in key order share an entry. Entries expire `expiry_days` after they
//! were written; expiry is checked when an entry is read.
//!
//! There is no locking. Concurrent writers race at the file level and a
//! corrupt or half-written file reads as a miss.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

const SECS_PER_DAY: f64 = 86_400.0;

/// Cache errors.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// On-disk form of one cache entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Unix time of the write, in seconds
    pub timestamp: f64,
    pub request: Value,
    pub response: Value,
}

/// Content-addressed request/response store in a single directory.
#[derive(Debug, Clone)]
pub struct ResponseCache {
    dir: PathBuf,
    expiry_days: u64,
}

/// Rebuild `value` with every object's keys in sorted order.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key.as_str()]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Hex SHA-256 of the canonical JSON text of `request`.
pub fn cache_key(request: &Value) -> String {
    let canonical = canonicalize(request).to_string();
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

fn unix_now() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

impl ResponseCache {
    /// Create a cache rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>, expiry_days: u64) -> Self {
        Self {
            dir: dir.into(),
            expiry_days,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn expiry_days(&self) -> u64 {
        self.expiry_days
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn is_expired(&self, entry: &CacheEntry, now: f64) -> bool {
        now - entry.timestamp > self.expiry_days as f64 * SECS_PER_DAY
    }

    /// Look up the stored response for `request`.
    ///
    /// Missing, unreadable, and expired entries are all misses; an expired
    /// entry is deleted.
    pub fn get(&self, request: &Value) -> Option<Value> {
        let key = cache_key(request);
        let path = self.entry_path(&key);
        let content = std::fs::read_to_string(&path).ok()?;

        let entry: CacheEntry = match serde_json::from_str(&content) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = %key, error = %e, "Unreadable cache entry, treating as miss");
                return None;
            }
        };

        if self.is_expired(&entry, unix_now()) {
            debug!(key = %key, "Cache entry expired");
            if let Err(e) = std::fs::remove_file(&path) {
                warn!(key = %key, error = %e, "Failed to remove expired cache entry");
            }
            return None;
        }

        debug!(key = %key, "Cache hit");
        Some(entry.response)
    }

    /// Store `response` for `request`, overwriting any previous entry.
    pub fn set(&self, request: &Value, response: &Value) -> Result<(), CacheError> {
        let entry = CacheEntry {
            timestamp: unix_now(),
            request: request.clone(),
            response: response.clone(),
        };
        self.write_entry(&cache_key(request), &entry)
    }

    fn write_entry(&self, key: &str, entry: &CacheEntry) -> Result<(), CacheError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| CacheError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let path = self.entry_path(key);
        let body = serde_json::to_string_pretty(entry)?;
        std::fs::write(&path, body).map_err(|source| CacheError::Io { path, source })?;
        debug!(key = %key, "Cache entry written");
        Ok(())
    }

    /// Remove entries whose file was last modified more than `days` ago.
    /// Returns the number removed.
    pub fn clear(&self, days: u64) -> Result<usize, CacheError> {
        let max_age = Duration::from_secs(days.saturating_mul(SECS_PER_DAY as u64));
        let now = SystemTime::now();
        let removed = self.remove_entries(|path| {
            std::fs::metadata(path)
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .is_some_and(|age| age > max_age)
        })?;
        info!(removed, days, "Cleared old cache entries");
        Ok(removed)
    }

    /// Remove every entry. Returns the number removed.
    pub fn clear_all(&self) -> Result<usize, CacheError> {
        let removed = self.remove_entries(|_| true)?;
        info!(removed, "Cleared cache");
        Ok(removed)
    }

    fn remove_entries(&self, mut should_remove: impl FnMut(&Path) -> bool) -> Result<usize, CacheError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(source) => {
                return Err(CacheError::Io {
                    path: self.dir.clone(),
                    source,
                });
            }
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") || !should_remove(&path) {
                continue;
            }
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove cache entry"),
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> Value {
        json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "hi"}],
            "temperature": 0.7
        })
    }

    #[test]
    fn key_ignores_object_key_order() {
        let a = json!({"model": "m", "params": {"a": 1, "b": [{"y": 2, "x": 1}]}});
        let b = json!({"params": {"b": [{"x": 1, "y": 2}], "a": 1}, "model": "m"});
        assert_eq!(cache_key(&a), cache_key(&b));
        assert_eq!(cache_key(&a).len(), 64);
        assert_ne!(cache_key(&a), cache_key(&json!({"model": "n"})));
    }

    #[test]
    fn set_then_get_returns_response() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::new(dir.path().join("cache"), 7);
        let response = json!({"choices": [{"message": {"content": "hello"}}]});

        assert!(cache.get(&request()).is_none());
        cache.set(&request(), &response).unwrap();
        assert_eq!(cache.get(&request()), Some(response));

        let file = dir.path().join("cache").join(format!("{}.json", cache_key(&request())));
        let stored: CacheEntry = serde_json::from_str(&std::fs::read_to_string(file).unwrap()).unwrap();
        assert_eq!(stored.request, request());
    }

    #[test]
    fn expired_entry_is_a_miss_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::new(dir.path(), 7);
        let key = cache_key(&request());
        let entry = CacheEntry {
            timestamp: unix_now() - 8.0 * SECS_PER_DAY,
            request: request(),
            response: json!("stale"),
        };
        cache.write_entry(&key, &entry).unwrap();
        assert!(cache.entry_path(&key).exists());

        assert!(cache.get(&request()).is_none());
        assert!(!cache.entry_path(&key).exists());
    }

    #[test]
    fn entry_within_expiry_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::new(dir.path(), 7);
        let entry = CacheEntry {
            timestamp: unix_now() - 6.0 * SECS_PER_DAY,
            request: request(),
            response: json!("fresh"),
        };
        cache.write_entry(&cache_key(&request()), &entry).unwrap();
        assert_eq!(cache.get(&request()), Some(json!("fresh")));
    }

    #[test]
    fn corrupt_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::new(dir.path(), 7);
        std::fs::write(cache.entry_path(&cache_key(&request())), "{not json").unwrap();
        assert!(cache.get(&request()).is_none());
    }

    #[test]
    fn clear_all_counts_only_json_files() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::new(dir.path(), 7);
        cache.set(&json!({"n": 1}), &json!(1)).unwrap();
        cache.set(&json!({"n": 2}), &json!(2)).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "keep me").unwrap();

        assert_eq!(cache.clear_all().unwrap(), 2);
        assert!(dir.path().join("notes.txt").exists());
        assert!(cache.get(&json!({"n": 1})).is_none());
    }

    #[test]
    fn clear_by_age_keeps_recent_entries() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::new(dir.path(), 7);
        cache.set(&request(), &json!("recent")).unwrap();
        assert_eq!(cache.clear(1).unwrap(), 0);
        assert_eq!(cache.get(&request()), Some(json!("recent")));
    }

    #[test]
    fn clearing_missing_directory_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::new(dir.path().join("never-created"), 7);
        assert_eq!(cache.clear_all().unwrap(), 0);
        assert_eq!(cache.clear(3).unwrap(), 0);
    }
}
