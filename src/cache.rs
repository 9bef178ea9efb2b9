//! Result Cache
//!
//! Memoizes successful TAP executions keyed by a fingerprint of the
//! normalized query text. Entries live in an in-process map and are mirrored
//! to one JSON file per fingerprint so a restarted process can reuse them.
//!
//! Both tiers sit behind a single mutex: a lookup never interleaves with a
//! store or a `clear()`, and files are written through a temp file + rename so
//! a half-written entry is never visible.

use crate::config::DEFAULT_CACHE_TTL_SECS;
use crate::error::Result;
use crate::execution::result::ExecutionResult;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

/// Longest time-to-live accepted; larger values are clamped
const MAX_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    key: String,
    payload: ExecutionResult,
    expires_at: DateTime<Utc>,
    query: String,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub memory_entries: usize,
    pub file_entries: usize,
    pub cache_dir: Option<PathBuf>,
}

pub struct ResultCache {
    dir: Option<PathBuf>,
    default_ttl_secs: u64,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ResultCache {
    /// Cache persisted under `dir` (created on first store)
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            default_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Volatile-only cache, nothing touches the filesystem
    pub fn in_memory() -> Self {
        Self {
            dir: None,
            default_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_default_ttl(mut self, ttl_secs: u64) -> Self {
        self.default_ttl_secs = ttl_secs;
        self
    }

    pub fn default_ttl_secs(&self) -> u64 {
        self.default_ttl_secs
    }

    /// Lowercased, whitespace-collapsed query text hashed with SHA-256
    pub fn fingerprint(query: &str) -> String {
        let normalized = query.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ");
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn lookup(&self, query: &str) -> Option<ExecutionResult> {
        let key = Self::fingerprint(query);
        let now = Utc::now();
        let mut entries = self.lock();

        if let Some(entry) = entries.get(&key) {
            if !entry.is_expired(now) {
                debug!("Cache hit (memory) for {}", key);
                return Some(served_from_cache(entry.payload.clone()));
            }
            entries.remove(&key);
        }

        let path = self.entry_path(&key)?;
        if !path.exists() {
            return None;
        }

        match read_entry(&path) {
            Ok(entry) if !entry.is_expired(now) => {
                debug!("Cache hit (file) for {}", key);
                let result = served_from_cache(entry.payload.clone());
                entries.insert(key, entry);
                Some(result)
            }
            Ok(_) => {
                remove_quietly(&path);
                None
            }
            Err(e) => {
                warn!("Discarding unreadable cache file {}: {}", path.display(), e);
                remove_quietly(&path);
                None
            }
        }
    }

    pub fn store(&self, query: &str, result: &ExecutionResult, ttl_secs: u64) {
        let key = Self::fingerprint(query);
        let mut payload = result.clone();
        payload.served_from_cache = false;

        let entry = CacheEntry {
            key: key.clone(),
            payload,
            expires_at: Utc::now() + Duration::seconds(ttl_secs.min(MAX_TTL_SECS) as i64),
            query: query.to_string(),
        };

        let mut entries = self.lock();
        if let Some(path) = self.entry_path(&key) {
            if let Err(e) = write_entry(&path, &entry) {
                warn!("Cache file write failed for {}: {}", path.display(), e);
            }
        }
        entries.insert(key, entry);
    }

    /// Store with the cache's default time-to-live
    pub fn store_default(&self, query: &str, result: &ExecutionResult) {
        self.store(query, result, self.default_ttl_secs);
    }

    pub fn clear(&self) {
        let mut entries = self.lock();
        entries.clear();

        if let Some(dir) = &self.dir {
            for path in entry_files(dir) {
                remove_quietly(&path);
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.lock();
        CacheStats {
            memory_entries: entries.len(),
            file_entries: self.dir.as_deref().map(|d| entry_files(d).len()).unwrap_or(0),
            cache_dir: self.dir.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn entry_path(&self, key: &str) -> Option<PathBuf> {
        self.dir.as_ref().map(|d| d.join(format!("{}.json", key)))
    }
}

fn served_from_cache(mut result: ExecutionResult) -> ExecutionResult {
    result.served_from_cache = true;
    result
}

fn read_entry(path: &Path) -> Result<CacheEntry> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn write_entry(path: &Path, entry: &CacheEntry) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_vec(entry)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Files in `dir` named `<fingerprint>.json`; anything else is left alone
fn entry_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(listing) = fs::read_dir(dir) else {
        return Vec::new();
    };
    listing
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
        .filter(|p| p.file_stem().and_then(|s| s.to_str()).is_some_and(is_fingerprint))
        .collect()
}

fn is_fingerprint(name: &str) -> bool {
    name.len() == 64 && name.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        debug!("Could not remove {}: {}", path.display(), e);
    }
}
