//! TTL cache of usage rows, stored next to the profile store.
//!
//! Entries carry an absolute expiry and are never swept; an expired entry is
//! simply ignored until the next successful write replaces it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::fsutil::{load_json_value, save_json, FileLock, LockRetry};
use crate::store::Provider;
use crate::usage::UsageRow;

pub const CACHE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageCacheEntry {
    pub provider: Provider,
    pub profile_id: String,
    pub expires_at_ms: i64,
    pub row: UsageRow,
}

impl UsageCacheEntry {
    pub fn is_valid_at(&self, now_ms: i64) -> bool {
        now_ms < self.expires_at_ms
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageCacheData {
    pub version: u32,
    pub entries: BTreeMap<String, UsageCacheEntry>,
}

impl Default for UsageCacheData {
    fn default() -> Self {
        Self {
            version: CACHE_VERSION,
            entries: BTreeMap::new(),
        }
    }
}

impl UsageCacheData {
    /// Entry for the profile if one exists and has not expired.
    pub fn fresh_entry(&self, provider: Provider, profile_id: &str, now_ms: i64) -> Option<&UsageCacheEntry> {
        self.entries
            .get(&cache_key(provider, profile_id))
            .filter(|entry| entry.is_valid_at(now_ms))
    }

    pub fn insert(&mut self, entry: UsageCacheEntry) {
        self.entries
            .insert(cache_key(entry.provider, &entry.profile_id), entry);
    }
}

pub fn cache_key(provider: Provider, profile_id: &str) -> String {
    format!("{}:{}", provider, profile_id)
}

/// Builds cache data from whatever JSON was found on disk.
///
/// Field defaults: anything but an object yields an empty cache; `version` is
/// always rewritten as `CACHE_VERSION`; `entries` must be an object and
/// entries that fail to decode are dropped.
pub fn coerce_cache(value: Option<Value>) -> UsageCacheData {
    let Some(Value::Object(raw)) = value else {
        return UsageCacheData::default();
    };
    let mut data = UsageCacheData::default();
    if let Some(Value::Object(entries)) = raw.get("entries") {
        for (key, entry) in entries {
            match serde_json::from_value::<UsageCacheEntry>(entry.clone()) {
                Ok(entry) => {
                    data.entries.insert(key.clone(), entry);
                }
                Err(err) => tracing::debug!(key = %key, error = %err, "dropping malformed cache entry"),
            }
        }
    }
    data
}

#[derive(Debug, Clone)]
pub struct UsageCache {
    path: PathBuf,
    lock_retry: LockRetry,
}

impl UsageCache {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock_retry: LockRetry::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> UsageCacheData {
        coerce_cache(load_json_value(&self.path))
    }

    pub fn update_with_lock<F>(&self, mutator: F) -> Result<UsageCacheData>
    where
        F: FnOnce(&mut UsageCacheData),
    {
        let _lock = FileLock::acquire(&self.path, self.lock_retry)?;
        let mut fresh = self.read();
        mutator(&mut fresh);
        save_json(&self.path, "usage cache", &fresh)?;
        Ok(fresh)
    }
}
