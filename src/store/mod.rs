mod types;

pub use types::{
    coerce_store, AuthProfile, CodexOAuthCredentials, CopilotCredentials, ProfileCredentials,
    Provider, StoreData, STORE_VERSION,
};

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::fsutil::{load_json_value, save_json, FileLock, LockRetry};

/// Profile store backed by a single JSON file guarded by an advisory lock.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
    lock_retry: LockRetry,
}

impl Store {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock_retry: LockRetry::default(),
        }
    }

    pub fn with_lock_retry(mut self, lock_retry: LockRetry) -> Self {
        self.lock_retry = lock_retry;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unlocked snapshot. Missing or malformed files read as an empty store.
    pub fn read(&self) -> StoreData {
        coerce_store(load_json_value(&self.path))
    }

    /// Read-modify-write under the store lock.
    ///
    /// The mutator always sees the on-disk state as of lock acquisition. If it
    /// fails, nothing is written and the error is returned.
    pub fn update_with_lock<F>(&self, mutator: F) -> Result<StoreData>
    where
        F: FnOnce(&mut StoreData) -> Result<()>,
    {
        let _lock = FileLock::acquire(&self.path, self.lock_retry)?;
        let mut current = self.read();
        mutator(&mut current)?;
        save_json(&self.path, "store", &current)?;
        Ok(current)
    }

    pub fn upsert_profile(&self, profile: AuthProfile) -> Result<StoreData> {
        tracing::debug!(id = %profile.id, provider = %profile.provider, "upserting profile");
        self.update_with_lock(|store| {
            store.upsert(profile);
            Ok(())
        })
    }

    /// Points `provider` at `id`. The caller checks that the profile exists.
    pub fn set_active_profile(&self, provider: Provider, id: &str) -> Result<StoreData> {
        self.update_with_lock(|store| {
            store.active.insert(provider, id.to_string());
            Ok(())
        })
    }

    /// Removes a profile and, in the same write, any active pointer naming it.
    /// Returns the removed profile and whether it was active.
    pub fn delete_profile(&self, id: &str) -> Result<(AuthProfile, bool)> {
        let mut removed = None;
        self.update_with_lock(|store| {
            let index = store
                .profiles
                .iter()
                .position(|profile| profile.id == id)
                .ok_or_else(|| Error::UnknownProfile { id: id.to_string() })?;
            let profile = store.profiles.remove(index);
            let was_active = store.active_id(profile.provider) == Some(profile.id.as_str());
            if was_active {
                store.active.remove(&profile.provider);
            }
            removed = Some((profile, was_active));
            Ok(())
        })?;
        removed.ok_or_else(|| Error::UnknownProfile { id: id.to_string() })
    }

    pub fn set_note(&self, id: &str, note: Option<String>, now_iso: &str) -> Result<AuthProfile> {
        let mut updated = None;
        self.update_with_lock(|store| {
            let profile = match store.profiles.iter_mut().find(|profile| profile.id == id) {
                Some(profile) => profile,
                None => return Err(Error::UnknownProfile { id: id.to_string() }),
            };
            profile.note = note;
            profile.updated_at = now_iso.to_string();
            updated = Some(profile.clone());
            Ok(())
        })?;
        updated.ok_or_else(|| Error::UnknownProfile { id: id.to_string() })
    }

    /// Writes back credentials and plan produced by a collection run.
    ///
    /// Only the fields a collector may change are copied onto the fresh
    /// record; a profile deleted in the meantime is not resurrected.
    pub fn merge_collected_profile(&self, collected: &AuthProfile) -> Result<bool> {
        let mut merged = false;
        self.update_with_lock(|store| {
            if let Some(existing) = store
                .profiles
                .iter_mut()
                .find(|profile| profile.id == collected.id && profile.provider == collected.provider)
            {
                existing.credentials = collected.credentials.clone();
                existing.plan_type = collected.plan_type.clone();
                existing.updated_at = collected.updated_at.clone();
                merged = true;
            }
            Ok(())
        })?;
        if !merged {
            tracing::warn!(id = %collected.id, "collected profile vanished before write-back");
        }
        Ok(merged)
    }
}
