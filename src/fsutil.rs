use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use fs2::FileExt;
use serde_json::Value;
use tempfile::NamedTempFile;

use crate::error::{Error, Result};

/// Backoff schedule for acquiring an advisory lock held by another process.
#[derive(Debug, Clone, Copy)]
pub struct LockRetry {
    pub retries: u32,
    pub factor: f64,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for LockRetry {
    fn default() -> Self {
        Self {
            retries: 5,
            factor: 1.3,
            min_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(300),
        }
    }
}

impl LockRetry {
    fn delay(&self, attempt: u32) -> Duration {
        let millis = self.min_delay.as_millis() as f64 * self.factor.powi(attempt as i32);
        Duration::from_millis(millis.round() as u64).min(self.max_delay)
    }
}

/// Exclusive lock on `<path>.lock`, released when dropped.
///
/// The data file itself is replaced by rename on every write, so the lock
/// lives on a sibling file whose inode stays stable.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    lock_path: PathBuf,
}

impl FileLock {
    pub fn acquire(path: &Path, retry: LockRetry) -> Result<Self> {
        let lock_path = lock_path_for(path);
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| Error::io("failed to create dir", parent, err))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|err| Error::io("failed to open lock file", &lock_path, err))?;
        set_private_permissions(&lock_path);

        let attempts = retry.retries + 1;
        for attempt in 0..attempts {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    tracing::trace!(lock = %lock_path.display(), attempt, "lock acquired");
                    return Ok(Self { file, lock_path });
                }
                Err(err) if err.kind() == fs2::lock_contended_error().kind() => {
                    if attempt + 1 < attempts {
                        let delay = retry.delay(attempt);
                        tracing::debug!(
                            lock = %lock_path.display(),
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "lock contended, retrying"
                        );
                        thread::sleep(delay);
                    }
                }
                Err(err) => return Err(Error::io("failed to acquire lock", &lock_path, err)),
            }
        }

        tracing::warn!(lock = %lock_path.display(), attempts, "giving up on lock");
        Err(Error::StoreBusy {
            path: path.to_path_buf(),
            attempts,
        })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(err) = self.file.unlock() {
            tracing::warn!(lock = %self.lock_path.display(), error = %err, "failed to release lock");
        }
    }
}

fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    path.with_file_name(name)
}

/// Reads a JSON document, mapping a missing or unparsable file to `None`.
pub fn load_json_value(path: &Path) -> Option<Value> {
    let data = fs::read(path).ok()?;
    match serde_json::from_slice::<Value>(&data) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "ignoring malformed JSON file");
            None
        }
    }
}

pub fn save_json<T: serde::Serialize>(path: &Path, what: &'static str, value: &T) -> Result<()> {
    let mut data =
        serde_json::to_vec_pretty(value).map_err(|source| Error::Encode { what, source })?;
    data.push(b'\n');
    write_file_atomic(path, &data)
}

/// Writes through a temp file in the same directory and renames over `path`.
pub fn write_file_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::Usage(format!("invalid target path: {}", path.display())))?;
    fs::create_dir_all(parent).map_err(|err| Error::io("failed to create dir", parent, err))?;

    let mut temp_file = NamedTempFile::new_in(parent)
        .map_err(|err| Error::io("failed to create temp file in", parent, err))?;
    temp_file
        .write_all(data)
        .map_err(|err| Error::io("failed to write temp file for", path, err))?;
    temp_file
        .as_file()
        .sync_all()
        .map_err(|err| Error::io("failed to flush temp file for", path, err))?;

    temp_file
        .persist(path)
        .map_err(|err| Error::io("failed to persist", path, err.error))?;
    set_private_permissions(path);
    Ok(())
}

pub fn set_private_permissions(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
    }
    #[cfg(not(unix))]
    let _ = path;
}
