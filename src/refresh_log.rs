//! JSON-lines audit trail of Codex token refreshes, one record per attempt.
//!
//! Tokens only ever appear as fingerprints. Appending is best effort: a
//! failed write is traced and never fails the refresh it describes.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::clock::iso_from_ms;
use crate::fsutil::set_private_permissions;

const LOG_FILE_NAME: &str = "refresh.log";
const MAX_LOG_BYTES: u64 = 5 * 1024 * 1024;
const FINGERPRINT_BYTES: usize = 8;

/// Leading bytes of a token's SHA-256, hex encoded. Enough to tell two
/// grants apart in the log without making either recoverable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(token: &str) -> Option<Self> {
        let token = token.trim();
        if token.is_empty() {
            return None;
        }
        let digest = Sha256::digest(token.as_bytes());
        Some(Self(hex::encode(&digest[..FINGERPRINT_BYTES])))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshReason {
    /// Expiry (minus buffer) passed before the request.
    Stale,
    /// The usage endpoint answered 401.
    Unauthorized,
}

impl fmt::Display for RefreshReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RefreshReason::Stale => "stale",
            RefreshReason::Unauthorized => "unauthorized",
        })
    }
}

/// How a refresh-token grant ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Refreshed {
        access_token_fp: Option<Fingerprint>,
        refresh_token_rotated: bool,
        expires_at: Option<String>,
    },
    /// Token endpoint answered with a non-2xx status.
    Rejected { status: u16 },
    /// The request never produced a response.
    Unreachable { detail: String },
    /// 2xx without a usable `access_token`.
    MalformedGrant,
}

impl AttemptOutcome {
    pub fn refreshed(access_token: &str, refresh_token_rotated: bool, expires_at_ms: Option<i64>) -> Self {
        AttemptOutcome::Refreshed {
            access_token_fp: Fingerprint::of(access_token),
            refresh_token_rotated,
            expires_at: expires_at_ms.map(iso_from_ms),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Refreshed { .. })
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptOutcome::Refreshed { .. } => f.write_str("refreshed"),
            AttemptOutcome::Rejected { status } => write!(f, "status {}", status),
            AttemptOutcome::Unreachable { detail } => f.write_str(detail),
            AttemptOutcome::MalformedGrant => f.write_str("response missing access_token"),
        }
    }
}

/// One line of the audit log.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshAttempt<'a> {
    pub at: String,
    pub profile_id: &'a str,
    pub reason: RefreshReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token_fp: Option<Fingerprint>,
    pub elapsed_ms: u64,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone)]
pub struct RefreshLog {
    path: PathBuf,
    max_bytes: u64,
}

impl RefreshLog {
    pub fn new(log_dir: PathBuf) -> Self {
        Self {
            path: log_dir.join(LOG_FILE_NAME),
            max_bytes: MAX_LOG_BYTES,
        }
    }

    #[cfg(test)]
    fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn log_file(&self) -> &Path {
        &self.path
    }

    /// The single previous generation kept after rotation.
    pub fn rotated_file(&self) -> PathBuf {
        self.path.with_extension("log.1")
    }

    pub fn record(&self, attempt: &RefreshAttempt<'_>) {
        if let Err(err) = self.append(attempt) {
            tracing::warn!(log = %self.path.display(), error = %err, "refresh audit append failed");
        }
    }

    fn append(&self, attempt: &RefreshAttempt<'_>) -> io::Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let oversized = fs::metadata(&self.path).is_ok_and(|meta| meta.len() > self.max_bytes);
        if oversized {
            // rename replaces an existing rotated file
            fs::rename(&self.path, self.rotated_file())?;
        }

        let mut line = serde_json::to_vec(attempt)?;
        line.push(b'\n');
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        set_private_permissions(&self.path);
        file.write_all(&line)
    }
}
