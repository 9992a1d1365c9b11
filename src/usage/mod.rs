//! Usage rows, the adapter contract and the collection pipeline.

mod collect;
mod types;

pub use collect::{CollectOptions, UsageCollector};
pub use types::{CodexUsageRow, CopilotMetricLabel, CopilotUsageMetric, CopilotUsageRow, UsageRow};

use crate::http::{Fetch, FetchError};
use crate::store::AuthProfile;

/// Per-profile failure, recorded in the row's `error` field rather than
/// aborting the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum UsageError {
    #[error("timeout")]
    Timeout,
    #[error("cancelled")]
    Cancelled,
    #[error("http_{0}")]
    Http(u16),
    #[error("network_error")]
    Network,
    #[error("malformed_payload")]
    MalformedPayload,
    #[error("refresh_failed")]
    RefreshFailed,
    #[error("invalid_credentials")]
    InvalidCredentials,
}

impl From<FetchError> for UsageError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Timeout => UsageError::Timeout,
            FetchError::Cancelled => UsageError::Cancelled,
            FetchError::Network(message) => {
                tracing::debug!(error = %message, "usage request failed");
                UsageError::Network
            }
        }
    }
}

pub struct CollectContext {
    /// Already bounded by the per-request timeout.
    pub fetch: Fetch,
    pub timeout_ms: u64,
    pub now_ms: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdapterOutput {
    pub row: UsageRow,
    /// Set when the adapter refreshed credentials that must be written back.
    pub updated_profile: Option<AuthProfile>,
}

pub trait UsageAdapter: Send + Sync {
    fn can_collect(&self, profile: &AuthProfile) -> bool;
    fn collect(&self, profile: &AuthProfile, ctx: &CollectContext) -> AdapterOutput;
}

/// Plan type as persisted on a profile: trimmed, lowercased, and absent when
/// empty or `unknown`.
pub fn normalize_persisted_plan(raw: &str) -> Option<String> {
    let normalized = raw.trim().to_lowercase();
    if normalized.is_empty() || normalized == "unknown" {
        None
    } else {
        Some(normalized)
    }
}
