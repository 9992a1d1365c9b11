use std::path::PathBuf;

use thiserror::Error;

use crate::store::Provider;

/// A stored profile offered back to the caller when a selector matches more than one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateHint {
    pub id: String,
    pub plan_type: Option<String>,
}

impl std::fmt::Display for CandidateHint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.plan_type {
            Some(plan) => write!(f, "{} ({})", self.id, plan),
            None => write!(f, "{}", self.id),
        }
    }
}

fn format_candidates(candidates: &[CandidateHint]) -> String {
    candidates
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("store busy: could not lock {} after {attempts} attempts", path.display())]
    StoreBusy { path: PathBuf, attempts: u32 },

    #[error("no matching {provider} profile found")]
    ProfileNotFound { provider: Provider },

    #[error("profile not found: {id}")]
    UnknownProfile { id: String },

    #[error("no {provider} profiles found")]
    NoProfiles { provider: Provider },

    #[error("ambiguous {provider} selector. Candidates: {}", format_candidates(candidates))]
    AmbiguousSelector {
        provider: Provider,
        candidates: Vec<CandidateHint>,
    },

    #[error("{provider} token refresh failed; please log in again")]
    RefreshFailed { provider: Provider },

    #[error("profile {id} carries credentials that do not match provider {provider}")]
    InvalidCredentials { id: String, provider: Provider },

    #[error("{0}")]
    Selection(String),

    #[error("{0}")]
    Usage(String),

    #[error("{context} {}: {source}", path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode {what}: {source}")]
    Encode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0}")]
    Http(String),
}

impl Error {
    pub fn io(context: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            context,
            path: path.into(),
            source,
        }
    }

    /// Process exit code for the CLI. Argument and selector mistakes exit with 2.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Usage(_) => 2,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
