//! Builders and fake transports shared by the unit tests.

use std::sync::{Arc, Mutex};

use crate::http::{Fetch, FetchError, HttpRequest, HttpResponse};
use crate::store::{
    AuthProfile, CodexOAuthCredentials, CopilotCredentials, ProfileCredentials, Provider,
};

pub const LONG_AGO: &str = "2026-01-01T00:00:00.000Z";

pub fn codex_profile(id: &str, email: &str, plan: Option<&str>) -> AuthProfile {
    AuthProfile {
        id: id.to_string(),
        provider: Provider::Codex,
        email: email.to_string(),
        plan_type: plan.map(str::to_string),
        note: None,
        created_at: LONG_AGO.to_string(),
        updated_at: LONG_AGO.to_string(),
        credentials: ProfileCredentials::CodexOauth(CodexOAuthCredentials {
            access_token: format!("at-{}", id),
            refresh_token: format!("rt-{}", id),
            id_token: None,
            account_id: Some(format!("acct-{}", id)),
            expires_at: None,
            last_refresh: None,
        }),
    }
}

pub fn copilot_profile(id: &str, email: &str, plan: Option<&str>) -> AuthProfile {
    AuthProfile {
        id: id.to_string(),
        provider: Provider::Copilot,
        email: email.to_string(),
        plan_type: plan.map(str::to_string),
        note: None,
        created_at: LONG_AGO.to_string(),
        updated_at: LONG_AGO.to_string(),
        credentials: ProfileCredentials::CopilotToken(CopilotCredentials {
            github_token: format!("gho-{}", id),
            copilot_token: None,
            copilot_token_expires_at: None,
            copilot_api_base_url: None,
        }),
    }
}

pub fn set_codex_expiry(profile: &mut AuthProfile, expires_at: Option<i64>) {
    if let ProfileCredentials::CodexOauth(credentials) = &mut profile.credentials {
        credentials.expires_at = expires_at;
    }
}

pub type RecordedRequests = Arc<Mutex<Vec<HttpRequest>>>;

/// Fetch closure that records every request and answers via `respond`.
pub fn recording_fetch<F>(respond: F) -> (Fetch, RecordedRequests)
where
    F: Fn(&HttpRequest) -> Result<HttpResponse, FetchError> + Send + Sync + 'static,
{
    let calls: RecordedRequests = Arc::new(Mutex::new(Vec::new()));
    let calls_ref = Arc::clone(&calls);
    let fetch: Fetch = Arc::new(move |request: &HttpRequest| {
        calls_ref
            .lock()
            .expect("lock recorded requests")
            .push(request.clone());
        respond(request)
    });
    (fetch, calls)
}

pub fn urls(calls: &RecordedRequests) -> Vec<String> {
    calls
        .lock()
        .expect("lock recorded requests")
        .iter()
        .map(|request| request.url.clone())
        .collect()
}
