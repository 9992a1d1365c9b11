use std::time::Instant;

use serde_json::Value;

use crate::clock::{iso_from_ms, parse_iso_ms};
use crate::error::{Error, Result};
use crate::http::{Fetch, HttpRequest};
use crate::json::{value_as_f64, value_as_string};
use crate::jwt;
use crate::refresh_log::{AttemptOutcome, Fingerprint, RefreshAttempt, RefreshLog, RefreshReason};
use crate::store::{AuthProfile, ProfileCredentials, Provider};
use crate::usage::UsageError;

use super::CODEX_CLIENT_ID;

pub const DEFAULT_EXPIRY_BUFFER_MS: i64 = 5 * 60 * 1000;
pub const DEFAULT_FALLBACK_TTL_MS: i64 = 60 * 60 * 1000;

/// When the access token should be treated as expired: the explicit expiry,
/// else one fallback TTL after the last grant, else one fallback TTL after the
/// profile was last written. `None` when nothing is known.
pub fn effective_expiry_ms(profile: &AuthProfile) -> Option<i64> {
    let credentials = profile.codex_credentials()?;
    credentials
        .expires_at
        .or_else(|| {
            credentials
                .last_refresh
                .as_deref()
                .and_then(parse_iso_ms)
                .map(|ms| ms.saturating_add(DEFAULT_FALLBACK_TTL_MS))
        })
        .or_else(|| {
            profile
                .updated_at_ms()
                .map(|ms| ms.saturating_add(DEFAULT_FALLBACK_TTL_MS))
        })
}

/// Unknown expiry is never stale; a 401 on first use still triggers a refresh.
pub fn is_stale(profile: &AuthProfile, now_ms: i64, buffer_ms: i64) -> bool {
    match effective_expiry_ms(profile) {
        Some(expiry) => now_ms >= expiry.saturating_sub(buffer_ms),
        None => false,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    pub expires_in: Option<f64>,
}

impl TokenGrant {
    fn from_payload(root: &Value) -> Option<Self> {
        Some(Self {
            access_token: value_as_string(root.get("access_token"))?,
            refresh_token: value_as_string(root.get("refresh_token")),
            id_token: value_as_string(root.get("id_token")),
            expires_in: root.get("expires_in").and_then(value_as_f64),
        })
    }
}

/// The access token's own `exp` claim wins over `expires_in`. Out-of-range
/// lifetimes saturate instead of wrapping.
pub fn grant_expiry_ms(grant: &TokenGrant, now_ms: i64) -> i64 {
    if let Some(expiry) = jwt::expiry_ms(&grant.access_token) {
        return expiry;
    }
    let lifetime_ms = grant
        .expires_in
        .filter(|seconds| seconds.is_finite() && *seconds > 0.0)
        .map(|seconds| (seconds.floor() as i64).saturating_mul(1000))
        .unwrap_or(DEFAULT_FALLBACK_TTL_MS);
    now_ms.saturating_add(lifetime_ms)
}

pub fn apply_grant(profile: &AuthProfile, grant: &TokenGrant, now_ms: i64) -> AuthProfile {
    let now_iso = iso_from_ms(now_ms);
    let mut updated = profile.clone();
    if let ProfileCredentials::CodexOauth(credentials) = &mut updated.credentials {
        credentials.access_token = grant.access_token.clone();
        if let Some(refresh_token) = &grant.refresh_token {
            credentials.refresh_token = refresh_token.clone();
        }
        if let Some(id_token) = &grant.id_token {
            credentials.id_token = Some(id_token.clone());
        }
        credentials.expires_at = Some(grant_expiry_ms(grant, now_ms));
        credentials.last_refresh = Some(now_iso.clone());
    }
    updated.updated_at = now_iso;
    updated
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// Token still valid, or not a Codex profile.
    Fresh,
    Refreshed(AuthProfile),
    Failed,
}

impl RefreshOutcome {
    pub fn refreshed(&self) -> Option<&AuthProfile> {
        match self {
            RefreshOutcome::Refreshed(profile) => Some(profile),
            _ => None,
        }
    }

    /// For callers that must not continue on a stale token.
    pub fn into_required(self) -> Result<Option<AuthProfile>> {
        match self {
            RefreshOutcome::Fresh => Ok(None),
            RefreshOutcome::Refreshed(profile) => Ok(Some(profile)),
            RefreshOutcome::Failed => Err(Error::RefreshFailed {
                provider: Provider::Codex,
            }),
        }
    }
}

/// Exchanges Codex refresh tokens at the OAuth token endpoint.
#[derive(Debug, Clone)]
pub struct CodexRefresher {
    token_url: String,
    client_id: String,
    buffer_ms: i64,
    log: Option<RefreshLog>,
}

impl CodexRefresher {
    pub fn new(token_url: String) -> Self {
        Self {
            token_url,
            client_id: CODEX_CLIENT_ID.to_string(),
            buffer_ms: DEFAULT_EXPIRY_BUFFER_MS,
            log: None,
        }
    }

    pub fn with_log(mut self, log: Option<RefreshLog>) -> Self {
        self.log = log;
        self
    }

    pub fn with_buffer_ms(mut self, buffer_ms: i64) -> Self {
        self.buffer_ms = buffer_ms;
        self
    }

    /// Refreshes ahead of use when the token is stale.
    pub fn ensure_fresh(&self, profile: &AuthProfile, fetch: &Fetch, now_ms: i64) -> RefreshOutcome {
        if profile.codex_credentials().is_none() || !is_stale(profile, now_ms, self.buffer_ms) {
            return RefreshOutcome::Fresh;
        }
        tracing::debug!(id = %profile.id, "codex token stale, refreshing");
        match self.refresh(profile, fetch, now_ms, RefreshReason::Stale) {
            Ok(updated) => RefreshOutcome::Refreshed(updated),
            Err(_) => RefreshOutcome::Failed,
        }
    }

    /// One refresh-token grant. Any transport, status or payload problem
    /// reports as `RefreshFailed`.
    pub fn refresh(
        &self,
        profile: &AuthProfile,
        fetch: &Fetch,
        now_ms: i64,
        reason: RefreshReason,
    ) -> std::result::Result<AuthProfile, UsageError> {
        let credentials = profile
            .codex_credentials()
            .ok_or(UsageError::InvalidCredentials)?;
        let started = Instant::now();
        let request = HttpRequest::post_form(
            self.token_url.as_str(),
            &[
                ("client_id", self.client_id.as_str()),
                ("grant_type", "refresh_token"),
                ("refresh_token", credentials.refresh_token.as_str()),
            ],
        )
        .header("Content-Type", "application/x-www-form-urlencoded")
        .header("Accept", "application/json");

        let (outcome, updated) = match fetch(&request) {
            Err(err) => (AttemptOutcome::Unreachable { detail: err.to_string() }, None),
            Ok(response) if !response.is_success() => (
                AttemptOutcome::Rejected {
                    status: response.status,
                },
                None,
            ),
            Ok(response) => match response.json().as_ref().and_then(TokenGrant::from_payload) {
                None => (AttemptOutcome::MalformedGrant, None),
                Some(grant) => {
                    let updated = apply_grant(profile, &grant, now_ms);
                    let expires_at = updated
                        .codex_credentials()
                        .and_then(|credentials| credentials.expires_at);
                    (
                        AttemptOutcome::refreshed(
                            &grant.access_token,
                            grant.refresh_token.is_some(),
                            expires_at,
                        ),
                        Some(updated),
                    )
                }
            },
        };

        if let Some(log) = &self.log {
            log.record(&RefreshAttempt {
                at: iso_from_ms(now_ms),
                profile_id: &profile.id,
                reason,
                refresh_token_fp: Fingerprint::of(&credentials.refresh_token),
                elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                outcome: outcome.clone(),
            });
        }

        match updated {
            Some(updated) => {
                tracing::info!(id = %profile.id, %reason, "codex token refreshed");
                Ok(updated)
            }
            None => {
                tracing::warn!(id = %profile.id, %reason, detail = %outcome, "codex token refresh failed");
                Err(UsageError::RefreshFailed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{FetchError, HttpResponse};
    use crate::test_support::{codex_profile, recording_fetch, set_codex_expiry};
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    const NOW: i64 = 1_770_854_400_000;

    #[test]
    fn expiry_prefers_explicit_then_last_refresh_then_updated_at() {
        let mut profile = codex_profile("p1", "a@b.com", None);
        profile.updated_at = iso_from_ms(NOW - 10_000);
        assert_eq!(
            effective_expiry_ms(&profile),
            Some(NOW - 10_000 + DEFAULT_FALLBACK_TTL_MS)
        );

        if let ProfileCredentials::CodexOauth(credentials) = &mut profile.credentials {
            credentials.last_refresh = Some(iso_from_ms(NOW - 20_000));
        }
        assert_eq!(
            effective_expiry_ms(&profile),
            Some(NOW - 20_000 + DEFAULT_FALLBACK_TTL_MS)
        );

        set_codex_expiry(&mut profile, Some(NOW + 1));
        assert_eq!(effective_expiry_ms(&profile), Some(NOW + 1));
    }

    #[test]
    fn unknown_expiry_is_never_stale() {
        let mut profile = codex_profile("p1", "a@b.com", None);
        profile.updated_at = String::new();
        assert_eq!(effective_expiry_ms(&profile), None);
        assert!(!is_stale(&profile, i64::MAX / 2, DEFAULT_EXPIRY_BUFFER_MS));
    }

    #[test]
    fn buffer_is_subtracted_before_comparing() {
        let mut profile = codex_profile("p1", "a@b.com", None);
        set_codex_expiry(&mut profile, Some(NOW + DEFAULT_EXPIRY_BUFFER_MS));
        assert!(is_stale(&profile, NOW, DEFAULT_EXPIRY_BUFFER_MS));
        assert!(!is_stale(&profile, NOW - 1, DEFAULT_EXPIRY_BUFFER_MS));
    }

    #[test]
    fn jwt_exp_overrides_expires_in() {
        let exp_seconds = 1_900_000_000_i64;
        let grant = TokenGrant {
            access_token: jwt::encode_for_test(&json!({ "exp": exp_seconds })),
            refresh_token: None,
            id_token: None,
            expires_in: Some(60.0),
        };
        assert_eq!(grant_expiry_ms(&grant, NOW), exp_seconds * 1000);

        let opaque = TokenGrant {
            access_token: "opaque".to_string(),
            ..grant.clone()
        };
        assert_eq!(grant_expiry_ms(&opaque, NOW), NOW + 60_000);

        let bare = TokenGrant {
            expires_in: Some(0.0),
            ..opaque
        };
        assert_eq!(grant_expiry_ms(&bare, NOW), NOW + DEFAULT_FALLBACK_TTL_MS);
    }

    #[test]
    fn oversized_lifetimes_saturate() {
        let huge_expires_in = TokenGrant {
            access_token: "opaque-not-a-jwt".to_string(),
            refresh_token: None,
            id_token: None,
            expires_in: Some(1e17),
        };
        assert_eq!(grant_expiry_ms(&huge_expires_in, NOW), i64::MAX);

        let infinite = TokenGrant {
            expires_in: Some(f64::INFINITY),
            ..huge_expires_in.clone()
        };
        assert_eq!(grant_expiry_ms(&infinite, NOW), NOW + DEFAULT_FALLBACK_TTL_MS);

        let huge_exp = TokenGrant {
            access_token: jwt::encode_for_test(&json!({ "exp": 1e17 })),
            ..huge_expires_in
        };
        assert_eq!(grant_expiry_ms(&huge_exp, NOW), i64::MAX);

        let applied = apply_grant(&codex_profile("p1", "a@b.com", None), &huge_exp, NOW);
        assert!(!is_stale(&applied, NOW, DEFAULT_EXPIRY_BUFFER_MS));
    }

    #[test]
    fn stored_expiry_extremes_do_not_overflow() {
        let mut profile = codex_profile("p1", "a@b.com", None);
        set_codex_expiry(&mut profile, Some(i64::MIN));
        assert!(is_stale(&profile, NOW, DEFAULT_EXPIRY_BUFFER_MS));

        set_codex_expiry(&mut profile, Some(i64::MAX));
        assert!(!is_stale(&profile, NOW, DEFAULT_EXPIRY_BUFFER_MS));
    }

    #[test]
    fn stale_grant_from_huge_expires_in_is_refreshed_without_panicking() {
        let refresher = CodexRefresher::new("https://auth.test/oauth/token".to_string());
        let (fetch, _) = recording_fetch(|_| {
            Ok(HttpResponse::new(
                200,
                json!({ "access_token": "at-new", "expires_in": 1e17 }).to_string(),
            ))
        });
        let mut profile = codex_profile("p1", "a@b.com", None);
        set_codex_expiry(&mut profile, Some(NOW - 1));

        let outcome = refresher.ensure_fresh(&profile, &fetch, NOW);
        let updated = outcome.refreshed().expect("refreshed profile");
        assert_eq!(
            updated.codex_credentials().and_then(|credentials| credentials.expires_at),
            Some(i64::MAX)
        );
    }

    #[test]
    fn applied_grant_keeps_previous_tokens_when_not_rotated() {
        let mut profile = codex_profile("p1", "a@b.com", Some("plus"));
        if let ProfileCredentials::CodexOauth(credentials) = &mut profile.credentials {
            credentials.id_token = Some("id-before".to_string());
        }
        let grant = TokenGrant {
            access_token: "at-after".to_string(),
            refresh_token: None,
            id_token: None,
            expires_in: Some(3600.0),
        };

        let updated = apply_grant(&profile, &grant, NOW);
        let credentials = updated.codex_credentials().expect("codex credentials");
        assert_eq!(credentials.access_token, "at-after");
        assert_eq!(credentials.refresh_token, "rt-p1");
        assert_eq!(credentials.id_token.as_deref(), Some("id-before"));
        assert_eq!(credentials.expires_at, Some(NOW + 3_600_000));
        assert_eq!(credentials.last_refresh.as_deref().and_then(parse_iso_ms), Some(NOW));
        assert_eq!(updated.updated_at_ms(), Some(NOW));
        assert_eq!(updated.plan_type.as_deref(), Some("plus"));
    }

    #[test]
    fn stale_profile_is_refreshed_with_form_grant_and_audited() {
        let temp = TempDir::new().expect("temp dir");
        let log = RefreshLog::new(temp.path().join("logs"));
        let refresher = CodexRefresher::new("https://auth.test/oauth/token".to_string())
            .with_log(Some(log.clone()));
        let (fetch, calls) = recording_fetch(|_| {
            Ok(HttpResponse::new(
                200,
                json!({ "access_token": "at-new", "refresh_token": "rt-new", "expires_in": 600 })
                    .to_string(),
            ))
        });
        let mut profile = codex_profile("p1", "a@b.com", None);
        set_codex_expiry(&mut profile, Some(NOW - 1));

        let outcome = refresher.ensure_fresh(&profile, &fetch, NOW);
        let updated = outcome.refreshed().expect("refreshed profile");
        let credentials = updated.codex_credentials().expect("credentials");
        assert_eq!(credentials.access_token, "at-new");
        assert_eq!(credentials.refresh_token, "rt-new");
        assert_eq!(credentials.expires_at, Some(NOW + 600_000));

        let calls = calls.lock().expect("calls");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].form_value("client_id"), Some(CODEX_CLIENT_ID));
        assert_eq!(calls[0].form_value("grant_type"), Some("refresh_token"));
        assert_eq!(calls[0].form_value("refresh_token"), Some("rt-p1"));

        let audit = fs::read_to_string(log.log_file()).expect("audit log");
        let record: Value = serde_json::from_str(audit.trim()).expect("one audit record");
        assert_eq!(record["outcome"], "refreshed");
        assert_eq!(record["reason"], "stale");
        assert_eq!(record["profile_id"], "p1");
        assert_eq!(record["refresh_token_rotated"], true);
        assert!(!audit.contains("rt-p1"));
        assert!(!audit.contains("at-new"));
    }

    #[test]
    fn fresh_profile_makes_no_request() {
        let refresher = CodexRefresher::new("https://auth.test/oauth/token".to_string());
        let (fetch, calls) = recording_fetch(|_| Ok(HttpResponse::new(500, "")));
        let mut profile = codex_profile("p1", "a@b.com", None);
        set_codex_expiry(&mut profile, Some(NOW + DEFAULT_FALLBACK_TTL_MS));

        assert_eq!(refresher.ensure_fresh(&profile, &fetch, NOW), RefreshOutcome::Fresh);
        assert!(calls.lock().expect("calls").is_empty());
    }

    #[test]
    fn failed_refresh_is_soft_unless_required() {
        let refresher = CodexRefresher::new("https://auth.test/oauth/token".to_string());
        let mut profile = codex_profile("p1", "a@b.com", None);
        set_codex_expiry(&mut profile, Some(NOW - 1));

        let (rejecting, _) = recording_fetch(|_| Ok(HttpResponse::new(400, "invalid_grant")));
        let outcome = refresher.ensure_fresh(&profile, &rejecting, NOW);
        assert_eq!(outcome, RefreshOutcome::Failed);
        let err = outcome.into_required().expect_err("required refresh");
        assert!(matches!(err, Error::RefreshFailed { provider: Provider::Codex }));

        let (offline, _) = recording_fetch(|_| Err(FetchError::Timeout));
        assert_eq!(
            refresher.refresh(&profile, &offline, NOW, RefreshReason::Unauthorized),
            Err(UsageError::RefreshFailed)
        );

        let (empty, _) = recording_fetch(|_| Ok(HttpResponse::new(200, "{}")));
        assert_eq!(
            refresher.refresh(&profile, &empty, NOW, RefreshReason::Unauthorized),
            Err(UsageError::RefreshFailed)
        );
    }

    #[test]
    fn failed_attempts_are_audited_with_their_cause() {
        let temp = TempDir::new().expect("temp dir");
        let log = RefreshLog::new(temp.path().join("logs"));
        let refresher = CodexRefresher::new("https://auth.test/oauth/token".to_string())
            .with_log(Some(log.clone()));
        let profile = codex_profile("p1", "a@b.com", None);

        let (rejecting, _) = recording_fetch(|_| Ok(HttpResponse::new(400, "invalid_grant")));
        let (offline, _) = recording_fetch(|_| Err(FetchError::Timeout));
        assert!(refresher.refresh(&profile, &rejecting, NOW, RefreshReason::Unauthorized).is_err());
        assert!(refresher.refresh(&profile, &offline, NOW, RefreshReason::Stale).is_err());

        let audit = fs::read_to_string(log.log_file()).expect("audit log");
        let records: Vec<Value> = audit
            .lines()
            .map(|line| serde_json::from_str(line).expect("json line"))
            .collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["outcome"], "rejected");
        assert_eq!(records[0]["status"], 400);
        assert_eq!(records[0]["reason"], "unauthorized");
        assert_eq!(records[1]["outcome"], "unreachable");
        assert_eq!(records[1]["reason"], "stale");
    }
}
