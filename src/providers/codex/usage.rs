use serde_json::Value;

use crate::http::{Fetch, HttpRequest};
use crate::json::{get_path_string, get_path_value, value_as_epoch_ms, value_as_f64};
use crate::refresh_log::RefreshReason;
use crate::store::{AuthProfile, CodexOAuthCredentials};
use crate::usage::{AdapterOutput, CodexUsageRow, CollectContext, UsageAdapter, UsageError, UsageRow};

use super::refresh::{CodexRefresher, RefreshOutcome};

const PRIMARY_FALLBACK_LABEL: &str = "5h";
const SECONDARY_FALLBACK_LABEL: &str = "weekly";

/// Display label for a rate-limit window length given in seconds.
pub fn window_label(seconds: Option<f64>, fallback: &str) -> String {
    match seconds {
        Some(seconds) if seconds == 18_000.0 => "5h".to_string(),
        Some(seconds) if seconds == 604_800.0 => "weekly".to_string(),
        Some(seconds) if seconds > 0.0 && seconds.fract() == 0.0 => {
            let seconds = seconds as u64;
            if seconds % 86_400 == 0 {
                format!("{}d", seconds / 86_400)
            } else if seconds % 3_600 == 0 {
                format!("{}h", seconds / 3_600)
            } else {
                fallback.to_string()
            }
        }
        _ => fallback.to_string(),
    }
}

struct Window {
    label: String,
    used_percent: f64,
    reset_at_ms: Option<i64>,
}

fn parse_window(root: &Value, key: &str, fallback: &str) -> Option<Window> {
    let window = get_path_value(root, &["rate_limit", key]).filter(|value| value.is_object())?;
    Some(Window {
        label: window_label(window.get("limit_window_seconds").and_then(value_as_f64), fallback),
        used_percent: window.get("used_percent").and_then(value_as_f64).unwrap_or(0.0),
        reset_at_ms: window.get("reset_at").and_then(value_as_epoch_ms),
    })
}

fn row_from_payload(profile: &AuthProfile, root: &Value) -> CodexUsageRow {
    let primary = parse_window(root, "primary_window", PRIMARY_FALLBACK_LABEL);
    let secondary = parse_window(root, "secondary_window", SECONDARY_FALLBACK_LABEL);
    CodexUsageRow {
        email: profile.email.clone(),
        plan_type: get_path_string(root, &["plan_type"]).unwrap_or_else(|| "unknown".to_string()),
        note: profile.note.clone(),
        error: None,
        primary_label: primary
            .as_ref()
            .map(|window| window.label.clone())
            .unwrap_or_else(|| PRIMARY_FALLBACK_LABEL.to_string()),
        primary_used_percent: primary.as_ref().map_or(0.0, |window| window.used_percent),
        primary_reset_at_ms: primary.as_ref().and_then(|window| window.reset_at_ms),
        secondary_label: secondary
            .as_ref()
            .map(|window| window.label.clone())
            .unwrap_or_else(|| SECONDARY_FALLBACK_LABEL.to_string()),
        secondary_used_percent: secondary.as_ref().map(|window| window.used_percent),
        secondary_reset_at_ms: secondary.as_ref().and_then(|window| window.reset_at_ms),
    }
}

fn error_row(profile: &AuthProfile, error: UsageError) -> CodexUsageRow {
    CodexUsageRow {
        email: profile.email.clone(),
        plan_type: profile
            .plan_type
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
        note: profile.note.clone(),
        error: Some(error.to_string()),
        primary_label: PRIMARY_FALLBACK_LABEL.to_string(),
        primary_used_percent: 0.0,
        primary_reset_at_ms: None,
        secondary_label: SECONDARY_FALLBACK_LABEL.to_string(),
        secondary_used_percent: None,
        secondary_reset_at_ms: None,
    }
}

/// Reads the ChatGPT rate-limit windows for a Codex OAuth profile.
pub struct CodexUsageAdapter {
    usage_url: String,
    refresher: CodexRefresher,
}

impl CodexUsageAdapter {
    pub fn new(usage_url: String, refresher: CodexRefresher) -> Self {
        Self {
            usage_url,
            refresher,
        }
    }

    fn fetch_usage(
        &self,
        credentials: &CodexOAuthCredentials,
        fetch: &Fetch,
    ) -> Result<Value, UsageError> {
        let mut request = HttpRequest::get(self.usage_url.as_str())
            .header("Authorization", format!("Bearer {}", credentials.access_token))
            .header("Accept", "application/json");
        if let Some(account_id) = credentials.account_id.as_deref() {
            request = request.header("ChatGPT-Account-Id", account_id);
        }

        let response = fetch(&request)?;
        if !response.is_success() {
            return Err(UsageError::Http(response.status));
        }
        response
            .json()
            .filter(Value::is_object)
            .ok_or(UsageError::MalformedPayload)
    }

    fn fetch_for(&self, profile: &AuthProfile, fetch: &Fetch) -> Result<Value, UsageError> {
        let credentials = profile
            .codex_credentials()
            .ok_or(UsageError::InvalidCredentials)?;
        self.fetch_usage(credentials, fetch)
    }
}

impl UsageAdapter for CodexUsageAdapter {
    fn can_collect(&self, profile: &AuthProfile) -> bool {
        profile.codex_credentials().is_some()
    }

    fn collect(&self, profile: &AuthProfile, ctx: &CollectContext) -> AdapterOutput {
        if profile.codex_credentials().is_none() {
            return AdapterOutput {
                row: UsageRow::Codex(error_row(profile, UsageError::InvalidCredentials)),
                updated_profile: None,
            };
        }

        let proactive = self.refresher.ensure_fresh(profile, &ctx.fetch, ctx.now_ms);
        let mut updated_profile = match proactive {
            RefreshOutcome::Refreshed(refreshed) => Some(refreshed),
            RefreshOutcome::Fresh | RefreshOutcome::Failed => None,
        };
        let current = updated_profile.as_ref().unwrap_or(profile);

        let result = match self.fetch_for(current, &ctx.fetch) {
            Err(UsageError::Http(401)) if updated_profile.is_none() => {
                tracing::debug!(id = %profile.id, "usage returned 401, refreshing once");
                match self.refresher.refresh(profile, &ctx.fetch, ctx.now_ms, RefreshReason::Unauthorized) {
                    Ok(refreshed) => {
                        let retried = self.fetch_for(&refreshed, &ctx.fetch);
                        updated_profile = Some(refreshed);
                        retried
                    }
                    Err(err) => Err(err),
                }
            }
            other => other,
        };

        let row = match result {
            Ok(payload) => row_from_payload(profile, &payload),
            Err(err) => {
                tracing::debug!(id = %profile.id, error = %err, "codex usage failed");
                error_row(profile, err)
            }
        };
        AdapterOutput {
            row: UsageRow::Codex(row),
            updated_profile,
        }
    }
}
