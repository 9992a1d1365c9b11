use serde_json::Value;

use crate::http::{Fetch, HttpRequest};
use crate::json::{first_f64, first_field, get_path_string, value_as_bool, value_as_epoch_ms};
use crate::store::{AuthProfile, CopilotCredentials};
use crate::usage::{
    AdapterOutput, CollectContext, CopilotMetricLabel, CopilotUsageMetric, CopilotUsageRow,
    UsageAdapter, UsageError, UsageRow,
};

const EDITOR_VERSION: &str = "vscode/1.96.2";
const EDITOR_PLUGIN_VERSION: &str = "copilot-chat/0.26.7";
const COPILOT_USER_AGENT: &str = "GitHubCopilotChat/0.26.7";
const GITHUB_API_VERSION: &str = "2025-04-01";

fn quota_metric(label: CopilotMetricLabel, quota: &Value) -> Option<CopilotUsageMetric> {
    if !quota.is_object() {
        return None;
    }
    Some(CopilotUsageMetric {
        label,
        used_percent: first_f64(quota, &["percent_remaining", "percentRemaining"])
            .map(|remaining| (100.0 - remaining).clamp(0.0, 100.0)),
        remaining: first_f64(quota, &["remaining", "quota_remaining", "quotaRemaining"]),
        entitlement: first_f64(quota, &["entitlement"]),
        unlimited: quota.get("unlimited").and_then(value_as_bool),
        overage_count: first_f64(quota, &["overage_count", "overageCount"]),
        reset_at_ms: first_field(quota, &["timestamp_utc", "timestampUtc"]).and_then(value_as_epoch_ms),
    })
}

/// Builds a usage row from a `copilot_internal/user` payload, accepting both
/// snake_case and camelCase spellings.
pub fn row_from_payload(profile: &AuthProfile, root: &Value) -> CopilotUsageRow {
    let snapshots = first_field(root, &["quota_snapshots", "quotaSnapshots"]);
    let lookups = [
        (CopilotMetricLabel::Premium, ["premium_interactions", "premiumInteractions"]),
        (CopilotMetricLabel::Chat, ["chat", "chat"]),
        (CopilotMetricLabel::Completions, ["completions", "completions"]),
    ];
    let metrics = lookups
        .into_iter()
        .filter_map(|(label, keys)| {
            let quota = snapshots.and_then(|snapshots| first_field(snapshots, &keys))?;
            quota_metric(label, quota)
        })
        .collect();

    CopilotUsageRow {
        email: profile.email.clone(),
        plan_type: get_path_string(root, &["copilot_plan"])
            .or_else(|| get_path_string(root, &["copilotPlan"]))
            .unwrap_or_else(|| "unknown".to_string()),
        note: profile.note.clone(),
        error: None,
        metrics,
        reset_at_ms: first_field(root, &["quota_reset_date_utc", "quotaResetDateUtc"])
            .and_then(value_as_epoch_ms),
    }
}

fn error_row(profile: &AuthProfile, error: UsageError) -> CopilotUsageRow {
    CopilotUsageRow {
        email: profile.email.clone(),
        plan_type: profile
            .plan_type
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
        note: profile.note.clone(),
        error: Some(error.to_string()),
        metrics: Vec::new(),
        reset_at_ms: None,
    }
}

/// Reads Copilot quota snapshots with a GitHub OAuth token.
pub struct CopilotUsageAdapter {
    user_url: String,
}

impl CopilotUsageAdapter {
    pub fn new(user_url: String) -> Self {
        Self { user_url }
    }

    pub fn fetch_user(&self, credentials: &CopilotCredentials, fetch: &Fetch) -> Result<Value, UsageError> {
        let request = HttpRequest::get(self.user_url.as_str())
            .header("Accept", "application/json")
            .header("Authorization", format!("token {}", credentials.github_token))
            .header("Editor-Version", EDITOR_VERSION)
            .header("Editor-Plugin-Version", EDITOR_PLUGIN_VERSION)
            .header("User-Agent", COPILOT_USER_AGENT)
            .header("X-Github-Api-Version", GITHUB_API_VERSION);

        let response = fetch(&request)?;
        if !response.is_success() {
            return Err(UsageError::Http(response.status));
        }
        response
            .json()
            .filter(Value::is_object)
            .ok_or(UsageError::MalformedPayload)
    }
}

impl UsageAdapter for CopilotUsageAdapter {
    fn can_collect(&self, profile: &AuthProfile) -> bool {
        profile.copilot_credentials().is_some()
    }

    fn collect(&self, profile: &AuthProfile, ctx: &CollectContext) -> AdapterOutput {
        let result = profile
            .copilot_credentials()
            .ok_or(UsageError::InvalidCredentials)
            .and_then(|credentials| self.fetch_user(credentials, &ctx.fetch));
        let row = match result {
            Ok(payload) => row_from_payload(profile, &payload),
            Err(err) => {
                tracing::debug!(id = %profile.id, error = %err, "copilot usage failed");
                error_row(profile, err)
            }
        };
        AdapterOutput {
            row: UsageRow::Copilot(row),
            updated_profile: None,
        }
    }
}
