use serde::{Deserialize, Serialize};

use crate::store::{AuthProfile, Provider};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CopilotMetricLabel {
    Premium,
    Chat,
    Completions,
}

impl CopilotMetricLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CopilotMetricLabel::Premium => "premium",
            CopilotMetricLabel::Chat => "chat",
            CopilotMetricLabel::Completions => "completions",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopilotUsageMetric {
    pub label: CopilotMetricLabel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entitlement: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlimited: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overage_count: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_at_ms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodexUsageRow {
    pub email: String,
    pub plan_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default = "default_primary_label")]
    pub primary_label: String,
    #[serde(default)]
    pub primary_used_percent: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_reset_at_ms: Option<i64>,
    #[serde(default = "default_secondary_label")]
    pub secondary_label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_used_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_reset_at_ms: Option<i64>,
}

fn default_primary_label() -> String {
    "5h".to_string()
}

fn default_secondary_label() -> String {
    "weekly".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopilotUsageRow {
    pub email: String,
    pub plan_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub metrics: Vec<CopilotUsageMetric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_at_ms: Option<i64>,
}

/// Usage snapshot for one profile, tagged by provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum UsageRow {
    Codex(CodexUsageRow),
    Copilot(CopilotUsageRow),
}

impl UsageRow {
    pub fn provider(&self) -> Provider {
        match self {
            UsageRow::Codex(_) => Provider::Codex,
            UsageRow::Copilot(_) => Provider::Copilot,
        }
    }

    pub fn email(&self) -> &str {
        match self {
            UsageRow::Codex(row) => &row.email,
            UsageRow::Copilot(row) => &row.email,
        }
    }

    pub fn plan_type(&self) -> &str {
        match self {
            UsageRow::Codex(row) => &row.plan_type,
            UsageRow::Copilot(row) => &row.plan_type,
        }
    }

    pub fn note(&self) -> Option<&str> {
        match self {
            UsageRow::Codex(row) => row.note.as_deref(),
            UsageRow::Copilot(row) => row.note.as_deref(),
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            UsageRow::Codex(row) => row.error.as_deref(),
            UsageRow::Copilot(row) => row.error.as_deref(),
        }
    }

    /// Replaces display metadata with the store's copy, keeping quota fields.
    pub fn restamp(&mut self, profile: &AuthProfile) {
        let (email, plan_type, note) = match self {
            UsageRow::Codex(row) => (&mut row.email, &mut row.plan_type, &mut row.note),
            UsageRow::Copilot(row) => (&mut row.email, &mut row.plan_type, &mut row.note),
        };
        email.clone_from(&profile.email);
        note.clone_from(&profile.note);
        if let Some(plan) = &profile.plan_type {
            plan_type.clone_from(plan);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CopilotCredentials, ProfileCredentials};

    #[test]
    fn cached_rows_tolerate_missing_and_legacy_fields() {
        let raw = serde_json::json!({
            "provider": "codex",
            "email": "old@b.com",
            "legacyField": "legacy",
            "note": "OLD NOTE",
            "planType": "cached",
            "primaryUsedPercent": 12.5
        });
        let row: UsageRow = serde_json::from_value(raw).expect("row");
        let UsageRow::Codex(codex) = &row else {
            panic!("expected codex row");
        };
        assert_eq!(codex.primary_label, "5h");
        assert_eq!(codex.secondary_label, "weekly");
        assert_eq!(codex.secondary_used_percent, None);

        let encoded = serde_json::to_value(&row).expect("encode");
        assert!(encoded.get("legacyField").is_none());
        assert_eq!(encoded["provider"], "codex");
    }

    #[test]
    fn restamp_takes_email_and_note_from_profile() {
        let mut row = UsageRow::Copilot(CopilotUsageRow {
            email: "old@b.com".to_string(),
            plan_type: "individual".to_string(),
            note: Some("OLD".to_string()),
            error: None,
            metrics: Vec::new(),
            reset_at_ms: Some(1),
        });
        let profile = AuthProfile {
            id: "c1".to_string(),
            provider: Provider::Copilot,
            email: "new@b.com".to_string(),
            plan_type: None,
            note: None,
            created_at: String::new(),
            updated_at: String::new(),
            credentials: ProfileCredentials::CopilotToken(CopilotCredentials {
                github_token: "gho".to_string(),
                copilot_token: None,
                copilot_token_expires_at: None,
                copilot_api_base_url: None,
            }),
        };

        row.restamp(&profile);
        assert_eq!(row.email(), "new@b.com");
        assert_eq!(row.note(), None);
        assert_eq!(row.plan_type(), "individual");
    }
}
