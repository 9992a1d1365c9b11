pub mod codex;
pub mod copilot;

use crate::paths::env_override;
use crate::refresh_log::RefreshLog;
use crate::usage::UsageAdapter;

/// Backend URLs, overridable per environment for staging and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub codex_token_url: String,
    pub codex_usage_url: String,
    pub copilot_user_url: String,
    pub github_api_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            codex_token_url: codex::CODEX_TOKEN_URL.to_string(),
            codex_usage_url: codex::CODEX_USAGE_URL.to_string(),
            copilot_user_url: copilot::COPILOT_USER_URL.to_string(),
            github_api_url: copilot::GITHUB_API_URL.to_string(),
        }
    }
}

impl Endpoints {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            codex_token_url: env_override("AGENTBAR_CODEX_TOKEN_URL")
                .unwrap_or(defaults.codex_token_url),
            codex_usage_url: env_override("AGENTBAR_CODEX_USAGE_URL")
                .unwrap_or(defaults.codex_usage_url),
            copilot_user_url: env_override("AGENTBAR_COPILOT_USER_URL")
                .unwrap_or(defaults.copilot_user_url),
            github_api_url: env_override("AGENTBAR_GITHUB_API_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.github_api_url),
        }
    }
}

/// One adapter per provider, in lookup order.
pub fn default_adapters(endpoints: &Endpoints, refresh_log: Option<RefreshLog>) -> Vec<Box<dyn UsageAdapter>> {
    let refresher = codex::CodexRefresher::new(endpoints.codex_token_url.clone()).with_log(refresh_log);
    vec![
        Box::new(codex::CodexUsageAdapter::new(
            endpoints.codex_usage_url.clone(),
            refresher,
        )),
        Box::new(copilot::CopilotUsageAdapter::new(
            endpoints.copilot_user_url.clone(),
        )),
    ]
}
