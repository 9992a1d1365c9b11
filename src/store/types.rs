use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::parse_iso_ms;

pub const STORE_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Codex,
    Copilot,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::Codex, Provider::Copilot];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Codex => "codex",
            Provider::Copilot => "copilot",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "codex" => Ok(Provider::Codex),
            "copilot" => Ok(Provider::Copilot),
            other => Err(format!("unknown provider: {} (expected codex|copilot)", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodexOAuthCredentials {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    /// Access-token expiry, epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    /// ISO-8601 timestamp of the last successful token grant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_refresh: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopilotCredentials {
    pub github_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copilot_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copilot_token_expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copilot_api_base_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProfileCredentials {
    CodexOauth(CodexOAuthCredentials),
    CopilotToken(CopilotCredentials),
}

impl ProfileCredentials {
    pub fn provider(&self) -> Provider {
        match self {
            ProfileCredentials::CodexOauth(_) => Provider::Codex,
            ProfileCredentials::CopilotToken(_) => Provider::Copilot,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthProfile {
    pub id: String,
    pub provider: Provider,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
    pub credentials: ProfileCredentials,
}

impl AuthProfile {
    pub fn credentials_match_provider(&self) -> bool {
        self.credentials.provider() == self.provider
    }

    pub fn codex_credentials(&self) -> Option<&CodexOAuthCredentials> {
        match (&self.provider, &self.credentials) {
            (Provider::Codex, ProfileCredentials::CodexOauth(credentials)) => Some(credentials),
            _ => None,
        }
    }

    pub fn copilot_credentials(&self) -> Option<&CopilotCredentials> {
        match (&self.provider, &self.credentials) {
            (Provider::Copilot, ProfileCredentials::CopilotToken(credentials)) => Some(credentials),
            _ => None,
        }
    }

    pub fn updated_at_ms(&self) -> Option<i64> {
        parse_iso_ms(&self.updated_at)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreData {
    pub version: u32,
    pub profiles: Vec<AuthProfile>,
    pub active: BTreeMap<Provider, String>,
}

impl Default for StoreData {
    fn default() -> Self {
        Self {
            version: STORE_VERSION,
            profiles: Vec::new(),
            active: BTreeMap::new(),
        }
    }
}

impl StoreData {
    pub fn find(&self, id: &str) -> Option<&AuthProfile> {
        self.profiles.iter().find(|profile| profile.id == id)
    }

    pub fn profiles_for(&self, provider: Provider) -> Vec<&AuthProfile> {
        self.profiles
            .iter()
            .filter(|profile| profile.provider == provider)
            .collect()
    }

    pub fn active_id(&self, provider: Provider) -> Option<&str> {
        self.active.get(&provider).map(String::as_str)
    }

    pub fn upsert(&mut self, profile: AuthProfile) {
        if let Some(index) = self.profiles.iter().position(|item| item.id == profile.id) {
            self.profiles[index] = profile;
        } else {
            self.profiles.push(profile);
        }
    }
}

/// Builds a `StoreData` from whatever JSON was found on disk.
///
/// Field defaults:
/// - not an object: empty store
/// - `version`: non-negative integer, otherwise `STORE_VERSION`
/// - `profiles`: array; entries that fail to decode are dropped, later
///   duplicates of an id are dropped
/// - `active`: object; entries with an unknown provider, a non-string id or an
///   id that does not name a profile of that provider are dropped
pub fn coerce_store(value: Option<Value>) -> StoreData {
    let Some(Value::Object(raw)) = value else {
        return StoreData::default();
    };

    let version = raw
        .get("version")
        .and_then(Value::as_u64)
        .and_then(|version| u32::try_from(version).ok())
        .unwrap_or(STORE_VERSION);

    let mut profiles: Vec<AuthProfile> = Vec::new();
    if let Some(Value::Array(items)) = raw.get("profiles") {
        for item in items {
            match serde_json::from_value::<AuthProfile>(item.clone()) {
                Ok(profile) => {
                    if profiles.iter().any(|existing| existing.id == profile.id) {
                        tracing::warn!(id = %profile.id, "dropping duplicate profile id");
                        continue;
                    }
                    profiles.push(profile);
                }
                Err(err) => tracing::warn!(error = %err, "dropping malformed profile record"),
            }
        }
    }

    let mut active = BTreeMap::new();
    if let Some(Value::Object(entries)) = raw.get("active") {
        for (key, id) in entries {
            let (Ok(provider), Some(id)) = (key.parse::<Provider>(), id.as_str()) else {
                continue;
            };
            let exists = profiles
                .iter()
                .any(|profile| profile.id == id && profile.provider == provider);
            if exists {
                active.insert(provider, id.to_string());
            } else {
                tracing::warn!(%provider, id, "dropping dangling active pointer");
            }
        }
    }

    StoreData {
        version,
        profiles,
        active,
    }
}
