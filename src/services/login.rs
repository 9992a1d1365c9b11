use std::io::BufRead;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use crate::clock::iso_from_ms;
use crate::error::{Error, Result};
use crate::http::with_timeout;
use crate::providers::codex::{profile_from_auth_file, read_codex_auth_file};
use crate::providers::copilot::{fetch_identity_label, row_from_payload, CopilotUsageAdapter};
use crate::store::{AuthProfile, CopilotCredentials, ProfileCredentials, Provider, StoreData};
use crate::usage::normalize_persisted_plan;

use super::AppContext;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedProfile {
    pub id: String,
    pub provider: Provider,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_type: Option<String>,
    /// False when an existing profile for the same account was updated.
    pub created: bool,
}

fn same_text(a: Option<&str>, b: Option<&str>) -> bool {
    let normalize = |value: Option<&str>| {
        value
            .map(|value| value.trim().to_lowercase())
            .filter(|value| !value.is_empty())
    };
    normalize(a) == normalize(b)
}

/// Inserts `incoming`, or refreshes the existing profile `same_account`
/// selects while keeping its id, creation time and note. The provider's
/// active pointer moves to the saved profile in the same write.
fn save_and_activate<F>(ctx: &AppContext, incoming: AuthProfile, same_account: F) -> Result<SavedProfile>
where
    F: Fn(&AuthProfile) -> bool,
{
    let mut saved = None;
    ctx.store.update_with_lock(|store: &mut StoreData| {
        let existing = store
            .profiles
            .iter_mut()
            .find(|profile| profile.provider == incoming.provider && same_account(profile));
        let (profile, created) = match existing {
            Some(profile) => {
                profile.email = incoming.email.clone();
                profile.plan_type = incoming.plan_type.clone();
                profile.credentials = incoming.credentials.clone();
                profile.updated_at = incoming.updated_at.clone();
                (profile.clone(), false)
            }
            None => {
                store.profiles.push(incoming.clone());
                (incoming.clone(), true)
            }
        };
        store.active.insert(profile.provider, profile.id.clone());
        saved = Some(SavedProfile {
            id: profile.id,
            provider: profile.provider,
            email: profile.email,
            plan_type: profile.plan_type,
            created,
        });
        Ok(())
    })?;
    let saved = saved.ok_or_else(|| Error::UnknownProfile { id: incoming.id.clone() })?;
    tracing::info!(id = %saved.id, provider = %saved.provider, created = saved.created, "saved profile");
    Ok(saved)
}

/// Imports the Codex CLI's current credentials as a stored profile.
pub fn save_codex(ctx: &AppContext) -> Result<SavedProfile> {
    let auth = read_codex_auth_file(&ctx.paths.codex_auth_file())?;
    let profile = profile_from_auth_file(&auth, Uuid::new_v4().to_string(), ctx.now_ms())?;
    let email = profile.email.clone();
    let plan = profile.plan_type.clone();
    save_and_activate(ctx, profile, |existing| {
        same_text(Some(&existing.email), Some(&email))
            && same_text(existing.plan_type.as_deref(), plan.as_deref())
    })
}

/// First non-blank line of piped input, trimmed. Keeps tokens out of argv.
pub fn read_token(reader: impl BufRead) -> Result<String> {
    for line in reader.lines() {
        let line = line.map_err(|source| Error::Io {
            context: "failed to read token from",
            path: PathBuf::from("<stdin>"),
            source,
        })?;
        let token = line.trim();
        if !token.is_empty() {
            return Ok(token.to_string());
        }
    }
    Err(Error::Usage("a GitHub token is required".to_string()))
}

/// Stores a GitHub OAuth token as a Copilot profile labelled with the
/// account's email. The plan lookup is best effort.
pub fn login_copilot(ctx: &AppContext, github_token: &str) -> Result<SavedProfile> {
    let github_token = github_token.trim();
    if github_token.is_empty() {
        return Err(Error::Usage("a GitHub token is required".to_string()));
    }

    let settings = ctx.settings.read();
    let fetch = with_timeout(ctx.fetch.clone(), Duration::from_millis(settings.timeout_ms), None);
    let email = fetch_identity_label(&fetch, &ctx.endpoints.github_api_url, github_token);

    let now_iso = iso_from_ms(ctx.now_ms());
    let credentials = CopilotCredentials {
        github_token: github_token.to_string(),
        copilot_token: None,
        copilot_token_expires_at: None,
        copilot_api_base_url: None,
    };
    let mut profile = AuthProfile {
        id: Uuid::new_v4().to_string(),
        provider: Provider::Copilot,
        email: email.clone(),
        plan_type: None,
        note: None,
        created_at: now_iso.clone(),
        updated_at: now_iso,
        credentials: ProfileCredentials::CopilotToken(credentials.clone()),
    };

    match CopilotUsageAdapter::new(ctx.endpoints.copilot_user_url.clone()).fetch_user(&credentials, &fetch) {
        Ok(payload) => {
            profile.plan_type = normalize_persisted_plan(&row_from_payload(&profile, &payload).plan_type);
        }
        Err(err) => tracing::debug!(error = %err, "copilot plan lookup failed during login"),
    }

    save_and_activate(ctx, profile, |existing| same_text(Some(&existing.email), Some(&email)))
}
