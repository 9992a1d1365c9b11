use std::path::PathBuf;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::providers::codex::write_codex_auth_file;
use crate::resolver::{resolve, ProfilePicker, Selector};
use crate::store::Provider;

use super::AppContext;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchResult {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_type: Option<String>,
    pub auth_path: PathBuf,
    pub refreshed: bool,
}

/// Makes a stored Codex profile the one the Codex CLI uses.
///
/// Order matters: refreshed credentials land in the store first, then the
/// auth file is written, and only then does the active pointer move.
pub fn switch_codex(
    ctx: &AppContext,
    selector: &Selector,
    picker: Option<&dyn ProfilePicker>,
) -> Result<SwitchResult> {
    let data = ctx.store.read();
    let target = resolve(&data.profiles, Provider::Codex, selector, picker)?.clone();

    let refreshed = ctx
        .codex_refresher()
        .ensure_fresh(&target, &ctx.fetch, ctx.now_ms())
        .into_required()?;
    let was_refreshed = refreshed.is_some();
    let effective = match refreshed {
        Some(profile) => {
            if !ctx.store.merge_collected_profile(&profile)? {
                return Err(Error::UnknownProfile { id: profile.id });
            }
            profile
        }
        None => target,
    };

    let auth_path = ctx.paths.codex_auth_file();
    write_codex_auth_file(&auth_path, &effective)?;
    ctx.store.set_active_profile(Provider::Codex, &effective.id)?;
    tracing::info!(id = %effective.id, refreshed = was_refreshed, "switched codex profile");

    Ok(SwitchResult {
        id: effective.id,
        email: effective.email,
        plan_type: effective.plan_type,
        auth_path,
        refreshed: was_refreshed,
    })
}
