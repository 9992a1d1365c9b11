use serde::Serialize;

use crate::clock::iso_from_ms;
use crate::error::{Error, Result};
use crate::resolver::{resolve, ProfilePicker, Selector};
use crate::store::{AuthProfile, Provider};

use super::AppContext;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedProfile {
    pub id: String,
    pub provider: Provider,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_type: Option<String>,
    pub was_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteUpdate {
    pub id: String,
    pub provider: Provider,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl From<AuthProfile> for NoteUpdate {
    fn from(profile: AuthProfile) -> Self {
        Self {
            id: profile.id,
            provider: profile.provider,
            email: profile.email,
            plan_type: profile.plan_type,
            note: profile.note,
        }
    }
}

fn resolve_target(
    ctx: &AppContext,
    provider: Provider,
    selector: &Selector,
    picker: Option<&dyn ProfilePicker>,
) -> Result<AuthProfile> {
    let data = ctx.store.read();
    let target = resolve(&data.profiles, provider, selector, picker)?;
    Ok(target.clone())
}

/// Deletes the selected profile once `confirm` accepts it. The active
/// pointer is cleared in the same locked write when it named the profile.
pub fn delete_profile<C>(
    ctx: &AppContext,
    provider: Provider,
    selector: &Selector,
    picker: Option<&dyn ProfilePicker>,
    confirm: C,
) -> Result<DeletedProfile>
where
    C: FnOnce(&AuthProfile) -> Result<()>,
{
    let target = resolve_target(ctx, provider, selector, picker)?;
    confirm(&target)?;
    let (removed, was_active) = ctx.store.delete_profile(&target.id)?;
    tracing::info!(id = %removed.id, provider = %removed.provider, was_active, "deleted profile");
    Ok(DeletedProfile {
        id: removed.id,
        provider: removed.provider,
        email: removed.email,
        plan_type: removed.plan_type,
        was_active,
    })
}

pub fn set_note(
    ctx: &AppContext,
    provider: Provider,
    selector: &Selector,
    picker: Option<&dyn ProfilePicker>,
    note: &str,
) -> Result<NoteUpdate> {
    let note = note.trim();
    if note.is_empty() {
        return Err(Error::Usage("no note provided".to_string()));
    }
    let target = resolve_target(ctx, provider, selector, picker)?;
    let updated = ctx
        .store
        .set_note(&target.id, Some(note.to_string()), &iso_from_ms(ctx.now_ms()))?;
    Ok(updated.into())
}

pub fn clear_note(
    ctx: &AppContext,
    provider: Provider,
    selector: &Selector,
    picker: Option<&dyn ProfilePicker>,
) -> Result<NoteUpdate> {
    let target = resolve_target(ctx, provider, selector, picker)?;
    let updated = ctx.store.set_note(&target.id, None, &iso_from_ms(ctx.now_ms()))?;
    Ok(updated.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::*;
    use crate::test_support::{codex_profile, copilot_profile, recording_fetch};
    use tempfile::TempDir;

    fn seeded(temp: &TempDir) -> AppContext {
        let (fetch, _) = recording_fetch(|_| panic!("no network expected"));
        let ctx = context(temp, fetch);
        ctx.store.upsert_profile(codex_profile("p1", "a@b.com", Some("plus"))).expect("seed");
        ctx.store.upsert_profile(codex_profile("p2", "a@b.com", Some("pro"))).expect("seed");
        ctx.store.upsert_profile(copilot_profile("c1", "a@b.com", None)).expect("seed");
        ctx.store.set_active_profile(Provider::Codex, "p2").expect("activate");
        ctx.store.set_active_profile(Provider::Copilot, "c1").expect("activate");
        ctx
    }

    #[test]
    fn delete_clears_active_pointer_for_that_provider_only() {
        let temp = TempDir::new().expect("temp dir");
        let ctx = seeded(&temp);

        let deleted = delete_profile(
            &ctx,
            Provider::Codex,
            &Selector::email("a@b.com").with_plan("pro"),
            None,
            |_| Ok(()),
        )
        .expect("delete");
        assert_eq!(deleted.id, "p2");
        assert!(deleted.was_active);

        let data = ctx.store.read();
        assert!(data.find("p2").is_none());
        assert_eq!(data.active_id(Provider::Codex), None);
        assert_eq!(data.active_id(Provider::Copilot), Some("c1"));
    }

    #[test]
    fn declined_confirmation_deletes_nothing() {
        let temp = TempDir::new().expect("temp dir");
        let ctx = seeded(&temp);
        let err = delete_profile(
            &ctx,
            Provider::Copilot,
            &Selector::email("a@b.com"),
            None,
            |_| Err(Error::Selection("delete cancelled".to_string())),
        )
        .expect_err("declined");
        assert_eq!(err.to_string(), "delete cancelled");
        assert!(ctx.store.read().find("c1").is_some());
    }

    #[test]
    fn ambiguous_delete_reports_candidates() {
        let temp = TempDir::new().expect("temp dir");
        let ctx = seeded(&temp);
        let err = delete_profile(&ctx, Provider::Codex, &Selector::email("a@b.com"), None, |_| Ok(()))
            .expect_err("ambiguous");
        assert_eq!(
            err.to_string(),
            "ambiguous codex selector. Candidates: p1 (plus), p2 (pro)"
        );
        assert_eq!(ctx.store.read().profiles.len(), 3);
    }

    #[test]
    fn notes_are_trimmed_and_clearable() {
        let temp = TempDir::new().expect("temp dir");
        let ctx = seeded(&temp);

        let updated = set_note(&ctx, Provider::Copilot, &Selector::email("A@b.com"), None, "  work laptop ")
            .expect("set note");
        assert_eq!(updated.note.as_deref(), Some("work laptop"));
        let stored = ctx.store.read().find("c1").cloned().expect("stored");
        assert_eq!(stored.note.as_deref(), Some("work laptop"));
        assert_eq!(stored.updated_at_ms(), Some(NOW));

        let err = set_note(&ctx, Provider::Copilot, &Selector::email("a@b.com"), None, "   ")
            .expect_err("empty note");
        assert!(matches!(err, Error::Usage(_)));

        let cleared = clear_note(&ctx, Provider::Copilot, &Selector::email("a@b.com"), None).expect("clear");
        assert_eq!(cleared.note, None);
        assert_eq!(ctx.store.read().find("c1").and_then(|p| p.note.clone()), None);
    }
}
