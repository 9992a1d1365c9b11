use serde::Serialize;

use crate::store::{Provider, Store};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRow {
    pub id: String,
    pub provider: Provider,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub active: bool,
}

/// Stored profiles sorted by provider then email, with active markers.
pub fn list_accounts(store: &Store, provider: Option<Provider>) -> Vec<AccountRow> {
    let data = store.read();
    let mut rows: Vec<AccountRow> = data
        .profiles
        .iter()
        .filter(|profile| provider.map_or(true, |provider| profile.provider == provider))
        .map(|profile| AccountRow {
            id: profile.id.clone(),
            provider: profile.provider,
            email: profile.email.clone(),
            plan_type: profile.plan_type.clone(),
            note: profile.note.clone(),
            active: data.active_id(profile.provider) == Some(profile.id.as_str()),
        })
        .collect();
    rows.sort_by(|a, b| a.provider.cmp(&b.provider).then_with(|| a.email.cmp(&b.email)));
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{codex_profile, copilot_profile};
    use tempfile::TempDir;

    #[test]
    fn rows_are_sorted_and_marked_active() {
        let temp = TempDir::new().expect("temp dir");
        let store = Store::new(temp.path().join("store.json"));
        store.upsert_profile(copilot_profile("c1", "a@b.com", None)).expect("seed");
        store.upsert_profile(codex_profile("p2", "z@b.com", Some("pro"))).expect("seed");
        store.upsert_profile(codex_profile("p1", "m@b.com", Some("plus"))).expect("seed");
        store.set_active_profile(Provider::Codex, "p2").expect("activate");

        let rows = list_accounts(&store, None);
        let ids: Vec<&str> = rows.iter().map(|row| row.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p2", "c1"]);
        assert!(rows[1].active);
        assert!(!rows[0].active);
        assert!(!rows[2].active);

        let copilot = list_accounts(&store, Some(Provider::Copilot));
        assert_eq!(copilot.len(), 1);

        let encoded = serde_json::to_value(&rows[0]).expect("json");
        assert_eq!(encoded["planType"], "plus");
        assert!(encoded.get("note").is_none());
    }

    #[test]
    fn missing_store_lists_nothing() {
        let temp = TempDir::new().expect("temp dir");
        let store = Store::new(temp.path().join("missing/store.json"));
        assert!(list_accounts(&store, None).is_empty());
    }
}
