use serde::Deserialize;
use serde_json::Value;

use crate::http::{Fetch, HttpRequest};
use crate::json::get_path_string;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GitHubEmail {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub verified: bool,
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Label stored as the Copilot profile's email: primary verified address,
/// then any verified, then any address, then the profile email, then the
/// login, then `copilot`.
pub fn identity_label(user: Option<&Value>, emails: &[GitHubEmail]) -> String {
    let pick = |predicate: &dyn Fn(&GitHubEmail) -> bool| {
        emails
            .iter()
            .filter(|entry| predicate(entry))
            .find_map(|entry| trimmed(entry.email.as_deref()))
    };

    pick(&|entry| entry.primary && entry.verified)
        .or_else(|| pick(&|entry| entry.verified))
        .or_else(|| pick(&|_| true))
        .or_else(|| user.and_then(|user| get_path_string(user, &["email"])))
        .or_else(|| user.and_then(|user| get_path_string(user, &["login"])))
        .unwrap_or_else(|| "copilot".to_string())
}

fn github_get(fetch: &Fetch, url: String, token: &str) -> Option<Value> {
    let request = HttpRequest::get(url)
        .header("Accept", "application/json")
        .header("Authorization", format!("token {}", token))
        .header("X-Github-Api-Version", "2022-11-28");
    match fetch(&request) {
        Ok(response) if response.is_success() => response.json(),
        Ok(response) => {
            tracing::debug!(url = %request.url, status = response.status, "github identity lookup failed");
            None
        }
        Err(err) => {
            tracing::debug!(url = %request.url, error = %err, "github identity lookup failed");
            None
        }
    }
}

/// Best-effort lookup; every failure falls through to the next label source.
pub fn fetch_identity_label(fetch: &Fetch, api_base_url: &str, github_token: &str) -> String {
    let base = api_base_url.trim_end_matches('/');
    let user = github_get(fetch, format!("{}/user", base), github_token);
    let emails: Vec<GitHubEmail> = github_get(fetch, format!("{}/user/emails", base), github_token)
        .and_then(|value| serde_json::from_value(value).ok())
        .unwrap_or_default();
    identity_label(user.as_ref(), &emails)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{FetchError, HttpResponse};
    use crate::test_support::recording_fetch;
    use serde_json::json;

    fn email(address: &str, primary: bool, verified: bool) -> GitHubEmail {
        GitHubEmail {
            email: Some(address.to_string()),
            primary,
            verified,
        }
    }

    #[test]
    fn label_prefers_primary_verified_then_verified_then_any() {
        let user = json!({ "login": "octocat", "email": "public@b.com" });
        let emails = vec![
            email("other@b.com", false, false),
            email("verified@b.com", false, true),
            email(" primary@b.com ", true, true),
        ];
        assert_eq!(identity_label(Some(&user), &emails), "primary@b.com");
        assert_eq!(identity_label(Some(&user), &emails[..2]), "verified@b.com");
        assert_eq!(identity_label(Some(&user), &emails[..1]), "other@b.com");
        assert_eq!(identity_label(Some(&user), &[]), "public@b.com");
        assert_eq!(identity_label(Some(&json!({ "login": "octocat", "email": null })), &[]), "octocat");
        assert_eq!(identity_label(None, &[]), "copilot");
    }

    #[test]
    fn fetch_uses_user_and_emails_endpoints() {
        let (fetch, calls) = recording_fetch(|request| {
            if request.url.ends_with("/user/emails") {
                return Ok(HttpResponse::new(
                    200,
                    json!([{ "email": "gh@b.com", "primary": true, "verified": true }]).to_string(),
                ));
            }
            Ok(HttpResponse::new(200, json!({ "login": "octocat" }).to_string()))
        });
        assert_eq!(fetch_identity_label(&fetch, "https://github.test/", "gho"), "gh@b.com");
        let calls = calls.lock().expect("calls");
        assert_eq!(calls[0].url, "https://github.test/user");
        assert_eq!(calls[1].url, "https://github.test/user/emails");
        assert_eq!(calls[1].header_value("Authorization"), Some("token gho"));
    }

    #[test]
    fn fetch_falls_back_when_endpoints_fail() {
        let (fetch, _) = recording_fetch(|request| {
            if request.url.ends_with("/user/emails") {
                return Err(FetchError::Network("reset".to_string()));
            }
            Ok(HttpResponse::new(200, json!({ "login": "octocat" }).to_string()))
        });
        assert_eq!(fetch_identity_label(&fetch, "https://github.test", "gho"), "octocat");

        let (offline, _) = recording_fetch(|_| Err(FetchError::Timeout));
        assert_eq!(fetch_identity_label(&offline, "https://github.test", "gho"), "copilot");
    }
}
