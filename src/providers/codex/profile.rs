use crate::clock::iso_from_ms;
use crate::error::{Error, Result};
use crate::jwt::{self, CodexClaims};
use crate::store::{AuthProfile, CodexOAuthCredentials, ProfileCredentials, Provider};

use super::auth_file::CodexAuthFile;
use super::refresh::DEFAULT_FALLBACK_TTL_MS;

/// Builds a new profile from Codex CLI credentials, reading identity from the
/// token claims. Fails when no email can be found.
pub fn profile_from_auth_file(auth: &CodexAuthFile, id: String, now_ms: i64) -> Result<AuthProfile> {
    let tokens = &auth.tokens;
    let claims = CodexClaims::new(tokens.id_token.as_deref(), Some(&tokens.access_token));
    let email = claims.email().ok_or_else(|| {
        Error::Usage("could not read an email from the Codex tokens; log in to Codex again".to_string())
    })?;
    let now_iso = iso_from_ms(now_ms);
    let expires_at = jwt::expiry_ms(&tokens.access_token).unwrap_or(now_ms.saturating_add(DEFAULT_FALLBACK_TTL_MS));

    Ok(AuthProfile {
        id,
        provider: Provider::Codex,
        email,
        plan_type: claims.plan_type(),
        note: None,
        created_at: now_iso.clone(),
        updated_at: now_iso.clone(),
        credentials: ProfileCredentials::CodexOauth(CodexOAuthCredentials {
            access_token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token.clone(),
            id_token: tokens.id_token.clone(),
            account_id: tokens.account_id.clone().or_else(|| claims.account_id()),
            expires_at: Some(expires_at),
            last_refresh: auth.last_refresh.clone().or(Some(now_iso)),
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::codex::CodexAuthTokens;
    use serde_json::json;

    const NOW: i64 = 1_770_854_400_000;

    fn auth_file(id_claims: serde_json::Value, access_claims: serde_json::Value) -> CodexAuthFile {
        CodexAuthFile {
            tokens: CodexAuthTokens {
                access_token: jwt::encode_for_test(&access_claims),
                refresh_token: "rt".to_string(),
                id_token: Some(jwt::encode_for_test(&id_claims)),
                account_id: None,
            },
            last_refresh: None,
        }
    }

    #[test]
    fn infers_identity_plan_account_and_expiry_from_claims() {
        let auth = auth_file(
            json!({ "email": "A@B.com" }),
            json!({
                "exp": 1_900_000_000,
                "https://api.openai.com/auth": { "chatgpt_plan_type": "plus", "chatgpt_account_id": "acct-1" }
            }),
        );
        let profile = profile_from_auth_file(&auth, "p1".to_string(), NOW).expect("profile");
        assert_eq!(profile.email, "A@B.com");
        assert_eq!(profile.plan_type.as_deref(), Some("plus"));
        let credentials = profile.codex_credentials().expect("credentials");
        assert_eq!(credentials.account_id.as_deref(), Some("acct-1"));
        assert_eq!(credentials.expires_at, Some(1_900_000_000_000));
        assert_eq!(profile.updated_at_ms(), Some(NOW));
    }

    #[test]
    fn missing_email_is_an_error_and_missing_exp_uses_fallback() {
        let anonymous = auth_file(json!({}), json!({}));
        assert!(profile_from_auth_file(&anonymous, "p1".to_string(), NOW).is_err());

        let no_exp = auth_file(json!({ "email": "a@b.com" }), json!({}));
        let profile = profile_from_auth_file(&no_exp, "p1".to_string(), NOW).expect("profile");
        assert_eq!(
            profile.codex_credentials().and_then(|c| c.expires_at),
            Some(NOW + DEFAULT_FALLBACK_TTL_MS)
        );
        assert_eq!(profile.plan_type, None);
    }
}
