//! Unverified JWT payload decoding. Tokens are only inspected for claims the
//! backend already vouched for when it issued them.

use base64::engine::general_purpose::{STANDARD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use serde_json::Value;

use crate::json::{get_path_string, value_as_f64};

const OPENAI_AUTH_CLAIM: &str = "https://api.openai.com/auth";
const OPENAI_PROFILE_CLAIM: &str = "https://api.openai.com/profile";

pub fn decode_payload(token: &str) -> Option<Value> {
    let mut parts = token.trim().split('.');
    let _header = parts.next()?;
    let payload = parts.next()?;

    let payload_data = URL_SAFE_NO_PAD
        .decode(payload.as_bytes())
        .or_else(|_| URL_SAFE.decode(payload.as_bytes()))
        .or_else(|_| STANDARD.decode(payload.as_bytes()))
        .ok()?;
    match serde_json::from_slice::<Value>(&payload_data).ok()? {
        Value::Object(map) => Some(Value::Object(map)),
        _ => None,
    }
}

/// `exp` claim converted to epoch milliseconds, saturating at `i64::MAX`.
pub fn expiry_ms(token: &str) -> Option<i64> {
    let payload = decode_payload(token)?;
    let exp = payload.get("exp").and_then(value_as_f64)?;
    if !exp.is_finite() || exp <= 0.0 {
        return None;
    }
    Some((exp.floor() as i64).saturating_mul(1000))
}

/// Decoded id and access token payloads of one Codex credential set.
#[derive(Debug, Default)]
pub struct CodexClaims {
    id: Option<Value>,
    access: Option<Value>,
}

impl CodexClaims {
    pub fn new(id_token: Option<&str>, access_token: Option<&str>) -> Self {
        Self {
            id: id_token.and_then(decode_payload),
            access: access_token.and_then(decode_payload),
        }
    }

    pub fn email(&self) -> Option<String> {
        let id = self.id.as_ref();
        let access = self.access.as_ref();
        [
            id.and_then(|payload| get_path_string(payload, &["email"])),
            id.and_then(|payload| get_path_string(payload, &[OPENAI_PROFILE_CLAIM, "email"])),
            access.and_then(|payload| get_path_string(payload, &["email"])),
            access.and_then(|payload| get_path_string(payload, &[OPENAI_PROFILE_CLAIM, "email"])),
        ]
        .into_iter()
        .flatten()
        .next()
    }

    pub fn plan_type(&self) -> Option<String> {
        self.first_claim(&["chatgpt_plan_type", "plan_type"])
            .map(|plan| plan.to_lowercase())
    }

    pub fn account_id(&self) -> Option<String> {
        self.first_claim(&["chatgpt_account_id", "account_id"])
    }

    /// Looks in the access token before the id token, and inside the OpenAI
    /// auth claim before the top level of each.
    fn first_claim(&self, keys: &[&str]) -> Option<String> {
        for payload in [self.access.as_ref(), self.id.as_ref()].into_iter().flatten() {
            for nested in [true, false] {
                for key in keys {
                    let found = if nested {
                        get_path_string(payload, &[OPENAI_AUTH_CLAIM, key])
                    } else {
                        get_path_string(payload, &[key])
                    };
                    if found.is_some() {
                        return found;
                    }
                }
            }
        }
        None
    }
}

#[cfg(test)]
pub(crate) fn encode_for_test(payload: &Value) -> String {
    format!(
        "{}.{}.sig",
        URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#),
        URL_SAFE_NO_PAD.encode(payload.to_string().as_bytes())
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_payload_and_expiry() {
        let token = encode_for_test(&json!({ "exp": 1_900_000_000, "sub": "x" }));
        assert_eq!(decode_payload(&token).expect("payload")["sub"], "x");
        assert_eq!(expiry_ms(&token), Some(1_900_000_000_000));
    }

    #[test]
    fn rejects_garbage_tokens() {
        assert!(decode_payload("not-a-jwt").is_none());
        assert!(decode_payload("a.%%%.c").is_none());
        let array = format!("a.{}.c", URL_SAFE_NO_PAD.encode(b"[1,2]"));
        assert!(decode_payload(&array).is_none());
        assert_eq!(expiry_ms(&encode_for_test(&json!({ "exp": "soon" }))), None);
    }

    #[test]
    fn huge_exp_saturates() {
        assert_eq!(expiry_ms(&encode_for_test(&json!({ "exp": 1e17 }))), Some(i64::MAX));
        assert_eq!(expiry_ms(&encode_for_test(&json!({ "exp": 1.7e308 }))), Some(i64::MAX));
        assert_eq!(expiry_ms(&encode_for_test(&json!({ "exp": -5 }))), None);
    }

    #[test]
    fn codex_claims_follow_lookup_order() {
        let id_token = encode_for_test(&json!({
            "https://api.openai.com/profile": { "email": "id-profile@b.com" },
            "https://api.openai.com/auth": { "chatgpt_plan_type": "plus", "chatgpt_account_id": "acct-id" }
        }));
        let access_token = encode_for_test(&json!({
            "email": "access@b.com",
            "https://api.openai.com/auth": { "chatgpt_plan_type": "Pro" },
            "account_id": "acct-access"
        }));

        let claims = CodexClaims::new(Some(&id_token), Some(&access_token));
        assert_eq!(claims.email().as_deref(), Some("id-profile@b.com"));
        assert_eq!(claims.plan_type().as_deref(), Some("pro"));
        assert_eq!(claims.account_id().as_deref(), Some("acct-access"));

        let empty = CodexClaims::new(None, None);
        assert_eq!(empty.email(), None);
        assert_eq!(empty.plan_type(), None);
    }
}
