use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::clock::utc_now_iso;
use crate::error::{Error, Result};
use crate::fsutil::{load_json_value, save_json};
use crate::store::{AuthProfile, Provider};

/// `$CODEX_HOME/auth.json` as read by the Codex CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodexAuthFile {
    pub tokens: CodexAuthTokens,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_refresh: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodexAuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
}

pub fn read_codex_auth_file(path: &Path) -> Result<CodexAuthFile> {
    let value = load_json_value(path)
        .ok_or_else(|| Error::Usage(format!("no Codex credentials at {}", path.display())))?;
    serde_json::from_value(value).map_err(|err| {
        Error::Usage(format!(
            "Codex credentials at {} are incomplete: {}",
            path.display(),
            err
        ))
    })
}

/// Replaces the Codex CLI's credentials with the profile's tokens.
pub fn write_codex_auth_file(path: &Path, profile: &AuthProfile) -> Result<()> {
    let credentials = profile
        .codex_credentials()
        .ok_or_else(|| Error::InvalidCredentials {
            id: profile.id.clone(),
            provider: Provider::Codex,
        })?;
    let payload = CodexAuthFile {
        tokens: CodexAuthTokens {
            access_token: credentials.access_token.clone(),
            refresh_token: credentials.refresh_token.clone(),
            id_token: credentials.id_token.clone(),
            account_id: credentials.account_id.clone(),
        },
        last_refresh: Some(utc_now_iso()),
    };
    save_json(path, "codex auth file", &payload)?;
    tracing::debug!(path = %path.display(), id = %profile.id, "wrote codex auth file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{codex_profile, copilot_profile};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn writes_codex_cli_shape_with_private_permissions() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join(".codex/auth.json");
        write_codex_auth_file(&path, &codex_profile("p1", "a@b.com", None)).expect("write");

        let raw: serde_json::Value =
            serde_json::from_slice(&fs::read(&path).expect("read")).expect("json");
        assert_eq!(raw["tokens"]["access_token"], "at-p1");
        assert_eq!(raw["tokens"]["refresh_token"], "rt-p1");
        assert_eq!(raw["tokens"]["account_id"], "acct-p1");
        assert!(raw["tokens"].get("id_token").is_none());
        assert!(raw["last_refresh"].is_string());

        let read_back = read_codex_auth_file(&path).expect("read back");
        assert_eq!(read_back.tokens.access_token, "at-p1");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).expect("metadata").permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn refuses_non_codex_profiles_and_missing_files() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("auth.json");
        assert!(write_codex_auth_file(&path, &copilot_profile("c1", "gh@b.com", None)).is_err());
        assert!(!path.exists());
        assert!(read_codex_auth_file(&path).is_err());

        fs::write(&path, r#"{"tokens":{"access_token":"x"}}"#).expect("write");
        assert!(read_codex_auth_file(&path).is_err());
    }
}
