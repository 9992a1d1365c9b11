mod auth_file;
mod profile;
mod refresh;
mod usage;

pub use auth_file::{read_codex_auth_file, write_codex_auth_file, CodexAuthFile, CodexAuthTokens};
pub use profile::profile_from_auth_file;
pub use refresh::{
    apply_grant, effective_expiry_ms, grant_expiry_ms, is_stale, CodexRefresher, RefreshOutcome,
    TokenGrant, DEFAULT_EXPIRY_BUFFER_MS, DEFAULT_FALLBACK_TTL_MS,
};
pub use usage::{window_label, CodexUsageAdapter};

pub const CODEX_CLIENT_ID: &str = "app_EMoamEEZ73f0CkXaXp7hrann";
pub const CODEX_TOKEN_URL: &str = "https://auth.openai.com/oauth/token";
pub const CODEX_USAGE_URL: &str = "https://chatgpt.com/backend-api/wham/usage";
