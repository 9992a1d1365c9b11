mod identity;
mod usage;

pub use identity::{fetch_identity_label, identity_label, GitHubEmail};
pub use usage::{row_from_payload, CopilotUsageAdapter};

pub const COPILOT_USER_URL: &str = "https://api.github.com/copilot_internal/user";
pub const GITHUB_API_URL: &str = "https://api.github.com";
