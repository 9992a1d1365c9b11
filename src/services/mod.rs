//! Operations behind the CLI commands, wired to one set of files and
//! endpoints.

mod accounts;
mod login;
mod manage;
mod switch;

pub use accounts::{list_accounts, AccountRow};
pub use login::{login_copilot, read_token, save_codex, SavedProfile};
pub use manage::{clear_note, delete_profile, set_note, DeletedProfile, NoteUpdate};
pub use switch::{switch_codex, SwitchResult};

use crate::cache::UsageCache;
use crate::clock::now_ms;
use crate::error::Result;
use crate::http::{CancelToken, Fetch};
use crate::paths::AppPaths;
use crate::providers::codex::CodexRefresher;
use crate::providers::{default_adapters, Endpoints};
use crate::refresh_log::RefreshLog;
use crate::settings::SettingsFile;
use crate::store::{Provider, Store};
use crate::usage::{CollectOptions, UsageCollector, UsageRow};

/// Files, endpoints and transport shared by every operation.
#[derive(Clone)]
pub struct AppContext {
    pub paths: AppPaths,
    pub store: Store,
    pub cache: UsageCache,
    pub settings: SettingsFile,
    pub endpoints: Endpoints,
    pub fetch: Fetch,
    pub refresh_log: Option<RefreshLog>,
    clock: fn() -> i64,
}

impl AppContext {
    pub fn new(paths: AppPaths, endpoints: Endpoints, fetch: Fetch) -> Self {
        Self {
            store: Store::new(paths.store_file()),
            cache: UsageCache::new(paths.usage_cache_file()),
            settings: SettingsFile::new(paths.config_file()),
            refresh_log: Some(RefreshLog::new(paths.log_dir())),
            paths,
            endpoints,
            fetch,
            clock: now_ms,
        }
    }

    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    pub fn without_refresh_log(mut self) -> Self {
        self.refresh_log = None;
        self
    }

    pub fn now_ms(&self) -> i64 {
        (self.clock)()
    }

    pub fn codex_refresher(&self) -> CodexRefresher {
        CodexRefresher::new(self.endpoints.codex_token_url.clone()).with_log(self.refresh_log.clone())
    }

    pub fn collector(&self) -> UsageCollector {
        UsageCollector::new(
            self.store.clone(),
            self.cache.clone(),
            default_adapters(&self.endpoints, self.refresh_log.clone()),
            self.fetch.clone(),
        )
        .with_clock(self.clock)
    }
}

/// Usage rows for every stored profile, or only `provider`'s, using the
/// configured timeouts, cache TTLs and concurrency.
pub fn collect_usage(
    ctx: &AppContext,
    provider: Option<Provider>,
    force_refresh: bool,
    cancel: Option<CancelToken>,
) -> Result<Vec<UsageRow>> {
    let settings = ctx.settings.read();
    let profiles: Vec<_> = ctx
        .store
        .read()
        .profiles
        .into_iter()
        .filter(|profile| provider.map_or(true, |provider| profile.provider == provider))
        .collect();
    tracing::debug!(profiles = profiles.len(), force_refresh, "collecting usage");

    let mut options = CollectOptions::from_settings(&settings, force_refresh);
    options.cancel = cancel;
    ctx.collector().collect(&profiles, &options)
}
