use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use crate::cache::{UsageCache, UsageCacheEntry};
use crate::clock::now_ms;
use crate::error::Result;
use crate::http::{with_timeout, CancelToken, Fetch};
use crate::settings::UsageSettings;
use crate::store::{AuthProfile, Provider, Store};

use super::{normalize_persisted_plan, AdapterOutput, CollectContext, UsageAdapter, UsageRow};

#[derive(Debug, Clone)]
pub struct CollectOptions {
    pub concurrency: usize,
    pub timeout_ms: u64,
    pub ttl_ms: u64,
    pub error_ttl_ms: u64,
    pub force_refresh: bool,
    pub cancel: Option<CancelToken>,
}

impl Default for CollectOptions {
    fn default() -> Self {
        Self::from_settings(&UsageSettings::default(), false)
    }
}

impl CollectOptions {
    pub fn from_settings(settings: &UsageSettings, force_refresh: bool) -> Self {
        Self {
            concurrency: settings.concurrency,
            timeout_ms: settings.timeout_ms,
            ttl_ms: settings.ttl_ms,
            error_ttl_ms: settings.error_ttl_ms,
            force_refresh,
            cancel: None,
        }
    }

    fn ttl_for(&self, row: &UsageRow) -> i64 {
        let ttl_ms = if row.error().is_some() {
            self.error_ttl_ms.min(self.ttl_ms)
        } else {
            self.ttl_ms
        };
        i64::try_from(ttl_ms).unwrap_or(i64::MAX)
    }
}

/// Cache-aware, bounded-concurrency usage collection over stored profiles.
pub struct UsageCollector {
    store: Store,
    cache: UsageCache,
    adapters: Vec<Box<dyn UsageAdapter>>,
    fetch: Fetch,
    clock: fn() -> i64,
}

impl UsageCollector {
    pub fn new(store: Store, cache: UsageCache, adapters: Vec<Box<dyn UsageAdapter>>, fetch: Fetch) -> Self {
        Self {
            store,
            cache,
            adapters,
            fetch,
            clock: now_ms,
        }
    }

    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    fn adapter_for(&self, profile: &AuthProfile) -> Option<&dyn UsageAdapter> {
        self.adapters
            .iter()
            .find(|adapter| adapter.can_collect(profile))
            .map(|adapter| adapter.as_ref())
    }

    /// Loads the store and collects usage for every profile, optionally
    /// limited to one provider.
    pub fn collect_usage(
        &self,
        settings: &UsageSettings,
        provider: Option<Provider>,
        force_refresh: bool,
    ) -> Result<Vec<UsageRow>> {
        let profiles: Vec<AuthProfile> = self
            .store
            .read()
            .profiles
            .into_iter()
            .filter(|profile| provider.map_or(true, |provider| profile.provider == provider))
            .collect();
        self.collect(&profiles, &CollectOptions::from_settings(settings, force_refresh))
    }

    /// Rows for `profiles`, sorted by provider then email.
    ///
    /// Per-profile failures are reported in the rows. Store and cache write
    /// failures abort the call.
    pub fn collect(&self, profiles: &[AuthProfile], options: &CollectOptions) -> Result<Vec<UsageRow>> {
        let now_ms = (self.clock)();
        let cache_enabled = options.ttl_ms > 0;
        let cached = (cache_enabled && !options.force_refresh).then(|| self.cache.read());

        let mut rows = Vec::with_capacity(profiles.len());
        let mut pending: Vec<(&AuthProfile, &dyn UsageAdapter)> = Vec::new();
        for profile in profiles {
            let Some(adapter) = self.adapter_for(profile) else {
                tracing::warn!(id = %profile.id, provider = %profile.provider, "no adapter can collect profile, skipping");
                continue;
            };
            let hit = cached
                .as_ref()
                .and_then(|cache| cache.fresh_entry(profile.provider, &profile.id, now_ms));
            if let Some(entry) = hit {
                tracing::debug!(id = %profile.id, "usage cache hit");
                let mut row = entry.row.clone();
                row.restamp(profile);
                rows.push(row);
                continue;
            }
            pending.push((profile, adapter));
        }

        let ctx = CollectContext {
            fetch: with_timeout(
                self.fetch.clone(),
                Duration::from_millis(options.timeout_ms),
                options.cancel.clone(),
            ),
            timeout_ms: options.timeout_ms,
            now_ms,
        };
        let outputs = run_bounded(&pending, options.concurrency, |(profile, adapter)| {
            let started = Instant::now();
            let output = adapter.collect(profile, &ctx);
            tracing::debug!(
                provider = %profile.provider,
                email = %profile.email,
                elapsed_ms = started.elapsed().as_millis() as u64,
                refreshed = output.updated_profile.is_some(),
                "collected usage"
            );
            output
        });

        let mut cache_updates = Vec::new();
        for ((profile, _), output) in pending.iter().zip(outputs) {
            let Some(output) = output else { continue };
            if let Some(write_back) = write_back_for(profile, &output) {
                self.store.merge_collected_profile(&write_back)?;
            }
            if cache_enabled {
                cache_updates.push(UsageCacheEntry {
                    provider: profile.provider,
                    profile_id: profile.id.clone(),
                    expires_at_ms: now_ms.saturating_add(options.ttl_for(&output.row)),
                    row: output.row.clone(),
                });
            }
            rows.push(output.row);
        }

        if !cache_updates.is_empty() {
            self.cache.update_with_lock(|cache| {
                for entry in cache_updates {
                    cache.insert(entry);
                }
            })?;
        }

        rows.sort_by(|a, b| {
            a.provider()
                .cmp(&b.provider())
                .then_with(|| a.email().cmp(b.email()))
        });
        Ok(rows)
    }
}

/// The profile version to persist after a collection, if anything changed:
/// refreshed credentials, a different normalized plan, or both.
fn write_back_for(profile: &AuthProfile, output: &AdapterOutput) -> Option<AuthProfile> {
    let mut candidate = output.updated_profile.clone();
    if output.row.error().is_none() {
        if let Some(plan) = normalize_persisted_plan(output.row.plan_type()) {
            let current = candidate.as_ref().unwrap_or(profile);
            if current.plan_type.as_deref() != Some(plan.as_str()) {
                candidate.get_or_insert_with(|| profile.clone()).plan_type = Some(plan);
            }
        }
    }
    candidate
}

/// Runs `work` over `items` on at most `limit` scoped threads. Each worker
/// claims the next unclaimed index; results keep the input order.
fn run_bounded<T, R, F>(items: &[T], limit: usize, work: F) -> Vec<Option<R>>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    let workers = limit.max(1).min(items.len());
    let slots: Vec<Mutex<Option<R>>> = items.iter().map(|_| Mutex::new(None)).collect();
    let next = AtomicUsize::new(0);

    thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                let index = next.fetch_add(1, Ordering::SeqCst);
                let Some(item) = items.get(index) else {
                    break;
                };
                let result = work(item);
                if let Ok(mut slot) = slots[index].lock() {
                    *slot = Some(result);
                }
            });
        }
    });

    slots
        .into_iter()
        .map(|slot| slot.into_inner().ok().flatten())
        .collect()
}
