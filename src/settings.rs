//! `~/.agentbar/config.json`: collection tuning knobs under the `usage` key.
//!
//! Other top-level keys in the file are preserved on every write.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::fsutil::{load_json_value, save_json};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSettings {
    pub timeout_ms: u64,
    pub ttl_ms: u64,
    pub error_ttl_ms: u64,
    pub concurrency: usize,
}

impl Default for UsageSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            ttl_ms: 60_000,
            error_ttl_ms: 10_000,
            concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKey {
    TimeoutMs,
    TtlMs,
    ErrorTtlMs,
    Concurrency,
}

impl SettingKey {
    pub const ALL: [SettingKey; 4] = [
        SettingKey::TimeoutMs,
        SettingKey::TtlMs,
        SettingKey::ErrorTtlMs,
        SettingKey::Concurrency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKey::TimeoutMs => "usage.timeoutMs",
            SettingKey::TtlMs => "usage.ttlMs",
            SettingKey::ErrorTtlMs => "usage.errorTtlMs",
            SettingKey::Concurrency => "usage.concurrency",
        }
    }

    fn field(&self) -> &'static str {
        match self {
            SettingKey::TimeoutMs => "timeoutMs",
            SettingKey::TtlMs => "ttlMs",
            SettingKey::ErrorTtlMs => "errorTtlMs",
            SettingKey::Concurrency => "concurrency",
        }
    }

    fn requires_positive(&self) -> bool {
        matches!(self, SettingKey::Concurrency)
    }

    fn value_in(&self, settings: &UsageSettings) -> u64 {
        match self {
            SettingKey::TimeoutMs => settings.timeout_ms,
            SettingKey::TtlMs => settings.ttl_ms,
            SettingKey::ErrorTtlMs => settings.error_ttl_ms,
            SettingKey::Concurrency => settings.concurrency as u64,
        }
    }

    /// Validates user input for this key.
    pub fn parse_value(&self, raw: &str) -> Result<u64> {
        let parsed = raw.trim().parse::<u64>().ok();
        match parsed {
            Some(0) if self.requires_positive() => Err(Error::Usage(format!(
                "{} must be a positive integer",
                self.as_str()
            ))),
            Some(value) => Ok(value),
            None if self.requires_positive() => Err(Error::Usage(format!(
                "{} must be a positive integer",
                self.as_str()
            ))),
            None => Err(Error::Usage(format!(
                "{} must be a non-negative integer",
                self.as_str()
            ))),
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettingKey {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        SettingKey::ALL
            .into_iter()
            .find(|key| key.as_str() == raw.trim())
            .ok_or_else(|| Error::Usage(format!("unknown setting key: {}", raw)))
    }
}

/// Every key with its effective value, in display order.
pub type SettingValues = Vec<(SettingKey, u64)>;

fn normalize_int(value: Option<&Value>, fallback: u64, positive: bool) -> u64 {
    let Some(number) = value.and_then(Value::as_f64).filter(|number| number.is_finite()) else {
        return fallback;
    };
    let floored = number.floor();
    if floored < 0.0 || (positive && floored < 1.0) {
        return fallback;
    }
    floored as u64
}

/// Normalizes a raw `usage` object; invalid or missing fields take defaults.
pub fn normalize_usage(raw: Option<&Value>) -> UsageSettings {
    let defaults = UsageSettings::default();
    let get = |key: SettingKey| {
        normalize_int(
            raw.and_then(|usage| usage.get(key.field())),
            key.value_in(&defaults),
            key.requires_positive(),
        )
    };
    UsageSettings {
        timeout_ms: get(SettingKey::TimeoutMs),
        ttl_ms: get(SettingKey::TtlMs),
        error_ttl_ms: get(SettingKey::ErrorTtlMs),
        concurrency: get(SettingKey::Concurrency) as usize,
    }
}

#[derive(Debug, Clone)]
pub struct SettingsFile {
    path: PathBuf,
}

impl SettingsFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> UsageSettings {
        let base = self.read_object();
        normalize_usage(base.get("usage"))
    }

    pub fn list(&self) -> SettingValues {
        let settings = self.read();
        SettingKey::ALL
            .into_iter()
            .map(|key| (key, key.value_in(&settings)))
            .collect()
    }

    pub fn get(&self, key: SettingKey) -> u64 {
        key.value_in(&self.read())
    }

    pub fn set(&self, key: SettingKey, raw: &str) -> Result<SettingValues> {
        let value = key.parse_value(raw)?;
        let mut base = self.read_object();
        let mut usage = usage_object(&base);
        usage.insert(key.field().to_string(), Value::from(value));
        base.insert("usage".to_string(), Value::Object(usage));
        save_json(&self.path, "config", &Value::Object(base))?;
        tracing::debug!(key = %key, value, "setting updated");
        Ok(self.list())
    }

    pub fn unset(&self, key: SettingKey) -> Result<SettingValues> {
        let mut base = self.read_object();
        let mut usage = usage_object(&base);
        usage.remove(key.field());
        if usage.is_empty() {
            base.remove("usage");
        } else {
            base.insert("usage".to_string(), Value::Object(usage));
        }
        save_json(&self.path, "config", &Value::Object(base))?;
        Ok(self.list())
    }

    fn read_object(&self) -> Map<String, Value> {
        match load_json_value(&self.path) {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

fn usage_object(base: &Map<String, Value>) -> Map<String, Value> {
    match base.get("usage") {
        Some(Value::Object(usage)) => usage.clone(),
        _ => Map::new(),
    }
}
