//! Local credential store and usage collector for Codex and Copilot accounts.

pub mod cache;
pub mod clock;
pub mod error;
pub mod fsutil;
pub mod http;
pub mod json;
pub mod jwt;
pub mod paths;
pub mod providers;
pub mod refresh_log;
pub mod render;
pub mod resolver;
pub mod services;
pub mod settings;
pub mod store;
pub mod usage;

#[cfg(test)]
mod test_support;

pub use error::{Error, Result};
