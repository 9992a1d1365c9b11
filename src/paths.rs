use std::path::{Path, PathBuf};

/// Filesystem layout rooted at a home directory.
#[derive(Debug, Clone)]
pub struct AppPaths {
    home_dir: PathBuf,
    root: PathBuf,
    codex_home: PathBuf,
}

impl AppPaths {
    pub fn new(home_dir: PathBuf) -> Self {
        let root = home_dir.join(".agentbar");
        let codex_home = home_dir.join(".codex");
        Self {
            home_dir,
            root,
            codex_home,
        }
    }

    /// Layout for the current user, honouring `$HOME` and `$CODEX_HOME`.
    pub fn from_env() -> Self {
        let mut paths = Self::new(default_home_dir());
        if let Some(codex_home) = env_override("CODEX_HOME") {
            paths.codex_home = PathBuf::from(codex_home);
        }
        paths
    }

    pub fn with_codex_home(mut self, codex_home: PathBuf) -> Self {
        self.codex_home = codex_home;
        self
    }

    pub fn home_dir(&self) -> &Path {
        &self.home_dir
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn store_file(&self) -> PathBuf {
        self.root.join("store.json")
    }

    pub fn usage_cache_file(&self) -> PathBuf {
        self.root.join("usage-cache.json")
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.json")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn codex_auth_file(&self) -> PathBuf {
        self.codex_home.join("auth.json")
    }
}

pub fn default_home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Non-empty environment variable value, trimmed.
pub fn env_override(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
