use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use piidash_store::DEFAULT_STORAGE_KEY;
use serde::Deserialize;

pub const DEFAULT_USERS_URL: &str = "http://localhost:4200/api/users";

/// Runtime settings. YAML keys match the field names; every field also has a
/// `PIIDASH_*` environment override.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub users_url: String,
    /// When set, users are read from this file instead of `users_url`.
    pub users_file: Option<PathBuf>,
    /// When set, UI state is kept in this file; otherwise it lives in memory.
    pub session_file: Option<PathBuf>,
    pub storage_key: String,
    pub search_debounce_ms: u64,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            users_url: DEFAULT_USERS_URL.into(),
            users_file: None,
            session_file: None,
            storage_key: DEFAULT_STORAGE_KEY.into(),
            search_debounce_ms: 200,
        }
    }
}

impl DashboardConfig {
    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)?;
        let cfg: DashboardConfig = serde_yaml::from_str(&text)?;
        Ok(cfg)
    }

    /// Config file (if any) with the process environment applied on top.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let cfg = match path {
            Some(path) => Self::from_path(path)?,
            None => Self::default(),
        };
        Ok(cfg.with_env(|key| std::env::var(key).ok()))
    }

    pub fn with_env(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| var(key).filter(|v| !v.is_empty());
        if let Some(url) = non_empty("PIIDASH_USERS_URL") {
            self.users_url = url;
        }
        if let Some(file) = non_empty("PIIDASH_USERS_FILE") {
            self.users_file = Some(file.into());
        }
        if let Some(file) = non_empty("PIIDASH_SESSION_FILE") {
            self.session_file = Some(file.into());
        }
        if let Some(key) = non_empty("PIIDASH_STORAGE_KEY") {
            self.storage_key = key;
        }
        if let Some(ms) = non_empty("PIIDASH_SEARCH_DEBOUNCE_MS").and_then(|v| v.parse().ok()) {
            self.search_debounce_ms = ms;
        }
        self
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }
}
