//! Settings for the link service client
//!
//! Loaded in order of priority (later wins):
//! 1. Built-in defaults
//! 2. JSON file (~/.config/linksync/linksync.json)
//! 3. Environment variables (LINKSYNC_API_URL, LINKSYNC_CLIENT_ID,
//!    LINKSYNC_CLIENT_SECRET, LINKSYNC_APP_VERSION)

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Settings filename in the linksync config directory
pub const SETTINGS_FILE: &str = "linksync.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinksSettings {
    /// Base URL of the link service
    pub api_url: String,
    /// OAuth token endpoint used to refresh access tokens
    pub token_url: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Push registrations are redone when this changes
    pub app_version: u32,
    pub request_timeout_secs: u64,
    /// SQLite database, relative to the config directory unless absolute
    pub database_file: String,
    /// Registration id from the push transport, if this device has one
    pub push_id: Option<String>,
}

impl Default for LinksSettings {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:5500".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            client_id: None,
            client_secret: None,
            app_version: 1,
            request_timeout_secs: 30,
            database_file: "links.sqlite".to_string(),
            push_id: None,
        }
    }
}

impl LinksSettings {
    /// Load from the config directory, then apply environment overrides
    pub fn load() -> Result<Self> {
        let settings = if config::config_exists(SETTINGS_FILE) {
            config::load_json(SETTINGS_FILE)?
        } else {
            Self::default()
        };
        settings.with_overrides(|key| std::env::var(key).ok())
    }

    /// Load from a specific JSON file, without environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        config::load_json_file(path)
    }

    /// Apply overrides from a variable lookup
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let lookup = |key: &str| lookup(key).filter(|value| !value.is_empty());

        if let Some(api_url) = lookup("LINKSYNC_API_URL") {
            self.api_url = api_url;
        }
        if let Some(client_id) = lookup("LINKSYNC_CLIENT_ID") {
            self.client_id = Some(client_id);
        }
        if let Some(client_secret) = lookup("LINKSYNC_CLIENT_SECRET") {
            self.client_secret = Some(client_secret);
        }
        if let Some(version) = lookup("LINKSYNC_APP_VERSION") {
            self.app_version = version
                .parse()
                .with_context(|| format!("Invalid LINKSYNC_APP_VERSION: {version:?}"))?;
        }
        Ok(self)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Resolved path of the SQLite database
    pub fn database_path(&self) -> Result<PathBuf> {
        let file = Path::new(&self.database_file);
        if file.is_absolute() {
            return Ok(file.to_path_buf());
        }
        config::config_path(&self.database_file).context("Could not determine config directory")
    }
}
