//! Client configuration.
//!
//! This module resolves where the platform lives and where credentials are
//! stored. Both can be overridden through the environment:
//!
//! - `DOXA_BASE_URL` selects the platform (defaults to `https://doxaai.com`)
//! - `DOXA_CONFIG_DIRECTORY` selects the credential directory (defaults to
//!   the per-user config directory, e.g. `~/.config/doxa`)

use std::path::{Path, PathBuf};

use crate::auth::CredentialStore;

/// Application name used for the config directory path
const APP_NAME: &str = "doxa";

/// Fallback directory name under the home directory
const HOME_DIR_NAME: &str = ".doxa";

/// Platform used when `DOXA_BASE_URL` is unset
pub const DEFAULT_BASE_URL: &str = "https://doxaai.com";

/// OAuth client identifier registered for the CLI
pub const CLIENT_ID: &str = "eb594ca3-023d-477f-823a-22e48f4e5235";

/// OAuth scope requested during device login
pub const SCOPE: &str = "basic";

pub const BASE_URL_ENV: &str = "DOXA_BASE_URL";
pub const CONFIG_DIRECTORY_ENV: &str = "DOXA_CONFIG_DIRECTORY";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    base_url: String,
    config_dir: PathBuf,
}

impl Config {
    pub fn new(base_url: impl Into<String>, config_dir: impl Into<PathBuf>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            config_dir: config_dir.into(),
        }
    }

    /// Build the configuration from `DOXA_BASE_URL` and `DOXA_CONFIG_DIRECTORY`.
    pub fn from_env() -> Self {
        let base_url = std::env::var(BASE_URL_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let config_dir = std::env::var_os(CONFIG_DIRECTORY_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(Self::default_config_dir);

        Self::new(base_url, config_dir)
    }

    fn default_config_dir() -> PathBuf {
        if let Some(dir) = dirs::config_dir() {
            return dir.join(APP_NAME);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(HOME_DIR_NAME)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn credential_store(&self) -> CredentialStore {
        CredentialStore::new(&self.config_dir)
    }

    pub fn device_code_url(&self) -> String {
        format!("{}/api/oauth/device/code", self.base_url)
    }

    pub fn token_url(&self) -> String {
        format!("{}/api/oauth/token", self.base_url)
    }

    pub fn user_url(&self) -> String {
        format!("{}/api/oauth/user", self.base_url)
    }

    pub fn upload_slot_url(&self) -> String {
        format!("{}/api/extern/upload-slot", self.base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints_derive_from_base_url() {
        let config = Config::new("https://example.test/", "/tmp/doxa");
        assert_eq!(config.base_url(), "https://example.test");
        assert_eq!(
            config.device_code_url(),
            "https://example.test/api/oauth/device/code"
        );
        assert_eq!(config.token_url(), "https://example.test/api/oauth/token");
        assert_eq!(config.user_url(), "https://example.test/api/oauth/user");
        assert_eq!(
            config.upload_slot_url(),
            "https://example.test/api/extern/upload-slot"
        );
    }

    #[test]
    fn test_credential_store_location() {
        let config = Config::new(DEFAULT_BASE_URL, "/tmp/doxa");
        assert_eq!(
            config.credential_store().path(),
            PathBuf::from("/tmp/doxa/config.json")
        );
    }
}
