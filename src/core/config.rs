//! Configuration management with layered hierarchy

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Project-local config file, looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = "dataloader.yaml";

/// Loader configuration with layered hierarchy
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// DIGIT gateway URL
    pub base_url: Option<String>,

    /// Login username
    pub username: Option<String>,

    /// Login password (prefer the environment over a file)
    pub password: Option<String>,

    /// Tenant used for login
    pub root_tenant: Option<String>,

    /// Tenant data is loaded into
    pub target_tenant: Option<String>,

    /// Delay between per-record calls
    pub throttle_ms: Option<u64>,

    /// Delay between per-locale localization calls
    pub locale_throttle_ms: Option<u64>,

    /// Wait after each boundary relationship create
    pub relationship_settle_ms: Option<u64>,

    /// Per-request timeout
    pub timeout_secs: Option<u64>,

    /// Directory for the consolidated failure workbook
    pub error_dir: Option<PathBuf>,

    /// Extra phrases that mark an error response as "already exists"
    pub duplicate_markers: Vec<String>,

    /// Locale for derived localization messages
    pub default_locale: Option<String>,

    /// Usage telemetry on/off
    pub telemetry: Option<bool>,
}

impl Config {
    pub const DEFAULT_URL: &'static str = "http://localhost:18000";
    pub const DEFAULT_USERNAME: &'static str = "ADMIN";
    pub const DEFAULT_ROOT_TENANT: &'static str = "pg";
    pub const DEFAULT_LOCALE: &'static str = "en_IN";

    /// Load configuration from all sources, merging in priority order
    pub fn load() -> Self {
        let mut config = Config::default();

        // 1. Built-in defaults (accessor fallbacks)

        // 2. Global user config (~/.config/dataloader/config.yaml)
        if let Some(global_path) = Self::global_config_path() {
            if let Some(global) = Self::read_file(&global_path) {
                config.merge(global);
            }
        }

        // 3. Working directory config (./dataloader.yaml)
        if let Some(local) = Self::read_file(&PathBuf::from(LOCAL_CONFIG_FILE)) {
            config.merge(local);
        }

        // 4. Environment variables
        config.merge_env(|key| std::env::var(key).ok());

        config
    }

    fn read_file(path: &PathBuf) -> Option<Config> {
        if !path.exists() {
            return None;
        }
        let contents = std::fs::read_to_string(path).ok()?;
        match serde_yml::from_str::<Config>(&contents) {
            Ok(c) => Some(c),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable config file");
                None
            }
        }
    }

    /// Get the path to the global config file
    fn global_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "dataloader")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Apply environment overrides through a lookup function
    pub fn merge_env<F: Fn(&str) -> Option<String>>(&mut self, lookup: F) {
        if let Some(v) = lookup("DIGIT_URL") {
            self.base_url = Some(v);
        }
        if let Some(v) = lookup("DIGIT_USERNAME") {
            self.username = Some(v);
        }
        if let Some(v) = lookup("DIGIT_PASSWORD") {
            self.password = Some(v);
        }
        if let Some(v) = lookup("ROOT_TENANT") {
            self.root_tenant = Some(v);
        }
        if let Some(v) = lookup("TARGET_TENANT") {
            self.target_tenant = Some(v);
        }
        if let Some(v) = lookup("TELEMETRY") {
            self.telemetry = Some(!v.eq_ignore_ascii_case("false"));
        }
    }

    /// Merge another config into this one (other takes precedence)
    fn merge(&mut self, other: Config) {
        if other.base_url.is_some() {
            self.base_url = other.base_url;
        }
        if other.username.is_some() {
            self.username = other.username;
        }
        if other.password.is_some() {
            self.password = other.password;
        }
        if other.root_tenant.is_some() {
            self.root_tenant = other.root_tenant;
        }
        if other.target_tenant.is_some() {
            self.target_tenant = other.target_tenant;
        }
        if other.throttle_ms.is_some() {
            self.throttle_ms = other.throttle_ms;
        }
        if other.locale_throttle_ms.is_some() {
            self.locale_throttle_ms = other.locale_throttle_ms;
        }
        if other.relationship_settle_ms.is_some() {
            self.relationship_settle_ms = other.relationship_settle_ms;
        }
        if other.timeout_secs.is_some() {
            self.timeout_secs = other.timeout_secs;
        }
        if other.error_dir.is_some() {
            self.error_dir = other.error_dir;
        }
        if !other.duplicate_markers.is_empty() {
            self.duplicate_markers.extend(other.duplicate_markers);
        }
        if other.default_locale.is_some() {
            self.default_locale = other.default_locale;
        }
        if other.telemetry.is_some() {
            self.telemetry = other.telemetry;
        }
    }

    pub fn base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| Self::DEFAULT_URL.to_string())
            .trim_end_matches('/')
            .to_string()
    }

    pub fn username(&self) -> String {
        self.username
            .clone()
            .unwrap_or_else(|| Self::DEFAULT_USERNAME.to_string())
    }

    pub fn root_tenant(&self) -> String {
        self.root_tenant
            .clone()
            .unwrap_or_else(|| Self::DEFAULT_ROOT_TENANT.to_string())
    }

    /// Tenant to load into, falling back to the root tenant
    pub fn target_tenant(&self) -> String {
        self.target_tenant.clone().unwrap_or_else(|| self.root_tenant())
    }

    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms.unwrap_or(100))
    }

    pub fn locale_throttle(&self) -> Duration {
        Duration::from_millis(self.locale_throttle_ms.unwrap_or(200))
    }

    pub fn relationship_settle(&self) -> Duration {
        Duration::from_millis(self.relationship_settle_ms.unwrap_or(2000))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(30))
    }

    pub fn error_dir(&self) -> PathBuf {
        self.error_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("errors"))
    }

    pub fn default_locale(&self) -> String {
        self.default_locale
            .clone()
            .unwrap_or_else(|| Self::DEFAULT_LOCALE.to_string())
    }

    pub fn telemetry_enabled(&self) -> bool {
        self.telemetry.unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.base_url(), Config::DEFAULT_URL);
        assert_eq!(config.target_tenant(), "pg");
        assert_eq!(config.throttle(), Duration::from_millis(100));
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert!(config.telemetry_enabled());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("DIGIT_URL", "https://unified-dev.digit.org/"),
            ("TARGET_TENANT", "pg.citest"),
            ("TELEMETRY", "FALSE"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.merge_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.base_url(), "https://unified-dev.digit.org");
        assert_eq!(config.target_tenant(), "pg.citest");
        assert!(!config.telemetry_enabled());
    }

    #[test]
    fn test_merge_file_layer() {
        let yaml = "base_url: http://example.test\nthrottle_ms: 0\nduplicate_markers:\n  - ALREADY_PRESENT\n";
        let file: Config = serde_yml::from_str(yaml).unwrap();
        let mut config = Config::default();
        config.merge(file);
        assert_eq!(config.base_url(), "http://example.test");
        assert_eq!(config.throttle(), Duration::ZERO);
        assert_eq!(config.duplicate_markers, vec!["ALREADY_PRESENT".to_string()]);
    }
}
