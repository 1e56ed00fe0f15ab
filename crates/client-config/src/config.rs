//! Configuration management.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default API base URL (can be overridden at compile time via AUTHCTL_API_BASE_URL).
pub const DEFAULT_API_BASE_URL: &str = match option_env!("AUTHCTL_API_BASE_URL") {
    Some(url) => url,
    None => "http://localhost:8000",
};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Refresh exchange endpoint, relative to the API base URL.
pub const DEFAULT_REFRESH_PATH: &str = "/auth/token/refresh/";

/// Persisted lifetime of the access credential (1 day).
pub const DEFAULT_ACCESS_TOKEN_TTL_SECS: u64 = 24 * 60 * 60;

/// Persisted lifetime of the refresh credential (7 days).
pub const DEFAULT_REFRESH_TOKEN_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Upper bound on a single refresh exchange.
pub const DEFAULT_REFRESH_TIMEOUT_SECS: u64 = 30;

/// Upper bound on an ordinary API request.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Base URL every request path is joined to.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Path of the refresh exchange endpoint.
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,
    #[serde(default = "default_access_token_ttl_secs")]
    pub access_token_ttl_secs: u64,
    #[serde(default = "default_refresh_token_ttl_secs")]
    pub refresh_token_ttl_secs: u64,
    #[serde(default = "default_refresh_timeout_secs")]
    pub refresh_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_refresh_path() -> String {
    DEFAULT_REFRESH_PATH.to_string()
}

fn default_access_token_ttl_secs() -> u64 {
    DEFAULT_ACCESS_TOKEN_TTL_SECS
}

fn default_refresh_token_ttl_secs() -> u64 {
    DEFAULT_REFRESH_TOKEN_TTL_SECS
}

fn default_refresh_timeout_secs() -> u64 {
    DEFAULT_REFRESH_TIMEOUT_SECS
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            api_base_url: default_api_base_url(),
            refresh_path: default_refresh_path(),
            access_token_ttl_secs: DEFAULT_ACCESS_TOKEN_TTL_SECS,
            refresh_token_ttl_secs: DEFAULT_REFRESH_TOKEN_TTL_SECS,
            refresh_timeout_secs: DEFAULT_REFRESH_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.apply_env(|name| std::env::var(name).ok());
        config
    }

    /// Load configuration from `paths`, falling back to defaults when the
    /// file does not exist. Environment variables win over the file.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Override fields from `AUTHCTL_*` variables resolved through `lookup`.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(log_level) = non_empty("AUTHCTL_LOG_LEVEL") {
            self.log_level = log_level;
        }
        if let Some(url) = non_empty("AUTHCTL_API_BASE_URL") {
            self.api_base_url = url;
        }
        if let Some(raw) = non_empty("AUTHCTL_REFRESH_TIMEOUT_SECS") {
            match raw.trim().parse() {
                Ok(secs) => self.refresh_timeout_secs = secs,
                Err(_) => tracing::warn!(
                    value = %raw,
                    "Ignoring AUTHCTL_REFRESH_TIMEOUT_SECS, not a number of seconds"
                ),
            }
        }
    }

    /// Reject configurations the client cannot run with.
    pub fn validate(&self) -> CoreResult<()> {
        self.api_base_url()?;
        if !self.refresh_path.starts_with('/') {
            return Err(CoreError::Config(format!(
                "refresh_path must start with '/': {}",
                self.refresh_path
            )));
        }
        if self.access_token_ttl_secs == 0 || self.refresh_token_ttl_secs == 0 {
            return Err(CoreError::Config(
                "token lifetimes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// The API base URL, parsed.
    pub fn api_base_url(&self) -> CoreResult<Url> {
        Url::parse(&self.api_base_url).map_err(CoreError::from)
    }

    pub fn access_token_ttl(&self) -> Duration {
        Duration::from_secs(self.access_token_ttl_secs)
    }

    pub fn refresh_token_ttl(&self) -> Duration {
        Duration::from_secs(self.refresh_token_ttl_secs)
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
