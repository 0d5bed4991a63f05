// Configuration types for the MEMD client
//
// This module defines the API connection settings, the environment variable
// names they can be read from, and the local paths used by the CLI.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default request timeout when none is configured
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// Log level accepted by the CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Critical,
    Null,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Warning
    }
}

impl LogLevel {
    /// Equivalent `tracing` filter directive
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Critical => "error",
            LogLevel::Null => "off",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warning => write!(f, "warning"),
            LogLevel::Critical => write!(f, "critical"),
            LogLevel::Null => write!(f, "null"),
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warning" | "warn" => Ok(LogLevel::Warning),
            "critical" | "error" => Ok(LogLevel::Critical),
            "null" | "off" => Ok(LogLevel::Null),
            _ => Err(format!("Invalid log level: {}", s)),
        }
    }
}

/// Run mode; test mode persists request and response payloads locally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Prod,
    Test,
}

/// Partially specified API settings, as read from a file or the environment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiSettings {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

impl ApiSettings {
    /// Overlay every value present in `other` on top of this one
    pub fn merge(&mut self, other: ApiSettings) {
        fn overlay<T>(target: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *target = value;
            }
        }

        overlay(&mut self.base_url, other.base_url);
        overlay(&mut self.username, other.username);
        overlay(&mut self.password, other.password);
        overlay(&mut self.client_id, other.client_id);
        overlay(&mut self.client_secret, other.client_secret);
        overlay(&mut self.timeout_seconds, other.timeout_seconds);
    }

    /// Names of required keys that are missing or blank
    pub fn missing_keys(&self) -> Vec<&'static str> {
        let fields = [
            ("base_url", &self.base_url),
            ("username", &self.username),
            ("password", &self.password),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
        ];

        fields
            .iter()
            .filter(|(_, value)| value.as_deref().map_or(true, |v| v.trim().is_empty()))
            .map(|(name, _)| *name)
            .collect()
    }

    /// Turn the settings into a complete configuration
    pub fn into_config(self) -> Result<ApiConfig> {
        let missing = self.missing_keys();
        if !missing.is_empty() {
            anyhow::bail!("api config missing {}", missing.join(", "));
        }

        let required = |value: Option<String>| value.unwrap_or_default();
        Ok(ApiConfig {
            base_url: required(self.base_url).trim_end_matches('/').to_string(),
            username: required(self.username),
            password: required(self.password),
            client_id: required(self.client_id),
            client_secret: required(self.client_secret),
            timeout_seconds: self.timeout_seconds,
        })
    }
}

/// On-disk layout of an API config file: settings live under `[api]`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiConfigFile {
    #[serde(default)]
    pub api: ApiSettings,
}

/// Complete connection settings for the MEMD API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL without a trailing slash
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub client_id: String,
    pub client_secret: String,
    /// Request timeout in seconds
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

impl ApiConfig {
    /// Request timeout, falling back to the default
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS))
    }
}

/// Environment variable names read by the client
pub struct EnvVars;

impl EnvVars {
    pub const BASE_URL: &'static str = "MEMD_API_BASE_URL";
    pub const USERNAME: &'static str = "MEMD_API_USERNAME";
    pub const PASSWORD: &'static str = "MEMD_API_PASSWORD";
    pub const CLIENT_ID: &'static str = "MEMD_API_CLIENT_ID";
    pub const CLIENT_SECRET: &'static str = "MEMD_API_CLIENT_SECRET";
    pub const TIMEOUT_SECONDS: &'static str = "MEMD_API_TIMEOUT_SECONDS";
    pub const HOME: &'static str = "MEMD_API_HOME";

    /// Suffix that redirects a variable to a file holding its value
    pub const FILE_SUFFIX: &'static str = "_FILE";
}

/// Configuration file paths and names
pub struct ConfigPaths;

impl ConfigPaths {
    /// Default home directory name
    pub const HOME_DIR_NAME: &'static str = ".memd_api";

    /// Configuration directory name inside the home directory
    pub const CONF_DIR_NAME: &'static str = "conf";

    /// API configuration file name
    pub const API_CONFIG_FILE: &'static str = "api.toml";

    /// Member defaults file name
    pub const DEFAULTS_FILE: &'static str = "defaults.json";

    /// Get the home directory, honouring `MEMD_API_HOME`
    pub fn home_dir() -> Result<PathBuf> {
        if let Ok(home) = std::env::var(EnvVars::HOME) {
            return Ok(PathBuf::from(home));
        }
        dirs::home_dir()
            .map(|home| home.join(Self::HOME_DIR_NAME))
            .context("Failed to determine home directory")
    }

    /// Get the configuration directory
    pub fn conf_dir() -> Result<PathBuf> {
        Ok(Self::home_dir()?.join(Self::CONF_DIR_NAME))
    }

    /// Get the default API configuration file path
    pub fn api_config_file() -> Result<PathBuf> {
        Ok(Self::conf_dir()?.join(Self::API_CONFIG_FILE))
    }

    /// Get the default member defaults file path
    pub fn defaults_file() -> Result<PathBuf> {
        Ok(Self::conf_dir()?.join(Self::DEFAULTS_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_settings() -> ApiSettings {
        ApiSettings {
            base_url: Some("https://memd.test/api/".to_string()),
            username: Some("user".to_string()),
            password: Some("pass".to_string()),
            client_id: Some("id".to_string()),
            client_secret: Some("secret".to_string()),
            timeout_seconds: None,
        }
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!("info".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert_eq!("WARN".parse::<LogLevel>().unwrap(), LogLevel::Warning);
        assert_eq!("null".parse::<LogLevel>().unwrap(), LogLevel::Null);
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_log_level_filters() {
        assert_eq!(LogLevel::default(), LogLevel::Warning);
        assert_eq!(LogLevel::Warning.as_filter(), "warn");
        assert_eq!(LogLevel::Critical.as_filter(), "error");
        assert_eq!(LogLevel::Null.as_filter(), "off");
        assert_eq!(LogLevel::Critical.to_string(), "critical");
    }

    #[test]
    fn test_into_config_strips_trailing_slash() {
        let config = complete_settings().into_config().unwrap();
        assert_eq!(config.base_url, "https://memd.test/api");
        assert_eq!(config.timeout(), Duration::from_secs(DEFAULT_TIMEOUT_SECONDS));
    }

    #[test]
    fn test_missing_keys_are_named() {
        let mut settings = complete_settings();
        settings.password = None;
        settings.client_secret = Some("  ".to_string());

        assert_eq!(settings.missing_keys(), vec!["password", "client_secret"]);
        let err = settings.into_config().unwrap_err();
        assert_eq!(err.to_string(), "api config missing password, client_secret");
    }

    #[test]
    fn test_merge_overlays_present_values() {
        let mut settings = complete_settings();
        settings.merge(ApiSettings {
            username: Some("other".to_string()),
            timeout_seconds: Some(5),
            ..Default::default()
        });

        assert_eq!(settings.username.as_deref(), Some("other"));
        assert_eq!(settings.password.as_deref(), Some("pass"));
        assert_eq!(settings.timeout_seconds, Some(5));
    }

    #[test]
    fn test_config_file_layout() {
        let file: ApiConfigFile = toml::from_str(
            r#"
            [api]
            base_url = "https://memd.test"
            username = "u"
            timeout_seconds = 12
            "#,
        )
        .unwrap();

        assert_eq!(file.api.base_url.as_deref(), Some("https://memd.test"));
        assert_eq!(file.api.timeout_seconds, Some(12));
        assert!(file.api.password.is_none());
    }
}
