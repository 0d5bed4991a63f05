// Configuration Manager implementation for the MEMD client
//
// This module resolves API settings from a config file and the process
// environment, and seeds the local configuration directory on first use.

use anyhow::{Context, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use super::types::{ApiConfig, ApiConfigFile, ApiSettings, ConfigPaths, EnvVars};

/// Template written to `conf/api.toml` when it does not exist yet
pub const API_CONFIG_TEMPLATE: &str = include_str!("../../data/api.toml");

/// Template written to `conf/defaults.json` when it does not exist yet
pub const MEMBER_DEFAULTS_TEMPLATE: &str = include_str!("../../data/defaults.json");

/// Read an environment variable, or the file named by its `_FILE` companion
///
/// Returns `Ok(None)` when neither is set. File contents have trailing
/// newlines removed.
pub fn load_env(name: &str) -> Result<Option<String>> {
    if let Ok(value) = env::var(name) {
        return Ok(Some(value));
    }

    let file_var = format!("{}{}", name, EnvVars::FILE_SUFFIX);
    match env::var(&file_var) {
        Ok(path) if !path.is_empty() => {
            let path = PathBuf::from(path);
            if !path.is_file() {
                tracing::warn!("{} points to {:?}, which is not a file", file_var, path);
                return Ok(None);
            }
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {} from {:?}", name, path))?;
            tracing::debug!("Loaded {} from {:?}", name, path);
            Ok(Some(content.trim_end_matches(['\r', '\n']).to_string()))
        }
        _ => Ok(None),
    }
}

/// Resolves MEMD API settings
#[derive(Debug, Clone, Default)]
pub struct ConfigManager {
    /// Merged settings; environment wins over file
    settings: ApiSettings,
    /// File the settings were read from, if any
    config_file: Option<PathBuf>,
}

impl ConfigManager {
    /// Build a configuration purely from environment variables
    pub fn from_env() -> Result<Self> {
        let mut manager = Self::default();
        manager.settings.merge(Self::settings_from_env()?);
        Ok(manager)
    }

    /// Build a configuration from a file, with environment overrides on top
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!("Loading API configuration from: {:?}", path);

        let mut manager = Self {
            settings: Self::read_config_file(path)?.api,
            config_file: Some(path.to_path_buf()),
        };
        manager.settings.merge(Self::settings_from_env()?);

        Ok(manager)
    }

    /// Load from `path`, seeding it from the template first when missing
    pub fn load_or_seed<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }
            fs::write(path, API_CONFIG_TEMPLATE)
                .with_context(|| format!("Failed to write config template: {}", path.display()))?;
            tracing::info!("Created API configuration template at {:?}", path);
        }
        Self::from_file(path)
    }

    fn read_config_file(path: &Path) -> Result<ApiConfigFile> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read API configuration file: {}", path.display()))?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map_or(false, |ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            serde_json::from_str(&content).context("Failed to parse API configuration file")
        } else {
            toml::from_str(&content).context("Failed to parse API configuration file")
        }
    }

    fn settings_from_env() -> Result<ApiSettings> {
        let timeout_seconds = match load_env(EnvVars::TIMEOUT_SECONDS)? {
            Some(raw) => Some(
                raw.trim()
                    .parse::<u64>()
                    .with_context(|| format!("{} must be a whole number of seconds", EnvVars::TIMEOUT_SECONDS))?,
            ),
            None => None,
        };

        Ok(ApiSettings {
            base_url: load_env(EnvVars::BASE_URL)?,
            username: load_env(EnvVars::USERNAME)?,
            password: load_env(EnvVars::PASSWORD)?,
            client_id: load_env(EnvVars::CLIENT_ID)?,
            client_secret: load_env(EnvVars::CLIENT_SECRET)?,
            timeout_seconds,
        })
    }

    /// Merged settings, possibly incomplete
    pub fn settings(&self) -> &ApiSettings {
        &self.settings
    }

    pub fn config_file(&self) -> Option<&Path> {
        self.config_file.as_deref()
    }

    /// Complete API configuration, failing on the first set of missing keys
    pub fn api_config(&self) -> Result<ApiConfig> {
        let config = self.settings.clone().into_config();
        match &self.config_file {
            Some(path) => {
                config.with_context(|| format!("Invalid API configuration in {}", path.display()))
            }
            None => config,
        }
    }

    /// Create the local home and conf directories and seed missing templates
    pub fn ensure_local_files() -> Result<PathBuf> {
        let conf_dir = ConfigPaths::conf_dir()?;
        fs::create_dir_all(&conf_dir)
            .with_context(|| format!("Failed to create configuration directory: {}", conf_dir.display()))?;

        let seeds = [
            (ConfigPaths::API_CONFIG_FILE, API_CONFIG_TEMPLATE),
            (ConfigPaths::DEFAULTS_FILE, MEMBER_DEFAULTS_TEMPLATE),
        ];
        for (name, template) in seeds {
            let path = conf_dir.join(name);
            if !path.exists() {
                fs::write(&path, template)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                tracing::debug!("Seeded {:?}", path);
            }
        }

        Ok(conf_dir)
    }
}
