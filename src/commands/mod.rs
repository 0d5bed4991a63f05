// CLI command handlers
//
// Handlers take a resolved `CommandContext` and write their results to a
// caller-supplied output so the binary prints to stdout and tests capture it.

pub mod member;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::api::MemdClient;
use crate::config::{ConfigManager, ConfigPaths, Mode};
use crate::workspace::Workspace;

pub use member::{MemberCommand, DEFAULT_PLAN_CODE};

/// Everything a command needs besides its own arguments
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub mode: Mode,
    pub config: ConfigManager,
    pub workspace: Workspace,
    /// Member defaults used by `member create` when `--defaults` is not given
    pub defaults_file: PathBuf,
}

impl CommandContext {
    pub fn new(mode: Mode, config: ConfigManager, workspace: Workspace, defaults_file: PathBuf) -> Self {
        Self {
            mode,
            config,
            workspace,
            defaults_file,
        }
    }

    /// Resolve configuration from the local home directory
    ///
    /// The home `conf/` templates are seeded first. An explicit `api_config`
    /// path that does not exist yet is seeded from the template as well.
    pub fn from_local_files(mode: Mode, api_config: Option<&Path>, workspace: Workspace) -> Result<Self> {
        ConfigManager::ensure_local_files()?;

        let config_path = match api_config {
            Some(path) => path.to_path_buf(),
            None => ConfigPaths::api_config_file()?,
        };
        let config = ConfigManager::load_or_seed(&config_path)
            .with_context(|| format!("Could not load API config {}", config_path.display()))?;

        Ok(Self::new(mode, config, workspace, ConfigPaths::defaults_file()?))
    }

    pub fn is_test_mode(&self) -> bool {
        self.mode == Mode::Test
    }

    /// Build an API client; fails when the configuration is incomplete
    pub fn client(&self) -> Result<MemdClient> {
        let api_config = self.config.api_config()?;
        MemdClient::new(&api_config).context("Failed to create MEMD API client")
    }
}
