// Configuration module for the MEMD client
//
// This module handles API connection settings, environment variable loading
// and the local configuration directory used by the CLI.

pub mod manager;
pub mod types;

// Re-export commonly used types
pub use manager::{load_env, ConfigManager};
pub use types::{ApiConfig, ApiSettings, ConfigPaths, EnvVars, LogLevel, Mode};
