//! MEMD Client Library
//!
//! This library provides a blocking client for the MEMD partner membership
//! API: token management, an authenticated JSON transport, member payload
//! validation and the member/policy lifecycle operations.

pub mod api;
pub mod commands;
pub mod config;
pub mod member;
pub mod schema;
pub mod utils;
pub mod workspace;

// Re-export main types for convenience
pub use api::{ApiError, ApiResult, MemdClient};
pub use config::{ApiConfig, ConfigManager};
pub use member::{EnsureOutcome, PolicyChange, PrimaryMember, TerminatedPolicy, TerminationOutcome};
pub use workspace::Workspace;
