// MEMD API access
//
// Token acquisition, the authenticated HTTP transport and the error type
// shared by every remote operation.

pub mod auth;
pub mod client;
pub mod error;

pub use auth::{AccessToken, TokenManager};
pub use client::MemdClient;
pub use error::{ApiError, ApiResult};
