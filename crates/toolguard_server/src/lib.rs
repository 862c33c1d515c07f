//! TOOLGUARD Server
//!
//! HTTP API in front of the validation engine: batch validation, tool
//! listing and configuration reload.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod auth;
pub mod handler;
pub mod middleware;

pub use api::{router, ApiServer, ServerConfig};
pub use auth::{AuthConfig, AuthError, Authenticator};
pub use handler::{ApiError, AppState, ServerError, ToolsResponse, ValidateResponse};
pub use middleware::RateLimiter;
