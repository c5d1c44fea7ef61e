//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`auth`] - PIN verification and session status
//! - [`download`] - Audio extraction and streaming
//! - [`system`] - Health, OpenAPI, unknown-route fallback

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

mod auth;
mod download;
mod system;

pub use auth::*;
pub use download::*;
pub use system::*;

/// Body of `POST /api/auth/verify`
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct VerifyPinRequest {
    /// Four-digit PIN
    #[serde(default)]
    pub pin: Option<String>,
}

/// Session state returned by the auth endpoints
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthStatus {
    /// Whether the caller's session is authenticated
    pub authenticated: bool,
}

/// Body of `POST /api/download`
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct DownloadRequest {
    /// youtube.com or youtu.be link
    #[serde(default)]
    pub url: Option<String>,
}

/// Body of `GET /api/health`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Always `"ok"`
    pub status: String,
    /// Crate version
    pub version: String,
}
