//! Error types for ytd-web
//!
//! This module provides:
//! - The crate-wide [`Error`] type and its pipeline sub-error
//! - HTTP status code mapping for the API layer
//! - The JSON error body returned to clients

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for ytd-web operations
pub type Result<T> = std::result::Result<T, Error>;

/// Message shown to clients for any pipeline failure; diagnostics stay in the server log.
pub const PIPELINE_FAILURE_MESSAGE: &str =
    "Failed to download audio. Please check the URL and try again.";

/// Main error type for ytd-web
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The environment variable or field that caused the error (e.g., "PIN")
        key: Option<String>,
    },

    /// User-correctable input error (bad URL, missing or malformed PIN)
    #[error("{0}")]
    Validation(String),

    /// Wrong PIN or missing session
    #[error("{0}")]
    Unauthorized(String),

    /// Client is locked out after repeated PIN failures
    #[error("too many failed attempts, locked for {seconds}s")]
    LockedOut {
        /// Seconds until the lockout expires
        seconds: u64,
    },

    /// The extraction pipeline failed
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),
}

/// Failures of the external extraction process and its temp files
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The extractor binary could not be started
    #[error("failed to start {binary}: {reason}")]
    Spawn {
        /// The binary that was invoked
        binary: PathBuf,
        /// The underlying OS error
        reason: String,
    },

    /// The extractor exited unsuccessfully or was terminated by a signal
    #[error("extractor failed (exit code {code:?}): {diagnostics}")]
    Failed {
        /// Exit code, `None` when killed by a signal
        code: Option<i32>,
        /// Captured process output
        diagnostics: String,
    },

    /// The extractor ran past the configured ceiling and was killed
    #[error("extractor timed out after {after:?}")]
    TimedOut {
        /// The ceiling that was exceeded
        after: Duration,
    },

    /// The extractor produced more diagnostic output than allowed
    #[error("extractor output exceeded {limit} bytes")]
    OutputTooLarge {
        /// The byte cap that was exceeded
        limit: usize,
    },

    /// The extractor reported success but the expected file is absent
    #[error("extractor completed but output file {path} is missing")]
    OutputMissing {
        /// Where the output was expected
        path: PathBuf,
    },

    /// Filesystem failure around the job's temp files
    #[error("temp file error at {path}: {reason}")]
    Resource {
        /// The path being created, read or opened
        path: PathBuf,
        /// The underlying failure
        reason: String,
    },
}

impl PipelineError {
    /// Build a [`PipelineError::Resource`] from an I/O error
    pub fn resource(path: impl Into<PathBuf>, error: &std::io::Error) -> Self {
        Self::Resource {
            path: path.into(),
            reason: error.to_string(),
        }
    }
}

/// API error response format
///
/// ```json
/// { "error": "Too many failed attempts", "lockoutSeconds": 30 }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Human-readable error message
    pub error: String,

    /// Seconds until the client may retry, present only for lockouts
    #[serde(
        rename = "lockoutSeconds",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub lockout_seconds: Option<u64>,
}

impl ApiError {
    /// Create an API error with a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            lockout_seconds: None,
        }
    }

    /// Create a lockout error carrying the remaining seconds
    pub fn locked_out(seconds: u64) -> Self {
        Self {
            error: "Too many failed attempts".to_string(),
            lockout_seconds: Some(seconds),
        }
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::Unauthorized(_) => 401,
            Error::LockedOut { .. } => 429,

            Error::Config { .. } => 500,
            Error::Pipeline(_) => 500,
            Error::Io(_) => 500,
            Error::ApiServerError(_) => 500,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Validation(_) => "validation_error",
            Error::Unauthorized(_) => "unauthorized",
            Error::LockedOut { .. } => "locked_out",
            Error::Pipeline(e) => match e {
                PipelineError::Spawn { .. } => "extractor_spawn_failed",
                PipelineError::Failed { .. } => "extractor_failed",
                PipelineError::TimedOut { .. } => "extractor_timed_out",
                PipelineError::OutputTooLarge { .. } => "extractor_output_too_large",
                PipelineError::OutputMissing { .. } => "output_missing",
                PipelineError::Resource { .. } => "resource_error",
            },
            Error::Io(_) => "io_error",
            Error::ApiServerError(_) => "api_server_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        match error {
            Error::LockedOut { seconds } => ApiError::locked_out(seconds),
            Error::Validation(message) | Error::Unauthorized(message) => ApiError::new(message),
            Error::Pipeline(_) | Error::Io(_) => ApiError::new(PIPELINE_FAILURE_MESSAGE),
            Error::Config { .. } | Error::ApiServerError(_) => {
                ApiError::new("Internal server error")
            }
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    /// Returns (Error, expected_status_code, expected_error_code) for every match arm
    fn all_error_variants() -> Vec<(Error, u16, &'static str)> {
        vec![
            (
                Error::Config {
                    message: "bad pin".into(),
                    key: Some("PIN".into()),
                },
                500,
                "config_error",
            ),
            (
                Error::Validation("URL is required".into()),
                400,
                "validation_error",
            ),
            (
                Error::Unauthorized("Invalid PIN".into()),
                401,
                "unauthorized",
            ),
            (Error::LockedOut { seconds: 30 }, 429, "locked_out"),
            (
                Error::Pipeline(PipelineError::Spawn {
                    binary: PathBuf::from("yt-dlp"),
                    reason: "not found".into(),
                }),
                500,
                "extractor_spawn_failed",
            ),
            (
                Error::Pipeline(PipelineError::Failed {
                    code: Some(1),
                    diagnostics: "ERROR: unavailable".into(),
                }),
                500,
                "extractor_failed",
            ),
            (
                Error::Pipeline(PipelineError::TimedOut {
                    after: Duration::from_secs(300),
                }),
                500,
                "extractor_timed_out",
            ),
            (
                Error::Pipeline(PipelineError::OutputTooLarge { limit: 1024 }),
                500,
                "extractor_output_too_large",
            ),
            (
                Error::Pipeline(PipelineError::OutputMissing {
                    path: PathBuf::from("/tmp/x.mp3"),
                }),
                500,
                "output_missing",
            ),
            (
                Error::Pipeline(PipelineError::Resource {
                    path: PathBuf::from("/tmp"),
                    reason: "read-only".into(),
                }),
                500,
                "resource_error",
            ),
            (
                Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone")),
                500,
                "io_error",
            ),
            (
                Error::ApiServerError("bind failed".into()),
                500,
                "api_server_error",
            ),
        ]
    }

    #[test]
    fn every_variant_maps_to_expected_status_and_code() {
        for (error, status, code) in all_error_variants() {
            assert_eq!(error.status_code(), status, "status for {error:?}");
            assert_eq!(error.error_code(), code, "code for {error:?}");
        }
    }

    #[test]
    fn lockout_body_carries_seconds() {
        let api_error: ApiError = Error::LockedOut { seconds: 17 }.into();
        let json = serde_json::to_value(&api_error).unwrap();

        assert_eq!(json["error"], "Too many failed attempts");
        assert_eq!(json["lockoutSeconds"], 17);
    }

    #[test]
    fn pipeline_diagnostics_are_not_exposed() {
        let api_error: ApiError = Error::Pipeline(PipelineError::Failed {
            code: Some(1),
            diagnostics: "ERROR: /home/secret/cookies.txt".into(),
        })
        .into();

        assert_eq!(api_error.error, PIPELINE_FAILURE_MESSAGE);
        assert!(!api_error.error.contains("secret"));
    }

    #[test]
    fn plain_errors_omit_lockout_field() {
        let api_error: ApiError = Error::Validation("PIN is required".into()).into();
        let json = serde_json::to_string(&api_error).unwrap();

        assert_eq!(json, r#"{"error":"PIN is required"}"#);
    }
}
