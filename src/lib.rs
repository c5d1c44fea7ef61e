//! # ytd-web
//!
//! Single-user web gateway that turns YouTube links into MP3 downloads.
//!
//! ## Overview
//!
//! - **PIN gate** - a shared 4-digit PIN unlocks an encrypted session
//!   cookie. Repeated failures lock the client out for a while
//!   ([`LockoutGuard`]).
//! - **Extraction pipeline** - each request runs one `yt-dlp` process
//!   ([`DownloadPipeline`]), streams the finished MP3 back and deletes every
//!   temporary file the job produced on every exit path.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use ytd_web::Config;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     ytd_web::api::start_api_server(Arc::new(config)).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API and static file serving
pub mod api;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Per-client PIN lockout
pub mod lockout;
/// yt-dlp extraction pipeline
pub mod pipeline;
/// URL, PIN and filename validation
pub mod validation;

// Re-export commonly used types
pub use config::{ApiConfig, AuthConfig, Config, DownloadConfig, LockoutConfig, RateLimitConfig};
pub use error::{ApiError, Error, PipelineError, Result, ToHttpStatus};
pub use lockout::LockoutGuard;
pub use pipeline::{DownloadPipeline, DownloadProgress, DownloadStatus, DownloadedAudio};

/// Resolves once the process is asked to stop.
///
/// - **Unix:** SIGTERM or SIGINT, falling back to whichever handler registers.
/// - **Windows/other:** Ctrl+C via `tokio::signal::ctrl_c()`.
#[cfg(unix)]
pub(crate) async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
            tracing::info!("Received SIGINT signal (Ctrl+C)");
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("Received SIGTERM signal");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
pub(crate) async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
