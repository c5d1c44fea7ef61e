//! ytd-web server binary
//!
//! Loads `.env`, installs the tracing subscriber, reads configuration from
//! the environment and serves until SIGTERM or Ctrl-C.

use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};
use ytd_web::Config;

const DEFAULT_LOG_FILTER: &str = "info,ytd_web=debug,tower_http=info";

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is normal; real environment variables still apply
    let dotenv = dotenvy::dotenv();

    init_tracing(std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")));

    if let Err(e) = &dotenv
        && !e.not_found()
    {
        tracing::warn!(error = %e, "failed to load .env file");
    }

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let secret = std::env::var("SESSION_SECRET").unwrap_or_default();
    if secret.is_empty() || secret == ytd_web::config::PLACEHOLDER_SESSION_SECRET {
        tracing::warn!("SESSION_SECRET not set; sessions will not survive a restart");
    }

    match ytd_web::api::start_api_server(Arc::new(config)).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "server failed");
            ExitCode::FAILURE
        }
    }
}

/// Install the global subscriber; `RUST_LOG` overrides the default filter
fn init_tracing(json: bool) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_target(true))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
