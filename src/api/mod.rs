//! REST API server module
//!
//! Serves the JSON API under `/api` and the single-page frontend from the
//! configured public directory.

use crate::{Config, Result};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderName, HeaderValue, header},
    middleware,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    services::{ServeDir, ServeFile},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};

pub mod auth;
pub mod client;
pub mod error_response;
pub mod openapi;
pub mod rate_limit;
pub mod routes;
pub mod state;

pub use client::ClientId;
pub use openapi::ApiDoc;
pub use state::AppState;

const CONTENT_SECURITY_POLICY: &str = "default-src 'self'; script-src 'self'; \
     style-src 'self' 'unsafe-inline'; img-src 'self' data:; connect-src 'self'";

/// Create the router with all route definitions
///
/// # Routes
///
/// ## Auth
/// - `GET /api/auth/status` - Whether the session is authenticated
/// - `POST /api/auth/verify` - Verify the PIN, start a session
/// - `POST /api/auth/logout` - End the session
///
/// ## Download (session required)
/// - `POST /api/download` - Extract audio and stream the MP3
///
/// ## System
/// - `GET /api/health` - Health check
/// - `GET /api/openapi.json` - OpenAPI specification
///
/// Any other `/api` path is a JSON 404. Everything else is served from the
/// public directory, falling back to its `index.html`.
pub fn create_router(state: AppState) -> Router {
    let config = state.config.clone();

    let public = Router::new()
        .route("/auth/status", get(routes::auth_status))
        .route("/auth/verify", post(routes::verify_pin))
        .route("/auth/logout", post(routes::logout))
        .route("/health", get(routes::health_check))
        .route("/openapi.json", get(routes::openapi_spec));

    let protected = Router::new()
        .route("/download", post(routes::download_audio))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_session,
        ));

    let api = public
        .merge(protected)
        .fallback(routes::api_not_found)
        .layer(DefaultBodyLimit::max(config.api.max_body_bytes));

    // Rate limiting wraps everything under /api, so it runs before auth
    let api = if config.api.rate_limit.enabled {
        let limiter = Arc::new(rate_limit::RateLimiter::new(
            config.api.rate_limit.clone(),
            config.api.trust_proxy,
        ));
        api.layer(middleware::from_fn_with_state(
            limiter,
            rate_limit::rate_limit_middleware,
        ))
    } else {
        api
    };

    let public_dir = &config.api.public_dir;
    let spa = ServeDir::new(public_dir).fallback(ServeFile::new(public_dir.join("index.html")));

    let router = Router::new()
        .nest("/api", api)
        .fallback_service(spa)
        .with_state(state);

    let router = with_security_headers(router).layer(TraceLayer::new_for_http());

    if config.api.cors_enabled {
        router.layer(build_cors_layer(&config.api.cors_origins))
    } else {
        router
    }
}

/// Attach the security headers every response carries
fn with_security_headers(router: Router) -> Router {
    let headers = [
        (header::CONTENT_SECURITY_POLICY, CONTENT_SECURITY_POLICY),
        (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        (header::X_FRAME_OPTIONS, "SAMEORIGIN"),
        (header::REFERRER_POLICY, "no-referrer"),
    ];

    headers
        .into_iter()
        .fold(router, |router, (name, value): (HeaderName, &'static str)| {
            router.layer(SetResponseHeaderLayer::if_not_present(
                name,
                HeaderValue::from_static(value),
            ))
        })
}

/// Build a CORS layer based on configured origins
///
/// `"*"` or an empty list allows any origin.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Start the API server on the configured bind address.
///
/// Runs until Ctrl-C or SIGTERM, then stops accepting connections and
/// lets in-flight requests finish.
///
/// # Example
///
/// ```no_run
/// use ytd_web::Config;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Arc::new(Config::from_env()?);
/// ytd_web::api::start_api_server(config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(config: Arc<Config>) -> Result<()> {
    let bind_address = config.api.bind_address;
    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    serve(listener, config, crate::wait_for_signal()).await
}

/// Serve the API on an already bound listener until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, config: Arc<Config>, shutdown: F) -> Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let address = listener.local_addr().map_err(crate::error::Error::Io)?;

    tracing::info!(
        %address,
        temp_dir = ?config.download.temp_dir,
        extractor = ?config.download.binary_path,
        "API server listening"
    );

    if config.api.forwarded_for_is_spoofable() {
        tracing::warn!(
            %address,
            "TRUST_PROXY is on while the listener is publicly reachable; direct clients can \
             rotate X-Forwarded-For to reset their PIN lockout and rate limit"
        );
    }

    let app = create_router(AppState::new(config));

    // ConnectInfo<SocketAddr> feeds client identification when no proxy header is trusted
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
