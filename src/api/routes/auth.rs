//! Auth handlers: status, PIN verification, logout.

use super::{AuthStatus, VerifyPinRequest};
use crate::api::AppState;
use crate::api::auth::{constant_time_eq, end_session, is_authenticated, start_session};
use crate::api::client::ClientId;
use crate::error::{Error, Result};
use crate::validation::is_valid_pin;
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use axum_extra::extract::PrivateCookieJar;

/// GET /auth/status - Whether the caller is authenticated
#[utoipa::path(
    get,
    path = "/api/auth/status",
    tag = "auth",
    responses(
        (status = 200, description = "Session state", body = AuthStatus)
    )
)]
pub async fn auth_status(jar: PrivateCookieJar) -> Json<AuthStatus> {
    Json(AuthStatus {
        authenticated: is_authenticated(&jar),
    })
}

/// POST /auth/verify - Verify the PIN and start a session
///
/// A locked-out client is rejected before its PIN is looked at. A missing or
/// malformed PIN is a 400 and does not count as a failed attempt.
#[utoipa::path(
    post,
    path = "/api/auth/verify",
    tag = "auth",
    request_body = VerifyPinRequest,
    responses(
        (status = 200, description = "PIN accepted, session cookie set", body = AuthStatus),
        (status = 400, description = "PIN missing or not four digits", body = crate::error::ApiError),
        (status = 401, description = "Wrong PIN", body = crate::error::ApiError),
        (status = 429, description = "Locked out after repeated failures", body = crate::error::ApiError)
    )
)]
pub async fn verify_pin(
    State(state): State<AppState>,
    client: ClientId,
    jar: PrivateCookieJar,
    body: std::result::Result<Json<VerifyPinRequest>, JsonRejection>,
) -> Result<(PrivateCookieJar, Json<AuthStatus>)> {
    let remaining = state.lockout.remaining_lockout(client.as_str()).await;
    if remaining > 0 {
        return Err(Error::LockedOut { seconds: remaining });
    }

    let pin = body
        .ok()
        .and_then(|Json(request)| request.pin)
        .filter(|pin| !pin.is_empty())
        .ok_or_else(|| Error::Validation("PIN is required".to_string()))?;

    if !is_valid_pin(&pin) {
        return Err(Error::Validation("PIN must be exactly 4 digits".to_string()));
    }

    if constant_time_eq(pin.as_bytes(), state.config.auth.pin.as_bytes()) {
        state.lockout.clear(client.as_str()).await;
        tracing::info!(client = client.as_str(), "PIN accepted");
        let jar = start_session(jar, &state.config.auth);
        return Ok((jar, Json(AuthStatus { authenticated: true })));
    }

    let lockout = state.lockout.record_failure(client.as_str()).await;
    if lockout > 0 {
        return Err(Error::LockedOut { seconds: lockout });
    }

    Err(Error::Unauthorized("Invalid PIN".to_string()))
}

/// POST /auth/logout - End the session
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    tag = "auth",
    responses(
        (status = 200, description = "Session cleared", body = AuthStatus)
    )
)]
pub async fn logout(jar: PrivateCookieJar) -> (PrivateCookieJar, Json<AuthStatus>) {
    (
        end_session(jar),
        Json(AuthStatus {
            authenticated: false,
        }),
    )
}
