//! Session handling for the REST API
//!
//! A successful PIN verification stores an encrypted `ytd_session` cookie
//! holding the session's expiry time. Routes behind [`require_session`]
//! answer 401 unless the cookie decrypts and has not expired.

use crate::config::AuthConfig;
use crate::error::Error;
use axum::{
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::{
    PrivateCookieJar,
    cookie::{Cookie, SameSite},
};
use time::OffsetDateTime;

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "ytd_session";

/// Whether the jar carries a live authenticated session
pub fn is_authenticated(jar: &PrivateCookieJar) -> bool {
    jar.get(SESSION_COOKIE)
        .and_then(|cookie| cookie.value().parse::<i64>().ok())
        .is_some_and(|expires| expires > OffsetDateTime::now_utc().unix_timestamp())
}

/// Mark the caller's session as authenticated
pub fn start_session(jar: PrivateCookieJar, auth: &AuthConfig) -> PrivateCookieJar {
    let ttl = time::Duration::try_from(auth.session_ttl).unwrap_or(time::Duration::WEEK);
    let expires = OffsetDateTime::now_utc() + ttl;

    let cookie = Cookie::build((SESSION_COOKIE, expires.unix_timestamp().to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .secure(auth.secure_cookie)
        .max_age(ttl);

    jar.add(cookie)
}

/// Drop the caller's session
pub fn end_session(jar: PrivateCookieJar) -> PrivateCookieJar {
    jar.remove(Cookie::build(SESSION_COOKIE).path("/"))
}

/// Middleware rejecting requests without an authenticated session
///
/// # Returns
///
/// - 401 `{"error": "Authentication required"}` without a valid session
/// - The response from the next handler otherwise
pub async fn require_session(jar: PrivateCookieJar, request: Request, next: Next) -> Response {
    if is_authenticated(&jar) {
        next.run(request).await
    } else {
        tracing::debug!(path = %request.uri().path(), "rejected request without session");
        Error::Unauthorized("Authentication required".to_string()).into_response()
    }
}

/// Constant-time byte comparison.
/// Always compares all bytes regardless of where the first mismatch occurs.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
