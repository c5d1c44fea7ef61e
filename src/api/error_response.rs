//! HTTP error response handling for the API
//!
//! Converts domain errors to HTTP responses with a status code and a JSON
//! `{ "error": ... }` body. Lockouts also carry `lockoutSeconds` and a
//! `Retry-After` header.

use crate::error::{ApiError, Error, ToHttpStatus};
use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status_code =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let retry_after = match &self {
            Error::LockedOut { seconds } => Some(HeaderValue::from(*seconds)),
            _ => None,
        };

        let api_error: ApiError = self.into();
        let mut response = (status_code, Json(api_error)).into_response();

        if let Some(value) = retry_after {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        response
    }
}

/// Explicit error bodies default to 500; domain errors go through [`Error`]
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, Json(self)).into_response()
    }
}
