//! OpenAPI documentation and schema generation
//!
//! Served as JSON at `/api/openapi.json`.

use utoipa::OpenApi;

/// OpenAPI documentation for the ytd-web REST API
#[derive(OpenApi)]
#[openapi(
    info(
        title = "ytd-web REST API",
        description = "PIN-gated API that extracts audio from YouTube links and streams it back as MP3",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:3000", description = "Local development server")
    ),
    paths(
        // Auth
        crate::api::routes::auth_status,
        crate::api::routes::verify_pin,
        crate::api::routes::logout,

        // Download
        crate::api::routes::download_audio,

        // System
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
    ),
    components(schemas(
        crate::api::routes::VerifyPinRequest,
        crate::api::routes::AuthStatus,
        crate::api::routes::DownloadRequest,
        crate::api::routes::HealthResponse,
        crate::error::ApiError,
    )),
    tags(
        (name = "auth", description = "PIN verification and session state"),
        (name = "download", description = "Audio extraction - requires an authenticated session"),
        (name = "system", description = "Health check and OpenAPI spec"),
    ),
    modifiers(&SessionCookieAddon)
)]
pub struct ApiDoc;

/// Documents the encrypted session cookie as the auth scheme
struct SessionCookieAddon;

impl utoipa::Modify for SessionCookieAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = &mut openapi.components {
            components.add_security_scheme(
                "session",
                utoipa::openapi::security::SecurityScheme::ApiKey(
                    utoipa::openapi::security::ApiKey::Cookie(
                        utoipa::openapi::security::ApiKeyValue::new(
                            crate::api::auth::SESSION_COOKIE,
                        ),
                    ),
                ),
            );
        }
    }
}
