//! Application state for the API server

use crate::config::Config;
use crate::lockout::LockoutGuard;
use crate::pipeline::DownloadPipeline;
use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;
use sha2::{Digest, Sha512};
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// Cloned per request; every field is behind an `Arc` or is itself cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration
    pub config: Arc<Config>,

    /// Per-client PIN failure tracking
    pub lockout: Arc<LockoutGuard>,

    /// Extraction pipeline shared by all download requests
    pub pipeline: Arc<DownloadPipeline>,

    cookie_key: Key,
}

impl AppState {
    /// Build state from configuration
    pub fn new(config: Arc<Config>) -> Self {
        let lockout = Arc::new(LockoutGuard::new(&config.auth.lockout));
        let pipeline = Arc::new(DownloadPipeline::new(config.download.clone()));
        let cookie_key = derive_cookie_key(&config.auth.session_secret);

        Self {
            config,
            lockout,
            pipeline,
            cookie_key,
        }
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}

/// Stretch the session secret to the 64 bytes the cookie cipher needs
fn derive_cookie_key(secret: &str) -> Key {
    let digest = Sha512::digest(secret.as_bytes());
    Key::from(digest.as_slice())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_key_is_stable_per_secret() {
        let a = derive_cookie_key("short");
        let b = derive_cookie_key("short");
        let c = derive_cookie_key("other");

        assert_eq!(a.master(), b.master());
        assert_ne!(a.master(), c.master());
    }
}
