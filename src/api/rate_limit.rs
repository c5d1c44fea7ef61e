//! Rate limiting middleware for the API
//!
//! Each client gets a token bucket holding `requests_per_minute` tokens that
//! refills continuously over a minute. Exempt paths and IPs bypass it.

use crate::api::client::{self, ClientId};
use crate::config::RateLimitConfig;
use axum::{
    Json,
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{collections::HashMap, net::IpAddr, sync::Arc};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::ApiError;

const RATE_LIMITED_MESSAGE: &str = "Too many requests. Please wait a minute before trying again.";

/// Buckets are pruned once this many clients are tracked
const PRUNE_THRESHOLD: usize = 4096;

/// Simple token bucket rate limiter
struct TokenBucket {
    /// Available tokens
    tokens: f64,
    /// Last refill time
    last_refill: Instant,
    /// Tokens per second
    rate: f64,
    /// Maximum burst size
    capacity: u32,
}

impl TokenBucket {
    fn new(rate: f64, capacity: u32) -> Self {
        Self {
            tokens: capacity as f64,
            last_refill: Instant::now(),
            rate,
            capacity,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity as f64);
        self.last_refill = now;
    }

    fn try_consume(&mut self) -> Option<u64> {
        self.refill(Instant::now());

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            None
        } else {
            let wait_secs = ((1.0 - self.tokens) / self.rate).ceil() as u64;
            Some(wait_secs.max(1))
        }
    }

    fn is_full(&self) -> bool {
        self.tokens >= self.capacity as f64
    }
}

/// Rate limiter with per-client tracking
pub struct RateLimiter {
    /// Per-client token buckets
    buckets: Mutex<HashMap<String, TokenBucket>>,
    /// Configuration
    config: RateLimitConfig,
    /// Whether client identity comes from `X-Forwarded-For`
    trust_proxy: bool,
}

impl RateLimiter {
    /// Create a new rate limiter from configuration
    pub fn new(config: RateLimitConfig, trust_proxy: bool) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            config,
            trust_proxy,
        }
    }

    /// Check if a path is exempt from rate limiting
    fn is_path_exempt(&self, path: &str) -> bool {
        self.config
            .exempt_paths
            .iter()
            .any(|exempt| path == exempt || path.starts_with(exempt.as_str()))
    }

    /// Check if a client is exempt from rate limiting
    fn is_client_exempt(&self, client: &ClientId) -> bool {
        client
            .as_str()
            .parse::<IpAddr>()
            .is_ok_and(|ip| self.config.exempt_ips.contains(&ip))
    }

    /// Check if a request should be rate limited
    ///
    /// Returns the seconds to wait before retrying, or `None` when allowed.
    pub async fn check(&self, path: &str, client: &ClientId) -> Option<u64> {
        if self.is_path_exempt(path) || self.is_client_exempt(client) {
            return None;
        }

        let mut buckets = self.buckets.lock().await;
        if buckets.len() >= PRUNE_THRESHOLD {
            let now = Instant::now();
            buckets.retain(|_, bucket| {
                bucket.refill(now);
                !bucket.is_full()
            });
        }

        let per_minute = self.config.requests_per_minute.max(1);
        let bucket = buckets
            .entry(client.as_str().to_string())
            .or_insert_with(|| TokenBucket::new(f64::from(per_minute) / 60.0, per_minute));
        bucket.try_consume()
    }

    /// Number of clients with a bucket
    pub async fn tracked_clients(&self) -> usize {
        self.buckets.lock().await.len()
    }
}

/// Rate limiting middleware function
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request,
    next: Next,
) -> Response {
    let client = client::resolve(req.headers(), req.extensions(), limiter.trust_proxy);

    match limiter.check(req.uri().path(), &client).await {
        None => next.run(req).await,
        Some(retry_after) => {
            tracing::debug!(client = client.as_str(), retry_after, "rate limited");
            (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, retry_after.to_string())],
                Json(ApiError::new(RATE_LIMITED_MESSAGE)),
            )
                .into_response()
        }
    }
}
