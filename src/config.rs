//! Configuration types for ytd-web
//!
//! Every setting has a default; [`Config::from_env`] overlays the process
//! environment (optionally populated from a `.env` file by the binary) and
//! validates the result.

use crate::error::{Error, Result};
use crate::validation::is_valid_pin;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

/// Session secret shipped in the sample `.env`; treated as unset.
pub const PLACEHOLDER_SESSION_SECRET: &str = "change-me-to-a-random-string";

/// Main configuration for the gateway
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// PIN, session and lockout settings
    #[serde(default)]
    pub auth: AuthConfig,

    /// Extraction pipeline settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// HTTP server settings
    #[serde(default)]
    pub api: ApiConfig,
}

/// PIN authentication and session configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthConfig {
    /// The shared 4-digit PIN (default: "1234")
    #[serde(default = "default_pin")]
    pub pin: String,

    /// Secret the session cookie key is derived from (default: random per process)
    #[serde(default = "generate_session_secret")]
    pub session_secret: String,

    /// Mark the session cookie `Secure` (enable behind an HTTPS proxy)
    #[serde(default)]
    pub secure_cookie: bool,

    /// Session cookie lifetime (default: 7 days)
    #[serde(default = "default_session_ttl")]
    pub session_ttl: Duration,

    /// Failed-attempt lockout settings
    #[serde(default)]
    pub lockout: LockoutConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            pin: default_pin(),
            session_secret: generate_session_secret(),
            secure_cookie: false,
            session_ttl: default_session_ttl(),
            lockout: LockoutConfig::default(),
        }
    }
}

/// Brute-force lockout configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LockoutConfig {
    /// Consecutive failures that trigger a lockout (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// How long a lockout lasts (default: 30s)
    #[serde(default = "default_lockout_duration")]
    pub duration: Duration,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            duration: default_lockout_duration(),
        }
    }
}

/// Extraction pipeline configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Working directory for job files (default: "/tmp/ytd-web")
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Path to the yt-dlp executable (default: discovered on PATH)
    #[serde(default = "default_binary_path")]
    pub binary_path: PathBuf,

    /// JavaScript runtime handed to yt-dlp via `--js-runtimes`
    #[serde(default)]
    pub js_runtime: Option<String>,

    /// Ask yt-dlp to embed title/artist metadata (default: true)
    #[serde(default = "default_true")]
    pub embed_metadata: bool,

    /// Ask yt-dlp to embed the thumbnail as cover art (default: true)
    #[serde(default = "default_true")]
    pub embed_thumbnail: bool,

    /// Kill the extractor after this long (default: 5 minutes)
    #[serde(default = "default_timeout")]
    pub timeout: Duration,

    /// Cap on extractor output captured across stdout and stderr (default: 10 MiB)
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,

    /// Maximum extractor processes running at once (default: 2)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Extensions removed for a job id when it fails
    #[serde(default = "default_artifact_extensions")]
    pub artifact_extensions: Vec<String>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            temp_dir: default_temp_dir(),
            binary_path: default_binary_path(),
            js_runtime: None,
            embed_metadata: true,
            embed_thumbnail: true,
            timeout: default_timeout(),
            max_output_bytes: default_max_output_bytes(),
            max_concurrent: default_max_concurrent(),
            artifact_extensions: default_artifact_extensions(),
        }
    }
}

/// HTTP server configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Address to bind to (default: 0.0.0.0:3000)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Directory holding the built frontend (default: "public")
    #[serde(default = "default_public_dir")]
    pub public_dir: PathBuf,

    /// Take the client address from the last `X-Forwarded-For` hop (default: true)
    #[serde(default = "default_true")]
    pub trust_proxy: bool,

    /// Enable CORS (default: false, the frontend is served same-origin)
    #[serde(default)]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Maximum accepted request body (default: 1 KiB)
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            public_dir: default_public_dir(),
            trust_proxy: true,
            cors_enabled: false,
            cors_origins: default_cors_origins(),
            max_body_bytes: default_max_body_bytes(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl ApiConfig {
    /// Whether any client that reaches the listener directly can choose its
    /// own identity through `X-Forwarded-For`
    ///
    /// True when proxy headers are trusted on a non-loopback bind. Such a
    /// client can rotate the header to escape the PIN lockout and the rate
    /// limit, so the server warns about it at startup.
    pub fn forwarded_for_is_spoofable(&self) -> bool {
        self.trust_proxy && !self.bind_address.ip().is_loopback()
    }
}

/// Rate limiting configuration for `/api` routes
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Enable rate limiting (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Requests per minute per client (default: 5)
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,

    /// Paths (relative to `/api`) exempt from rate limiting
    #[serde(default)]
    pub exempt_paths: Vec<String>,

    /// Client IPs exempt from rate limiting
    #[serde(default)]
    pub exempt_ips: Vec<IpAddr>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_minute: default_requests_per_minute(),
            exempt_paths: Vec::new(),
            exempt_ips: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from the process environment
    ///
    /// Unset variables keep their defaults. See [`Config::from_lookup`] for
    /// the variable names.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    ///
    /// Recognised keys: `PIN`, `PORT`, `BIND_ADDRESS`, `RATE_LIMIT_MAX`,
    /// `SESSION_SECRET`, `SECURE_COOKIES`, `TMP_DIR`, `YTDLP_PATH`,
    /// `YTDLP_JS_RUNTIME`, `EMBED_METADATA`, `EMBED_THUMBNAIL`,
    /// `MAX_CONCURRENT_DOWNLOADS`, `DOWNLOAD_TIMEOUT_SECS`, `PUBLIC_DIR`,
    /// `TRUST_PROXY`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(pin) = lookup("PIN") {
            config.auth.pin = pin;
        }
        if let Some(secret) = lookup("SESSION_SECRET")
            && !secret.is_empty()
            && secret != PLACEHOLDER_SESSION_SECRET
        {
            config.auth.session_secret = secret;
        }
        if let Some(secure) = parse_var::<Flag>(&lookup, "SECURE_COOKIES")? {
            config.auth.secure_cookie = secure.0;
        }

        if let Some(ip) = parse_var::<IpAddr>(&lookup, "BIND_ADDRESS")? {
            config.api.bind_address.set_ip(ip);
        }
        if let Some(port) = parse_var::<u16>(&lookup, "PORT")? {
            config.api.bind_address.set_port(port);
        }
        if let Some(max) = parse_var::<u32>(&lookup, "RATE_LIMIT_MAX")? {
            config.api.rate_limit.requests_per_minute = max;
        }
        if let Some(dir) = lookup("PUBLIC_DIR") {
            config.api.public_dir = PathBuf::from(dir);
        }
        if let Some(trust) = parse_var::<Flag>(&lookup, "TRUST_PROXY")? {
            config.api.trust_proxy = trust.0;
        }

        if let Some(dir) = lookup("TMP_DIR") {
            config.download.temp_dir = PathBuf::from(dir);
        }
        if let Some(path) = lookup("YTDLP_PATH") {
            config.download.binary_path = PathBuf::from(path);
        }
        if let Some(runtime) = lookup("YTDLP_JS_RUNTIME").filter(|r| !r.is_empty()) {
            config.download.js_runtime = Some(runtime);
        }
        if let Some(embed) = parse_var::<Flag>(&lookup, "EMBED_METADATA")? {
            config.download.embed_metadata = embed.0;
        }
        if let Some(embed) = parse_var::<Flag>(&lookup, "EMBED_THUMBNAIL")? {
            config.download.embed_thumbnail = embed.0;
        }
        if let Some(max) = parse_var::<usize>(&lookup, "MAX_CONCURRENT_DOWNLOADS")? {
            config.download.max_concurrent = max;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "DOWNLOAD_TIMEOUT_SECS")? {
            config.download.timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Check invariants that serde defaults cannot express
    pub fn validate(&self) -> Result<()> {
        if !is_valid_pin(&self.auth.pin) {
            return Err(config_error("PIN must be exactly 4 digits", "PIN"));
        }
        if self.auth.session_secret.is_empty() {
            return Err(config_error(
                "session secret must not be empty",
                "SESSION_SECRET",
            ));
        }
        if self.auth.lockout.max_attempts == 0 {
            return Err(config_error(
                "lockout threshold must be at least 1",
                "auth.lockout.max_attempts",
            ));
        }
        if self.api.rate_limit.requests_per_minute == 0 {
            return Err(config_error(
                "rate limit must allow at least one request per minute",
                "RATE_LIMIT_MAX",
            ));
        }
        if self.download.max_concurrent == 0 {
            return Err(config_error(
                "at least one concurrent download is required",
                "MAX_CONCURRENT_DOWNLOADS",
            ));
        }
        if self.download.timeout.is_zero() {
            return Err(config_error(
                "download timeout must be positive",
                "DOWNLOAD_TIMEOUT_SECS",
            ));
        }
        Ok(())
    }
}

fn config_error(message: &str, key: &str) -> Error {
    Error::Config {
        message: message.to_string(),
        key: Some(key.to_string()),
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| config_error(&format!("invalid value {raw:?}: {e}"), key)),
    }
}

/// Boolean env value accepting true/false, 1/0, yes/no, on/off
struct Flag(bool);

impl FromStr for Flag {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Flag(true)),
            "0" | "false" | "no" | "off" => Ok(Flag(false)),
            other => Err(format!("expected a boolean, got {other:?}")),
        }
    }
}

// Default value functions
fn default_pin() -> String {
    "1234".to_string()
}

fn generate_session_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn default_session_ttl() -> Duration {
    Duration::from_secs(7 * 24 * 60 * 60)
}

fn default_max_attempts() -> u32 {
    3
}

fn default_lockout_duration() -> Duration {
    Duration::from_secs(30)
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("/tmp/ytd-web")
}

fn default_binary_path() -> PathBuf {
    which::which("yt-dlp").unwrap_or_else(|_| PathBuf::from("yt-dlp"))
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_max_output_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_max_concurrent() -> usize {
    2
}

fn default_artifact_extensions() -> Vec<String> {
    [
        "mp3", "mp3.part", "webm", "webm.part", "m4a", "m4a.part", "opus", "part", "ytdl",
        "temp", "title", "webp", "jpg", "png",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3000))
}

fn default_public_dir() -> PathBuf {
    PathBuf::from("public")
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".into()]
}

fn default_max_body_bytes() -> usize {
    1024
}

fn default_requests_per_minute() -> u32 {
    5
}
