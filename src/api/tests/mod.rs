use super::*;
use axum::body::Body;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::Response;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::{TempDir, tempdir};
use tower::ServiceExt;


const TEST_PIN: &str = "4321";

/// Router plus the scratch directories and state behind it
struct TestApp {
    router: Router,
    state: AppState,
    dir: TempDir,
}

impl TestApp {
    fn new() -> Self {
        Self::with(|_, _| {})
    }

    fn with(tweak: impl FnOnce(&mut Config, &Path)) -> Self {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.auth.pin = TEST_PIN.to_string();
        config.api.rate_limit.enabled = false;
        config.api.public_dir = dir.path().join("public");
        config.download.temp_dir = dir.path().join("jobs");
        config.download.binary_path = dir.path().join("missing-yt-dlp");
        tweak(&mut config, dir.path());

        let state = AppState::new(Arc::new(config));
        Self {
            router: create_router(state.clone()),
            state,
            dir,
        }
    }

    async fn send(&self, request: Request) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    fn job_dir(&self) -> PathBuf {
        self.dir.path().join("jobs")
    }

    /// Verify the PIN and return the session cookie pair (`name=value`)
    async fn login(&self) -> String {
        let response = self
            .send(post_json(
                "/api/auth/verify",
                &format!(r#"{{"pin":"{TEST_PIN}"}}"#),
                None,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        session_cookie(&response).expect("login sets a session cookie")
    }
}

fn get(uri: &str, cookie: Option<&str>) -> Request {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header("cookie", cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: &str, cookie: Option<&str>) -> Request {
    post_json_from(uri, body, cookie, None)
}

fn post_json_from(uri: &str, body: &str, cookie: Option<&str>, client: Option<&str>) -> Request {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header("cookie", cookie);
    }
    if let Some(client) = client {
        builder = builder.header("x-forwarded-for", client);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// The `ytd_session=...` pair from a response's `Set-Cookie`, if any
fn session_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(crate::api::auth::SESSION_COOKIE))
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

#[tokio::test]
async fn test_api_server_serves_and_shuts_down() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let dir = tempdir().unwrap();
    let mut config = Config::default();
    config.api.public_dir = dir.path().join("public");
    config.download.temp_dir = dir.path().join("jobs");

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let (stop, stopped) = tokio::sync::oneshot::channel::<()>();

    let server = tokio::spawn(serve(listener, Arc::new(config), async move {
        stopped.await.ok();
    }));

    let mut stream = tokio::net::TcpStream::connect(address).await.unwrap();
    stream
        .write_all(b"GET /api/health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut raw = String::new();
    stream.read_to_string(&mut raw).await.unwrap();

    assert!(raw.starts_with("HTTP/1.1 200"), "got {raw}");
    assert!(raw.contains(r#""status":"ok""#));

    stop.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_cors_enabled() {
    let app = TestApp::with(|config, _| {
        config.api.cors_enabled = true;
        config.api.cors_origins = vec!["*".to_string()];
    });

    let request = Request::builder()
        .uri("/api/health")
        .header("Origin", "http://localhost:5173")
        .body(Body::empty())
        .unwrap();
    let response = app.send(request).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        HeaderValue::from_static("*")
    );
}

#[tokio::test]
async fn test_cors_disabled_by_default() {
    let app = TestApp::new();

    let request = Request::builder()
        .uri("/api/health")
        .header("Origin", "http://localhost:5173")
        .body(Body::empty())
        .unwrap();
    let response = app.send(request).await;

    assert!(
        response
            .headers()
            .get("access-control-allow-origin")
            .is_none()
    );
}

#[tokio::test]
async fn test_cors_specific_origins() {
    let app = TestApp::with(|config, _| {
        config.api.cors_enabled = true;
        config.api.cors_origins = vec!["https://music.example".to_string()];
    });

    let allowed = Request::builder()
        .uri("/api/health")
        .header("Origin", "https://music.example")
        .body(Body::empty())
        .unwrap();
    let response = app.send(allowed).await;
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "https://music.example"
    );

    let denied = Request::builder()
        .uri("/api/health")
        .header("Origin", "https://evil.example")
        .body(Body::empty())
        .unwrap();
    let response = app.send(denied).await;
    assert!(
        response
            .headers()
            .get("access-control-allow-origin")
            .is_none()
    );
}
