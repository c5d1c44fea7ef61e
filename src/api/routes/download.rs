//! Download handler: validate, extract, stream.

use super::DownloadRequest;
use crate::api::AppState;
use crate::error::{Error, Result};
use crate::pipeline::{DownloadProgress, stream_and_dispose};
use crate::validation::{sanitize_title, validate_video_url};
use axum::{
    Json,
    body::Body,
    extract::{State, rejection::JsonRejection},
    http::{HeaderValue, StatusCode, header},
    response::Response,
};

/// POST /download - Extract audio from a video URL and stream the MP3
///
/// The temporary MP3 is deleted once the body has been sent, fails, or the
/// client disconnects.
#[utoipa::path(
    post,
    path = "/api/download",
    tag = "download",
    request_body = DownloadRequest,
    responses(
        (status = 200, description = "MP3 stream", content_type = "audio/mpeg"),
        (status = 400, description = "URL missing or not an accepted link", body = crate::error::ApiError),
        (status = 401, description = "No authenticated session", body = crate::error::ApiError),
        (status = 500, description = "Extraction failed", body = crate::error::ApiError)
    )
)]
pub async fn download_audio(
    State(state): State<AppState>,
    body: std::result::Result<Json<DownloadRequest>, JsonRejection>,
) -> Result<Response> {
    let raw = body
        .ok()
        .and_then(|Json(request)| request.url)
        .unwrap_or_default();
    let url = validate_video_url(&raw)?;

    let log_progress = |progress: DownloadProgress| {
        tracing::debug!(
            job_id = %progress.job_id,
            status = ?progress.status,
            percent = ?progress.percent,
            "download progress"
        );
    };

    let audio = state
        .pipeline
        .run(&url, Some(&log_progress))
        .await
        .inspect_err(|e| tracing::error!(url = %url, error = %e, "download failed"))?;

    let file = stream_and_dispose(&audio.path).await.inspect_err(
        |e| tracing::error!(job_id = %audio.job_id, error = %e, "failed to open output"),
    )?;

    let disposition = format!(
        "attachment; filename=\"{}.mp3\"",
        sanitize_title(&audio.title)
    );
    let disposition = HeaderValue::from_str(&disposition)
        .map_err(|e| Error::ApiServerError(format!("invalid Content-Disposition: {e}")))?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "audio/mpeg")
        .header(header::CONTENT_LENGTH, file.len)
        .header(header::CONTENT_DISPOSITION, disposition)
        .body(Body::from_stream(file.stream))
        .map_err(|e| Error::ApiServerError(e.to_string()))
}
