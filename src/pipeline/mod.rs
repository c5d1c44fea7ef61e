//! Audio extraction pipeline
//!
//! [`DownloadPipeline::run`] drives one yt-dlp process per request: it
//! creates a job-scoped output location, supervises the process with a
//! timeout and an output cap, reports progress, and removes every artifact
//! of the job on failure. The finished file is handed to the caller, who
//! streams it with [`stream_and_dispose`] so it is deleted exactly once.

use crate::config::DownloadConfig;
use crate::error::{Error, PipelineError, Result};
use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

pub mod disposal;
pub mod extractor;
pub mod job;
pub mod progress;

pub use disposal::{AudioFile, DisposingStream, TempFileGuard, stream_and_dispose};
pub use extractor::ProcessGroup;
pub use job::{DownloadJob, JobArtifacts, ProgressCallback};
pub use progress::{DownloadProgress, DownloadStatus, parse_percent};

/// Title used when the sidecar is missing or unreadable
pub const UNKNOWN_TITLE: &str = "Unknown";

/// Diagnostics kept in errors and logs; the tail is where yt-dlp reports failures
const DIAGNOSTIC_TAIL_BYTES: usize = 4096;

const READ_CHUNK: usize = 8192;

/// A successfully extracted audio file
#[derive(Debug, Clone)]
pub struct DownloadedAudio {
    /// Id of the job that produced the file
    pub job_id: Uuid,
    /// Location of the MP3 in the working directory
    pub path: PathBuf,
    /// Video title as reported by the extractor
    pub title: String,
}

/// Runs extraction jobs against the configured yt-dlp binary
pub struct DownloadPipeline {
    config: DownloadConfig,
    permits: Arc<Semaphore>,
}

/// Bytes read from one output stream, with progress parsed per complete line
#[derive(Default)]
struct StreamCapture {
    bytes: Vec<u8>,
    parsed: usize,
}

impl StreamCapture {
    fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Append `chunk`; returns the lines it completed, if any
    ///
    /// A trailing partial line is held back until its newline arrives, so a
    /// percentage split across reads is seen whole.
    fn push(&mut self, chunk: &[u8]) -> Option<&[u8]> {
        self.bytes.extend_from_slice(chunk);
        let start = self.parsed;
        let newline = self.bytes[start..].iter().rposition(|&b| b == b'\n')?;
        let end = start + newline + 1;
        self.parsed = end;
        Some(&self.bytes[start..end])
    }

    /// The unterminated tail left at end of stream
    fn rest(&mut self) -> Option<&[u8]> {
        let start = self.parsed;
        self.parsed = self.bytes.len();
        (start < self.bytes.len()).then(|| &self.bytes[start..])
    }
}

/// Output captured from a finished extractor process
struct Captured {
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl Captured {
    fn diagnostics(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stderr).into_owned();
        let stdout = String::from_utf8_lossy(&self.stdout);
        if !stdout.trim().is_empty() {
            text.push('\n');
            text.push_str(&stdout);
        }
        tail(text.trim(), DIAGNOSTIC_TAIL_BYTES).to_string()
    }
}

impl DownloadPipeline {
    /// Create a pipeline from configuration
    pub fn new(config: DownloadConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        Self { config, permits }
    }

    /// The pipeline's configuration
    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Extract audio from `url`
    ///
    /// Suspends until the extractor exits. `on_progress` receives
    /// `downloading`/`converting` events followed by exactly one `complete`
    /// or `error`. On any failure every file scoped to the job is removed
    /// before the error is returned; on success only the output file remains.
    pub async fn run(
        &self,
        url: &Url,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<DownloadedAudio> {
        let dir = &self.config.temp_dir;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| PipelineError::resource(dir, &e))?;

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| Error::ApiServerError("download pipeline is shut down".into()))?;

        let mut job = DownloadJob::new(dir, url.clone());
        let mut artifacts = job.artifacts(&self.config.artifact_extensions);

        info!(job_id = %job.id, url = %job.url, "starting extraction");
        job.report(DownloadStatus::Downloading, None, on_progress);

        let outcome = self.extract(&mut job, on_progress).await;

        match outcome {
            Ok(()) => self.finish(job, artifacts, on_progress).await,
            Err(error) => {
                warn!(job_id = %job.id, error = %error, "extraction failed");
                job.report(DownloadStatus::Error, None, on_progress);
                artifacts.sweep().await;
                Err(error.into())
            }
        }
    }

    /// Spawn and supervise the extractor until it exits successfully
    async fn extract(
        &self,
        job: &mut DownloadJob,
        on_progress: Option<&ProgressCallback>,
    ) -> std::result::Result<(), PipelineError> {
        let mut child = extractor::command(&self.config, job)
            .spawn()
            .map_err(|e| PipelineError::Spawn {
                binary: self.config.binary_path.clone(),
                reason: e.to_string(),
            })?;

        let mut group = ProcessGroup::of(&child);

        let supervised = tokio::time::timeout(
            self.config.timeout,
            self.supervise(&mut child, job, on_progress),
        )
        .await;

        // The group goes first: post-processors must be dead before the sweep.
        let captured = match supervised {
            Err(_) => {
                group.kill();
                kill(&mut child, job.id).await;
                return Err(PipelineError::TimedOut {
                    after: self.config.timeout,
                });
            }
            Ok(Err(error)) => {
                group.kill();
                kill(&mut child, job.id).await;
                return Err(error);
            }
            Ok(Ok(captured)) => captured,
        };

        if !captured.status.success() {
            group.kill();
            return Err(PipelineError::Failed {
                code: captured.status.code(),
                diagnostics: captured.diagnostics(),
            });
        }

        group.release();
        debug!(job_id = %job.id, "extractor exited successfully");
        Ok(())
    }

    /// Drain both output streams, reporting progress, then wait for exit
    async fn supervise(
        &self,
        child: &mut Child,
        job: &mut DownloadJob,
        on_progress: Option<&ProgressCallback>,
    ) -> std::result::Result<Captured, PipelineError> {
        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();
        let mut out_buf = vec![0u8; READ_CHUNK];
        let mut err_buf = vec![0u8; READ_CHUNK];
        let mut out = StreamCapture::default();
        let mut err = StreamCapture::default();

        while stdout.is_some() || stderr.is_some() {
            tokio::select! {
                read = read_chunk(&mut stdout, &mut out_buf), if stdout.is_some() => match read {
                    Ok(0) => {
                        report_lines(out.rest(), job, on_progress);
                        stdout = None;
                    }
                    Ok(n) => self.absorb(&out_buf[..n], &mut out, err.len(), job, on_progress)?,
                    Err(e) => {
                        warn!(job_id = %job.id, error = %e, "failed reading extractor stdout");
                        stdout = None;
                    }
                },
                read = read_chunk(&mut stderr, &mut err_buf), if stderr.is_some() => match read {
                    Ok(0) => {
                        report_lines(err.rest(), job, on_progress);
                        stderr = None;
                    }
                    Ok(n) => self.absorb(&err_buf[..n], &mut err, out.len(), job, on_progress)?,
                    Err(e) => {
                        warn!(job_id = %job.id, error = %e, "failed reading extractor stderr");
                        stderr = None;
                    }
                },
            }
        }

        let status = child.wait().await.map_err(|e| PipelineError::Failed {
            code: None,
            diagnostics: format!("failed to wait for extractor: {e}"),
        })?;

        Ok(Captured {
            status,
            stdout: out.bytes,
            stderr: err.bytes,
        })
    }

    /// Buffer one chunk of output and report any progress it completes
    ///
    /// `other` is what the sibling stream has captured; the cap covers both.
    fn absorb(
        &self,
        chunk: &[u8],
        stream: &mut StreamCapture,
        other: usize,
        job: &mut DownloadJob,
        on_progress: Option<&ProgressCallback>,
    ) -> std::result::Result<(), PipelineError> {
        if stream.len() + other + chunk.len() > self.config.max_output_bytes {
            return Err(PipelineError::OutputTooLarge {
                limit: self.config.max_output_bytes,
            });
        }
        report_lines(stream.push(chunk), job, on_progress);
        Ok(())
    }

    /// Read the title, verify the output, and hand the file to the caller
    async fn finish(
        &self,
        mut job: DownloadJob,
        mut artifacts: JobArtifacts,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<DownloadedAudio> {
        let title = read_title(&job).await;

        if tokio::fs::metadata(&job.output_path).await.is_err() {
            let error = PipelineError::OutputMissing {
                path: job.output_path.clone(),
            };
            warn!(job_id = %job.id, error = %error, "extractor broke its output contract");
            job.report(DownloadStatus::Error, None, on_progress);
            artifacts.sweep().await;
            return Err(error.into());
        }

        artifacts.sweep_except(Some(&job.output_path)).await;
        job.report(DownloadStatus::Complete, Some(100.0), on_progress);
        info!(job_id = %job.id, title = %title, "extraction complete");

        Ok(DownloadedAudio {
            job_id: job.id,
            path: job.output_path,
            title,
        })
    }
}

/// Best-effort read of the title sidecar, which is always removed afterwards
async fn read_title(job: &DownloadJob) -> String {
    let title = match tokio::fs::read_to_string(&job.title_path).await {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().to_string(),
        Ok(_) => UNKNOWN_TITLE.to_string(),
        Err(e) => {
            debug!(job_id = %job.id, error = %e, "no readable title sidecar");
            UNKNOWN_TITLE.to_string()
        }
    };
    job::remove_quietly(&job.title_path).await;
    title
}

fn report_lines(lines: Option<&[u8]>, job: &mut DownloadJob, on_progress: Option<&ProgressCallback>) {
    if let Some(percent) = lines.and_then(|lines| parse_percent(&String::from_utf8_lossy(lines))) {
        job.report(DownloadStatus::from_percent(percent), Some(percent), on_progress);
    }
}

async fn read_chunk<R>(reader: &mut Option<R>, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    match reader {
        Some(reader) => reader.read(buf).await,
        None => std::future::pending().await,
    }
}

async fn kill(child: &mut Child, job_id: Uuid) {
    if let Err(e) = child.kill().await {
        debug!(%job_id, error = %e, "extractor already exited");
    }
}

fn tail(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}
