//! Per-request job state and its temp-file artifacts

use super::progress::{DownloadProgress, DownloadStatus};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

/// Receives progress events for a job
pub type ProgressCallback = dyn Fn(DownloadProgress) + Send + Sync;

/// Extension of the produced audio file
pub const AUDIO_EXTENSION: &str = "mp3";

/// Extension of the title sidecar written by the extractor
pub const TITLE_EXTENSION: &str = "title";

/// One download attempt, scoped by a fresh id
///
/// Every file the extractor writes for this job is named `<id>.<ext>` inside
/// the working directory.
#[derive(Debug)]
pub struct DownloadJob {
    /// Unique token scoping this job's files
    pub id: Uuid,
    /// Validated source URL
    pub url: Url,
    /// Where the finished audio file is expected
    pub output_path: PathBuf,
    /// Where the extractor writes the video title
    pub title_path: PathBuf,
    dir: PathBuf,
    status: DownloadStatus,
    percent: Option<f64>,
}

impl DownloadJob {
    /// Create a job with a fresh id inside `dir`
    pub fn new(dir: &Path, url: Url) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            url,
            output_path: dir.join(format!("{id}.{AUDIO_EXTENSION}")),
            title_path: dir.join(format!("{id}.{TITLE_EXTENSION}")),
            dir: dir.to_path_buf(),
            status: DownloadStatus::Downloading,
            percent: None,
        }
    }

    /// Output template handed to the extractor; it substitutes `%(ext)s`
    pub fn output_template(&self) -> PathBuf {
        self.dir.join(format!("{}.%(ext)s", self.id))
    }

    /// Current stage
    pub fn status(&self) -> DownloadStatus {
        self.status
    }

    /// Last reported percentage
    pub fn percent(&self) -> Option<f64> {
        self.percent
    }

    /// Record a transition and forward it to `sink`
    ///
    /// Ignored once the job has reached a terminal status.
    pub fn report(
        &mut self,
        status: DownloadStatus,
        percent: Option<f64>,
        sink: Option<&ProgressCallback>,
    ) {
        if self.status.is_terminal() {
            return;
        }
        self.status = status;
        if percent.is_some() {
            self.percent = percent;
        }
        if let Some(sink) = sink {
            sink(DownloadProgress {
                job_id: self.id,
                status,
                percent,
            });
        }
    }

    /// Cleanup handle covering every artifact this job may produce
    pub fn artifacts(&self, extensions: &[String]) -> JobArtifacts {
        JobArtifacts {
            job_id: self.id,
            dir: self.dir.clone(),
            paths: extensions
                .iter()
                .map(|ext| self.dir.join(format!("{}.{ext}", self.id)))
                .chain([self.output_path.clone(), self.title_path.clone()])
                .collect(),
            armed: true,
        }
    }
}

/// Removes a job's files on every exit path
///
/// A sweep covers the configured `<id>.<ext>` names plus any other entry in
/// the working directory whose name starts with `<id>.`; yt-dlp derives
/// format-suffixed and fragment names (`<id>.f251.webm`,
/// `<id>.mp4.part-Frag3`) that no fixed list can enumerate.
///
/// [`JobArtifacts::sweep`] is the explicit path. If the handle is dropped
/// while still armed (e.g. the request future was cancelled mid-extraction)
/// the same files are removed synchronously.
pub struct JobArtifacts {
    job_id: Uuid,
    dir: PathBuf,
    paths: Vec<PathBuf>,
    armed: bool,
}

impl JobArtifacts {
    /// Delete every known artifact; returns how many files were removed
    pub async fn sweep(&mut self) -> usize {
        self.sweep_except(None).await
    }

    /// Delete every artifact of the job except `keep`, then disarm
    pub async fn sweep_except(&mut self, keep: Option<&Path>) -> usize {
        let mut removed = 0;
        for path in &self.paths {
            if keep == Some(path.as_path()) {
                continue;
            }
            if remove_quietly(path).await {
                removed += 1;
            }
        }
        for path in self.scan().await {
            if keep == Some(path.as_path()) {
                continue;
            }
            if remove_quietly(&path).await {
                removed += 1;
            }
        }
        self.armed = false;
        if removed > 0 {
            debug!(job_id = %self.job_id, removed, "removed job artifacts");
        }
        removed
    }

    fn prefix(&self) -> String {
        format!("{}.", self.job_id)
    }

    /// Entries of the working directory named after this job
    async fn scan(&self) -> Vec<PathBuf> {
        let mut found = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) => {
                debug!(job_id = %self.job_id, error = %e, "cannot scan working directory");
                return found;
            }
        };
        let prefix = self.prefix();
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    if entry.file_name().to_string_lossy().starts_with(&prefix) {
                        found.push(entry.path());
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(job_id = %self.job_id, error = %e, "failed to scan working directory");
                    break;
                }
            }
        }
        found
    }

    fn scan_blocking(&self) -> Vec<PathBuf> {
        let prefix = self.prefix();
        std::fs::read_dir(&self.dir)
            .map(|entries| {
                entries
                    .filter_map(|entry| entry.ok())
                    .filter(|entry| entry.file_name().to_string_lossy().starts_with(&prefix))
                    .map(|entry| entry.path())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Drop for JobArtifacts {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let scanned = self.scan_blocking();
        for path in self.paths.iter().chain(&scanned) {
            match std::fs::remove_file(path) {
                Ok(()) => debug!(job_id = %self.job_id, ?path, "removed abandoned artifact"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(job_id = %self.job_id, ?path, error = %e, "failed to remove artifact"),
            }
        }
    }
}

/// Best-effort file removal; returns whether a file was deleted
///
/// A missing file is not an error.
pub async fn remove_quietly(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            warn!(?path, error = %e, "failed to delete temp file");
            false
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::tempdir;

    fn job_in(dir: &Path) -> DownloadJob {
        DownloadJob::new(dir, Url::parse("https://youtu.be/abc123").unwrap())
    }

    fn extensions() -> Vec<String> {
        ["webm", "part", "mp3.part"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn paths_are_scoped_by_job_id() {
        let job = job_in(Path::new("/tmp/ytd"));
        let id = job.id.to_string();

        assert_eq!(job.output_path, PathBuf::from(format!("/tmp/ytd/{id}.mp3")));
        assert_eq!(job.title_path, PathBuf::from(format!("/tmp/ytd/{id}.title")));
        assert_eq!(
            job.output_template(),
            PathBuf::from(format!("/tmp/ytd/{id}.%(ext)s"))
        );
    }

    #[test]
    fn ids_are_unique() {
        let a = job_in(Path::new("/tmp"));
        let b = job_in(Path::new("/tmp"));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn no_events_after_terminal_status() {
        let events = std::sync::Arc::new(Mutex::new(Vec::new()));
        let recorded = std::sync::Arc::clone(&events);
        let sink = move |p: DownloadProgress| recorded.lock().unwrap().push(p.status);
        let mut job = job_in(Path::new("/tmp"));

        job.report(DownloadStatus::Downloading, Some(50.0), Some(&sink));
        job.report(DownloadStatus::Error, None, Some(&sink));
        job.report(DownloadStatus::Complete, None, Some(&sink));
        job.report(DownloadStatus::Downloading, Some(60.0), Some(&sink));

        assert_eq!(
            *events.lock().unwrap(),
            vec![DownloadStatus::Downloading, DownloadStatus::Error]
        );
        assert_eq!(job.status(), DownloadStatus::Error);
        assert_eq!(job.percent(), Some(50.0));
    }

    #[tokio::test]
    async fn sweep_removes_every_known_artifact() {
        let dir = tempdir().unwrap();
        let job = job_in(dir.path());
        let id = job.id;
        for ext in ["webm", "part", "mp3.part", "mp3", "title"] {
            std::fs::write(dir.path().join(format!("{id}.{ext}")), b"x").unwrap();
        }
        std::fs::write(dir.path().join("unrelated.mp3"), b"keep").unwrap();

        let mut artifacts = job.artifacts(&extensions());
        assert_eq!(artifacts.sweep().await, 5);

        let left: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(left, vec![std::ffi::OsString::from("unrelated.mp3")]);

        // Idempotent
        assert_eq!(artifacts.sweep().await, 0);
    }

    #[tokio::test]
    async fn sweep_except_keeps_the_output() {
        let dir = tempdir().unwrap();
        let job = job_in(dir.path());
        std::fs::write(&job.output_path, b"audio").unwrap();
        std::fs::write(&job.title_path, b"title").unwrap();

        let mut artifacts = job.artifacts(&extensions());
        artifacts.sweep_except(Some(&job.output_path)).await;
        drop(artifacts);

        assert!(job.output_path.exists());
        assert!(!job.title_path.exists());
    }

    #[tokio::test]
    async fn sweep_finds_names_outside_the_extension_list() {
        let dir = tempdir().unwrap();
        let job = job_in(dir.path());
        let id = job.id;
        for name in ["temp.mp3", "f251.webm", "mp4.part-Frag3", "webm.ytdl"] {
            std::fs::write(dir.path().join(format!("{id}.{name}")), b"x").unwrap();
        }
        std::fs::write(&job.output_path, b"audio").unwrap();
        std::fs::write(dir.path().join(format!("{id}-other.mp3")), b"keep").unwrap();
        std::fs::write(dir.path().join("other-job.f251.webm"), b"keep").unwrap();

        let mut artifacts = job.artifacts(&extensions());
        artifacts.sweep_except(Some(&job.output_path)).await;

        let mut left: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        left.sort();
        let mut expected = vec![
            format!("{id}-other.mp3"),
            format!("{id}.mp3"),
            "other-job.f251.webm".to_string(),
        ];
        expected.sort();
        assert_eq!(left, expected);
    }

    #[test]
    fn dropping_an_armed_handle_removes_unlisted_names() {
        let dir = tempdir().unwrap();
        let job = job_in(dir.path());
        let fragment = dir.path().join(format!("{}.mp4.part-Frag7", job.id));
        std::fs::write(&fragment, b"frag").unwrap();

        drop(job.artifacts(&extensions()));

        assert!(!fragment.exists());
    }

    #[test]
    fn dropping_an_armed_handle_cleans_up() {
        let dir = tempdir().unwrap();
        let job = job_in(dir.path());
        let partial = dir.path().join(format!("{}.webm", job.id));
        std::fs::write(&partial, b"partial").unwrap();

        drop(job.artifacts(&extensions()));

        assert!(!partial.exists());
    }
}
