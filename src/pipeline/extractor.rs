//! yt-dlp invocation contract
//!
//! The extractor is always started from an argument vector, never through a
//! shell, so nothing in the URL can be interpreted as shell syntax.

use super::job::{AUDIO_EXTENSION, DownloadJob};
use crate::config::DownloadConfig;
use std::ffi::OsString;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::debug;

/// Build the extractor arguments for `job`
///
/// In order: audio-only extraction to MP3 at best quality, optional metadata
/// and thumbnail embedding, the job-scoped output template, the title
/// sidecar, machine-parsable progress lines, the switches that disable
/// config files and post-download commands, single-video mode, and finally
/// the URL after `--`.
pub fn build_args(config: &DownloadConfig, job: &DownloadJob) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::with_capacity(32);

    if let Some(runtime) = &config.js_runtime {
        args.push("--js-runtimes".into());
        args.push(runtime.into());
    }

    args.extend(
        ["-x", "--audio-format", AUDIO_EXTENSION, "--audio-quality", "0"]
            .into_iter()
            .map(OsString::from),
    );

    if config.embed_metadata {
        args.push("--embed-metadata".into());
    }
    if config.embed_thumbnail {
        args.push("--embed-thumbnail".into());
    }

    args.push("-o".into());
    args.push(job.output_template().into_os_string());

    // --print would imply --skip-download; the title goes to a sidecar instead
    args.push("--print-to-file".into());
    args.push("%(title)s".into());
    args.push(job.title_path.clone().into_os_string());

    args.extend(
        [
            "--newline",
            "--progress-template",
            "%(progress._percent_str)s",
            "--no-exec",
            "--ignore-config",
            "--no-playlist",
            "--",
        ]
        .into_iter()
        .map(OsString::from),
    );
    args.push(job.url.as_str().into());

    args
}

/// Prepare the extractor process for `job`
///
/// Output streams are piped for progress parsing and the child is killed if
/// its handle is dropped. On unix the child leads a new process group, so
/// the ffmpeg post-processors it starts can be signalled with it.
pub fn command(config: &DownloadConfig, job: &DownloadJob) -> Command {
    let mut std_command = std::process::Command::new(&config.binary_path);
    std_command
        .args(build_args(config, job))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        std_command.process_group(0);
    }

    let mut command = Command::from(std_command);
    command.kill_on_drop(true);
    command
}

/// The process group led by a spawned extractor
///
/// Killing the group reaches every descendant that did not detach itself.
/// An armed handle kills the group when dropped, which covers a request
/// future cancelled mid-extraction.
#[derive(Debug)]
pub struct ProcessGroup {
    pgid: Option<u32>,
}

impl ProcessGroup {
    /// The group of `child`, which must have been spawned from [`command`]
    pub fn of(child: &Child) -> Self {
        Self { pgid: child.id() }
    }

    /// Send SIGKILL to every process in the group, at most once
    pub fn kill(&mut self) {
        let Some(pgid) = self.pgid.take() else {
            return;
        };
        signal_group(pgid);
    }

    /// Forget the group without signalling it
    pub fn release(&mut self) {
        self.pgid = None;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(unix)]
fn signal_group(pgid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return;
    };
    // SAFETY: killpg takes plain integers and touches no memory we own.
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc != 0 {
        debug!(
            pgid,
            error = %std::io::Error::last_os_error(),
            "extractor process group already gone"
        );
    }
}

#[cfg(not(unix))]
fn signal_group(pgid: u32) {
    debug!(pgid, "process groups unsupported; only the extractor is killed");
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use url::Url;

    fn job() -> DownloadJob {
        DownloadJob::new(
            Path::new("/tmp/ytd"),
            Url::parse("https://youtu.be/abc123").unwrap(),
        )
    }

    fn as_strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    fn value_after(args: &[String], flag: &str) -> Option<String> {
        let pos = args.iter().position(|a| a == flag)?;
        args.get(pos + 1).cloned()
    }

    #[test]
    fn url_is_the_last_argument_after_separator() {
        let args = as_strings(&build_args(&DownloadConfig::default(), &job()));
        let n = args.len();

        assert_eq!(args[n - 2], "--");
        assert_eq!(args[n - 1], "https://youtu.be/abc123");
    }

    #[test]
    fn requests_audio_only_mp3() {
        let args = as_strings(&build_args(&DownloadConfig::default(), &job()));

        assert!(args.contains(&"-x".to_string()));
        assert_eq!(value_after(&args, "--audio-format").as_deref(), Some("mp3"));
        assert_eq!(value_after(&args, "--audio-quality").as_deref(), Some("0"));
    }

    #[test]
    fn writes_title_to_sidecar_and_output_to_job_template() {
        let job = job();
        let args = as_strings(&build_args(&DownloadConfig::default(), &job));

        assert_eq!(
            value_after(&args, "-o").unwrap(),
            format!("/tmp/ytd/{}.%(ext)s", job.id)
        );
        let pos = args.iter().position(|a| a == "--print-to-file").unwrap();
        assert_eq!(args[pos + 1], "%(title)s");
        assert_eq!(args[pos + 2], format!("/tmp/ytd/{}.title", job.id));
        assert!(!args.iter().any(|a| a == "--print" || a == "-O"));
    }

    #[test]
    fn disables_config_exec_and_playlists() {
        let args = as_strings(&build_args(&DownloadConfig::default(), &job()));

        for flag in ["--no-exec", "--ignore-config", "--no-playlist", "--newline"] {
            assert!(args.contains(&flag.to_string()), "missing {flag}");
        }
        assert_eq!(
            value_after(&args, "--progress-template").as_deref(),
            Some("%(progress._percent_str)s")
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn killing_the_group_stops_background_descendants() {
        use std::os::unix::process::CommandExt;
        use std::time::Duration;

        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("late-write");
        let mut std_command = std::process::Command::new("sh");
        std_command
            .arg("-c")
            .arg(format!("(sleep 1; echo late > '{}') & wait", marker.display()))
            .process_group(0);
        let mut child = Command::from(std_command).kill_on_drop(true).spawn().unwrap();
        let mut group = ProcessGroup::of(&child);

        tokio::time::sleep(Duration::from_millis(200)).await;
        group.kill();
        child.wait().await.unwrap();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!marker.exists(), "a descendant outlived its group");
    }

    #[test]
    fn command_starts_the_configured_binary() {
        let config = DownloadConfig {
            binary_path: "/opt/bin/yt-dlp".into(),
            ..DownloadConfig::default()
        };
        let command = command(&config, &job());

        assert_eq!(command.as_std().get_program(), "/opt/bin/yt-dlp");
        assert_eq!(command.as_std().get_args().last().unwrap(), "https://youtu.be/abc123");
    }

    #[test]
    fn embedding_and_js_runtime_are_configurable() {
        let config = DownloadConfig {
            embed_metadata: false,
            embed_thumbnail: false,
            js_runtime: Some("node".into()),
            ..DownloadConfig::default()
        };
        let args = as_strings(&build_args(&config, &job()));

        assert!(!args.contains(&"--embed-metadata".to_string()));
        assert!(!args.contains(&"--embed-thumbnail".to_string()));
        assert_eq!(args[0], "--js-runtimes");
        assert_eq!(args[1], "node");

        let defaults = as_strings(&build_args(&DownloadConfig::default(), &job()));
        assert!(defaults.contains(&"--embed-metadata".to_string()));
        assert!(defaults.contains(&"--embed-thumbnail".to_string()));
        assert!(!defaults.contains(&"--js-runtimes".to_string()));
    }
}
