//! Streaming a finished file while guaranteeing it is deleted exactly once

use crate::error::PipelineError;
use axum::body::Bytes;
use futures::Stream;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

/// Owns a temp file and deletes it at most once
///
/// Deletion happens on the first [`TempFileGuard::dispose`] call or on drop,
/// whichever comes first. A file that is already gone is not an error.
#[derive(Debug)]
pub struct TempFileGuard {
    path: Option<PathBuf>,
}

impl TempFileGuard {
    /// Take ownership of `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// The guarded path, until disposed
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Delete the file; returns `false` if this guard already disposed it
    pub fn dispose(&mut self) -> bool {
        let Some(path) = self.path.take() else {
            return false;
        };
        // Runs inside poll_next and Drop, where nothing can be awaited; a
        // single unlink is a metadata operation, not a data transfer.
        match std::fs::remove_file(&path) {
            Ok(()) => debug!(?path, "disposed temp file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(?path, "temp file already gone")
            }
            Err(e) => warn!(?path, error = %e, "failed to dispose temp file"),
        }
        true
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Byte stream that disposes its backing file when it ends, errors, or is dropped
///
/// Dropping covers client disconnects: the HTTP layer drops the body and the
/// guard fires.
pub struct DisposingStream<S> {
    inner: S,
    guard: TempFileGuard,
}

impl<S> DisposingStream<S> {
    /// Wrap `inner`, taking ownership of the file behind it
    pub fn new(inner: S, guard: TempFileGuard) -> Self {
        Self { inner, guard }
    }

    /// Whether the backing file has been disposed
    pub fn is_disposed(&self) -> bool {
        self.guard.path().is_none()
    }
}

impl<S> Stream for DisposingStream<S>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin,
{
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let item = ready!(Pin::new(&mut this.inner).poll_next(cx));
        match &item {
            None => {
                this.guard.dispose();
            }
            Some(Err(e)) => {
                warn!(error = %e, "stream failed, disposing temp file");
                this.guard.dispose();
            }
            Some(Ok(_)) => {}
        }
        Poll::Ready(item)
    }
}

/// A finished audio file ready to be sent
pub struct AudioFile {
    /// Size in bytes, for `Content-Length`
    pub len: u64,
    /// File contents; deletes the file once consumed or dropped
    pub stream: DisposingStream<ReaderStream<File>>,
}

/// Open `path` for streaming under the disposal contract
///
/// The file is deleted even if opening it fails.
pub async fn stream_and_dispose(path: &Path) -> Result<AudioFile, PipelineError> {
    let guard = TempFileGuard::new(path);

    let file = File::open(path)
        .await
        .map_err(|e| PipelineError::resource(path, &e))?;
    let len = file
        .metadata()
        .await
        .map_err(|e| PipelineError::resource(path, &e))?
        .len();

    Ok(AudioFile {
        len,
        stream: DisposingStream::new(ReaderStream::new(file), guard),
    })
}
