//! Progress events and extractor output parsing

use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use uuid::Uuid;

#[allow(clippy::expect_used)]
static PERCENT: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(\d+(?:\.\d+)?)%").expect("percent pattern is a valid regex")
});

/// Lifecycle stage of a download job
///
/// Jobs move through `downloading* -> converting* -> (complete | error)` and
/// emit exactly one terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    /// Fetching the source media
    Downloading,
    /// Fetch finished, converting to the target audio format
    Converting,
    /// Output file is ready
    Complete,
    /// The job failed and its files were removed
    Error,
}

impl DownloadStatus {
    /// Whether no further events follow this status
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }

    /// Status implied by a progress percentage
    pub fn from_percent(percent: f64) -> Self {
        if percent >= 100.0 {
            Self::Converting
        } else {
            Self::Downloading
        }
    }
}

/// One progress notification for a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadProgress {
    /// The job this event belongs to
    pub job_id: Uuid,
    /// Current stage
    pub status: DownloadStatus,
    /// Completion percentage in `[0, 100]`, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent: Option<f64>,
}

/// Extract the most recent percentage from a chunk of extractor output
///
/// Returns the last `NN.N%` occurrence clamped to `[0, 100]`.
pub fn parse_percent(chunk: &str) -> Option<f64> {
    PERCENT
        .captures_iter(chunk)
        .filter_map(|caps| caps.get(1)?.as_str().parse::<f64>().ok())
        .last()
        .map(|p| p.clamp(0.0, 100.0))
}
