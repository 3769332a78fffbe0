use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::stream::AbortHandle;
use url::Url;

use super::AppError;
use crate::utils::sanitize_filename;

/// Absolute URL identifying the content to download.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceLocator(Url);

impl ResourceLocator {
    pub fn parse(input: &str) -> Result<Self, AppError> {
        let url = Url::parse(input.trim())
            .map_err(|e| AppError::InvalidLocator(format!("{}: {}", input, e)))?;

        if url.cannot_be_a_base() {
            return Err(AppError::InvalidLocator(format!(
                "{}: not an absolute URL",
                input
            )));
        }

        Ok(Self(url))
    }

    /// Percent-encoded form, as sent on the wire and to the HTTP client.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Default file name offered in the save dialog.
    ///
    /// Uses the last non-empty path segment, then the host, then a fixed
    /// fallback.
    pub fn file_name_hint(&self) -> String {
        let segment = self
            .0
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .map(|s| {
                urlencoding::decode(s)
                    .map(|decoded| decoded.into_owned())
                    .unwrap_or_else(|_| s.to_string())
            });

        let candidate = segment
            .or_else(|| self.0.host_str().map(str::to_string))
            .map(|name| sanitize_filename(&name))
            .unwrap_or_default();

        let candidate = candidate.trim_matches(|c| c == '.' || c == ' ');
        if candidate.is_empty() {
            "download".to_string()
        } else {
            candidate.to_string()
        }
    }
}

impl FromStr for ResourceLocator {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ResourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The unit carried by one frame on the transport endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub locator: ResourceLocator,
}

impl DownloadRequest {
    pub fn new(locator: ResourceLocator) -> Self {
        Self { locator }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DownloadId(pub u64);

impl fmt::Display for DownloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    Pending,
    Running,
    /// Body fully received, write to the destination in flight.
    Saving,
    Completed,
    /// Body received but the destination could not be written. Waits for
    /// the user to retry the write or abandon it.
    WriteFailed,
    /// Body received, write abandoned by the user.
    Unsaved,
    Cancelled,
    Failed,
}

impl DownloadState {
    /// States that stay on screen until the user dismisses them.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Unsaved | Self::Cancelled | Self::Failed
        )
    }

    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for DownloadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Running => "downloading",
            Self::Saving => "saving",
            Self::Completed => "completed",
            Self::WriteFailed => "completed, not saved",
            Self::Unsaved => "completed, discarded",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Snapshot of a download's counters at one point in time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSample {
    pub bytes_received: u64,
    /// `None` until the server discloses the size.
    pub bytes_total: Option<u64>,
    pub elapsed: Duration,
}

impl ProgressSample {
    /// Completed fraction in `0.0..=1.0`, or `None` while indeterminate.
    pub fn fraction(&self) -> Option<f32> {
        match self.bytes_total {
            Some(0) => Some(1.0),
            Some(total) => Some((self.bytes_received as f64 / total as f64).min(1.0) as f32),
            None => None,
        }
    }

    /// Estimated time remaining: `elapsed * (total / received - 1)`.
    ///
    /// Saturates at `Duration::MAX` when the advertised size is absurd.
    pub fn remaining(&self) -> Option<Duration> {
        let total = self.bytes_total?;
        if self.bytes_received == 0 {
            return None;
        }

        let factor = total as f64 / self.bytes_received as f64 - 1.0;
        let secs = (self.elapsed.as_secs_f64() * factor).max(0.0);

        Some(Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX))
    }
}

#[derive(Debug)]
pub struct Download {
    pub(crate) id: DownloadId,
    pub(crate) locator: ResourceLocator,
    pub(crate) destination: PathBuf,
    pub(crate) bytes_received: u64,
    pub(crate) bytes_total: Option<u64>,
    pub(crate) started_at: Instant,
    pub(crate) state: DownloadState,
    pub(crate) last_error: Option<String>,
    pub(crate) write_error: Option<String>,
    /// Bumped on every fetch; events tagged with an older value are stale.
    pub(crate) attempt: u32,
    pub(crate) body: Option<Bytes>,
    pub(crate) fetch: Option<AbortHandle>,
}

impl Download {
    pub(crate) fn new(id: DownloadId, locator: ResourceLocator, destination: PathBuf) -> Self {
        Self {
            id,
            locator,
            destination,
            bytes_received: 0,
            bytes_total: None,
            started_at: Instant::now(),
            state: DownloadState::Pending,
            last_error: None,
            write_error: None,
            attempt: 0,
            body: None,
            fetch: None,
        }
    }

    pub fn id(&self) -> DownloadId {
        self.id
    }

    pub fn locator(&self) -> &ResourceLocator {
        &self.locator
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    pub fn bytes_total(&self) -> Option<u64> {
        self.bytes_total
    }

    pub fn state(&self) -> DownloadState {
        self.state
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn write_error(&self) -> Option<&str> {
        self.write_error.as_deref()
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn sample(&self, now: Instant) -> ProgressSample {
        ProgressSample {
            bytes_received: self.bytes_received,
            bytes_total: self.bytes_total,
            elapsed: now.saturating_duration_since(self.started_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(received: u64, total: Option<u64>, elapsed_secs: f64) -> ProgressSample {
        ProgressSample {
            bytes_received: received,
            bytes_total: total,
            elapsed: Duration::from_secs_f64(elapsed_secs),
        }
    }

    #[test]
    fn test_remaining_unknown() {
        assert_eq!(sample(0, Some(100), 5.0).remaining(), None);
        assert_eq!(sample(10, None, 5.0).remaining(), None);
    }

    #[test]
    fn test_remaining_floored_at_zero() {
        assert_eq!(sample(200, Some(100), 5.0).remaining(), Some(Duration::ZERO));
        assert_eq!(sample(100, Some(100), 5.0).remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn test_remaining_saturates_on_huge_total() {
        assert_eq!(
            sample(1, Some(u64::MAX), 2.0).remaining(),
            Some(Duration::MAX)
        );
    }

    #[test]
    fn test_remaining_decreases_at_constant_rate() {
        let total = 1_000_000u64;
        let rate = 10_000.0;
        let mut previous: Option<Duration> = None;
        for received in (50_000..total).step_by(50_000) {
            let remaining = sample(received, Some(total), received as f64 / rate)
                .remaining()
                .unwrap();
            if let Some(previous) = previous {
                assert!(remaining < previous);
            }
            previous = Some(remaining);
        }
    }

    #[test]
    fn test_parse_rejects_relative() {
        assert!(ResourceLocator::parse("/just/a/path").is_err());
        assert!(ResourceLocator::parse("not a url").is_err());
        assert!(ResourceLocator::parse("https://example.com/a.iso").is_ok());
    }

    #[test]
    fn test_file_name_hint() {
        let locator = ResourceLocator::parse("https://example.com/pub/file%20name.tar.gz").unwrap();
        assert_eq!(locator.file_name_hint(), "file name.tar.gz");

        let locator = ResourceLocator::parse("https://example.com/dir/").unwrap();
        assert_eq!(locator.file_name_hint(), "dir");

        let locator = ResourceLocator::parse("https://example.com/").unwrap();
        assert_eq!(locator.file_name_hint(), "example.com");
    }

    #[test]
    fn test_terminal_states() {
        assert!(DownloadState::Completed.is_terminal());
        assert!(DownloadState::Unsaved.is_terminal());
        assert!(!DownloadState::WriteFailed.is_terminal());
        assert!(!DownloadState::Running.is_terminal());
    }
}
