use thiserror::Error;

use super::model::{DownloadId, DownloadState};

#[derive(Debug, Clone, Error)]
pub enum AppError {
    #[error("Invalid resource locator: {0}")]
    InvalidLocator(String),

    #[error("Endpoint {0} exists but cannot be reached: {1}")]
    Unreachable(String, String),

    #[error("Coordination error: {0}")]
    Coordination(String),

    #[error("Malformed frame: {0}")]
    Protocol(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Download {0} not found")]
    UnknownDownload(DownloadId),

    #[error("Cannot {action} download {id} while it is {state}")]
    InvalidTransition {
        id: DownloadId,
        action: &'static str,
        state: DownloadState,
    },
}
