pub mod error;
pub mod model;

pub use error::AppError;
pub use model::{
    Download, DownloadId, DownloadRequest, DownloadState, ProgressSample, ResourceLocator,
};
