use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::domain::{AppError, DownloadId};

/// Write `body` to `destination`, replacing any existing file.
///
/// Intermediate directories are never created.
pub async fn write_body(destination: &Path, body: &[u8]) -> Result<(), AppError> {
    let mut file = tokio::fs::File::create(destination)
        .await
        .map_err(|e| AppError::Io(format!("Failed to open {}: {}", destination.display(), e)))?;

    file.write_all(body)
        .await
        .map_err(|e| AppError::Io(format!("Write error on {}: {}", destination.display(), e)))?;

    file.sync_all()
        .await
        .map_err(|e| AppError::Io(format!("Failed to sync {}: {}", destination.display(), e)))?;

    Ok(())
}

/// One write attempt for a fully received body.
///
/// The body is shared with the engine, so a retry reuses the same bytes.
#[derive(Debug, Clone)]
pub struct PersistJob {
    pub id: DownloadId,
    pub destination: PathBuf,
    pub body: Bytes,
}

impl PersistJob {
    pub async fn execute(self) -> (DownloadId, Result<(), AppError>) {
        debug!(id = %self.id, path = %self.destination.display(), len = self.body.len(), "writing body");

        let result = write_body(&self.destination, &self.body).await;
        if let Err(e) = &result {
            warn!(id = %self.id, error = %e, "write failed");
        }

        (self.id, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_body() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");

        write_body(&path, b"payload").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"payload");

        // Existing files are truncated
        write_body(&path, b"x").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"x");
    }

    #[tokio::test]
    async fn test_missing_directory_is_not_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.bin");

        let job = PersistJob {
            id: DownloadId(7),
            destination: path.clone(),
            body: Bytes::from_static(b"payload"),
        };
        let (id, result) = job.execute().await;

        assert_eq!(id, DownloadId(7));
        assert!(matches!(result, Err(AppError::Io(_))));
        assert!(!dir.path().join("missing").exists());
    }
}
