use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::configuration::config::Config;
use crate::error_handling::types::CaptureError;

use super::types::Direction;

/// Append-only raw dump of the payload forwarded in one direction.
///
/// A sink is opened once per process and shared by every session. Each call to
/// [`CaptureSink::record`] appends a whole chunk and syncs it to disk before returning; chunks
/// from concurrent sessions land in whatever order their copiers get the lock. There is no
/// header and no framing.
#[derive(Debug)]
pub struct CaptureSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl CaptureSink {
    /// Opens `path` for append, creating it if needed.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, CaptureError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| CaptureError::OpenFailed(path.clone(), e))?;
        info!("Capture file {} opened", path.display());
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `chunk` and syncs it. Empty chunks are ignored.
    ///
    /// Returns the number of bytes persisted.
    pub async fn record(&self, chunk: &[u8]) -> Result<usize, CaptureError> {
        if chunk.is_empty() {
            return Ok(0);
        }
        let mut file = self.file.lock().await;
        file.write_all(chunk).await?;
        file.flush().await?;
        file.sync_data().await?;
        debug!("Wrote {} byte(s) to {}", chunk.len(), self.path.display());
        Ok(chunk.len())
    }
}

/// The capture sinks configured for both directions.
#[derive(Debug, Clone, Default)]
pub struct CaptureSinks {
    pub upstream: Option<Arc<CaptureSink>>,
    pub downstream: Option<Arc<CaptureSink>>,
}

impl CaptureSinks {
    /// Opens every capture file named in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::OpenFailed`] for the first file that cannot be opened. The caller
    /// is expected to treat this as fatal.
    pub async fn open(config: &Config) -> Result<Self, CaptureError> {
        let upstream = match config.upstream_capture_file.as_ref() {
            Some(path) => Some(Arc::new(CaptureSink::open(path).await?)),
            None => None,
        };
        let downstream = match config.downstream_capture_file.as_ref() {
            Some(path) => Some(Arc::new(CaptureSink::open(path).await?)),
            None => None,
        };
        Ok(Self {
            upstream,
            downstream,
        })
    }

    pub fn for_direction(&self, direction: Direction) -> Option<Arc<CaptureSink>> {
        match direction {
            Direction::Upstream => self.upstream.clone(),
            Direction::Downstream => self.downstream.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::test_support::config_for;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_record_appends_to_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("up.bin");
        std::fs::write(&path, b"old|").unwrap();

        let sink = CaptureSink::open(&path).await.unwrap();
        assert_eq!(sink.record(b"hello").await.unwrap(), 5);
        assert_eq!(sink.record(b"").await.unwrap(), 0);
        assert_eq!(sink.record(b"_t").await.unwrap(), 2);

        assert_eq!(std::fs::read(&path).unwrap(), b"old|hello_t");
    }

    #[tokio::test]
    async fn test_open_fails_for_missing_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("up.bin");
        assert!(matches!(
            CaptureSink::open(&path).await,
            Err(CaptureError::OpenFailed(_, _))
        ));
    }

    #[tokio::test]
    async fn test_sinks_follow_configuration() {
        let dir = TempDir::new().unwrap();
        let down = dir.path().join("down.bin");
        let mut config = config_for(10000);
        config.downstream_capture_file = Some(down.clone());

        let sinks = CaptureSinks::open(&config).await.unwrap();
        assert!(sinks.for_direction(Direction::Upstream).is_none());
        let sink = sinks.for_direction(Direction::Downstream).unwrap();
        assert_eq!(sink.path(), down.as_path());
        assert!(down.exists());
    }
}
