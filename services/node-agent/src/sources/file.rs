//! Local-file manifest source.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};
use stevedore_manifest::ContainerManifest;
use tokio::sync::{mpsc, watch};
use tracing::warn;

/// Polls a manifest file and emits the parsed manifest when its bytes
/// change.
pub struct FileSource {
    path: PathBuf,
    poll_interval: Duration,
    updates: mpsc::Sender<ContainerManifest>,
}

impl FileSource {
    pub fn new(
        path: impl Into<PathBuf>,
        poll_interval: Duration,
        updates: mpsc::Sender<ContainerManifest>,
    ) -> Self {
        Self {
            path: path.into(),
            poll_interval,
            updates,
        }
    }

    /// Poll until shutdown. A failed poll keeps the previous snapshot; the
    /// next tick retries from scratch.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut snapshot: Vec<u8> = Vec::new();
        let mut ticker = tokio::time::interval(self.poll_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.extract(&snapshot).await {
                        Ok(data) => snapshot = data,
                        Err(error) => {
                            warn!(path = %self.path.display(), error = %error, "Manifest file poll failed");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    /// Read and parse the file, emitting the manifest iff its bytes differ
    /// from `last`. Returns the snapshot to carry forward.
    pub async fn extract(&self, last: &[u8]) -> Result<Vec<u8>> {
        let data = tokio::fs::read(&self.path).await?;
        let manifest = ContainerManifest::parse(&data)?;
        if data != last {
            self.updates
                .send(manifest)
                .await
                .map_err(|_| anyhow!("manifest channel closed"))?;
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn source_with_channel(path: &std::path::Path) -> (FileSource, mpsc::Receiver<ContainerManifest>) {
        let (tx, rx) = mpsc::channel(1);
        (FileSource::new(path, Duration::from_secs(20), tx), rx)
    }

    fn write_temp(data: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(data).unwrap();
        file.flush().unwrap();
        file
    }

    #[tokio::test]
    async fn test_extract_from_missing_file() {
        let (source, mut rx) = source_with_channel(std::path::Path::new("/some/fake/file"));
        let err = source.extract(&[1, 2, 3]).await;
        assert!(err.is_err());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_extract_from_bad_data() {
        let file = write_temp(&[1, 2, 3]);
        let (source, mut rx) = source_with_channel(file.path());
        let err = source.extract(&[1, 2, 3]).await;
        assert!(err.is_err());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_extract_from_same_data() {
        let last = serde_json::to_vec(&ContainerManifest {
            id: "foo".to_string(),
            ..Default::default()
        })
        .unwrap();
        let file = write_temp(&last);
        let (source, mut rx) = source_with_channel(file.path());

        let data = source.extract(&last).await.unwrap();
        assert_eq!(data, last);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_extract_from_changed_data() {
        let last = serde_json::to_vec(&ContainerManifest {
            id: "foo".to_string(),
            ..Default::default()
        })
        .unwrap();
        let new_data = serde_json::to_vec(&ContainerManifest {
            id: "bar".to_string(),
            ..Default::default()
        })
        .unwrap();
        let file = write_temp(&new_data);
        let (source, mut rx) = source_with_channel(file.path());

        let data = source.extract(&last).await.unwrap();
        assert_eq!(data, new_data);

        let manifest = rx.try_recv().unwrap();
        assert_eq!(manifest.id, "bar");
        assert!(rx.try_recv().is_err());
    }
}
