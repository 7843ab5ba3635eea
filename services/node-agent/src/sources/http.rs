//! HTTP manifest source.

use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use stevedore_manifest::ContainerManifest;
use tokio::sync::{mpsc, watch};
use tracing::warn;

/// Ceiling on manifest response bodies.
const MAX_MANIFEST_BYTES: usize = 1 << 20;

/// Request timeout for a single poll.
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Polls a manifest URL and emits the parsed manifest when the response
/// bytes change.
pub struct HttpSource {
    url: String,
    client: reqwest::Client,
    poll_interval: Duration,
    updates: mpsc::Sender<ContainerManifest>,
}

impl HttpSource {
    pub fn new(
        url: impl Into<String>,
        poll_interval: Duration,
        updates: mpsc::Sender<ContainerManifest>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            url: url.into(),
            client,
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
                            warn!(url = %self.url, error = %error, "Manifest fetch failed");
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

    /// Fetch and parse the manifest, emitting it iff the response bytes
    /// differ from `last`. Returns the snapshot to carry forward.
    pub async fn extract(&self, last: &[u8]) -> Result<Vec<u8>> {
        let response = self.client.get(&self.url).send().await?;
        if !response.status().is_success() {
            bail!("manifest fetch returned status {}", response.status());
        }

        let data = response.bytes().await?;
        if data.len() > MAX_MANIFEST_BYTES {
            bail!(
                "manifest response too large: {} bytes (limit {})",
                data.len(),
                MAX_MANIFEST_BYTES
            );
        }

        let manifest = ContainerManifest::parse(&data)?;
        if data != last {
            self.updates
                .send(manifest)
                .await
                .map_err(|_| anyhow!("manifest channel closed"))?;
        }
        Ok(data.to_vec())
    }
}
