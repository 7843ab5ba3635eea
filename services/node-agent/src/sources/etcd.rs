//! State-store manifest source.
//!
//! Unlike the pollers, this source has two phases: an initial read of the
//! node's manifest key, then a long-poll watch on the same key. Watch
//! responses are drained by a dedicated relay task so a slow consumer never
//! stalls the long-poll loop.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use stevedore_manifest::ContainerManifest;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::store::{Response, StateStore};

/// Backoff between attempts to reach the store.
const RETRY_INTERVAL: Duration = Duration::from_secs(30);

/// Watches the store key holding this node's manifest list.
pub struct EtcdSource {
    store: Arc<dyn StateStore>,
    key: String,
    updates: mpsc::Sender<Vec<ContainerManifest>>,
}

impl EtcdSource {
    pub fn new(
        store: Arc<dyn StateStore>,
        key: impl Into<String>,
        updates: mpsc::Sender<Vec<ContainerManifest>>,
    ) -> Self {
        Self {
            store,
            key: key.into(),
            updates,
        }
    }

    /// Read the manifest key once and emit its list downstream.
    ///
    /// A missing key is not an error: nothing has been scheduled onto this
    /// node yet, and nothing is emitted. A response without a node is a
    /// protocol error. Returns the index to watch from.
    pub async fn fetch_initial(&self) -> Result<Option<u64>> {
        match self.store.get(&self.key).await {
            Ok(response) => {
                let next_index = response.node.as_ref().map(|n| n.modified_index + 1);
                let manifests = response_to_manifests(&response)?;
                debug!(key = %self.key, manifest_count = manifests.len(), "Fetched manifest list");
                self.updates
                    .send(manifests)
                    .await
                    .map_err(|_| anyhow!("manifest channel closed"))?;
                Ok(next_index)
            }
            Err(error) if error.is_key_not_found() => {
                debug!(key = %self.key, "No manifest list for this node yet");
                Ok(None)
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Fetch, then watch, until shutdown. Store failures fall back to the
    /// initial fetch after a backoff.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let (responses_tx, responses_rx) = mpsc::channel(4);
        let relay = tokio::spawn(relay_watch_responses(responses_rx, self.updates.clone()));

        let mut retry = tokio::time::interval(RETRY_INTERVAL);
        let mut wait_index: Option<u64> = None;
        let mut synced = false;

        loop {
            if !synced {
                tokio::select! {
                    _ = retry.tick() => {}
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
                match self.fetch_initial().await {
                    Ok(index) => {
                        wait_index = index;
                        synced = true;
                    }
                    Err(error) => {
                        warn!(key = %self.key, error = %error, "Initial manifest fetch failed");
                    }
                }
                continue;
            }

            tokio::select! {
                result = self.store.watch(&self.key, wait_index) => match result {
                    Ok(response) => {
                        if let Some(node) = &response.node {
                            wait_index = Some(node.modified_index + 1);
                        }
                        if responses_tx.send(response).await.is_err() {
                            break;
                        }
                    }
                    Err(error) => {
                        warn!(key = %self.key, error = %error, "Watch failed, re-fetching");
                        synced = false;
                    }
                },
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        drop(responses_tx);
        let _ = relay.await;
    }
}

/// Drain watch responses, parsing each into a manifest list. Malformed
/// responses are skipped; the stream keeps flowing.
pub async fn relay_watch_responses(
    mut responses: mpsc::Receiver<Response>,
    updates: mpsc::Sender<Vec<ContainerManifest>>,
) {
    while let Some(response) = responses.recv().await {
        let manifests = match response_to_manifests(&response) {
            Ok(manifests) => manifests,
            Err(error) => {
                warn!(error = %error, "Skipping malformed watch response");
                continue;
            }
        };
        if updates.send(manifests).await.is_err() {
            break;
        }
    }
}

/// Extract the manifest list carried by a store response.
fn response_to_manifests(response: &Response) -> Result<Vec<ContainerManifest>> {
    let node = response
        .node
        .as_ref()
        .ok_or_else(|| anyhow!("store response has no node"))?;
    let value = node
        .value
        .as_deref()
        .ok_or_else(|| anyhow!("store node has no value"))?;
    Ok(ContainerManifest::parse_list(value.as_bytes())?)
}
