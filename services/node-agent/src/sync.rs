//! The reconciliation loop.
//!
//! The loop holds one "latest" slot per manifest source and wakes on any
//! source emission or on the sync timer. Each tick concatenates the slots
//! into the desired set and converges the runtime against it: missing
//! containers are created and started, managed containers with no desired
//! counterpart are stopped. Creates happen before stops, so a manifest
//! rename never leaves a service without an instance mid-tick.
//!
//! Containers whose runtime name lacks the `--` marker were started outside
//! the agent and are never touched.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::Result;
use stevedore_manifest::{
    parse_runtime_name, runtime_container_name, Container, ContainerManifest, Event,
};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::events::EventRecorder;
use crate::runtime::ContainerRuntime;

/// Receive ends of the per-source manifest channels. A source that is not
/// configured simply has its sender dropped; its branch goes quiet.
pub struct SyncSources {
    pub file: mpsc::Receiver<ContainerManifest>,
    pub http: mpsc::Receiver<ContainerManifest>,
    pub etcd: mpsc::Receiver<Vec<ContainerManifest>>,
}

pub struct SyncLoop {
    runtime: ContainerRuntime,
    events: Option<EventRecorder>,
    interval: Duration,
}

impl SyncLoop {
    pub fn new(runtime: ContainerRuntime, events: Option<EventRecorder>, interval: Duration) -> Self {
        Self {
            runtime,
            events,
            interval,
        }
    }

    /// Run until shutdown, syncing on every source emission and on the
    /// timer.
    pub async fn run(&self, mut sources: SyncSources, mut shutdown: watch::Receiver<bool>) {
        info!(
            sync_interval_secs = self.interval.as_secs(),
            "Starting sync loop"
        );

        let mut last_file: Vec<ContainerManifest> = Vec::new();
        let mut last_http: Vec<ContainerManifest> = Vec::new();
        let mut last_etcd: Vec<ContainerManifest> = Vec::new();

        // First tick lands a full interval out, so sources get a chance to
        // report before the first timer-driven sync of an empty desired set.
        let start = tokio::time::Instant::now() + self.interval;
        let mut ticker = tokio::time::interval_at(start, self.interval);

        loop {
            tokio::select! {
                Some(manifest) = sources.file.recv() => {
                    debug!(manifest = %manifest.id, "File source changed");
                    last_file = vec![manifest];
                }
                Some(manifest) = sources.http.recv() => {
                    debug!(manifest = %manifest.id, "HTTP source changed");
                    last_http = vec![manifest];
                }
                Some(manifests) = sources.etcd.recv() => {
                    debug!(manifest_count = manifests.len(), "Store source changed");
                    last_etcd = manifests;
                }
                _ = ticker.tick() => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Sync loop shutting down");
                        break;
                    }
                }
            }

            let desired: Vec<ContainerManifest> = last_file
                .iter()
                .chain(last_http.iter())
                .chain(last_etcd.iter())
                .cloned()
                .collect();

            if let Err(e) = self.sync(&desired).await {
                error!(error = %e, "Sync failed");
            }
        }
    }

    /// One reconciliation pass against the given desired set.
    pub async fn sync(&self, desired: &[ContainerManifest]) -> Result<()> {
        debug!(manifest_count = desired.len(), "Syncing desired state");

        let mut desired_names = HashSet::new();
        for manifest in desired {
            for container in &manifest.containers {
                let name = runtime_container_name(&manifest.id, &container.name);
                desired_names.insert(name.clone());

                let existing = match self.runtime.container_exists(manifest, container).await {
                    Ok(existing) => existing,
                    Err(e) => {
                        error!(
                            container = %container.name,
                            error = %e,
                            "Error checking container existence"
                        );
                        continue;
                    }
                };
                if existing.is_some() {
                    debug!(name = %name, "Container already running");
                    continue;
                }

                info!(
                    manifest = %manifest.id,
                    container = %container.name,
                    "Container missing, creating"
                );
                match self.runtime.run_container(manifest, container).await {
                    Ok(id) => {
                        info!(name = %name, id = %id, "Container started");
                        self.record_event("started", container).await;
                    }
                    Err(e) => {
                        error!(name = %name, error = %e, "Error creating container");
                        self.record_event("failed to start", container).await;
                    }
                }
            }
        }

        let existing = self.runtime.list_container_names().await?;
        for name in existing {
            let trimmed = name.strip_prefix('/').unwrap_or(&name).to_string();
            if !trimmed.contains("--") {
                // Not ours. Users may run their own containers alongside.
                continue;
            }
            if desired_names.contains(&trimmed) {
                continue;
            }

            info!(name = %trimmed, "Stopping orphaned container");
            if let Err(e) = self.runtime.kill_container(&name).await {
                error!(name = %trimmed, error = %e, "Error stopping container");
                continue;
            }
            if let Some((_, container_name)) = parse_runtime_name(&trimmed) {
                let container = Container {
                    name: container_name,
                    ..Default::default()
                };
                self.record_event("stopped", &container).await;
            }
        }

        Ok(())
    }

    /// Best-effort event write; failures are logged and dropped.
    async fn record_event(&self, what: &str, container: &Container) {
        let Some(recorder) = &self.events else {
            return;
        };
        let event = Event {
            event: what.to_string(),
            container: container.clone(),
            timestamp: 0,
        };
        if let Err(e) = recorder.log_event(&event).await {
            warn!(container = %container.name, error = %e, "Failed to record event");
        }
    }
}
