//! Higher-level container queries over the raw runtime surface.
//!
//! The driver is stateless; every query re-derives what it needs from the
//! runtime's list call, which is what lets the agent recover ownership of
//! its containers across restarts.

use std::sync::Arc;

use anyhow::Result;
use stevedore_manifest::{parse_runtime_name, runtime_container_name, Container, ContainerManifest};
use tracing::debug;

use crate::docker::{ContainerApi, ContainerDetail, CreateConfig};
use crate::translate;

/// Grace period handed to the runtime when stopping a container, in seconds.
const STOP_TIMEOUT_SECS: u32 = 10;

/// Thin driver over the runtime RPC surface.
#[derive(Clone)]
pub struct ContainerRuntime {
    client: Arc<dyn ContainerApi>,
}

impl ContainerRuntime {
    pub fn new(client: Arc<dyn ContainerApi>) -> Self {
        Self { client }
    }

    /// Check whether the container described by `(manifest, container)` is
    /// present at the runtime, returning its detail when it is.
    pub async fn container_exists(
        &self,
        manifest: &ContainerManifest,
        container: &Container,
    ) -> Result<Option<ContainerDetail>> {
        let names = self.list_container_names().await?;
        for name in &names {
            let Some((manifest_id, container_name)) = parse_runtime_name(name) else {
                continue;
            };
            if manifest_id == manifest.id && container_name == container.name {
                return self.container_by_name(name).await;
            }
        }
        Ok(None)
    }

    /// Resolve a runtime name to a container id by exact name membership.
    pub async fn container_id(&self, name: &str) -> Result<Option<String>> {
        let containers = self.client.list_containers().await?;
        for entry in containers {
            if entry.names.iter().any(|n| n == name) {
                return Ok(Some(entry.id));
            }
        }
        Ok(None)
    }

    /// Resolve a runtime name and inspect the container behind it.
    pub async fn container_by_name(&self, name: &str) -> Result<Option<ContainerDetail>> {
        let Some(id) = self.container_id(name).await? else {
            return Ok(None);
        };
        Ok(Some(self.client.inspect_container(&id).await?))
    }

    /// All runtime container names, managed or not. The first reported name
    /// identifies each container.
    pub async fn list_container_names(&self) -> Result<Vec<String>> {
        let containers = self.client.list_containers().await?;
        Ok(containers
            .into_iter()
            .filter_map(|c| c.names.into_iter().next())
            .collect())
    }

    /// Stop a container by runtime name. A failed name resolution surfaces
    /// the error without issuing a stop.
    pub async fn kill_container(&self, name: &str) -> Result<()> {
        let id = self
            .container_id(name)
            .await?
            .ok_or_else(|| anyhow::anyhow!("couldn't find container: {name}"))?;
        debug!(name = %name, id = %id, "Stopping container");
        self.client.stop_container(&id, STOP_TIMEOUT_SECS).await
    }

    /// Create and start one container from its manifest entry. Returns the
    /// runtime-assigned container id.
    pub async fn run_container(
        &self,
        manifest: &ContainerManifest,
        container: &Container,
    ) -> Result<String> {
        let name = runtime_container_name(&manifest.id, &container.name);
        let command = translate::command_line(container);
        let env = translate::environment_variables(container);
        let (volumes, binds) = translate::volumes_and_binds(container);
        let (exposed_ports, port_bindings) = translate::ports_and_bindings(container);

        let config = CreateConfig {
            name,
            image: container.image.clone(),
            command,
            env,
            working_dir: container.working_dir.clone(),
            exposed_ports,
            volumes,
            binds,
            port_bindings,
        };

        let id = self.client.create_container(config).await?;
        self.client.start_container(&id).await?;
        Ok(id)
    }
}
