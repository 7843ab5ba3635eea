//! Container runtime RPC surface.
//!
//! The agent consumes five Docker Engine operations: list, inspect, create,
//! start, stop. `ContainerApi` is the seam; `DockerEngine` implements it over
//! bollard, and `FakeDockerClient` is a call-recording double for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, StartContainerOptions,
    StopContainerOptions,
};
use bollard::models::HostConfig;
use bollard::Docker;

/// Connection timeout for the Docker socket, in seconds.
const DOCKER_TIMEOUT_SECS: u64 = 120;

/// A container as reported by the runtime's list call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiContainer {
    pub id: String,
    /// The runtime reports names with a leading `/`.
    pub names: Vec<String>,
}

/// Detail returned by inspecting a container.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerDetail {
    pub id: String,
    pub running: bool,
}

/// One host-side binding for an exposed container port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortBinding {
    pub host_port: String,
}

/// Everything needed to create and start one container.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateConfig {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub env: Vec<String>,
    pub working_dir: String,
    /// Exposed ports, keyed `<port>/<proto>`.
    pub exposed_ports: Vec<String>,
    /// Container-side mount points.
    pub volumes: Vec<String>,
    /// Host binds, `<host-path>:<container-path>[:ro]`.
    pub binds: Vec<String>,
    /// Host bindings per exposed port key, in manifest order.
    pub port_bindings: HashMap<String, Vec<PortBinding>>,
}

/// The runtime operations the agent consumes.
#[async_trait]
pub trait ContainerApi: Send + Sync {
    async fn list_containers(&self) -> Result<Vec<ApiContainer>>;
    async fn inspect_container(&self, id: &str) -> Result<ContainerDetail>;
    /// Create a container; returns the runtime-assigned id.
    async fn create_container(&self, config: CreateConfig) -> Result<String>;
    async fn start_container(&self, id: &str) -> Result<()>;
    async fn stop_container(&self, id: &str, timeout_secs: u32) -> Result<()>;
}

/// Docker Engine implementation over bollard.
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Connect to the Docker daemon, via the given unix socket or the
    /// platform defaults.
    pub fn new(socket_path: Option<&str>) -> Result<Self> {
        let docker = match socket_path {
            Some(path) => {
                Docker::connect_with_unix(path, DOCKER_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)?
            }
            None => Docker::connect_with_local_defaults()?,
        };
        Ok(Self { docker })
    }

    /// Verify the daemon is reachable.
    pub async fn ping(&self) -> Result<()> {
        self.docker.ping().await?;
        Ok(())
    }
}

#[async_trait]
impl ContainerApi for DockerEngine {
    async fn list_containers(&self) -> Result<Vec<ApiContainer>> {
        let options = ListContainersOptions::<String> {
            all: true,
            ..Default::default()
        };
        let summaries = self.docker.list_containers(Some(options)).await?;
        Ok(summaries
            .into_iter()
            .map(|c| ApiContainer {
                id: c.id.unwrap_or_default(),
                names: c.names.unwrap_or_default(),
            })
            .collect())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerDetail> {
        let response = self.docker.inspect_container(id, None).await?;
        Ok(ContainerDetail {
            id: response.id.unwrap_or_else(|| id.to_string()),
            running: response
                .state
                .and_then(|s| s.running)
                .unwrap_or(false),
        })
    }

    async fn create_container(&self, config: CreateConfig) -> Result<String> {
        let options = CreateContainerOptions {
            name: config.name.clone(),
            platform: None,
        };

        let exposed_ports: HashMap<String, HashMap<(), ()>> = config
            .exposed_ports
            .iter()
            .map(|port| (port.clone(), HashMap::new()))
            .collect();
        let volumes: HashMap<String, HashMap<(), ()>> = config
            .volumes
            .iter()
            .map(|path| (path.clone(), HashMap::new()))
            .collect();
        let port_bindings: HashMap<String, Option<Vec<bollard::models::PortBinding>>> = config
            .port_bindings
            .iter()
            .map(|(port, bindings)| {
                let bindings = bindings
                    .iter()
                    .map(|b| bollard::models::PortBinding {
                        host_ip: None,
                        host_port: Some(b.host_port.clone()),
                    })
                    .collect();
                (port.clone(), Some(bindings))
            })
            .collect();

        let host_config = HostConfig {
            binds: Some(config.binds),
            port_bindings: Some(port_bindings),
            ..Default::default()
        };

        let body = Config {
            image: Some(config.image),
            cmd: Some(config.command),
            env: Some(config.env),
            working_dir: if config.working_dir.is_empty() {
                None
            } else {
                Some(config.working_dir)
            },
            exposed_ports: Some(exposed_ports),
            volumes: Some(volumes),
            host_config: Some(host_config),
            ..Default::default()
        };

        let response = self.docker.create_container(Some(options), body).await?;
        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn stop_container(&self, id: &str, timeout_secs: u32) -> Result<()> {
        let options = StopContainerOptions {
            t: timeout_secs as i64,
        };
        self.docker.stop_container(id, Some(options)).await?;
        Ok(())
    }
}

/// Call-recording fake runtime for tests.
///
/// Records the operation sequence (`list`, `inspect`, `create`, `start`,
/// `stop`), the ids stopped, and the create configs submitted. An injected
/// error fails list and inspect.
#[derive(Default)]
pub struct FakeDockerClient {
    state: Mutex<FakeState>,
}

#[derive(Default)]
struct FakeState {
    containers: Vec<ApiContainer>,
    detail: Option<ContainerDetail>,
    error: Option<String>,
    calls: Vec<&'static str>,
    stopped: Vec<String>,
    created: Vec<CreateConfig>,
    next_id: u64,
}

impl FakeDockerClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake docker state poisoned")
    }

    pub fn set_containers(&self, containers: Vec<ApiContainer>) {
        self.state().containers = containers;
    }

    pub fn set_detail(&self, detail: ContainerDetail) {
        self.state().detail = Some(detail);
    }

    pub fn set_error(&self, message: &str) {
        self.state().error = Some(message.to_string());
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn stopped(&self) -> Vec<String> {
        self.state().stopped.clone()
    }

    pub fn created(&self) -> Vec<CreateConfig> {
        self.state().created.clone()
    }
}

#[async_trait]
impl ContainerApi for FakeDockerClient {
    async fn list_containers(&self) -> Result<Vec<ApiContainer>> {
        let mut state = self.state();
        state.calls.push("list");
        if let Some(message) = &state.error {
            anyhow::bail!("{message}");
        }
        Ok(state.containers.clone())
    }

    async fn inspect_container(&self, _id: &str) -> Result<ContainerDetail> {
        let mut state = self.state();
        state.calls.push("inspect");
        if let Some(message) = &state.error {
            anyhow::bail!("{message}");
        }
        state
            .detail
            .clone()
            .ok_or_else(|| anyhow::anyhow!("no such container"))
    }

    async fn create_container(&self, config: CreateConfig) -> Result<String> {
        let mut state = self.state();
        state.calls.push("create");
        state.created.push(config);
        state.next_id += 1;
        Ok(format!("fake_{:08x}", state.next_id))
    }

    async fn start_container(&self, _id: &str) -> Result<()> {
        self.state().calls.push("start");
        Ok(())
    }

    async fn stop_container(&self, id: &str, _timeout_secs: u32) -> Result<()> {
        let mut state = self.state();
        state.calls.push("stop");
        state.stopped.push(id.to_string());
        Ok(())
    }
}
