//! Translation from manifest fields to runtime launch parameters.
//!
//! Pure functions; everything here is deterministic on the container alone.

use std::collections::HashMap;

use stevedore_manifest::Container;
use tracing::warn;

use crate::docker::PortBinding;

/// Root under which named volumes are exported on the host.
const VOLUME_EXPORT_ROOT: &str = "/exports";

/// Split the manifest command string into argv tokens.
pub fn command_line(container: &Container) -> Vec<String> {
    if container.command.is_empty() {
        return Vec::new();
    }
    container.command.split(' ').map(String::from).collect()
}

/// Render env entries as `name=value` strings, order preserved.
pub fn environment_variables(container: &Container) -> Vec<String> {
    container
        .env
        .iter()
        .map(|env| format!("{}={}", env.name, env.value))
        .collect()
}

/// Produce container-side mount points and host bind strings.
///
/// Each mount contributes a mount point at its path and a bind of the form
/// `/exports/<name>:<mountPath>`, with `:ro` appended for read-only mounts.
pub fn volumes_and_binds(container: &Container) -> (Vec<String>, Vec<String>) {
    let mut volumes = Vec::new();
    let mut binds = Vec::new();
    for mount in &container.volume_mounts {
        volumes.push(mount.mount_path.clone());
        let mut bind = format!("{}/{}:{}", VOLUME_EXPORT_ROOT, mount.name, mount.mount_path);
        if mount.read_only {
            bind.push_str(":ro");
        }
        binds.push(bind);
    }
    (volumes, binds)
}

/// Produce exposed port keys and host bindings.
///
/// The protocol normalizes to `udp` only when the manifest says so; anything
/// else, including empty, is treated as `tcp`. Repeated container-port keys
/// accumulate their host bindings in manifest order.
pub fn ports_and_bindings(
    container: &Container,
) -> (Vec<String>, HashMap<String, Vec<PortBinding>>) {
    let mut exposed = Vec::new();
    let mut bindings: HashMap<String, Vec<PortBinding>> = HashMap::new();
    for port in &container.ports {
        let protocol = match port.protocol.to_lowercase().as_str() {
            "udp" => "udp",
            "tcp" | "" => "tcp",
            other => {
                warn!(protocol = %other, "Unknown protocol, defaulting to tcp");
                "tcp"
            }
        };
        let key = format!("{}/{}", port.container_port, protocol);
        exposed.push(key.clone());
        bindings.entry(key).or_default().push(PortBinding {
            host_port: port.host_port.to_string(),
        });
    }
    (exposed, bindings)
}
