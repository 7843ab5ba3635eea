//! Wire types for container manifests and events.
//!
//! Field names follow the external camelCase schema. Every field defaults so
//! partial manifests parse; unknown fields are carried past without error.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Manifest handling errors.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The payload is not a valid manifest document.
    #[error("invalid manifest: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// A declarative description of a desired group of containers sharing an
/// identity. The `id` must be unique within a manifest list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContainerManifest {
    pub version: String,
    pub id: String,
    pub volumes: Vec<Volume>,
    pub containers: Vec<Container>,
}

impl ContainerManifest {
    /// Parse a single manifest from YAML or JSON bytes.
    pub fn parse(data: &[u8]) -> Result<Self, ManifestError> {
        Ok(serde_yaml::from_slice(data)?)
    }

    /// Parse a manifest list from YAML or JSON bytes.
    pub fn parse_list(data: &[u8]) -> Result<Vec<Self>, ManifestError> {
        Ok(serde_yaml::from_slice(data)?)
    }
}

/// A named volume declared at the manifest level and referenced by
/// container mounts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Volume {
    pub name: String,
}

/// One container within a manifest. `name` is unique within its manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Container {
    pub name: String,
    pub image: String,
    /// Whitespace-delimited command string, split into argv at launch.
    pub command: String,
    pub working_dir: String,
    pub volume_mounts: Vec<VolumeMount>,
    pub ports: Vec<Port>,
    pub env: Vec<EnvVar>,
    pub memory: i64,
    pub cpu: i64,
}

/// A host-to-container volume mount.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VolumeMount {
    pub name: String,
    pub read_only: bool,
    pub mount_path: String,
}

/// A container-to-host port mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Port {
    pub name: String,
    pub host_port: u16,
    pub container_port: u16,
    /// `"tcp"` or `"udp"`; anything else normalizes to tcp at translation.
    pub protocol: String,
}

/// An environment variable entry, rendered as `name=value` at launch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

/// An observable lifecycle event, recorded to the state store under the
/// container's name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Event {
    pub event: String,
    pub container: Container,
    /// Unix seconds, stamped by the recorder at write time.
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flow_style() {
        let data = br#"{ "id": "foo", "containers": [{ "name": "bar", "image": "busybox" }] }"#;
        let manifest = ContainerManifest::parse(data).unwrap();
        assert_eq!(manifest.id, "foo");
        assert_eq!(manifest.containers.len(), 1);
        assert_eq!(manifest.containers[0].name, "bar");
        assert_eq!(manifest.containers[0].image, "busybox");
    }

    #[test]
    fn test_parse_block_style() {
        let data = b"id: web\ncontainers:\n  - name: nginx\n    image: nginx:1.25\n    ports:\n      - containerPort: 80\n        hostPort: 8080\n";
        let manifest = ContainerManifest::parse(data).unwrap();
        assert_eq!(manifest.id, "web");
        assert_eq!(manifest.containers[0].ports[0].container_port, 80);
        assert_eq!(manifest.containers[0].ports[0].host_port, 8080);
    }

    #[test]
    fn test_parse_camel_case_fields() {
        let data = br#"{"id":"m","containers":[{"name":"c","workingDir":"/srv","volumeMounts":[{"name":"disk","mountPath":"/mnt","readOnly":true}]}]}"#;
        let manifest = ContainerManifest::parse(data).unwrap();
        let container = &manifest.containers[0];
        assert_eq!(container.working_dir, "/srv");
        assert_eq!(container.volume_mounts[0].mount_path, "/mnt");
        assert!(container.volume_mounts[0].read_only);
    }

    #[test]
    fn test_parse_ignores_unknown_fields() {
        let data = br#"{"id":"foo","flavor":"grape","containers":[]}"#;
        let manifest = ContainerManifest::parse(data).unwrap();
        assert_eq!(manifest.id, "foo");
    }

    #[test]
    fn test_parse_list() {
        let data = br#"[{"id":"foo"},{"id":"bar"}]"#;
        let list = ContainerManifest::parse_list(data).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, "foo");
        assert_eq!(list[1].id, "bar");
    }

    #[test]
    fn test_parse_empty_list() {
        let list = ContainerManifest::parse_list(b"[]").unwrap();
        assert!(list.is_empty());
    }

    #[test]
    fn test_parse_garbage_fails() {
        assert!(ContainerManifest::parse(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_event_round_trip() {
        let event = Event {
            event: "started".to_string(),
            container: Container {
                name: "foo".to_string(),
                ..Default::default()
            },
            timestamp: 1_700_000_000,
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
