//! Container manifest model for the stevedore node agent.
//!
//! A manifest is the desired-state unit consumed by the agent: an identified,
//! ordered group of containers. This library holds the wire types, the parser
//! (accepting both YAML block style and JSON flow style), and the name codec
//! that maps a `(manifest id, container name)` pair onto a runtime container
//! name and back.
//!
//! The codec is what lets the agent stay stateless: ownership of a container
//! is recovered purely from its runtime name after a restart.

pub mod naming;
pub mod types;

pub use naming::{parse_runtime_name, runtime_container_name};
pub use types::{
    Container, ContainerManifest, EnvVar, Event, ManifestError, Port, Volume, VolumeMount,
};
