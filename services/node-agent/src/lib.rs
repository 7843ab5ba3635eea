//! stevedore node agent library.
//!
//! The agent runs on each host and owns container lifecycle for that node.
//! Manifest sources (file, HTTP, state store) fan into a single sync loop
//! that converges the local Docker container set to the merged desired
//! state:
//!
//! ```text
//! FileSource ──┐
//! HttpSource ──┼──▶ SyncLoop ──▶ ContainerRuntime ──▶ Docker
//! EtcdSource ──┘        │
//!                       └──▶ EventRecorder ──▶ state store
//! ```
//!
//! The agent keeps no local state: ownership is encoded in runtime
//! container names and recovered by scanning them on every pass.
//!
//! ## Modules
//!
//! - `docker`: the consumed runtime RPC surface and its fake
//! - `runtime`: higher-level container queries over that surface
//! - `translate`: manifest fields to launch parameters
//! - `sources`: manifest source adapters with change detection
//! - `store`: the consumed state-store surface and its fake
//! - `events`: best-effort event appends
//! - `sync`: the reconciliation loop itself

pub mod config;
pub mod docker;
pub mod events;
pub mod runtime;
pub mod sources;
pub mod store;
pub mod sync;
pub mod translate;

// Re-export commonly used types
pub use docker::{DockerEngine, FakeDockerClient};
pub use events::EventRecorder;
pub use runtime::ContainerRuntime;
pub use store::{EtcdClient, FakeStateStore};
pub use sync::{SyncLoop, SyncSources};
