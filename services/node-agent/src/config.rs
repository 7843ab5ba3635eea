use std::time::Duration;

use anyhow::Result;

/// Default file/HTTP source poll interval.
const DEFAULT_POLL_INTERVAL_SECS: u64 = 20;

/// Default reconciliation interval.
const DEFAULT_SYNC_INTERVAL_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct Config {
    /// Local manifest file to poll, if any.
    pub manifest_file: Option<String>,
    /// Manifest URL to poll, if any.
    pub manifest_url: Option<String>,
    /// State-store endpoint, e.g. `http://127.0.0.1:4001`, if any.
    pub etcd_url: Option<String>,
    /// Key prefix under which this node's manifest list lives.
    pub etcd_prefix: String,
    /// This node's name within the cluster registry.
    pub hostname: String,
    /// Docker socket path override; bollard auto-detects when unset.
    pub docker_socket: Option<String>,
    pub poll_interval: Duration,
    pub sync_interval: Duration,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let manifest_file = std::env::var("STEVEDORE_MANIFEST_FILE").ok();
        let manifest_url = std::env::var("STEVEDORE_MANIFEST_URL").ok();
        let etcd_url = std::env::var("STEVEDORE_ETCD_URL").ok();

        let etcd_prefix = std::env::var("STEVEDORE_ETCD_PREFIX")
            .unwrap_or_else(|_| "/registry/hosts".to_string());

        let hostname = std::env::var("STEVEDORE_HOSTNAME")
            .or_else(|_| std::env::var("HOSTNAME"))
            .unwrap_or_else(|_| "localhost".to_string());

        let docker_socket = std::env::var("STEVEDORE_DOCKER_SOCKET").ok();

        let poll_interval = std::env::var("STEVEDORE_POLL_INTERVAL")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS));

        let sync_interval = std::env::var("STEVEDORE_SYNC_INTERVAL")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_SYNC_INTERVAL_SECS));

        let log_level = std::env::var("STEVEDORE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            manifest_file,
            manifest_url,
            etcd_url,
            etcd_prefix,
            hostname,
            docker_socket,
            poll_interval,
            sync_interval,
            log_level,
        })
    }

    /// The state-store key holding this node's manifest list.
    pub fn manifest_key(&self) -> String {
        format!("{}/{}/manifests", self.etcd_prefix, self.hostname)
    }
}
