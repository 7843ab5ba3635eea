//! stevedore node agent
//!
//! Runs on each host and converges the local Docker container set to the
//! desired manifest list fanned in from a local file, an HTTP endpoint,
//! and the cluster state store.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use stevedore_node_agent::config::Config;
use stevedore_node_agent::docker::DockerEngine;
use stevedore_node_agent::events::EventRecorder;
use stevedore_node_agent::runtime::ContainerRuntime;
use stevedore_node_agent::sources::{EtcdSource, FileSource, HttpSource};
use stevedore_node_agent::store::{EtcdClient, StateStore};
use stevedore_node_agent::sync::{SyncLoop, SyncSources};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting stevedore node agent");

    let config = Config::from_env()?;
    info!(
        hostname = %config.hostname,
        sync_interval_secs = config.sync_interval.as_secs(),
        "Configuration loaded"
    );

    let engine = DockerEngine::new(config.docker_socket.as_deref())?;
    engine.ping().await?;
    let runtime = ContainerRuntime::new(Arc::new(engine));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let (file_tx, file_rx) = mpsc::channel(1);
    let (http_tx, http_rx) = mpsc::channel(1);
    let (etcd_tx, etcd_rx) = mpsc::channel(1);

    if let Some(path) = config.manifest_file.clone() {
        info!(path = %path, "Watching manifest file");
        let source = FileSource::new(path, config.poll_interval, file_tx);
        tokio::spawn(source.run(shutdown_rx.clone()));
    } else {
        drop(file_tx);
    }

    if let Some(url) = config.manifest_url.clone() {
        info!(url = %url, "Polling manifest URL");
        let source = HttpSource::new(url, config.poll_interval, http_tx);
        tokio::spawn(source.run(shutdown_rx.clone()));
    } else {
        drop(http_tx);
    }

    let store: Option<Arc<dyn StateStore>> = config
        .etcd_url
        .as_deref()
        .map(|url| Arc::new(EtcdClient::new(url)) as Arc<dyn StateStore>);

    if let Some(store) = store.clone() {
        let key = config.manifest_key();
        info!(key = %key, "Watching state store");
        let source = EtcdSource::new(store, key, etcd_tx);
        tokio::spawn(source.run(shutdown_rx.clone()));
    } else {
        drop(etcd_tx);
    }

    let events = store.map(EventRecorder::new);
    let sync = SyncLoop::new(runtime, events, config.sync_interval);
    let sources = SyncSources {
        file: file_rx,
        http: http_rx,
        etcd: etcd_rx,
    };

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    sync.run(sources, shutdown_rx).await;

    Ok(())
}
