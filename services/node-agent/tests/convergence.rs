//! Integration tests for the full fan-in and convergence flow.
//!
//! These tests drive the sync loop the way the wired agent does: manifests
//! arrive over the per-source channels, the loop reconciles against a fake
//! Docker client, and events land in a fake state store.

use std::sync::Arc;
use std::time::Duration;

use stevedore_manifest::{Container, ContainerManifest, Event};
use stevedore_node_agent::docker::{ApiContainer, ContainerDetail, FakeDockerClient};
use stevedore_node_agent::events::EventRecorder;
use stevedore_node_agent::runtime::ContainerRuntime;
use stevedore_node_agent::store::FakeStateStore;
use stevedore_node_agent::sync::{SyncLoop, SyncSources};
use tokio::sync::{mpsc, watch};

/// Long enough that the timer never fires during a test; syncs are driven
/// by source emissions alone.
const QUIET_INTERVAL: Duration = Duration::from_secs(600);

fn test_manifest(id: &str, container_names: &[&str]) -> ContainerManifest {
    ContainerManifest {
        id: id.to_string(),
        containers: container_names
            .iter()
            .map(|name| Container {
                name: name.to_string(),
                image: "busybox".to_string(),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    }
}

struct Harness {
    fake: Arc<FakeDockerClient>,
    file_tx: mpsc::Sender<ContainerManifest>,
    etcd_tx: mpsc::Sender<Vec<ContainerManifest>>,
    shutdown_tx: watch::Sender<bool>,
    handle: tokio::task::JoinHandle<()>,
}

impl Harness {
    fn start() -> Self {
        let fake = Arc::new(FakeDockerClient::new());
        let (file_tx, file_rx) = mpsc::channel(1);
        let (http_tx, http_rx) = mpsc::channel(1);
        let (etcd_tx, etcd_rx) = mpsc::channel(1);
        drop(http_tx);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let sync = SyncLoop::new(
            ContainerRuntime::new(fake.clone()),
            None,
            QUIET_INTERVAL,
        );
        let sources = SyncSources {
            file: file_rx,
            http: http_rx,
            etcd: etcd_rx,
        };
        let handle = tokio::spawn(async move { sync.run(sources, shutdown_rx).await });

        Self {
            fake,
            file_tx,
            etcd_tx,
            shutdown_tx,
            handle,
        }
    }

    async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    async fn shutdown(self) {
        self.shutdown_tx.send(true).unwrap();
        self.handle.await.unwrap();
    }
}

#[tokio::test]
async fn test_file_emission_creates_container() {
    let harness = Harness::start();

    harness
        .file_tx
        .send(test_manifest("foo", &["bar"]))
        .await
        .unwrap();
    harness.settle().await;

    let created = harness.fake.created();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].name, "bar--foo");
    assert_eq!(created[0].image, "busybox");
    assert!(harness.fake.stopped().is_empty());

    harness.shutdown().await;
}

#[tokio::test]
async fn test_etcd_list_replaces_slot() {
    let harness = Harness::start();
    harness.fake.set_containers(vec![ApiContainer {
        id: "1234".to_string(),
        names: vec!["bar--foo".to_string()],
    }]);
    harness.fake.set_detail(ContainerDetail {
        id: "1234".to_string(),
        running: true,
    });

    // Desired matches observed: nothing to do.
    harness
        .etcd_tx
        .send(vec![test_manifest("foo", &["bar"])])
        .await
        .unwrap();
    harness.settle().await;
    assert!(harness.fake.created().is_empty());
    assert!(harness.fake.stopped().is_empty());

    // The store now says this node runs nothing: the managed container goes.
    harness.etcd_tx.send(vec![]).await.unwrap();
    harness.settle().await;
    assert_eq!(harness.fake.stopped(), vec!["1234"]);
    assert!(harness.fake.created().is_empty());

    harness.shutdown().await;
}

#[tokio::test]
async fn test_unmanaged_containers_survive_empty_desired() {
    let harness = Harness::start();
    harness.fake.set_containers(vec![ApiContainer {
        id: "4567".to_string(),
        names: vec!["somebody-elses".to_string()],
    }]);

    harness.etcd_tx.send(vec![]).await.unwrap();
    harness.settle().await;

    assert!(harness.fake.stopped().is_empty());
    assert!(harness.fake.created().is_empty());

    harness.shutdown().await;
}

#[tokio::test]
async fn test_sources_merge_into_one_desired_set() {
    let harness = Harness::start();

    harness
        .file_tx
        .send(test_manifest("from-file", &["web"]))
        .await
        .unwrap();
    harness.settle().await;
    harness
        .etcd_tx
        .send(vec![test_manifest("from-store", &["worker"])])
        .await
        .unwrap();
    harness.settle().await;

    let names: Vec<String> = harness.fake.created().iter().map(|c| c.name.clone()).collect();
    assert!(names.contains(&"web--from_-_file".to_string()));
    assert!(names.contains(&"worker--from_-_store".to_string()));

    harness.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_ends_loop() {
    let harness = Harness::start();
    harness.settle().await;
    harness.shutdown().await;
}

#[tokio::test]
async fn test_sync_records_stop_events() {
    let fake = Arc::new(FakeDockerClient::new());
    fake.set_containers(vec![ApiContainer {
        id: "1234".to_string(),
        names: vec!["foo--bar".to_string()],
    }]);
    let store = Arc::new(FakeStateStore::new());
    let sync = SyncLoop::new(
        ContainerRuntime::new(fake.clone()),
        Some(EventRecorder::new(store.clone())),
        QUIET_INTERVAL,
    );

    sync.sync(&[]).await.unwrap();

    assert_eq!(fake.stopped(), vec!["1234"]);
    assert_eq!(store.child_count(), 1);

    let response = store.stored("/events/foo/1").expect("event written");
    let event: Event =
        serde_json::from_str(&response.node.unwrap().value.unwrap()).unwrap();
    assert_eq!(event.event, "stopped");
    assert_eq!(event.container.name, "foo");
}

#[tokio::test]
async fn test_sync_records_start_events() {
    let fake = Arc::new(FakeDockerClient::new());
    let store = Arc::new(FakeStateStore::new());
    let sync = SyncLoop::new(
        ContainerRuntime::new(fake.clone()),
        Some(EventRecorder::new(store.clone())),
        QUIET_INTERVAL,
    );

    sync.sync(&[test_manifest("foo", &["bar"])]).await.unwrap();

    assert_eq!(fake.created()[0].name, "bar--foo");
    assert_eq!(store.child_count(), 1);

    let response = store.stored("/events/bar/1").expect("event written");
    let event: Event =
        serde_json::from_str(&response.node.unwrap().value.unwrap()).unwrap();
    assert_eq!(event.event, "started");
    assert_eq!(event.container.name, "bar");
}
