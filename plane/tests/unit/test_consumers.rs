//! Consumer loop tests against the in-memory channel

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;

use shipyard::channel::{MemoryChannel, ReceivedMessage};
use shipyard::errors::PlatformError;
use shipyard::models::{
    Deployment, DeploymentId, DeploymentLogRecord, DeploymentStatus, LogPage, NewLogRecord,
    Project, ProjectId, StatusChange,
};
use shipyard::store::{AppendOutcome, CasOutcome, DeploymentStore, MemoryStore};
use shipyard::workers::consumer::{Disposition, MessageHandler};
use shipyard::workers::{consumer, log_consumer, status_consumer};

use crate::support::{eventually, Plane, ROOT_DOMAIN};

fn fast_consumer() -> consumer::Options {
    consumer::Options {
        batch_size: 10,
        visibility_timeout: Duration::from_millis(100),
        wait_time: Duration::from_millis(20),
        ..Default::default()
    }
}

struct Running {
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

impl Running {
    async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        self.handle.await.unwrap();
    }
}

fn spawn_status(channel: Arc<MemoryChannel>, store: Arc<dyn DeploymentStore>) -> Running {
    let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
    let options = status_consumer::Options {
        consumer: fast_consumer(),
        root_domain: ROOT_DOMAIN.to_string(),
        ..Default::default()
    };
    let handle = tokio::spawn(async move {
        status_consumer::run(
            &options,
            channel.as_ref(),
            store,
            tokio::time::sleep,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });
    Running {
        shutdown_tx,
        handle,
    }
}

fn spawn_logs(channel: Arc<MemoryChannel>, store: Arc<dyn DeploymentStore>) -> Running {
    let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
    let options = log_consumer::Options {
        consumer: fast_consumer(),
    };
    let handle = tokio::spawn(async move {
        log_consumer::run(
            &options,
            channel.as_ref(),
            store,
            tokio::time::sleep,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });
    Running {
        shutdown_tx,
        handle,
    }
}

#[tokio::test]
async fn test_status_events_drive_the_deployment() {
    let plane = Plane::new().with_project("p1", None);
    let deployment = plane.deployment_in("p1", DeploymentStatus::Queued).await;
    let channel = Arc::new(MemoryChannel::new("memory://status"));

    let id = deployment.id.as_str();
    channel.send(json!({"deploymentId": id, "status": "PROG"}).to_string());
    channel.send(json!({"deploymentId": id, "status": "DEPLOYED"}).to_string());

    let running = spawn_status(channel.clone(), plane.store.clone());
    assert!(eventually(|| channel.pending() == 0).await);
    running.stop().await;

    let stored = plane.store.get(&deployment.id).await.unwrap().unwrap();
    assert_eq!(stored.status, DeploymentStatus::Deployed);
    assert_eq!(channel.deleted(), 2);
}

#[tokio::test]
async fn test_poison_message_is_deleted_once() {
    let plane = Plane::new();
    let channel = Arc::new(MemoryChannel::new("memory://status"));
    channel.send("this is not json");
    channel.send(json!({"deploymentId": "d1", "status": "EXPLODED"}).to_string());

    let running = spawn_status(channel.clone(), plane.store.clone());
    assert!(eventually(|| channel.pending() == 0).await);

    // Give the consumer a few more receive rounds
    tokio::time::sleep(Duration::from_millis(250)).await;
    running.stop().await;

    assert_eq!(channel.deleted(), 2);
}

#[tokio::test]
async fn test_shutdown_stops_an_idle_consumer() {
    let plane = Plane::new();
    let channel = Arc::new(MemoryChannel::new("memory://logs"));
    let running = spawn_logs(channel, plane.store.clone());

    tokio::time::timeout(Duration::from_secs(1), running.stop())
        .await
        .unwrap();
}

/// Store whose first status writes or log appends fail with a transient error
struct FlakyStore {
    inner: MemoryStore,
    status_failures: AtomicU32,
    log_failures: AtomicU32,
    status_writes: AtomicU32,
}

impl FlakyStore {
    fn new(status_failures: u32, log_failures: u32) -> Self {
        Self {
            inner: MemoryStore::new(),
            status_failures: AtomicU32::new(status_failures),
            log_failures: AtomicU32::new(log_failures),
            status_writes: AtomicU32::new(0),
        }
    }

    async fn queued_deployment(&self) -> Deployment {
        self.inner
            .insert_project(crate::support::project("p1", None))
            .unwrap();
        let project = self.get_project(&ProjectId::new("p1")).await.unwrap().unwrap();
        self.create_queued(&project, Utc::now()).await.unwrap()
    }
}

fn trip(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl DeploymentStore for FlakyStore {
    async fn get_project(&self, id: &ProjectId) -> Result<Option<Project>, PlatformError> {
        self.inner.get_project(id).await
    }

    async fn project_by_subdomain(
        &self,
        subdomain: &str,
    ) -> Result<Option<Project>, PlatformError> {
        self.inner.project_by_subdomain(subdomain).await
    }

    async fn count_active(&self, project_id: &ProjectId) -> Result<u64, PlatformError> {
        self.inner.count_active(project_id).await
    }

    async fn create_queued(
        &self,
        project: &Project,
        now: DateTime<Utc>,
    ) -> Result<Deployment, PlatformError> {
        self.inner.create_queued(project, now).await
    }

    async fn get(&self, id: &DeploymentId) -> Result<Option<Deployment>, PlatformError> {
        self.inner.get(id).await
    }

    async fn remove(&self, id: &DeploymentId) -> Result<bool, PlatformError> {
        self.inner.remove(id).await
    }

    async fn compare_and_set_status(
        &self,
        id: &DeploymentId,
        expected: DeploymentStatus,
        change: &StatusChange,
    ) -> Result<CasOutcome, PlatformError> {
        self.status_writes.fetch_add(1, Ordering::SeqCst);
        if trip(&self.status_failures) {
            return Err(PlatformError::Internal("connection reset".to_string()));
        }
        self.inner.compare_and_set_status(id, expected, change).await
    }

    async fn latest_deployed(
        &self,
        project_id: &ProjectId,
    ) -> Result<Option<Deployment>, PlatformError> {
        self.inner.latest_deployed(project_id).await
    }

    async fn append_log(&self, record: NewLogRecord) -> Result<AppendOutcome, PlatformError> {
        if trip(&self.log_failures) {
            return Err(PlatformError::Internal("connection reset".to_string()));
        }
        self.inner.append_log(record).await
    }

    async fn list_logs(
        &self,
        id: &DeploymentId,
        page: LogPage,
    ) -> Result<Vec<DeploymentLogRecord>, PlatformError> {
        self.inner.list_logs(id, page).await
    }
}

#[tokio::test]
async fn test_transient_failure_is_redelivered() {
    let store = Arc::new(FlakyStore::new(0, 1));
    let deployment = store.queued_deployment().await;

    let channel = Arc::new(MemoryChannel::new("memory://logs"));
    let msg_id = channel.send(
        json!({"deploymentId": deployment.id.as_str(), "message": "Cloning repository"})
            .to_string(),
    );

    let running = spawn_logs(channel.clone(), store.clone());
    assert!(eventually(|| channel.pending() == 0).await);
    running.stop().await;

    assert_eq!(channel.receive_count(&msg_id), None);
    assert_eq!(channel.deleted(), 1);
    let logs = store.list_logs(&deployment.id, LogPage::default()).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].message, "Cloning repository");
}

#[tokio::test]
async fn test_status_store_failure_is_redelivered() {
    let store = Arc::new(FlakyStore::new(1, 0));
    let deployment = store.queued_deployment().await;

    let channel = Arc::new(MemoryChannel::new("memory://status"));
    channel.send(json!({"deploymentId": deployment.id.as_str(), "status": "BUILDING"}).to_string());

    let running = spawn_status(channel.clone(), store.clone());
    assert!(eventually(|| channel.pending() == 0).await);
    running.stop().await;

    // First write failed and left the message; the redelivery applied it
    assert_eq!(store.status_writes.load(Ordering::SeqCst), 2);
    assert_eq!(channel.deleted(), 1);
    let stored = store.get(&deployment.id).await.unwrap().unwrap();
    assert_eq!(stored.status, DeploymentStatus::Building);
}

/// Handler that blocks until its gate opens
struct GatedHandler {
    started: Notify,
    gate: Notify,
    finished: AtomicU32,
}

#[async_trait]
impl MessageHandler for GatedHandler {
    fn name(&self) -> &'static str {
        "gated"
    }

    async fn handle(&self, _message: &ReceivedMessage) -> Disposition {
        self.started.notify_one();
        self.gate.notified().await;
        self.finished.fetch_add(1, Ordering::SeqCst);
        Disposition::Ack
    }
}

#[tokio::test]
async fn test_shutdown_finishes_in_flight_message() {
    let channel = Arc::new(MemoryChannel::new("memory://logs"));
    channel.send("first");
    channel.send("second");
    let handler = Arc::new(GatedHandler {
        started: Notify::new(),
        gate: Notify::new(),
        finished: AtomicU32::new(0),
    });

    let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);
    let handle = {
        let channel = channel.clone();
        let handler = handler.clone();
        tokio::spawn(async move {
            consumer::run(
                &fast_consumer(),
                channel.as_ref(),
                handler.as_ref(),
                tokio::time::sleep,
                Box::pin(async move {
                    let _ = shutdown_rx.recv().await;
                }),
            )
            .await;
        })
    };

    handler.started.notified().await;
    let _ = shutdown_tx.send(());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!handle.is_finished());

    handler.gate.notify_one();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .unwrap()
        .unwrap();

    // The in-flight message was finished and acked, the next one left alone
    assert_eq!(handler.finished.load(Ordering::SeqCst), 1);
    assert_eq!(channel.deleted(), 1);
}
