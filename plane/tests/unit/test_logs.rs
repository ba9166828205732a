//! Log ingestion tests

use serde_json::json;
use shipyard::channel::ReceivedMessage;
use shipyard::models::{DeploymentStatus, LogPage, LogType};
use shipyard::store::DeploymentStore;
use shipyard::workers::consumer::{Disposition, MessageHandler};
use shipyard::workers::log_consumer::LogHandler;

use crate::support::Plane;

fn message(id: &str, body: serde_json::Value) -> ReceivedMessage {
    ReceivedMessage {
        id: id.to_string(),
        body: body.to_string(),
        delivery_token: format!("{}-token", id),
    }
}

fn log_body(deployment_id: &str, sequence: u64, text: &str) -> serde_json::Value {
    json!({
        "deploymentId": deployment_id,
        "projectId": "p1",
        "message": text,
        "sequence": sequence,
    })
}

#[tokio::test]
async fn test_interleaved_deployments_keep_their_order() {
    let plane = Plane::new().with_project("p1", None).with_project("p2", None);
    let a = plane.deployment_in("p1", DeploymentStatus::Building).await;
    let b = plane.deployment_in("p2", DeploymentStatus::Building).await;
    let handler = LogHandler::new(plane.store.clone());

    // Arrival order differs from emission order
    let arrivals = [
        (a.id.as_str(), 2, "a-2"),
        (b.id.as_str(), 1, "b-1"),
        (a.id.as_str(), 1, "a-1"),
        (b.id.as_str(), 3, "b-3"),
        (a.id.as_str(), 3, "a-3"),
        (b.id.as_str(), 2, "b-2"),
    ];
    for (i, (id, seq, text)) in arrivals.iter().enumerate() {
        let msg = message(&format!("m{}", i), log_body(id, *seq, text));
        assert_eq!(handler.handle(&msg).await, Disposition::Ack);
    }

    let lines = |records: Vec<shipyard::models::DeploymentLogRecord>| {
        records.into_iter().map(|r| r.message).collect::<Vec<_>>()
    };
    let a_logs = plane.store.list_logs(&a.id, LogPage::default()).await.unwrap();
    let b_logs = plane.store.list_logs(&b.id, LogPage::default()).await.unwrap();
    assert_eq!(lines(a_logs), vec!["a-1", "a-2", "a-3"]);
    assert_eq!(lines(b_logs), vec!["b-1", "b-2", "b-3"]);
}

#[tokio::test]
async fn test_redelivered_line_is_stored_once() {
    let plane = Plane::new().with_project("p1", None);
    let deployment = plane.deployment_in("p1", DeploymentStatus::Building).await;
    let handler = LogHandler::new(plane.store.clone());

    let body = log_body(deployment.id.as_str(), 1, "npm install");
    let first = message("m1", body.clone());
    let redelivered = ReceivedMessage {
        delivery_token: "second-token".to_string(),
        ..first.clone()
    };
    assert_eq!(handler.handle(&first).await, Disposition::Ack);
    assert_eq!(handler.handle(&redelivered).await, Disposition::Ack);

    let logs = plane
        .store
        .list_logs(&deployment.id, LogPage::default())
        .await
        .unwrap();
    assert_eq!(logs.len(), 1);

    let stored = plane.store.get(&deployment.id).await.unwrap().unwrap();
    assert_eq!(stored.last_log_id, Some(logs[0].id));
}

#[tokio::test]
async fn test_log_fields_are_projected() {
    let plane = Plane::new().with_project("p1", None);
    let deployment = plane.deployment_in("p1", DeploymentStatus::Building).await;
    let handler = LogHandler::new(plane.store.clone());

    let msg = message(
        "m1",
        json!({
            "deploymentId": deployment.id.as_str(),
            "projectId": "p1",
            "message": "Build failed",
            "stack": "at build (index.js:1)",
            "logType": "error",
            "timestamp": "2026-01-02T03:04:05Z",
        }),
    );
    assert_eq!(handler.handle(&msg).await, Disposition::Ack);

    let logs = plane
        .store
        .list_logs(&deployment.id, LogPage::default())
        .await
        .unwrap();
    assert_eq!(logs[0].log_type, LogType::Error);
    assert_eq!(logs[0].stack.as_deref(), Some("at build (index.js:1)"));
    assert_eq!(logs[0].timestamp.to_rfc3339(), "2026-01-02T03:04:05+00:00");
}

#[tokio::test]
async fn test_unusable_events_are_acked_and_dropped() {
    let plane = Plane::new().with_project("p1", None);
    let deployment = plane.deployment_in("p1", DeploymentStatus::Building).await;
    let handler = LogHandler::new(plane.store.clone());

    let malformed = ReceivedMessage {
        id: "bad".to_string(),
        body: "{not json".to_string(),
        delivery_token: "t".to_string(),
    };
    let empty = message("empty", log_body(deployment.id.as_str(), 1, "   "));
    let orphan = message("orphan", log_body("ghost", 1, "hello"));

    for msg in [malformed, empty, orphan] {
        assert_eq!(handler.handle(&msg).await, Disposition::Ack);
    }

    let logs = plane
        .store
        .list_logs(&deployment.id, LogPage::default())
        .await
        .unwrap();
    assert!(logs.is_empty());
}

#[tokio::test]
async fn test_pages() {
    let plane = Plane::new().with_project("p1", None);
    let deployment = plane.deployment_in("p1", DeploymentStatus::Building).await;
    let handler = LogHandler::new(plane.store.clone());

    for seq in 1..=5 {
        let msg = message(
            &format!("m{}", seq),
            log_body(deployment.id.as_str(), seq, &format!("line {}", seq)),
        );
        handler.handle(&msg).await;
    }

    let page = plane
        .launcher
        .list_logs(&deployment.id, LogPage::new(2, 2))
        .await
        .unwrap();
    let lines: Vec<_> = page.into_iter().map(|r| r.message).collect();
    assert_eq!(lines, vec!["line 3", "line 4"]);
}
