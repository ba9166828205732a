//! Control API tests

use std::sync::Arc;

use api_models::{
    CreateDeploymentResponse, DeleteDeploymentResponse, DeploymentResponse,
    DeploymentStatusResponse, ErrorResponse, LogsResponse,
};
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde::de::DeserializeOwned;
use serde_json::json;
use tower::ServiceExt;

use shipyard::channel::ReceivedMessage;
use shipyard::models::DeploymentStatus;
use shipyard::server::serve::router;
use shipyard::server::state::ServerState;
use shipyard::workers::consumer::MessageHandler;
use shipyard::workers::log_consumer::LogHandler;

use crate::support::Plane;

fn app(plane: &Plane) -> Router {
    router(Arc::new(ServerState::new(plane.launcher.clone())))
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, Vec<u8>) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

fn parse<T: DeserializeOwned>(bytes: &[u8]) -> T {
    serde_json::from_slice(bytes).unwrap()
}

#[tokio::test]
async fn test_create_and_get_deployment() {
    let plane = Plane::new().with_project("p1", None);
    let app = app(&plane);

    let (status, body) = call(
        &app,
        Method::POST,
        "/deployments",
        Some(json!({"projectId": "p1"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let created: CreateDeploymentResponse = parse(&body);
    assert_eq!(created.status, "QUEUED");

    let (status, body) = call(
        &app,
        Method::GET,
        &format!("/deployments/{}", created.deployment_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let deployment: DeploymentResponse = parse(&body);
    assert_eq!(deployment.id, created.deployment_id);
    assert_eq!(deployment.project_id, "p1");
    assert_eq!(deployment.ready_url, None);
}

#[tokio::test]
async fn test_second_create_conflicts() {
    let plane = Plane::new().with_project("p1", None);
    let app = app(&plane);
    let request = json!({"projectId": "p1"});

    let (status, _) = call(&app, Method::POST, "/deployments", Some(request.clone())).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = call(&app, Method::POST, "/deployments", Some(request)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let error: ErrorResponse = parse(&body);
    assert_eq!(error.error, "conflict");
}

#[tokio::test]
async fn test_bad_requests() {
    let plane = Plane::new().with_project("p1", None);
    let app = app(&plane);

    let (status, _) = call(&app, Method::POST, "/deployments", Some(json!({"projectId": "  "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app, Method::POST, "/deployments", Some(json!({"name": "x"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app, Method::POST, "/deployments", Some(json!({"projectId": "nope"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(&app, Method::GET, "/deployments/ghost", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_launch_failure_is_internal_error() {
    let plane = Plane::new().with_project("p1", None);
    plane.runner.set_failing(true);
    let app = app(&plane);

    let (status, body) = call(&app, Method::POST, "/deployments", Some(json!({"projectId": "p1"}))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let error: ErrorResponse = parse(&body);
    assert_eq!(error.message, "internal server error");
}

#[tokio::test]
async fn test_logs_endpoint() {
    let plane = Plane::new().with_project("p1", None);
    let deployment = plane.deployment_in("p1", DeploymentStatus::Building).await;
    let handler = LogHandler::new(plane.store.clone());
    for seq in 1..=3 {
        let message = ReceivedMessage {
            id: format!("m{}", seq),
            body: json!({
                "deploymentId": deployment.id.as_str(),
                "message": format!("step {}", seq),
                "sequence": seq,
                "logType": if seq == 3 { "ERROR" } else { "INFO" },
            })
            .to_string(),
            delivery_token: format!("t{}", seq),
        };
        handler.handle(&message).await;
    }
    let app = app(&plane);

    let (status, body) = call(
        &app,
        Method::GET,
        &format!("/deployments/{}/logs?page=1&per_page=2", deployment.id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let logs: LogsResponse = parse(&body);
    assert_eq!(logs.per_page, 2);
    assert_eq!(logs.logs.len(), 2);
    assert_eq!(logs.logs[0].message, "step 1");

    let (_, body) = call(
        &app,
        Method::GET,
        &format!("/deployments/{}/logs?page=2&per_page=2", deployment.id),
        None,
    )
    .await;
    let logs: LogsResponse = parse(&body);
    assert_eq!(logs.logs.len(), 1);
    assert_eq!(logs.logs[0].log_type, "ERROR");
}

#[tokio::test]
async fn test_delete_deployment() {
    let plane = Plane::new().with_project("p1", None);
    let deployment = plane.deployment_in("p1", DeploymentStatus::Deployed).await;
    let key = plane.layout.index_key(deployment.id.as_str());
    plane.artifacts.put(&key, "<h1>bye</h1>").unwrap();
    let app = app(&plane);
    let uri = format!("/deployments/{}", deployment.id);

    let (status, body) = call(&app, Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    let deleted: DeleteDeploymentResponse = parse(&body);
    assert_eq!(deleted.removed_artifacts, 1);

    let (status, _) = call(&app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_and_version() {
    let plane = Plane::new();
    let app = app(&plane);

    let (status, body) = call(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    let health: serde_json::Value = parse(&body);
    assert_eq!(health["status"], "healthy");

    let (status, _) = call(&app, Method::GET, "/version", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_deployment_status() {
    let plane = Plane::new().with_project("p1", None);
    let deployment = plane.deployment_in("p1", DeploymentStatus::Deployed).await;
    let app = app(&plane);

    let (status, body) = call(
        &app,
        Method::GET,
        &format!("/deployments/{}/status", deployment.id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let current: DeploymentStatusResponse = parse(&body);
    assert_eq!(current.deployment_id, deployment.id.as_str());
    assert_eq!(current.status, "DEPLOYED");

    let (status, _) = call(&app, Method::GET, "/deployments/ghost/status", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
