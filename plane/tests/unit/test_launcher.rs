//! Launcher tests

use std::time::Duration;

use shipyard::deploy::launcher::Launcher;
use shipyard::errors::PlatformError;
use shipyard::models::{DeploymentStatus, ProjectId};
use shipyard::store::DeploymentStore;

use crate::support::Plane;

#[tokio::test]
async fn test_concurrent_creates_admit_one() {
    let plane = Plane::new().with_project("p1", None);
    plane.runner.set_delay(Some(Duration::from_millis(20)));

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let launcher = plane.launcher.clone();
        tasks.push(tokio::spawn(async move {
            launcher.create_deployment(&ProjectId::new("p1")).await
        }));
    }

    let mut created = 0;
    let mut conflicts = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(deployment) => {
                assert_eq!(deployment.status, DeploymentStatus::Queued);
                created += 1;
            }
            Err(PlatformError::Conflict(_)) => conflicts += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(created, 1);
    assert_eq!(conflicts, 7);
    assert_eq!(plane.store.count_active(&ProjectId::new("p1")).await.unwrap(), 1);
    assert_eq!(plane.runner.launched().len(), 1);
}

#[tokio::test]
async fn test_failed_launch_leaves_no_row() {
    let plane = Plane::new().with_project("p1", None);
    plane.runner.fail_next(1);

    let err = plane
        .launcher
        .create_deployment(&ProjectId::new("p1"))
        .await
        .unwrap_err();
    assert!(matches!(err, PlatformError::Internal(_)));
    assert_eq!(plane.store.count_active(&ProjectId::new("p1")).await.unwrap(), 0);

    // The project is free for the next attempt
    let deployment = plane
        .launcher
        .create_deployment(&ProjectId::new("p1"))
        .await
        .unwrap();
    assert_eq!(plane.runner.launched()[0].deployment_id, deployment.id);
}

#[tokio::test]
async fn test_abandoned_launch_is_compensated() {
    let plane = Plane::new().with_project("p1", None);
    plane.runner.set_delay(Some(Duration::from_secs(5)));

    let project_id = ProjectId::new("p1");
    let launch = plane.launcher.create_deployment(&project_id);
    assert!(tokio::time::timeout(Duration::from_millis(50), launch)
        .await
        .is_err());

    let mut active = u64::MAX;
    for _ in 0..100 {
        active = plane.store.count_active(&ProjectId::new("p1")).await.unwrap();
        if active == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(active, 0);
}

#[tokio::test]
async fn test_launch_parameters() {
    let plane = Plane::new().with_project("p1", None);
    let deployment = plane
        .launcher
        .create_deployment(&ProjectId::new("p1"))
        .await
        .unwrap();

    let launched = plane.runner.launched();
    assert_eq!(launched.len(), 1);
    let env = launched[0].environment();
    let get = |key: &str| {
        env.iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.clone())
            .unwrap()
    };
    assert_eq!(get("DEPLOYMENT_ID"), deployment.id.to_string());
    assert_eq!(get("PROJECT_ID"), "p1");
    assert_eq!(get("GIT_REPOSITORY_URL"), "https://github.com/acme/p1");
    assert_eq!(get("STATUS_QUEUE_URL"), "memory://status");
    assert_eq!(get("LOG_QUEUE_URL"), "memory://logs");
}

#[tokio::test]
async fn test_unknown_project() {
    let plane = Plane::new();
    let err = plane
        .launcher
        .create_deployment(&ProjectId::new("nope"))
        .await
        .unwrap_err();
    assert!(matches!(err, PlatformError::NotFound(_)));
    assert!(plane.runner.launched().is_empty());
}

async fn delete_ok(launcher: &Launcher, plane: &Plane, status: DeploymentStatus) {
    let deployment = plane.deployment_in("p1", status).await;
    let dir = plane.layout.deployment_dir(deployment.id.as_str());
    plane.artifacts.put(&format!("{}index.html", dir), "<h1>hi</h1>").unwrap();
    plane.artifacts.put(&format!("{}app.js", dir), "console.log(1)").unwrap();
    plane.cache.insert(deployment.id.as_str(), true);

    assert_eq!(launcher.delete_deployment(&deployment.id).await.unwrap(), 2);
    assert!(plane.artifacts.is_empty());
    assert_eq!(plane.cache.get(deployment.id.as_str()), None);
    assert!(plane.store.get(&deployment.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_finished_deployments() {
    let plane = Plane::new().with_project("p1", None);
    delete_ok(&plane.launcher, &plane, DeploymentStatus::Deployed).await;
    delete_ok(&plane.launcher, &plane, DeploymentStatus::Failed).await;
}

#[tokio::test]
async fn test_delete_active_deployment_conflicts() {
    let plane = Plane::new().with_project("p1", None);
    let deployment = plane.deployment_in("p1", DeploymentStatus::Building).await;

    let err = plane
        .launcher
        .delete_deployment(&deployment.id)
        .await
        .unwrap_err();
    assert!(matches!(err, PlatformError::Conflict(_)));
    assert!(plane.store.get(&deployment.id).await.unwrap().is_some());
}
