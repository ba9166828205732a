//! Status transition tests

use std::sync::Arc;

use shipyard::models::{DeploymentId, DeploymentStatus};
use shipyard::store::DeploymentStore;
use shipyard::workers::status_consumer::{Options, StatusHandler, StatusOutcome};

use crate::support::{Plane, ROOT_DOMAIN};

fn handler(plane: &Plane) -> StatusHandler {
    StatusHandler::new(
        Options {
            root_domain: ROOT_DOMAIN.to_string(),
            ..Default::default()
        },
        plane.store.clone(),
    )
}

#[tokio::test]
async fn test_late_building_does_not_regress() {
    let plane = Plane::new().with_project("p1", None);
    let deployment = plane.deployment_in("p1", DeploymentStatus::Queued).await;
    let handler = handler(&plane);

    let outcomes = [
        handler.apply(&deployment.id, DeploymentStatus::Building).await.unwrap(),
        handler.apply(&deployment.id, DeploymentStatus::Deployed).await.unwrap(),
        handler.apply(&deployment.id, DeploymentStatus::Building).await.unwrap(),
    ];
    assert_eq!(outcomes[0], StatusOutcome::Applied(DeploymentStatus::Building));
    assert_eq!(outcomes[1], StatusOutcome::Applied(DeploymentStatus::Deployed));
    assert_eq!(
        outcomes[2],
        StatusOutcome::Rejected {
            current: DeploymentStatus::Deployed,
            reported: DeploymentStatus::Building,
        }
    );

    let stored = plane.store.get(&deployment.id).await.unwrap().unwrap();
    assert_eq!(stored.status, DeploymentStatus::Deployed);
    assert_eq!(
        stored.ready_url,
        Some(format!("https://{}.{}", deployment.id, ROOT_DOMAIN))
    );
    assert!(stored.duration_secs.is_some());
}

#[tokio::test]
async fn test_duplicate_leaves_record_untouched() {
    let plane = Plane::new().with_project("p1", None);
    let deployment = plane.deployment_in("p1", DeploymentStatus::Queued).await;
    let handler = handler(&plane);

    handler.apply(&deployment.id, DeploymentStatus::Building).await.unwrap();
    let before = plane.store.get(&deployment.id).await.unwrap().unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let outcome = handler.apply(&deployment.id, DeploymentStatus::Building).await.unwrap();
    assert_eq!(outcome, StatusOutcome::Duplicate);

    let after = plane.store.get(&deployment.id).await.unwrap().unwrap();
    assert_eq!(after, before);
}

#[tokio::test]
async fn test_terminal_states_are_final() {
    let plane = Plane::new().with_project("p1", None);
    let deployment = plane.deployment_in("p1", DeploymentStatus::Failed).await;
    let handler = handler(&plane);

    for reported in [
        DeploymentStatus::Queued,
        DeploymentStatus::Building,
        DeploymentStatus::Deployed,
    ] {
        let outcome = handler.apply(&deployment.id, reported).await.unwrap();
        assert!(matches!(outcome, StatusOutcome::Rejected { .. }));
    }
    let stored = plane.store.get(&deployment.id).await.unwrap().unwrap();
    assert_eq!(stored.status, DeploymentStatus::Failed);
    assert_eq!(stored.ready_url, None);
}

#[tokio::test]
async fn test_queued_can_fail_directly() {
    let plane = Plane::new().with_project("p1", None);
    let deployment = plane.deployment_in("p1", DeploymentStatus::Queued).await;
    let outcome = handler(&plane)
        .apply(&deployment.id, DeploymentStatus::Failed)
        .await
        .unwrap();
    assert_eq!(outcome, StatusOutcome::Applied(DeploymentStatus::Failed));
}

#[tokio::test]
async fn test_concurrent_reports_end_in_one_terminal_state() {
    let plane = Plane::new().with_project("p1", None);
    let deployment = plane.deployment_in("p1", DeploymentStatus::Building).await;
    let handler = Arc::new(handler(&plane));

    let mut tasks = Vec::new();
    for i in 0..10 {
        let handler = handler.clone();
        let id = deployment.id.clone();
        let reported = if i % 2 == 0 {
            DeploymentStatus::Deployed
        } else {
            DeploymentStatus::Failed
        };
        tasks.push(tokio::spawn(async move { handler.apply(&id, reported).await }));
    }

    let mut applied = 0;
    for task in tasks {
        if let StatusOutcome::Applied(_) = task.await.unwrap().unwrap() {
            applied += 1;
        }
    }
    assert_eq!(applied, 1);

    let stored = plane.store.get(&deployment.id).await.unwrap().unwrap();
    assert!(stored.status.is_terminal());
}

#[tokio::test]
async fn test_unknown_deployment() {
    let plane = Plane::new();
    let outcome = handler(&plane)
        .apply(&DeploymentId::new("ghost"), DeploymentStatus::Building)
        .await
        .unwrap();
    assert_eq!(outcome, StatusOutcome::UnknownDeployment);
}
