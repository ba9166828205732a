//! Status ingestion worker
//!
//! Drains status events published by build workers and advances the
//! deployment state machine. Writes are compare-and-set on the recorded
//! status, so any number of instances can run against one store.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};
use wire_events::StatusEvent;

use crate::channel::{MessageChannel, ReceivedMessage};
use crate::deploy::fsm::{decide, Transition};
use crate::errors::PlatformError;
use crate::models::{DeploymentId, DeploymentStatus, StatusChange};
use crate::store::{CasOutcome, DeploymentStore};
use crate::workers::consumer::{self, Disposition, MessageHandler};

/// Status consumer options
#[derive(Debug, Clone)]
pub struct Options {
    pub consumer: consumer::Options,

    /// Re-reads allowed after losing a compare-and-set race
    pub max_cas_retries: u32,

    /// Scheme of published deployment URLs
    pub ready_url_scheme: String,

    /// Domain deployments are served under
    pub root_domain: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            consumer: consumer::Options::default(),
            max_cas_retries: 5,
            ready_url_scheme: "https".to_string(),
            root_domain: "localhost".to_string(),
        }
    }
}

/// Result of applying one status event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusOutcome {
    /// Status written
    Applied(DeploymentStatus),

    /// Status already recorded
    Duplicate,

    /// Not reachable from the recorded status
    Rejected {
        current: DeploymentStatus,
        reported: DeploymentStatus,
    },

    /// The deployment no longer exists
    UnknownDeployment,
}

/// Applies status events to the store
pub struct StatusHandler {
    options: Options,
    store: Arc<dyn DeploymentStore>,
}

impl StatusHandler {
    pub fn new(options: Options, store: Arc<dyn DeploymentStore>) -> Self {
        Self { options, store }
    }

    fn ready_url(&self, id: &DeploymentId) -> String {
        format!(
            "{}://{}.{}",
            self.options.ready_url_scheme, id, self.options.root_domain
        )
    }

    /// Apply `reported` to a deployment, re-deciding after every lost race
    pub async fn apply(
        &self,
        id: &DeploymentId,
        reported: DeploymentStatus,
    ) -> Result<StatusOutcome, PlatformError> {
        for attempt in 0..=self.options.max_cas_retries {
            let Some(current) = self.store.get(id).await? else {
                return Ok(StatusOutcome::UnknownDeployment);
            };

            match decide(current.status, reported) {
                Transition::Duplicate => return Ok(StatusOutcome::Duplicate),
                Transition::Reject => {
                    return Ok(StatusOutcome::Rejected {
                        current: current.status,
                        reported,
                    })
                }
                Transition::Apply => {}
            }

            let mut change = StatusChange::new(reported, Utc::now());
            if reported == DeploymentStatus::Deployed {
                change = change.with_ready_url(self.ready_url(id));
            }

            match self
                .store
                .compare_and_set_status(id, current.status, &change)
                .await?
            {
                CasOutcome::Updated(updated) => return Ok(StatusOutcome::Applied(updated.status)),
                CasOutcome::Missing => return Ok(StatusOutcome::UnknownDeployment),
                CasOutcome::Stale(now) => {
                    debug!(
                        deployment_id = %id,
                        attempt,
                        expected = %current.status,
                        found = %now.status,
                        "Lost status race, re-deciding"
                    );
                }
            }
        }

        Err(PlatformError::Internal(format!(
            "status update for {} lost {} races",
            id,
            self.options.max_cas_retries + 1
        )))
    }
}

#[async_trait]
impl MessageHandler for StatusHandler {
    fn name(&self) -> &'static str {
        "status"
    }

    async fn handle(&self, message: &ReceivedMessage) -> Disposition {
        let event = match StatusEvent::from_json(&message.body) {
            Ok(event) => event,
            Err(e) => {
                warn!(message_id = %message.id, "Dropping malformed status event: {}", e);
                return Disposition::Ack;
            }
        };

        if event.status.trim().is_empty() {
            debug!(message_id = %message.id, "Dropping status event without status");
            return Disposition::Ack;
        }

        let reported = match event.status.parse::<DeploymentStatus>() {
            Ok(status) => status,
            Err(e) => {
                warn!(message_id = %message.id, deployment_id = %event.deployment_id, "Dropping status event: {}", e);
                return Disposition::Ack;
            }
        };

        let id = DeploymentId::new(event.deployment_id);
        match self.apply(&id, reported).await {
            Ok(StatusOutcome::Applied(status)) => {
                info!(deployment_id = %id, status = %status, "Deployment status updated");
                Disposition::Ack
            }
            Ok(StatusOutcome::Duplicate) => {
                debug!(deployment_id = %id, status = %reported, "Duplicate status event");
                Disposition::Ack
            }
            Ok(StatusOutcome::Rejected { current, reported }) => {
                info!(
                    deployment_id = %id,
                    current = %current,
                    reported = %reported,
                    "Ignoring out-of-order status event"
                );
                Disposition::Ack
            }
            Ok(StatusOutcome::UnknownDeployment) => {
                warn!(deployment_id = %id, "Status event for unknown deployment");
                Disposition::Ack
            }
            Err(e) if e.is_transient() => {
                warn!(deployment_id = %id, "Failed to apply status event, will retry: {}", e);
                Disposition::Retry
            }
            Err(e) => {
                warn!(deployment_id = %id, "Dropping status event: {}", e);
                Disposition::Ack
            }
        }
    }
}

/// Run one status consumer instance
pub async fn run<S, F>(
    options: &Options,
    channel: &dyn MessageChannel,
    store: Arc<dyn DeploymentStore>,
    sleep_fn: S,
    shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    let handler = StatusHandler::new(options.clone(), store);
    consumer::run(&options.consumer, channel, &handler, sleep_fn, shutdown_signal).await;
}
