//! Log ingestion worker
//!
//! Appends build log lines to the deployment log. Redelivered messages are
//! recognised by their delivery message id and not stored twice.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};
use wire_events::LogEvent;

use crate::channel::{MessageChannel, ReceivedMessage};
use crate::errors::PlatformError;
use crate::models::{DeploymentId, LogType, NewLogRecord, ProjectId};
use crate::store::{AppendOutcome, DeploymentStore};
use crate::workers::consumer::{self, Disposition, MessageHandler};

/// Log consumer options
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub consumer: consumer::Options,
}

/// Appends log events to the store
pub struct LogHandler {
    store: Arc<dyn DeploymentStore>,
}

impl LogHandler {
    pub fn new(store: Arc<dyn DeploymentStore>) -> Self {
        Self { store }
    }

    /// Project a wire event onto a log record
    pub fn to_record(event: LogEvent, message_id: &str) -> NewLogRecord {
        NewLogRecord {
            deployment_id: DeploymentId::new(event.deployment_id),
            project_id: ProjectId::new(event.project_id),
            log_type: LogType::parse_lenient(event.log_type.as_deref()),
            message: event.message,
            stack: event.stack.filter(|s| !s.trim().is_empty()),
            sequence: event.sequence.and_then(|s| i64::try_from(s).ok()),
            message_id: Some(message_id.to_string()),
            timestamp: event.timestamp.unwrap_or_else(Utc::now),
        }
    }
}

#[async_trait]
impl MessageHandler for LogHandler {
    fn name(&self) -> &'static str {
        "logs"
    }

    async fn handle(&self, message: &ReceivedMessage) -> Disposition {
        let event = match LogEvent::from_json(&message.body) {
            Ok(event) => event,
            Err(e) => {
                warn!(message_id = %message.id, "Dropping malformed log event: {}", e);
                return Disposition::Ack;
            }
        };

        if event.is_empty() {
            debug!(message_id = %message.id, "Dropping empty log event");
            return Disposition::Ack;
        }

        let record = Self::to_record(event, &message.id);
        let deployment_id = record.deployment_id.clone();
        match self.store.append_log(record).await {
            Ok(AppendOutcome::Appended(id)) => {
                debug!(deployment_id = %deployment_id, log_id = id, "Log line stored");
                Disposition::Ack
            }
            Ok(AppendOutcome::Duplicate) => {
                debug!(deployment_id = %deployment_id, message_id = %message.id, "Duplicate log delivery");
                Disposition::Ack
            }
            Err(PlatformError::NotFound(_)) => {
                warn!(deployment_id = %deployment_id, "Log event for unknown deployment");
                Disposition::Ack
            }
            Err(e) if e.is_transient() => {
                warn!(deployment_id = %deployment_id, "Failed to store log line, will retry: {}", e);
                Disposition::Retry
            }
            Err(e) => {
                warn!(deployment_id = %deployment_id, "Dropping log event: {}", e);
                Disposition::Ack
            }
        }
    }
}

/// Run one log consumer instance
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
    let handler = LogHandler::new(store);
    consumer::run(&options.consumer, channel, &handler, sleep_fn, shutdown_signal).await;
}
