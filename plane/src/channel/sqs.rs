//! SQS message channel

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_sqs::error::DisplayErrorContext;
use tracing::warn;

use crate::errors::PlatformError;

use super::{MessageChannel, ReceivedMessage};

/// SQS caps both batch size and long-poll wait
const MAX_BATCH: u32 = 10;
const MAX_WAIT_SECS: u64 = 20;

#[derive(Clone)]
pub struct SqsChannel {
    client: aws_sdk_sqs::Client,
    queue_url: String,
}

impl std::fmt::Debug for SqsChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqsChannel")
            .field("queue_url", &self.queue_url)
            .finish()
    }
}

impl SqsChannel {
    pub fn new(client: aws_sdk_sqs::Client, queue_url: impl Into<String>) -> Self {
        Self {
            client,
            queue_url: queue_url.into(),
        }
    }
}

#[async_trait]
impl MessageChannel for SqsChannel {
    fn address(&self) -> &str {
        &self.queue_url
    }

    async fn receive(
        &self,
        max: u32,
        visibility: Duration,
        wait: Duration,
    ) -> Result<Vec<ReceivedMessage>, PlatformError> {
        let out = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(max.clamp(1, MAX_BATCH) as i32)
            .visibility_timeout(visibility.as_secs().max(1) as i32)
            .wait_time_seconds(wait.as_secs().min(MAX_WAIT_SECS) as i32)
            .send()
            .await
            .map_err(|e| {
                PlatformError::Unavailable(format!(
                    "sqs receive_message failed: {}",
                    DisplayErrorContext(e)
                ))
            })?;

        let mut messages = Vec::new();
        for message in out.messages() {
            let (Some(id), Some(token)) = (message.message_id(), message.receipt_handle()) else {
                warn!("Skipping SQS message without id or receipt handle");
                continue;
            };
            messages.push(ReceivedMessage {
                id: id.to_string(),
                body: message.body().unwrap_or_default().to_string(),
                delivery_token: token.to_string(),
            });
        }

        Ok(messages)
    }

    async fn delete(&self, delivery_token: &str) -> Result<(), PlatformError> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(delivery_token)
            .send()
            .await
            .map_err(|e| {
                PlatformError::Unavailable(format!(
                    "sqs delete_message failed: {}",
                    DisplayErrorContext(e)
                ))
            })?;
        Ok(())
    }
}
