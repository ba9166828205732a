//! Message channels carrying build worker events
//!
//! Delivery is at-least-once. A received message stays invisible for the
//! visibility timeout; if it is not deleted before that, it is delivered
//! again.

mod memory;
#[cfg(feature = "aws")]
mod sqs;

pub use memory::MemoryChannel;
#[cfg(feature = "aws")]
pub use sqs::SqsChannel;

use std::time::Duration;

use async_trait::async_trait;

use crate::errors::PlatformError;

/// A message handed out by [`MessageChannel::receive`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    /// Stable id of the message across redeliveries
    pub id: String,

    pub body: String,

    /// Handle for deleting this particular delivery
    pub delivery_token: String,
}

/// Receiving side of a queue
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Address build workers publish to
    fn address(&self) -> &str;

    /// Receive up to `max` messages, waiting at most `wait` for the first one
    async fn receive(
        &self,
        max: u32,
        visibility: Duration,
        wait: Duration,
    ) -> Result<Vec<ReceivedMessage>, PlatformError>;

    /// Acknowledge a delivery
    async fn delete(&self, delivery_token: &str) -> Result<(), PlatformError>;
}
