//! Queue consumer loop shared by the ingestion workers

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tracing::{debug, error, info, warn};

use crate::channel::{MessageChannel, ReceivedMessage};
use crate::utils::{calc_exp_backoff, CooldownOptions};

/// What to do with a message once handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Delete it from the channel
    Ack,

    /// Leave it; it is redelivered after the visibility timeout
    Retry,
}

/// Processes one message at a time
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &'static str;

    async fn handle(&self, message: &ReceivedMessage) -> Disposition;
}

/// Consumer options
#[derive(Debug, Clone)]
pub struct Options {
    /// Messages requested per receive call
    pub batch_size: u32,

    /// How long a received message stays hidden from other consumers
    pub visibility_timeout: Duration,

    /// Long-poll wait per receive call
    pub wait_time: Duration,

    /// Backoff applied after failed receive calls
    pub receive_backoff: CooldownOptions,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            batch_size: 10,
            visibility_timeout: Duration::from_secs(30),
            wait_time: Duration::from_secs(20),
            receive_backoff: CooldownOptions {
                base_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(60),
                multiplier: 2.0,
            },
        }
    }
}

/// Run a consumer until the shutdown signal fires.
///
/// Messages of one batch are handled strictly in order. Shutdown is observed
/// between messages, so a message being handled is always finished first.
pub async fn run<S, F>(
    options: &Options,
    channel: &dyn MessageChannel,
    handler: &dyn MessageHandler,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    let name = handler.name();
    info!(consumer = name, queue = channel.address(), "Consumer starting...");

    let mut failed_receives: u32 = 0;
    loop {
        let received = tokio::select! {
            _ = &mut shutdown_signal => {
                info!(consumer = name, "Consumer shutting down...");
                return;
            }
            received = channel.receive(
                options.batch_size,
                options.visibility_timeout,
                options.wait_time,
            ) => received,
        };

        let messages = match received {
            Ok(messages) => {
                failed_receives = 0;
                messages
            }
            Err(e) => {
                let wait = calc_exp_backoff(&options.receive_backoff, failed_receives);
                failed_receives = failed_receives.saturating_add(1);
                error!(consumer = name, "Failed to receive messages, retrying in {:?}: {}", wait, e);
                tokio::select! {
                    _ = &mut shutdown_signal => {
                        info!(consumer = name, "Consumer shutting down...");
                        return;
                    }
                    _ = sleep_fn(wait) => {}
                }
                continue;
            }
        };

        if !messages.is_empty() {
            debug!(consumer = name, count = messages.len(), "Received messages");
        }

        for message in messages {
            process(channel, handler, &message).await;

            if (&mut shutdown_signal).now_or_never().is_some() {
                info!(consumer = name, "Consumer shutting down...");
                return;
            }
        }
    }
}

async fn process(channel: &dyn MessageChannel, handler: &dyn MessageHandler, message: &ReceivedMessage) {
    match handler.handle(message).await {
        Disposition::Ack => {
            if let Err(e) = channel.delete(&message.delivery_token).await {
                warn!(
                    consumer = handler.name(),
                    message_id = %message.id,
                    "Failed to delete message, it will be redelivered: {}", e
                );
            }
        }
        Disposition::Retry => {
            debug!(
                consumer = handler.name(),
                message_id = %message.id,
                "Message left for redelivery"
            );
        }
    }
}
