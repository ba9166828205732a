//! In-memory message channel with visibility-timeout redelivery

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::errors::PlatformError;

use super::{MessageChannel, ReceivedMessage};

/// Longest single sleep while long-polling an empty queue
const POLL_STEP: Duration = Duration::from_millis(20);

#[derive(Debug)]
struct Entry {
    id: String,
    body: String,
    visible_at: Instant,
    delivery_token: Option<String>,
    receive_count: u32,
}

/// In-memory queue.
///
/// Behaves like a standard SQS queue for the properties consumers rely on:
/// received messages become visible again once the visibility timeout
/// elapses, and only the latest delivery token of a message can delete it.
#[derive(Debug)]
pub struct MemoryChannel {
    address: String,
    entries: Mutex<Vec<Entry>>,
    notify: Notify,
    next_id: AtomicU64,
    deleted: AtomicU64,
}

impl MemoryChannel {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            entries: Mutex::new(Vec::new()),
            notify: Notify::new(),
            next_id: AtomicU64::new(0),
            deleted: AtomicU64::new(0),
        }
    }

    /// Enqueue a message body, returning its id
    pub fn send(&self, body: impl Into<String>) -> String {
        let id = format!("msg-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.push(Entry {
            id: id.clone(),
            body: body.into(),
            visible_at: Instant::now(),
            delivery_token: None,
            receive_count: 0,
        });
        drop(entries);
        self.notify.notify_waiters();
        id
    }

    /// Messages not yet deleted, visible or in flight
    pub fn pending(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Number of successful deletes
    pub fn deleted(&self) -> u64 {
        self.deleted.load(Ordering::SeqCst)
    }

    /// How many times the message has been handed out
    pub fn receive_count(&self, id: &str) -> Option<u32> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.iter().find(|e| e.id == id).map(|e| e.receive_count)
    }

    fn take_visible(&self, max: u32, visibility: Duration) -> Vec<ReceivedMessage> {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .iter_mut()
            .filter(|e| e.visible_at <= now)
            .take(max as usize)
            .map(|entry| {
                let token = uuid::Uuid::new_v4().to_string();
                entry.visible_at = now + visibility;
                entry.delivery_token = Some(token.clone());
                entry.receive_count += 1;
                ReceivedMessage {
                    id: entry.id.clone(),
                    body: entry.body.clone(),
                    delivery_token: token,
                }
            })
            .collect()
    }
}

#[async_trait]
impl MessageChannel for MemoryChannel {
    fn address(&self) -> &str {
        &self.address
    }

    async fn receive(
        &self,
        max: u32,
        visibility: Duration,
        wait: Duration,
    ) -> Result<Vec<ReceivedMessage>, PlatformError> {
        let deadline = Instant::now() + wait;
        loop {
            let notified = self.notify.notified();
            let messages = self.take_visible(max.max(1), visibility);
            let now = Instant::now();
            if !messages.is_empty() || now >= deadline {
                return Ok(messages);
            }
            let step = (deadline - now).min(POLL_STEP);
            let _ = tokio::time::timeout(step, notified).await;
        }
    }

    async fn delete(&self, delivery_token: &str) -> Result<(), PlatformError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let Some(pos) = entries
            .iter()
            .position(|e| e.delivery_token.as_deref() == Some(delivery_token))
        else {
            return Err(PlatformError::NotFound(
                "delivery token expired or unknown".to_string(),
            ));
        };
        entries.remove(pos);
        self.deleted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
