//! In-memory task runner

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::errors::PlatformError;

use super::{LaunchParams, TaskHandle, TaskRunner};

/// Records launches instead of starting containers.
///
/// Launches can be made to fail or to take a while, for exercising the
/// launcher's rollback.
#[derive(Debug, Default)]
pub struct MemoryRunner {
    launched: Mutex<Vec<LaunchParams>>,
    failing: AtomicBool,
    fail_next: AtomicU32,
    delay: Mutex<Option<Duration>>,
}

impl MemoryRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every launch while set
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Fail the next `count` launches
    pub fn fail_next(&self, count: u32) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Sleep this long inside every launch
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap_or_else(|e| e.into_inner()) = delay;
    }

    /// Launches that succeeded, oldest first
    pub fn launched(&self) -> Vec<LaunchParams> {
        self.launched.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn should_fail(&self) -> bool {
        if self.failing.load(Ordering::SeqCst) {
            return true;
        }
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl TaskRunner for MemoryRunner {
    async fn launch(&self, params: &LaunchParams) -> Result<TaskHandle, PlatformError> {
        let delay = *self.delay.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.should_fail() {
            return Err(PlatformError::Unavailable(
                "task runner rejected the launch".to_string(),
            ));
        }

        info!(deployment_id = %params.deployment_id, "Recorded build launch");
        self.launched
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(params.clone());

        Ok(TaskHandle {
            task_id: format!("local-{}", params.deployment_id),
        })
    }
}
