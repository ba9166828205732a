//! Server state

use std::sync::Arc;

use crate::deploy::launcher::Launcher;

/// Server state shared across handlers
pub struct ServerState {
    pub launcher: Arc<Launcher>,
}

impl ServerState {
    pub fn new(launcher: Arc<Launcher>) -> Self {
        Self { launcher }
    }
}
