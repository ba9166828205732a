//! Finite state machine for deployment status

use crate::models::DeploymentStatus;

/// Outcome of applying a reported status to the recorded one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Move to the reported status
    Apply,

    /// Reported status equals the recorded one; nothing to write
    Duplicate,

    /// Reported status is not reachable from the recorded one; nothing to write
    Reject,
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::Apply => "apply",
            Transition::Duplicate => "duplicate",
            Transition::Reject => "reject",
        }
    }
}

/// Decide what to do with a reported status.
///
/// Delivery order between status events is not guaranteed, so a terminal
/// status may arrive before BUILDING. QUEUED may therefore jump straight to
/// either terminal status, and a late BUILDING is rejected.
pub fn decide(current: DeploymentStatus, reported: DeploymentStatus) -> Transition {
    use DeploymentStatus::*;

    match (current, reported) {
        (from, to) if from == to => Transition::Duplicate,

        // From Queued
        (Queued, Building) | (Queued, Deployed) | (Queued, Failed) => Transition::Apply,

        // From Building
        (Building, Deployed) | (Building, Failed) => Transition::Apply,

        // Terminal states and backwards moves
        _ => Transition::Reject,
    }
}

/// Status after applying `reported` on top of `current`
pub fn next_status(current: DeploymentStatus, reported: DeploymentStatus) -> DeploymentStatus {
    match decide(current, reported) {
        Transition::Apply => reported,
        Transition::Duplicate | Transition::Reject => current,
    }
}
