//! Deployment lifecycle

pub mod cleanup;
pub mod fsm;
pub mod launcher;
pub mod rollback;
