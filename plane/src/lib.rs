//! Shipyard control plane
//!
//! Launches deployments, ingests the status and log events their build
//! workers publish, and serves finished deployments from their subdomains.

pub mod app;
pub mod artifacts;
pub mod cache;
pub mod channel;
pub mod deploy;
pub mod errors;
pub mod logs;
pub mod models;
pub mod proxy;
pub mod runner;
pub mod server;
pub mod settings;
pub mod store;
pub mod utils;
pub mod workers;
