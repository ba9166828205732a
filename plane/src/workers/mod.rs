//! Background workers

pub mod consumer;
pub mod log_consumer;
pub mod status_consumer;
