//! In-process caches

pub mod existence;
