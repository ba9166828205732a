//! Reverse proxy serving deployments from their subdomains

pub mod limiter;
pub mod router;
pub mod subdomain;
pub mod upstream;

use std::time::Duration;

use crate::cache::existence;

/// Proxy server options
#[derive(Debug, Clone)]
pub struct Options {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Domain deployments are served under
    pub root_domain: String,

    /// Origin serving the artifact bucket over HTTP
    pub artifact_base_url: String,

    /// Deadline for a whole proxied request
    pub request_timeout: Duration,

    /// Largest request body forwarded
    pub max_body_bytes: usize,

    pub rate_limit: limiter::Options,

    pub cache: existence::Options,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            root_domain: "localhost".to_string(),
            artifact_base_url: "http://127.0.0.1:9000".to_string(),
            request_timeout: Duration::from_secs(30),
            max_body_bytes: 10 * 1024 * 1024,
            rate_limit: limiter::Options::default(),
            cache: existence::Options::default(),
        }
    }
}
