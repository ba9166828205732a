//! Forwarding to the artifact origin

use std::error::Error as _;
use std::time::Duration;

use axum::body::Body;
use axum::response::Response;
use bytes::Bytes;
use http::{HeaderMap, Method};
use tracing::debug;

use crate::errors::PlatformError;

/// HTTP client towards the artifact origin
#[derive(Clone)]
pub struct Upstream {
    client: reqwest::Client,
    base_url: String,
}

impl Upstream {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, PlatformError> {
        let parsed = url::Url::parse(base_url).map_err(|e| {
            PlatformError::ConfigError(format!("invalid artifact base url {}: {}", base_url, e))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(PlatformError::ConfigError(format!(
                "artifact base url must be http(s), got {}",
                parsed.scheme()
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Absolute URL of an origin path (leading slash included)
    pub fn url(&self, path: &str, query: Option<&str>) -> String {
        match query {
            Some(q) if !q.is_empty() => format!("{}{}?{}", self.base_url, path, q),
            _ => format!("{}{}", self.base_url, path),
        }
    }

    /// Send a request to the origin and relay its response
    pub async fn forward(
        &self,
        method: Method,
        path: &str,
        query: Option<&str>,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<Response, PlatformError> {
        let url = self.url(path, query);
        debug!(method = %method, url = %url, "Forwarding request");

        let mut request = self.client.request(method, &url);
        for (name, value) in headers.iter() {
            if !is_hop_by_hop_header(name.as_str()) && *name != http::header::HOST {
                request = request.header(name.clone(), value.clone());
            }
        }
        if !body.is_empty() {
            request = request.body(body);
        }

        let response = request.send().await.map_err(|e| classify(&e))?;

        let status = response.status();
        let response_headers = response.headers().clone();
        let body = response.bytes().await.map_err(|e| classify(&e))?;

        let mut builder = Response::builder().status(status);
        for (name, value) in response_headers.iter() {
            if !is_hop_by_hop_header(name.as_str()) {
                builder = builder.header(name, value);
            }
        }

        builder
            .body(Body::from(body))
            .map_err(|e| PlatformError::Internal(e.to_string()))
    }
}

/// Map a client error onto the error taxonomy
pub fn classify(err: &reqwest::Error) -> PlatformError {
    if err.is_redirect() {
        return PlatformError::Internal(format!("upstream redirect misconfiguration: {}", err));
    }
    if err.is_timeout() {
        return PlatformError::GatewayTimeout(err.to_string());
    }

    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::ConnectionRefused {
                return PlatformError::Unavailable(err.to_string());
            }
        }

        let text = cause.to_string().to_lowercase();
        if text.contains("connection refused") {
            return PlatformError::Unavailable(err.to_string());
        }
        if text.contains("dns error")
            || text.contains("failed to lookup address")
            || text.contains("no such host")
        {
            return PlatformError::NotFound(format!("upstream host not found: {}", err));
        }

        source = cause.source();
    }

    PlatformError::BadGateway(err.to_string())
}

/// Check if a header is a hop-by-hop header that should not be forwarded.
fn is_hop_by_hop_header(name: &str) -> bool {
    matches!(
        name,
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "proxy-connection"
            | "te"
            | "trailer"
            | "trailers"
            | "transfer-encoding"
            | "upgrade"
            | "content-length"
    )
}
