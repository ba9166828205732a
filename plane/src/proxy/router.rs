//! Subdomain router
//!
//! Resolves the deployment a request is for from its `Host` header and
//! forwards it to the deployment's directory on the artifact origin.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::to_bytes,
    extract::{Request, State},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::artifacts::{ArtifactLayout, ArtifactRepository};
use crate::cache::existence::ExistenceCache;
use crate::errors::PlatformError;
use crate::proxy::limiter::RequestLimiter;
use crate::proxy::subdomain::{extract_label, validate_label};
use crate::proxy::upstream::Upstream;
use crate::proxy::Options;
use crate::store::DeploymentStore;

/// Shared state of the proxy
pub struct ProxyState {
    pub root_domain: String,
    pub request_timeout: Duration,
    pub max_body_bytes: usize,
    pub limiter: RequestLimiter,
    pub cache: ExistenceCache,
    pub layout: ArtifactLayout,
    pub store: Arc<dyn DeploymentStore>,
    pub artifacts: Arc<dyn ArtifactRepository>,
    pub upstream: Upstream,
}

impl ProxyState {
    pub fn new(
        options: &Options,
        cache: ExistenceCache,
        layout: ArtifactLayout,
        store: Arc<dyn DeploymentStore>,
        artifacts: Arc<dyn ArtifactRepository>,
    ) -> Result<Self, PlatformError> {
        Ok(Self {
            root_domain: options.root_domain.clone(),
            request_timeout: options.request_timeout,
            max_body_bytes: options.max_body_bytes,
            limiter: RequestLimiter::new(&options.rate_limit)?,
            cache,
            layout,
            store,
            artifacts,
            upstream: Upstream::new(&options.artifact_base_url, options.request_timeout)?,
        })
    }

    /// Deployment prefix a validated label stands for
    async fn resolve_prefix(&self, label: &str) -> Result<String, PlatformError> {
        let alias = match self.cache.alias(label) {
            Some(alias) => alias,
            None => {
                let alias = match self.store.project_by_subdomain(label).await? {
                    Some(project) => Some(
                        self.store
                            .latest_deployed(&project.id)
                            .await?
                            .map(|d| d.id.to_string())
                            .ok_or_else(|| {
                                PlatformError::NotFound("deployment not found".to_string())
                            })?,
                    ),
                    None => None,
                };
                self.cache.insert_alias(label, alias.clone());
                alias
            }
        };

        Ok(alias.unwrap_or_else(|| label.to_string()))
    }

    async fn deployment_exists(&self, prefix: &str) -> Result<bool, PlatformError> {
        if let Some(exists) = self.cache.get(prefix) {
            return Ok(exists);
        }
        let exists = self.artifacts.exists(&self.layout.index_key(prefix)).await?;
        self.cache.insert(prefix, exists);
        Ok(exists)
    }

    /// Route one request.
    ///
    /// Everything after label validation shares one deadline of
    /// `request_timeout`, counted from arrival.
    pub async fn route(&self, request: Request) -> Result<Response, PlatformError> {
        let deadline = Instant::now() + self.request_timeout;

        let host = request
            .headers()
            .get(http::header::HOST)
            .and_then(|v| v.to_str().ok())
            .or_else(|| request.uri().host())
            .unwrap_or_default()
            .to_string();

        let label = extract_label(&host, &self.root_domain)
            .ok_or_else(|| PlatformError::NotFound("no deployment for this host".to_string()))?;
        validate_label(&label)?;

        self.limiter
            .acquire(deadline.saturating_duration_since(Instant::now()))
            .await?;

        match tokio::time::timeout_at(deadline, self.dispatch(&label, request)).await {
            Ok(result) => result,
            Err(_) => Err(PlatformError::GatewayTimeout(format!(
                "request not served within {:?}",
                self.request_timeout
            ))),
        }
    }

    /// Resolve, check and forward a request for a validated label
    async fn dispatch(&self, label: &str, request: Request) -> Result<Response, PlatformError> {
        let prefix = self.resolve_prefix(label).await?;
        if !self.deployment_exists(&prefix).await? {
            debug!(label, prefix = %prefix, "Unknown deployment");
            return Err(PlatformError::NotFound("deployment not found".to_string()));
        }

        let (parts, body) = request.into_parts();
        let path = match parts.uri.path() {
            "" | "/" => "/index.html",
            path => path,
        };
        let target = format!("/{}{}", self.layout.deployment_dir(&prefix).trim_end_matches('/'), path);
        let body = to_bytes(body, self.max_body_bytes)
            .await
            .map_err(|_| PlatformError::PayloadTooLarge(self.max_body_bytes))?;

        self.upstream
            .forward(parts.method, &target, parts.uri.query(), &parts.headers, body)
            .await
    }
}

async fn proxy_handler(State(state): State<Arc<ProxyState>>, request: Request) -> Response {
    match state.route(request).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

async fn healthz_handler() -> &'static str {
    "ok"
}

/// Router serving every proxied host
pub fn router(state: Arc<ProxyState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz_handler))
        .fallback(proxy_handler)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Start the proxy server
pub async fn serve(
    options: &Options,
    state: Arc<ProxyState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), PlatformError>>, PlatformError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting proxy server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| PlatformError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| PlatformError::ServerError(e.to_string()))
    });

    Ok(handle)
}
