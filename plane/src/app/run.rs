//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::app::options::{AppOptions, LifecycleOptions};
use crate::app::state::AppState;
use crate::errors::PlatformError;
use crate::proxy::router::{self as proxy_router, ProxyState};
use crate::server::serve::serve;
use crate::server::state::ServerState;
use crate::workers::{log_consumer, status_consumer};

/// Run the Shipyard control plane
pub async fn run(
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), PlatformError> {
    info!("Initializing Shipyard control plane...");

    // Create shutdown channel
    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(shutdown_tx.clone(), options.lifecycle.clone());

    if let Err(e) = init(&options, shutdown_tx.clone(), &mut shutdown_manager).await {
        error!("Failed to start control plane: {}", e);
        shutdown_manager.shutdown().await?;
        return Err(e);
    }

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    // Shutdown
    drop(shutdown_tx);
    shutdown_manager.shutdown().await
}

// =============================== INITIALIZATION ================================== //

async fn init(
    options: &AppOptions,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<(), PlatformError> {
    if options.backends.is_in_memory() {
        warn!("Running with in-memory backends, nothing is persisted");
    }

    let app_state = Arc::new(AppState::init(options).await?);
    shutdown_manager.with_app_state(app_state.clone())?;

    init_status_consumers(options, app_state.clone(), shutdown_manager, &shutdown_tx)?;
    init_log_consumers(options, app_state.clone(), shutdown_manager, &shutdown_tx)?;

    if options.enable_api_server {
        init_api_server(
            options,
            app_state.clone(),
            shutdown_manager,
            shutdown_tx.subscribe(),
        )
        .await?;
    }

    if options.enable_proxy {
        init_proxy_server(options, app_state, shutdown_manager, shutdown_tx.subscribe()).await?;
    }

    Ok(())
}

fn init_status_consumers(
    options: &AppOptions,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    shutdown_tx: &broadcast::Sender<()>,
) -> Result<(), PlatformError> {
    info!(
        instances = options.status_consumer_instances,
        "Initializing status consumers..."
    );

    for _ in 0..options.status_consumer_instances {
        let options = options.status_consumer.clone();
        let channel = app_state.backends.status_channel.clone();
        let store = app_state.backends.store.clone();
        let mut shutdown_rx = shutdown_tx.subscribe();

        let handle = tokio::spawn(async move {
            status_consumer::run(
                &options,
                channel.as_ref(),
                store,
                tokio::time::sleep,
                Box::pin(async move {
                    let _ = shutdown_rx.recv().await;
                }),
            )
            .await;
        });
        shutdown_manager.with_consumer_handle(handle);
    }
    Ok(())
}

fn init_log_consumers(
    options: &AppOptions,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    shutdown_tx: &broadcast::Sender<()>,
) -> Result<(), PlatformError> {
    info!(
        instances = options.log_consumer_instances,
        "Initializing log consumers..."
    );

    for _ in 0..options.log_consumer_instances {
        let options = options.log_consumer.clone();
        let channel = app_state.backends.log_channel.clone();
        let store = app_state.backends.store.clone();
        let mut shutdown_rx = shutdown_tx.subscribe();

        let handle = tokio::spawn(async move {
            log_consumer::run(
                &options,
                channel.as_ref(),
                store,
                tokio::time::sleep,
                Box::pin(async move {
                    let _ = shutdown_rx.recv().await;
                }),
            )
            .await;
        });
        shutdown_manager.with_consumer_handle(handle);
    }
    Ok(())
}

async fn init_api_server(
    options: &AppOptions,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), PlatformError> {
    info!("Initializing control API server...");

    let server_state = ServerState::new(app_state.launcher.clone());

    let server_handle = serve(&options.server, Arc::new(server_state), async move {
        let _ = shutdown_rx.recv().await;
    })
    .await?;

    shutdown_manager.with_api_server_handle(server_handle)?;
    Ok(())
}

async fn init_proxy_server(
    options: &AppOptions,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), PlatformError> {
    info!("Initializing reverse proxy...");

    let proxy_state = ProxyState::new(
        &options.proxy,
        app_state.cache.clone(),
        app_state.layout.clone(),
        app_state.backends.store.clone(),
        app_state.backends.artifacts.clone(),
    )?;

    let proxy_handle = proxy_router::serve(&options.proxy, Arc::new(proxy_state), async move {
        let _ = shutdown_rx.recv().await;
    })
    .await?;

    shutdown_manager.with_proxy_server_handle(proxy_handle)?;
    Ok(())
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    lifecycle_options: LifecycleOptions,
    app_state: Option<Arc<AppState>>,
    api_server_handle: Option<JoinHandle<Result<(), PlatformError>>>,
    proxy_server_handle: Option<JoinHandle<Result<(), PlatformError>>>,
    consumer_handles: Vec<JoinHandle<()>>,
}

impl ShutdownManager {
    pub fn new(shutdown_tx: broadcast::Sender<()>, lifecycle_options: LifecycleOptions) -> Self {
        Self {
            shutdown_tx,
            lifecycle_options,
            app_state: None,
            api_server_handle: None,
            proxy_server_handle: None,
            consumer_handles: Vec::new(),
        }
    }

    pub fn with_app_state(&mut self, state: Arc<AppState>) -> Result<(), PlatformError> {
        if self.app_state.is_some() {
            return Err(PlatformError::ShutdownError("app_state already set".to_string()));
        }
        self.app_state = Some(state);
        Ok(())
    }

    pub fn with_consumer_handle(&mut self, handle: JoinHandle<()>) {
        self.consumer_handles.push(handle);
    }

    pub fn with_api_server_handle(
        &mut self,
        handle: JoinHandle<Result<(), PlatformError>>,
    ) -> Result<(), PlatformError> {
        if self.api_server_handle.is_some() {
            return Err(PlatformError::ShutdownError("api_server_handle already set".to_string()));
        }
        self.api_server_handle = Some(handle);
        Ok(())
    }

    pub fn with_proxy_server_handle(
        &mut self,
        handle: JoinHandle<Result<(), PlatformError>>,
    ) -> Result<(), PlatformError> {
        if self.proxy_server_handle.is_some() {
            return Err(PlatformError::ShutdownError("proxy_server_handle already set".to_string()));
        }
        self.proxy_server_handle = Some(handle);
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), PlatformError> {
        let _ = self.shutdown_tx.send(());

        match tokio::time::timeout(
            self.lifecycle_options.max_shutdown_delay,
            self.shutdown_impl(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, forcing shutdown...",
                    self.lifecycle_options.max_shutdown_delay
                );
                std::process::exit(1);
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), PlatformError> {
        info!("Shutting down Shipyard control plane...");

        // 1. Proxy, stop taking end-user traffic first
        if let Some(handle) = self.proxy_server_handle.take() {
            handle.await.map_err(|e| PlatformError::ShutdownError(e.to_string()))??;
        }

        // 2. Control API
        if let Some(handle) = self.api_server_handle.take() {
            handle.await.map_err(|e| PlatformError::ShutdownError(e.to_string()))??;
        }

        // 3. Consumers finish the message in hand
        for handle in self.consumer_handles.drain(..) {
            handle.await.map_err(|e| PlatformError::ShutdownError(e.to_string()))?;
        }

        // 4. App state
        if let Some(app_state) = self.app_state.take() {
            app_state.shutdown().await?;
        }

        info!("Shutdown complete");
        Ok(())
    }
}
