//! Application configuration options

use std::time::Duration;

use crate::cache::existence;
use crate::deploy::launcher;
use crate::proxy::{self, limiter};
use crate::settings::{
    CloudBackend, CloudSettings, ConsumerSettings, Settings, StoreBackend, StoreSettings,
};
use crate::workers::{consumer, log_consumer, status_consumer};

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Backends the state is built from
    pub backends: BackendOptions,

    /// Key prefix build outputs are written under
    pub outputs_prefix: String,

    /// Enable the control API server
    pub enable_api_server: bool,

    /// Control API server configuration
    pub server: ServerOptions,

    /// Enable the reverse proxy
    pub enable_proxy: bool,

    pub proxy: proxy::Options,

    pub launcher: launcher::Options,

    /// Status consumer tasks to spawn
    pub status_consumer_instances: usize,

    pub status_consumer: status_consumer::Options,

    /// Log consumer tasks to spawn
    pub log_consumer_instances: usize,

    pub log_consumer: log_consumer::Options,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            backends: BackendOptions::default(),
            outputs_prefix: "__outputs".to_string(),
            enable_api_server: true,
            server: ServerOptions::default(),
            enable_proxy: true,
            proxy: proxy::Options::default(),
            launcher: launcher::Options::default(),
            status_consumer_instances: 1,
            status_consumer: status_consumer::Options::default(),
            log_consumer_instances: 1,
            log_consumer: log_consumer::Options::default(),
        }
    }
}

impl AppOptions {
    /// Build options from a parsed settings file
    pub fn from_settings(settings: &Settings) -> Self {
        let proxy = proxy::Options {
            host: settings.proxy.host.clone(),
            port: settings.proxy.port,
            root_domain: settings.proxy.root_domain.clone(),
            artifact_base_url: settings.proxy.artifact_base_url.clone(),
            request_timeout: Duration::from_secs(settings.proxy.request_timeout_secs),
            max_body_bytes: settings.proxy.max_body_bytes,
            rate_limit: limiter::Options {
                per_second: settings.proxy.rate_limit_per_second,
                burst: settings.proxy.rate_limit_burst,
                max_wait: Duration::from_millis(settings.proxy.rate_limit_max_wait_ms),
            },
            cache: existence::Options {
                capacity: settings.proxy.cache_capacity,
                positive_ttl: Duration::from_secs(settings.proxy.cache_positive_ttl_secs),
                negative_ttl: Duration::from_secs(settings.proxy.cache_negative_ttl_secs),
            },
        };

        let backends = BackendOptions {
            store: settings.store.clone(),
            cloud: settings.cloud.clone(),
        };

        let (status_channel, log_channel) = match settings.cloud.backend {
            CloudBackend::Aws => (
                settings.cloud.status_queue_url.clone(),
                settings.cloud.log_queue_url.clone(),
            ),
            CloudBackend::Memory => (
                MEMORY_STATUS_CHANNEL.to_string(),
                MEMORY_LOG_CHANNEL.to_string(),
            ),
        };

        Self {
            lifecycle: LifecycleOptions {
                max_shutdown_delay: Duration::from_secs(settings.max_shutdown_delay_secs),
            },
            backends,
            outputs_prefix: settings.proxy.outputs_prefix.clone(),
            enable_api_server: settings.enable_api_server,
            server: ServerOptions {
                host: settings.api_server.host.clone(),
                port: settings.api_server.port,
            },
            enable_proxy: settings.enable_proxy,
            proxy,
            launcher: launcher::Options {
                status_channel,
                log_channel,
            },
            status_consumer_instances: settings.status_consumer.instances,
            status_consumer: status_consumer::Options {
                consumer: consumer_options(&settings.status_consumer),
                ready_url_scheme: settings.ready_url_scheme.clone(),
                root_domain: settings.proxy.root_domain.clone(),
                ..Default::default()
            },
            log_consumer_instances: settings.log_consumer.instances,
            log_consumer: log_consumer::Options {
                consumer: consumer_options(&settings.log_consumer),
            },
        }
    }
}

/// Address of the in-process status channel
pub const MEMORY_STATUS_CHANNEL: &str = "memory://status";

/// Address of the in-process log channel
pub const MEMORY_LOG_CHANNEL: &str = "memory://logs";

fn consumer_options(settings: &ConsumerSettings) -> consumer::Options {
    consumer::Options {
        batch_size: settings.batch_size,
        visibility_timeout: Duration::from_secs(settings.visibility_timeout_secs),
        wait_time: Duration::from_secs(settings.wait_time_secs),
        ..Default::default()
    }
}

/// Lifecycle options
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// Store and cloud backend selection
#[derive(Debug, Clone, Default)]
pub struct BackendOptions {
    pub store: StoreSettings,
    pub cloud: CloudSettings,
}

impl BackendOptions {
    pub fn is_in_memory(&self) -> bool {
        self.store.backend == StoreBackend::Memory && self.cloud.backend == CloudBackend::Memory
    }
}

/// Control API server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}
