//! Settings file management

use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::errors::PlatformError;
use crate::logs::LogLevel;

/// Default location of the settings file
pub const DEFAULT_SETTINGS_PATH: &str = "/etc/shipyard/settings.json";

/// Control plane settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit logs as JSON
    #[serde(default)]
    pub json_format: bool,

    /// Directory for daily rolling log files
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Deployment store configuration
    #[serde(default)]
    pub store: StoreSettings,

    /// Object store, channels and task runner configuration
    #[serde(default)]
    pub cloud: CloudSettings,

    /// Enable the control API server
    #[serde(default = "default_true")]
    pub enable_api_server: bool,

    /// Control API server configuration
    #[serde(default)]
    pub api_server: ApiServerSettings,

    /// Enable the reverse proxy
    #[serde(default = "default_true")]
    pub enable_proxy: bool,

    /// Reverse proxy configuration
    #[serde(default)]
    pub proxy: ProxySettings,

    /// Status consumer configuration
    #[serde(default)]
    pub status_consumer: ConsumerSettings,

    /// Log consumer configuration
    #[serde(default)]
    pub log_consumer: ConsumerSettings,

    /// Scheme of published deployment URLs
    #[serde(default = "default_ready_url_scheme")]
    pub ready_url_scheme: String,

    /// Maximum delay for graceful shutdown in seconds
    #[serde(default = "default_max_shutdown_delay")]
    pub max_shutdown_delay_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_ready_url_scheme() -> String {
    "https".to_string()
}

fn default_max_shutdown_delay() -> u64 {
    30
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            json_format: false,
            log_dir: None,
            store: StoreSettings::default(),
            cloud: CloudSettings::default(),
            enable_api_server: true,
            api_server: ApiServerSettings::default(),
            enable_proxy: true,
            proxy: ProxySettings::default(),
            status_consumer: ConsumerSettings::default(),
            log_consumer: ConsumerSettings::default(),
            ready_url_scheme: default_ready_url_scheme(),
            max_shutdown_delay_secs: default_max_shutdown_delay(),
        }
    }
}

impl Settings {
    /// Read and parse a settings file
    pub async fn read_from(path: impl AsRef<Path>) -> Result<Self, PlatformError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            PlatformError::ConfigError(format!("unable to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, PlatformError> {
        let settings: Settings = serde_json::from_str(content)
            .map_err(|e| PlatformError::ConfigError(format!("invalid settings: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), PlatformError> {
        if self.store.backend == StoreBackend::Postgres && self.store.database_url.is_none() {
            return Err(PlatformError::ConfigError(
                "store.database_url is required for the postgres backend".to_string(),
            ));
        }
        if self.cloud.backend == CloudBackend::Aws {
            let required = [
                ("cloud.bucket", &self.cloud.bucket),
                ("cloud.status_queue_url", &self.cloud.status_queue_url),
                ("cloud.log_queue_url", &self.cloud.log_queue_url),
                ("cloud.cluster", &self.cloud.cluster),
                ("cloud.task_definition", &self.cloud.task_definition),
            ];
            for (name, value) in required {
                if value.trim().is_empty() {
                    return Err(PlatformError::ConfigError(format!(
                        "{} is required for the aws backend",
                        name
                    )));
                }
            }
        }
        if self.proxy.rate_limit_per_second == 0 || self.proxy.rate_limit_burst == 0 {
            return Err(PlatformError::ConfigError(
                "proxy rate limit must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Deployment store backends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Postgres,
}

/// Deployment store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Connection string, never logged
    #[serde(default, skip_serializing)]
    pub database_url: Option<SecretString>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            database_url: None,
            max_connections: default_max_connections(),
        }
    }
}

/// Object store, channel and task runner backends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudBackend {
    #[default]
    Memory,
    Aws,
}

/// Cloud settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudSettings {
    #[serde(default)]
    pub backend: CloudBackend,

    /// Region, falls back to the environment when absent
    #[serde(default)]
    pub region: Option<String>,

    /// Artifact bucket
    #[serde(default)]
    pub bucket: String,

    #[serde(default)]
    pub status_queue_url: String,

    #[serde(default)]
    pub log_queue_url: String,

    /// Cluster build workers run on
    #[serde(default)]
    pub cluster: String,

    #[serde(default)]
    pub task_definition: String,

    #[serde(default = "default_container_name")]
    pub container_name: String,

    #[serde(default)]
    pub subnets: Vec<String>,

    #[serde(default)]
    pub security_groups: Vec<String>,

    #[serde(default = "default_true")]
    pub assign_public_ip: bool,
}

fn default_container_name() -> String {
    "builder".to_string()
}

impl Default for CloudSettings {
    fn default() -> Self {
        Self {
            backend: CloudBackend::Memory,
            region: None,
            bucket: String::new(),
            status_queue_url: String::new(),
            log_queue_url: String::new(),
            cluster: String::new(),
            task_definition: String::new(),
            container_name: default_container_name(),
            subnets: Vec::new(),
            security_groups: Vec::new(),
            assign_public_ip: true,
        }
    }
}

/// Control API server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiServerSettings {
    #[serde(default = "default_api_host")]
    pub host: String,

    #[serde(default = "default_api_port")]
    pub port: u16,
}

fn default_api_host() -> String {
    "127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
    8080
}

impl Default for ApiServerSettings {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
        }
    }
}

/// Reverse proxy settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxySettings {
    #[serde(default = "default_proxy_host")]
    pub host: String,

    #[serde(default = "default_proxy_port")]
    pub port: u16,

    /// Domain deployments are served under
    #[serde(default = "default_root_domain")]
    pub root_domain: String,

    /// Origin serving the artifact bucket over HTTP
    #[serde(default = "default_artifact_base_url")]
    pub artifact_base_url: String,

    /// Key prefix build outputs are written under
    #[serde(default = "default_outputs_prefix")]
    pub outputs_prefix: String,

    #[serde(default = "default_rate_limit_per_second")]
    pub rate_limit_per_second: u32,

    #[serde(default = "default_rate_limit_burst")]
    pub rate_limit_burst: u32,

    /// Longest a request waits for a rate limit token in milliseconds
    #[serde(default = "default_rate_limit_max_wait")]
    pub rate_limit_max_wait_ms: u64,

    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: u64,

    #[serde(default = "default_positive_ttl")]
    pub cache_positive_ttl_secs: u64,

    #[serde(default = "default_negative_ttl")]
    pub cache_negative_ttl_secs: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_proxy_host() -> String {
    "0.0.0.0".to_string()
}

fn default_proxy_port() -> u16 {
    8000
}

fn default_root_domain() -> String {
    "localhost".to_string()
}

fn default_artifact_base_url() -> String {
    "http://127.0.0.1:9000".to_string()
}

fn default_outputs_prefix() -> String {
    "__outputs".to_string()
}

fn default_rate_limit_per_second() -> u32 {
    100
}

fn default_rate_limit_burst() -> u32 {
    200
}

fn default_rate_limit_max_wait() -> u64 {
    500
}

fn default_cache_capacity() -> u64 {
    10_000
}

fn default_positive_ttl() -> u64 {
    30
}

fn default_negative_ttl() -> u64 {
    5
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            host: default_proxy_host(),
            port: default_proxy_port(),
            root_domain: default_root_domain(),
            artifact_base_url: default_artifact_base_url(),
            outputs_prefix: default_outputs_prefix(),
            rate_limit_per_second: default_rate_limit_per_second(),
            rate_limit_burst: default_rate_limit_burst(),
            rate_limit_max_wait_ms: default_rate_limit_max_wait(),
            cache_capacity: default_cache_capacity(),
            cache_positive_ttl_secs: default_positive_ttl(),
            cache_negative_ttl_secs: default_negative_ttl(),
            request_timeout_secs: default_request_timeout(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Consumer settings, shared by the status and log consumers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerSettings {
    /// Concurrent polling tasks, 0 disables the consumer
    #[serde(default = "default_instances")]
    pub instances: usize,

    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    #[serde(default = "default_visibility_timeout")]
    pub visibility_timeout_secs: u64,

    #[serde(default = "default_wait_time")]
    pub wait_time_secs: u64,
}

fn default_instances() -> usize {
    1
}

fn default_batch_size() -> u32 {
    10
}

fn default_visibility_timeout() -> u64 {
    30
}

fn default_wait_time() -> u64 {
    20
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            instances: default_instances(),
            batch_size: default_batch_size(),
            visibility_timeout_secs: default_visibility_timeout(),
            wait_time_secs: default_wait_time(),
        }
    }
}
