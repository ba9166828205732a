//! Application state management

use std::sync::Arc;

use tracing::info;

use crate::app::options::{AppOptions, BackendOptions, MEMORY_LOG_CHANNEL, MEMORY_STATUS_CHANNEL};
use crate::artifacts::{ArtifactLayout, ArtifactRepository, MemoryArtifacts};
use crate::cache::existence::ExistenceCache;
use crate::channel::{MemoryChannel, MessageChannel};
use crate::deploy::launcher::Launcher;
use crate::errors::PlatformError;
use crate::runner::{MemoryRunner, TaskRunner};
use crate::settings::{CloudBackend, CloudSettings, StoreBackend, StoreSettings};
use crate::store::{DeploymentStore, MemoryStore};

/// Collaborators every role is built from
#[derive(Clone)]
pub struct Backends {
    pub store: Arc<dyn DeploymentStore>,
    pub artifacts: Arc<dyn ArtifactRepository>,
    pub runner: Arc<dyn TaskRunner>,
    pub status_channel: Arc<dyn MessageChannel>,
    pub log_channel: Arc<dyn MessageChannel>,
}

impl Backends {
    /// Everything in process
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            artifacts: Arc::new(MemoryArtifacts::new()),
            runner: Arc::new(MemoryRunner::new()),
            status_channel: Arc::new(MemoryChannel::new(MEMORY_STATUS_CHANNEL)),
            log_channel: Arc::new(MemoryChannel::new(MEMORY_LOG_CHANNEL)),
        }
    }

    /// Build the backends named by the options
    pub async fn connect(options: &BackendOptions) -> Result<Self, PlatformError> {
        let store = connect_store(&options.store).await?;

        let backends = match options.cloud.backend {
            CloudBackend::Memory => Self {
                store,
                ..Self::in_memory()
            },
            CloudBackend::Aws => connect_aws(&options.cloud, store).await?,
        };
        Ok(backends)
    }
}

async fn connect_store(
    settings: &StoreSettings,
) -> Result<Arc<dyn DeploymentStore>, PlatformError> {
    match settings.backend {
        StoreBackend::Memory => {
            info!("Using in-memory deployment store");
            Ok(Arc::new(MemoryStore::new()))
        }
        #[cfg(feature = "postgres")]
        StoreBackend::Postgres => {
            let url = settings.database_url.as_ref().ok_or_else(|| {
                PlatformError::ConfigError("store.database_url is not set".to_string())
            })?;
            info!("Connecting to PostgreSQL deployment store...");
            let store =
                crate::store::PostgresStore::connect(url, settings.max_connections).await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "postgres"))]
        StoreBackend::Postgres => Err(PlatformError::ConfigError(
            "built without the postgres feature".to_string(),
        )),
    }
}

#[cfg(feature = "aws")]
async fn connect_aws(
    settings: &CloudSettings,
    store: Arc<dyn DeploymentStore>,
) -> Result<Backends, PlatformError> {
    use crate::artifacts::S3Artifacts;
    use crate::channel::SqsChannel;
    use crate::runner::{EcsRunner, EcsRunnerOptions};

    info!("Loading AWS configuration...");
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
    if let Some(region) = &settings.region {
        loader = loader.region(aws_config::Region::new(region.clone()));
    }
    let config = loader.load().await;

    let sqs = aws_sdk_sqs::Client::new(&config);
    let runner = EcsRunner::new(
        aws_sdk_ecs::Client::new(&config),
        EcsRunnerOptions {
            cluster: settings.cluster.clone(),
            task_definition: settings.task_definition.clone(),
            container_name: settings.container_name.clone(),
            subnets: settings.subnets.clone(),
            security_groups: settings.security_groups.clone(),
            assign_public_ip: settings.assign_public_ip,
            environment: vec![("ARTIFACT_BUCKET".to_string(), settings.bucket.clone())],
        },
    );

    Ok(Backends {
        store,
        artifacts: Arc::new(S3Artifacts::new(
            aws_sdk_s3::Client::new(&config),
            settings.bucket.clone(),
        )),
        runner: Arc::new(runner),
        status_channel: Arc::new(SqsChannel::new(sqs.clone(), settings.status_queue_url.clone())),
        log_channel: Arc::new(SqsChannel::new(sqs, settings.log_queue_url.clone())),
    })
}

#[cfg(not(feature = "aws"))]
async fn connect_aws(
    _settings: &CloudSettings,
    _store: Arc<dyn DeploymentStore>,
) -> Result<Backends, PlatformError> {
    Err(PlatformError::ConfigError("built without the aws feature".to_string()))
}

/// Main application state
pub struct AppState {
    pub backends: Backends,

    /// Existence cache shared by the proxy and the launcher
    pub cache: ExistenceCache,

    pub layout: ArtifactLayout,

    pub launcher: Arc<Launcher>,
}

impl AppState {
    /// Initialize application state
    pub async fn init(options: &AppOptions) -> Result<Self, PlatformError> {
        info!("Initializing application state...");
        let backends = Backends::connect(&options.backends).await?;
        Ok(Self::from_backends(options, backends))
    }

    pub fn from_backends(options: &AppOptions, backends: Backends) -> Self {
        let cache = ExistenceCache::new(&options.proxy.cache);
        let layout = ArtifactLayout::new(&options.outputs_prefix);

        let launcher = Arc::new(Launcher::new(
            options.launcher.clone(),
            backends.store.clone(),
            backends.runner.clone(),
            backends.artifacts.clone(),
            layout.clone(),
            cache.clone(),
        ));

        Self {
            backends,
            cache,
            layout,
            launcher,
        }
    }

    /// Shutdown application state
    pub async fn shutdown(&self) -> Result<(), PlatformError> {
        info!("Shutting down application state...");
        self.cache.invalidate_all();
        Ok(())
    }
}
