//! ECS Fargate task runner

use async_trait::async_trait;
use aws_sdk_ecs::error::DisplayErrorContext;
use aws_sdk_ecs::types::{
    AssignPublicIp, AwsVpcConfiguration, ContainerOverride, KeyValuePair, LaunchType,
    NetworkConfiguration, TaskOverride,
};
use tracing::{error, info};

use crate::errors::PlatformError;

use super::{LaunchParams, TaskHandle, TaskRunner};

/// Where and how build workers run
#[derive(Debug, Clone, Default)]
pub struct EcsRunnerOptions {
    pub cluster: String,
    pub task_definition: String,
    pub container_name: String,
    pub subnets: Vec<String>,
    pub security_groups: Vec<String>,
    pub assign_public_ip: bool,

    /// Extra environment passed to every worker (bucket, region, ...)
    pub environment: Vec<(String, String)>,
}

#[derive(Clone)]
pub struct EcsRunner {
    client: aws_sdk_ecs::Client,
    options: EcsRunnerOptions,
}

impl std::fmt::Debug for EcsRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EcsRunner")
            .field("options", &self.options)
            .finish()
    }
}

impl EcsRunner {
    pub fn new(client: aws_sdk_ecs::Client, options: EcsRunnerOptions) -> Self {
        Self { client, options }
    }

    fn overrides(&self, params: &LaunchParams) -> TaskOverride {
        let environment = self
            .options
            .environment
            .iter()
            .cloned()
            .chain(
                params
                    .environment()
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v)),
            )
            .map(|(name, value)| KeyValuePair::builder().name(name).value(value).build())
            .collect::<Vec<_>>();

        TaskOverride::builder()
            .container_overrides(
                ContainerOverride::builder()
                    .name(&self.options.container_name)
                    .set_environment(Some(environment))
                    .build(),
            )
            .build()
    }
}

#[async_trait]
impl TaskRunner for EcsRunner {
    async fn launch(&self, params: &LaunchParams) -> Result<TaskHandle, PlatformError> {
        let vpc = AwsVpcConfiguration::builder()
            .set_subnets(Some(self.options.subnets.clone()))
            .set_security_groups(Some(self.options.security_groups.clone()))
            .assign_public_ip(if self.options.assign_public_ip {
                AssignPublicIp::Enabled
            } else {
                AssignPublicIp::Disabled
            })
            .build()
            .map_err(|e| PlatformError::ConfigError(e.to_string()))?;

        let out = self
            .client
            .run_task()
            .cluster(&self.options.cluster)
            .task_definition(&self.options.task_definition)
            .launch_type(LaunchType::Fargate)
            .count(1)
            .network_configuration(
                NetworkConfiguration::builder()
                    .awsvpc_configuration(vpc)
                    .build(),
            )
            .overrides(self.overrides(params))
            .started_by(format!("shipyard-{}", params.deployment_id))
            .send()
            .await
            .map_err(|e| {
                PlatformError::Unavailable(format!("ecs run_task failed: {}", DisplayErrorContext(e)))
            })?;

        let Some(task_arn) = out.tasks().first().and_then(|t| t.task_arn()) else {
            let reasons = out
                .failures()
                .iter()
                .filter_map(|f| f.reason())
                .collect::<Vec<_>>()
                .join(", ");
            error!(deployment_id = %params.deployment_id, reasons = %reasons, "ECS did not start the build task");
            return Err(PlatformError::Unavailable(format!(
                "ecs run_task started no task: {}",
                reasons
            )));
        };

        info!(deployment_id = %params.deployment_id, task_arn, "Build task started");
        Ok(TaskHandle {
            task_id: task_arn.to_string(),
        })
    }
}
