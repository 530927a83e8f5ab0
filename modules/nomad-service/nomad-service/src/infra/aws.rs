use std::sync::Arc;

use async_trait::async_trait;
use nomad_service_sdk::{CloudClient, CommandError, InstanceHealth, ProgressSink};

use crate::domain::runner::CommandRunner;

/// [`CloudClient`] backed by the `aws` command line.
pub struct AwsCli {
    runner: Arc<dyn CommandRunner>,
    bin: String,
    region: Option<String>,
}

impl AwsCli {
    pub fn new(runner: Arc<dyn CommandRunner>, bin: impl Into<String>, region: Option<String>) -> Self {
        Self {
            runner,
            bin: bin.into(),
            region,
        }
    }

    fn argv<'a>(&self, args: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        let mut argv: Vec<String> = std::iter::once(self.bin.clone())
            .chain(args.into_iter().map(str::to_owned))
            .collect();
        if let Some(region) = &self.region {
            argv.push("--region".to_owned());
            argv.push(region.clone());
        }
        argv
    }
}

#[async_trait]
impl CloudClient for AwsCli {
    async fn private_dns_name(&self, instance_id: &str) -> Result<Option<String>, CommandError> {
        let out = self
            .runner
            .capture(&self.argv([
                "ec2",
                "describe-instances",
                "--instance-ids",
                instance_id,
                "--query",
                "Reservations[0].Instances[0].PrivateDnsName",
                "--output",
                "text",
            ]))
            .await?;
        let name = String::from_utf8_lossy(&out).trim().to_owned();
        // `--output text` prints "None" for a null result.
        if name.is_empty() || name == "None" {
            Ok(None)
        } else {
            Ok(Some(name))
        }
    }

    async fn set_instance_health(
        &self,
        instance_id: &str,
        health: InstanceHealth,
        progress: &ProgressSink,
    ) -> Result<(), CommandError> {
        self.runner
            .stream(
                &self.argv([
                    "autoscaling",
                    "set-instance-health",
                    "--instance-id",
                    instance_id,
                    "--health-status",
                    health.as_str(),
                ]),
                progress,
            )
            .await
    }

    async fn complete_lifecycle_action(
        &self,
        instance_id: &str,
        hook_name: &str,
        auto_scaling_group: &str,
        progress: &ProgressSink,
    ) -> Result<(), CommandError> {
        self.runner
            .stream(
                &self.argv([
                    "autoscaling",
                    "complete-lifecycle-action",
                    "--lifecycle-action-result",
                    "CONTINUE",
                    "--instance-id",
                    instance_id,
                    "--lifecycle-hook-name",
                    hook_name,
                    "--auto-scaling-group-name",
                    auto_scaling_group,
                ]),
                progress,
            )
            .await
    }
}
