use std::fmt;
use std::sync::Arc;

use nomad_service_sdk::{
    CalloutClient, CloudClient, InstanceHealth, LifecycleEvent, LifecycleTransition,
    ProgressSink, SchedulerClient,
};

use super::error::DomainError;

/// A decoded call to the autoscaling endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoscalingRequest {
    /// SNS wants the subscription confirmed by visiting `subscribe_url`.
    PushConfirmation { subscribe_url: String },
    /// SNS delivered an auto-scaling lifecycle message.
    PushNotification(LifecycleEvent),
    /// SNS delivered something this service does not act on.
    PushIgnored { reason: String },
    /// Caller reports the health of an instance.
    DirectHealth {
        instance: String,
        health: InstanceHealth,
    },
    /// Caller lets a paused lifecycle transition continue.
    DirectContinue { instance: String, hook_name: String },
}

/// What happened to a lifecycle notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleOutcome {
    /// Node drained and the termination released.
    Drained { node_id: String },
    /// Instance has no private DNS name any more.
    NoPrivateName,
    /// No scheduler node matches the instance; it is probably gone already.
    NodeNotFound { name: String },
    /// Transition other than termination.
    Skipped,
}

impl fmt::Display for LifecycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Drained { node_id } => write!(f, "node {node_id} drained"),
            Self::NoPrivateName => f.write_str("instance has no private name"),
            Self::NodeNotFound { name } => write!(f, "no node named {name}"),
            Self::Skipped => f.write_str("skipped"),
        }
    }
}

pub struct AutoscalingService {
    scheduler: Arc<dyn SchedulerClient>,
    cloud: Arc<dyn CloudClient>,
    callout: Arc<dyn CalloutClient>,
}

impl AutoscalingService {
    pub fn new(
        scheduler: Arc<dyn SchedulerClient>,
        cloud: Arc<dyn CloudClient>,
        callout: Arc<dyn CalloutClient>,
    ) -> Self {
        Self {
            scheduler,
            cloud,
            callout,
        }
    }

    /// Visit the confirmation URL once. Failures are logged; SNS retries on its own.
    pub async fn confirm_subscription(&self, subscribe_url: &str) -> bool {
        match self.callout.confirm_subscription(subscribe_url).await {
            Ok(()) => {
                tracing::info!("SNS subscription confirmed");
                true
            }
            Err(err) => {
                tracing::warn!(error = %err, "SNS subscription confirmation failed");
                false
            }
        }
    }

    /// Drain the scheduler node behind a terminating instance, then let the
    /// termination continue.
    ///
    /// # Errors
    /// Returns `DomainError` if any command in the sequence fails.
    pub async fn handle_lifecycle(
        &self,
        event: &LifecycleEvent,
        progress: &ProgressSink,
    ) -> Result<LifecycleOutcome, DomainError> {
        if event.transition != LifecycleTransition::Terminating {
            tracing::debug!(instance = %event.instance_id, "Ignoring non-termination lifecycle transition");
            return Ok(LifecycleOutcome::Skipped);
        }

        let instance = event.instance_id.as_str();
        progress
            .line(format!("Instance {instance} is terminating\n"))
            .await;

        let name = self
            .cloud
            .private_dns_name(instance)
            .await
            .map_err(|source| DomainError::DescribeInstance {
                instance: instance.to_owned(),
                source,
            })?;
        let Some(name) = name else {
            tracing::info!(%instance, "Instance has no private DNS name, nothing to drain");
            return Ok(LifecycleOutcome::NoPrivateName);
        };

        let node = self
            .scheduler
            .find_node(&name)
            .await
            .map_err(|source| DomainError::FindNode {
                name: name.clone(),
                source,
            })?;
        let Some(node) = node else {
            tracing::info!(%instance, %name, "No scheduler node matches instance");
            return Ok(LifecycleOutcome::NodeNotFound { name });
        };

        progress
            .line(format!("Disabling eligibility of node {node} ({name}) ...\n"))
            .await;
        self.scheduler
            .disable_eligibility(&node, progress)
            .await
            .map_err(|source| DomainError::DisableEligibility {
                node: node.clone(),
                source,
            })?;

        progress.line(format!("Draining node {node} ...\n")).await;
        self.scheduler
            .drain_node(&node, progress)
            .await
            .map_err(|source| DomainError::DrainNode {
                node: node.clone(),
                source,
            })?;

        self.continue_lifecycle(
            instance,
            &event.hook_name,
            &event.auto_scaling_group,
            progress,
        )
        .await?;

        tracing::info!(%instance, node_id = %node, "Node drained, termination released");
        Ok(LifecycleOutcome::Drained { node_id: node })
    }

    /// # Errors
    /// Returns `DomainError::SetHealth` if the cloud call fails.
    pub async fn set_health(
        &self,
        instance: &str,
        health: InstanceHealth,
        progress: &ProgressSink,
    ) -> Result<(), DomainError> {
        self.cloud
            .set_instance_health(instance, health, progress)
            .await
            .map_err(|source| DomainError::SetHealth { health, source })
    }

    /// # Errors
    /// Returns `DomainError::CompleteLifecycle` if the cloud call fails.
    pub async fn continue_lifecycle(
        &self,
        instance: &str,
        hook_name: &str,
        auto_scaling_group: &str,
        progress: &ProgressSink,
    ) -> Result<(), DomainError> {
        progress
            .line(format!(
                "Completing lifecycle action {hook_name} for {instance} ...\n"
            ))
            .await;
        self.cloud
            .complete_lifecycle_action(instance, hook_name, auto_scaling_group, progress)
            .await
            .map_err(DomainError::CompleteLifecycle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{CloudCall, FakeCloud, FakeScheduler, RecordingCallout, SchedulerCall};

    fn terminating(instance: &str) -> LifecycleEvent {
        LifecycleEvent {
            instance_id: instance.to_owned(),
            transition: LifecycleTransition::Terminating,
            hook_name: "drain-hook".to_owned(),
            auto_scaling_group: "workers".to_owned(),
        }
    }

    fn service(
        scheduler: &Arc<FakeScheduler>,
        cloud: &Arc<FakeCloud>,
    ) -> AutoscalingService {
        AutoscalingService::new(
            scheduler.clone(),
            cloud.clone(),
            Arc::new(RecordingCallout::new()),
        )
    }

    #[tokio::test]
    async fn terminating_instance_is_drained_then_released() {
        let scheduler = Arc::new(FakeScheduler::new().with_node("ip-10-0-0-5.ec2.internal", "node-1"));
        let cloud = Arc::new(FakeCloud::new().with_dns_name("i-123", "ip-10-0-0-5.ec2.internal"));
        let svc = service(&scheduler, &cloud);

        let outcome = svc
            .handle_lifecycle(&terminating("i-123"), &ProgressSink::log_only("autoscaling"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            LifecycleOutcome::Drained {
                node_id: "node-1".to_owned()
            }
        );
        assert_eq!(
            scheduler.calls(),
            vec![
                SchedulerCall::FindNode("ip-10-0-0-5.ec2.internal".to_owned()),
                SchedulerCall::DisableEligibility("node-1".to_owned()),
                SchedulerCall::DrainNode("node-1".to_owned()),
            ]
        );
        assert_eq!(
            cloud.calls(),
            vec![
                CloudCall::PrivateDnsName("i-123".to_owned()),
                CloudCall::CompleteLifecycle {
                    instance: "i-123".to_owned(),
                    hook_name: "drain-hook".to_owned(),
                    group: "workers".to_owned(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn missing_node_is_a_soft_no_op() {
        let scheduler = Arc::new(FakeScheduler::new());
        let cloud = Arc::new(FakeCloud::new().with_dns_name("i-123", "ip-10-0-0-5.ec2.internal"));
        let svc = service(&scheduler, &cloud);

        let outcome = svc
            .handle_lifecycle(&terminating("i-123"), &ProgressSink::log_only("autoscaling"))
            .await
            .unwrap();

        assert!(matches!(outcome, LifecycleOutcome::NodeNotFound { .. }));
        assert_eq!(cloud.calls().len(), 1);
    }

    #[tokio::test]
    async fn missing_dns_name_is_a_soft_no_op() {
        let scheduler = Arc::new(FakeScheduler::new());
        let cloud = Arc::new(FakeCloud::new());
        let svc = service(&scheduler, &cloud);

        let outcome = svc
            .handle_lifecycle(&terminating("i-404"), &ProgressSink::log_only("autoscaling"))
            .await
            .unwrap();

        assert_eq!(outcome, LifecycleOutcome::NoPrivateName);
        assert!(scheduler.calls().is_empty());
    }

    #[tokio::test]
    async fn launching_instance_is_ignored() {
        let scheduler = Arc::new(FakeScheduler::new());
        let cloud = Arc::new(FakeCloud::new());
        let svc = service(&scheduler, &cloud);

        let mut event = terminating("i-123");
        event.transition = LifecycleTransition::Launching;
        let outcome = svc
            .handle_lifecycle(&event, &ProgressSink::log_only("autoscaling"))
            .await
            .unwrap();

        assert_eq!(outcome, LifecycleOutcome::Skipped);
        assert!(cloud.calls().is_empty());
    }

    #[tokio::test]
    async fn drain_failure_keeps_termination_paused() {
        let scheduler = Arc::new(
            FakeScheduler::new()
                .with_node("ip-10-0-0-5.ec2.internal", "node-1")
                .failing_drain(),
        );
        let cloud = Arc::new(FakeCloud::new().with_dns_name("i-123", "ip-10-0-0-5.ec2.internal"));
        let svc = service(&scheduler, &cloud);

        let err = svc
            .handle_lifecycle(&terminating("i-123"), &ProgressSink::log_only("autoscaling"))
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::DrainNode { .. }));
        assert!(
            !cloud
                .calls()
                .iter()
                .any(|c| matches!(c, CloudCall::CompleteLifecycle { .. }))
        );
    }

    #[tokio::test]
    async fn health_failure_names_the_state() {
        let scheduler = Arc::new(FakeScheduler::new());
        let cloud = Arc::new(FakeCloud::new().failing_health());
        let svc = service(&scheduler, &cloud);

        let err = svc
            .set_health("i-123", InstanceHealth::Healthy, &ProgressSink::log_only("autoscaling"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Failed to mark instance healthy");
    }
}
