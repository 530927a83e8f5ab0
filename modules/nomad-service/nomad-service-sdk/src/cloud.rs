//! Cloud provider (AWS) collaborator contract

use crate::error::CommandError;
use crate::models::InstanceHealth;
use crate::progress::ProgressSink;

/// Operations the control plane needs from the cloud provider.
#[async_trait::async_trait]
pub trait CloudClient: Send + Sync {
    /// Resolve an instance id to its private DNS name. `None` if the instance
    /// is unknown or has no private name any more.
    ///
    /// # Errors
    /// Returns `CommandError` if the lookup fails.
    async fn private_dns_name(&self, instance_id: &str) -> Result<Option<String>, CommandError>;

    /// Report the health of an instance to its auto-scaling group.
    ///
    /// # Errors
    /// Returns `CommandError` if the provider rejects the update.
    async fn set_instance_health(
        &self,
        instance_id: &str,
        health: InstanceHealth,
        progress: &ProgressSink,
    ) -> Result<(), CommandError>;

    /// Let a paused lifecycle transition continue.
    ///
    /// # Errors
    /// Returns `CommandError` if the provider rejects the action.
    async fn complete_lifecycle_action(
        &self,
        instance_id: &str,
        hook_name: &str,
        auto_scaling_group: &str,
        progress: &ProgressSink,
    ) -> Result<(), CommandError>;
}
