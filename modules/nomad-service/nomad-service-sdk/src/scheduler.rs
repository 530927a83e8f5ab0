//! Scheduler (Nomad) collaborator contract

use std::collections::HashMap;
use std::path::Path;

use crate::error::CommandError;
use crate::progress::ProgressSink;

/// Operations the control plane needs from the workload scheduler.
///
/// Streaming operations forward the scheduler's own output to `progress`;
/// query operations return data and report nothing.
#[async_trait::async_trait]
pub trait SchedulerClient: Send + Sync {
    /// Store literal `items` under the variable at `path`, replacing it.
    ///
    /// # Errors
    /// Returns `CommandError` if the scheduler rejects the write.
    async fn put_variable(
        &self,
        path: &str,
        items: &[(&str, &str)],
        progress: &ProgressSink,
    ) -> Result<(), CommandError>;

    /// Fetch all items of the variable at `path`.
    ///
    /// # Errors
    /// Returns `CommandError` if the variable cannot be read or parsed.
    async fn variable_items(&self, path: &str) -> Result<HashMap<String, String>, CommandError>;

    /// Fetch the raw value of a single item of the variable at `path`.
    ///
    /// # Errors
    /// Returns `CommandError` if the variable cannot be read.
    async fn variable_item(&self, path: &str, item: &str) -> Result<Vec<u8>, CommandError>;

    /// Look up the node id whose name contains `name`. `None` if no node matches.
    ///
    /// # Errors
    /// Returns `CommandError` if the node listing fails.
    async fn find_node(&self, name: &str) -> Result<Option<String>, CommandError>;

    /// Stop new allocations from being placed on `node_id`.
    ///
    /// # Errors
    /// Returns `CommandError` if the scheduler rejects the change.
    async fn disable_eligibility(
        &self,
        node_id: &str,
        progress: &ProgressSink,
    ) -> Result<(), CommandError>;

    /// Drain `node_id`, system jobs included, and wait until it is empty.
    ///
    /// # Errors
    /// Returns `CommandError` if the drain fails.
    async fn drain_node(&self, node_id: &str, progress: &ProgressSink) -> Result<(), CommandError>;

    /// Submit the job specification stored at `jobspec`.
    ///
    /// # Errors
    /// Returns `CommandError` if the job cannot be submitted.
    async fn run_job(&self, jobspec: &Path, progress: &ProgressSink) -> Result<(), CommandError>;
}
