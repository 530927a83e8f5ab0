use std::io;
use std::path::PathBuf;

use nomad_service_sdk::CommandError;

/// Failure of a deploy or autoscaling pipeline.
///
/// The `Display` text is what operators see after `ERROR:` in the stream.
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("Setting new version failed.")]
    SetVersion(#[source] CommandError),

    #[error("Retrieving settings failed: {0}")]
    Settings(#[source] CommandError),

    #[error("Retrieving jobspec failed: {0}")]
    Jobspec(#[source] CommandError),

    #[error("Jobspec is not valid base64: {0}")]
    DecodeJobspec(#[from] base64::DecodeError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("Writing jobspec to {} failed: {source}", path.display())]
    WriteJobspec {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Deploying new version failed.")]
    RunJob(#[source] CommandError),

    #[error("Failed to mark instance {health}")]
    SetHealth {
        health: nomad_service_sdk::InstanceHealth,
        #[source]
        source: CommandError,
    },

    #[error("Failed to send lifecycle action")]
    CompleteLifecycle(#[source] CommandError),

    #[error("Looking up instance {instance} failed: {source}")]
    DescribeInstance {
        instance: String,
        #[source]
        source: CommandError,
    },

    #[error("Looking up node {name} failed: {source}")]
    FindNode {
        name: String,
        #[source]
        source: CommandError,
    },

    #[error("Disabling eligibility of node {node} failed: {source}")]
    DisableEligibility {
        node: String,
        #[source]
        source: CommandError,
    },

    #[error("Draining node {node} failed: {source}")]
    DrainNode {
        node: String,
        #[source]
        source: CommandError,
    },
}

/// Placeholders that had no value when rendering a job specification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Jobspec has unresolved placeholders: {}", .tokens.join(", "))]
pub struct RenderError {
    pub tokens: Vec<String>,
}

/// Failure to read one of the watched state files.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl LoadError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Read { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}
