use async_trait::async_trait;
use nomad_service_sdk::{CommandError, ProgressSink};

/// Runs external command lines (`argv[0]` is the program).
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion, forwarding stdout and stderr line by line to `progress`.
    ///
    /// # Errors
    /// Returns `CommandError` if the command cannot be started or exits non-zero.
    async fn stream(&self, argv: &[String], progress: &ProgressSink) -> Result<(), CommandError>;

    /// Run to completion and return its stdout.
    ///
    /// # Errors
    /// Returns `CommandError` if the command cannot be started or exits non-zero.
    async fn capture(&self, argv: &[String]) -> Result<Vec<u8>, CommandError>;
}

/// Build an argument vector from string-like parts.
#[must_use]
pub fn argv<I, S>(parts: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    parts.into_iter().map(Into::into).collect()
}
