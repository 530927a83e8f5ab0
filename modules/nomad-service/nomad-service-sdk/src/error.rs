//! Error types for collaborator calls

use std::io;

/// Error returned when an external command cannot be run to a successful exit.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The argument vector was empty.
    #[error("empty command line")]
    EmptyCommand,

    /// The process could not be started (binary missing, permissions, ...).
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        /// Program name (`argv[0]`)
        program: String,
        /// Underlying OS error
        #[source]
        source: io::Error,
    },

    /// Reading the process output or waiting for it failed.
    #[error("I/O error while running `{program}`: {source}")]
    Io {
        /// Program name (`argv[0]`)
        program: String,
        /// Underlying OS error
        #[source]
        source: io::Error,
    },

    /// The process exited with a non-zero status (or was killed by a signal).
    #[error("`{program}` failed: {status}")]
    Exit {
        /// Program name (`argv[0]`)
        program: String,
        /// Exit code, `None` when terminated by a signal
        code: Option<i32>,
        /// Human-readable exit status
        status: String,
    },

    /// The process did not finish within the configured limit and was killed.
    #[error("`{program}` did not finish within {secs}s")]
    Timeout {
        /// Program name (`argv[0]`)
        program: String,
        /// Configured limit in seconds
        secs: u64,
    },

    /// The process succeeded but its output could not be interpreted.
    #[error("`{program}` produced unexpected output: {detail}")]
    MalformedOutput {
        /// Program name (`argv[0]`)
        program: String,
        /// What was wrong with the output
        detail: String,
    },
}

impl CommandError {
    /// Check if the command ran and reported failure through its exit status.
    #[must_use]
    pub const fn is_exit(&self) -> bool {
        matches!(self, Self::Exit { .. })
    }
}

/// Error returned by direct outbound HTTP calls.
#[derive(Debug, thiserror::Error)]
pub enum CalloutError {
    /// The URL could not be reached or the exchange broke off.
    #[error("request to {url} failed: {detail}")]
    Transport {
        /// Target URL
        url: String,
        /// Transport-level failure description
        detail: String,
    },

    /// The peer answered with a non-success status.
    #[error("request to {url} returned HTTP {status}")]
    Status {
        /// Target URL
        url: String,
        /// HTTP status code
        status: u16,
    },
}
