use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the Nomad control-plane module.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NomadServiceConfig {
    /// JSON file mapping service name to `{ "key": ... }`.
    #[serde(default = "default_service_keys_file")]
    pub service_keys_file: PathBuf,
    /// JSON file mapping service name to a list of `{ "address", "port" }`.
    #[serde(default = "default_instances_file")]
    pub instances_file: PathBuf,
    /// Directory rendered job specifications are written to.
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
    /// First segment of scheduler variable paths (`<prefix>/<service>/...`).
    #[serde(default = "default_variable_prefix")]
    pub variable_prefix: String,
    /// Optional stack suffix (`<prefix>/<service>-<stack>/...`).
    #[serde(default)]
    pub stack: Option<String>,
    /// Header carrying the real client address, set by the fronting proxy.
    #[serde(default = "default_trusted_ip_header")]
    pub trusted_ip_header: String,
    #[serde(default = "default_nomad_bin")]
    pub nomad_bin: String,
    #[serde(default = "default_aws_bin")]
    pub aws_bin: String,
    /// Passed as `--region` to every AWS call when set.
    #[serde(default)]
    pub aws_region: Option<String>,
    /// Kill external commands that run longer than this. Unlimited when unset.
    #[serde(default)]
    pub command_timeout_secs: Option<u64>,
    /// Limit for outbound HTTP calls. Unlimited when unset.
    #[serde(default)]
    pub callout_timeout_secs: Option<u64>,
    #[serde(default = "default_max_body_size_bytes")]
    pub max_body_size_bytes: usize,
    /// Number of progress chunks buffered per response before the writer waits.
    #[serde(default = "default_stream_buffer")]
    pub stream_buffer: usize,
}

impl Default for NomadServiceConfig {
    fn default() -> Self {
        Self {
            service_keys_file: default_service_keys_file(),
            instances_file: default_instances_file(),
            scratch_dir: default_scratch_dir(),
            variable_prefix: default_variable_prefix(),
            stack: None,
            trusted_ip_header: default_trusted_ip_header(),
            nomad_bin: default_nomad_bin(),
            aws_bin: default_aws_bin(),
            aws_region: None,
            command_timeout_secs: None,
            callout_timeout_secs: None,
            max_body_size_bytes: default_max_body_size_bytes(),
            stream_buffer: default_stream_buffer(),
        }
    }
}

impl NomadServiceConfig {
    #[must_use]
    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }

    #[must_use]
    pub fn callout_timeout(&self) -> Option<Duration> {
        self.callout_timeout_secs.map(Duration::from_secs)
    }
}

fn default_service_keys_file() -> PathBuf {
    PathBuf::from("local/service-keys.json")
}

fn default_instances_file() -> PathBuf {
    PathBuf::from("local/instances.json")
}

fn default_scratch_dir() -> PathBuf {
    PathBuf::from("local")
}

fn default_variable_prefix() -> String {
    "app".to_owned()
}

fn default_trusted_ip_header() -> String {
    "cf-connecting-ip".to_owned()
}

fn default_nomad_bin() -> String {
    "nomad".to_owned()
}

fn default_aws_bin() -> String {
    "aws".to_owned()
}

fn default_max_body_size_bytes() -> usize {
    1024 * 1024 // 1 MB
}

fn default_stream_buffer() -> usize {
    64
}
