//! Test doubles for the collaborator traits.
//!
//! Every fake records the calls it receives so tests can assert both on what
//! the handlers streamed and on what they asked the outside world to do.
//!
//! # Usage
//! ```ignore
//! let scheduler = Arc::new(FakeScheduler::new().with_settings("app/wiki/settings", &[("PORT", "8080")]));
//! let state = TestStateBuilder::new().with_scheduler(scheduler.clone()).build();
//! let app = test_router(state);
//! ```

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use nomad_service_sdk::{
    CalloutClient, CalloutError, CloudClient, CommandError, InstanceHealth, ProgressChunk,
    ProgressSink, SchedulerClient, ServiceInstance,
};
use tokio::sync::mpsc;

use crate::config::NomadServiceConfig;
use crate::domain::autoscaling::AutoscalingService;
use crate::domain::credentials::{CredentialSnapshot, CredentialStore};
use crate::domain::deploy::{DeployService, VariableLayout};
use crate::domain::instances::{InstanceDirectory, InstanceStore};
use crate::domain::reload::ReloadService;
use crate::domain::runner::CommandRunner;
use crate::module::AppState;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn exit_failure(program: &str) -> CommandError {
    CommandError::Exit {
        program: program.to_owned(),
        code: Some(1),
        status: "exit status: 1".to_owned(),
    }
}

/// Drain a progress receiver. Returns the concatenated text and whether the
/// stream ended with an abort marker.
pub async fn collect_progress(mut rx: mpsc::Receiver<ProgressChunk>) -> (String, bool) {
    let mut text = Vec::new();
    let mut aborted = false;
    while let Some(chunk) = rx.recv().await {
        match chunk {
            Ok(bytes) => text.extend_from_slice(&bytes),
            Err(_) => aborted = true,
        }
    }
    (String::from_utf8_lossy(&text).into_owned(), aborted)
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerCall {
    PutVariable {
        path: String,
        items: Vec<(String, String)>,
    },
    VariableItems(String),
    VariableItem(String, String),
    FindNode(String),
    DisableEligibility(String),
    DrainNode(String),
    RunJob(PathBuf),
}

/// In-memory scheduler: variables live in a map, nodes are looked up by name.
#[derive(Default)]
pub struct FakeScheduler {
    settings: HashMap<String, HashMap<String, String>>,
    items: HashMap<String, Vec<u8>>,
    nodes: HashMap<String, String>,
    fail_put: bool,
    fail_run: bool,
    fail_drain: bool,
    calls: Mutex<Vec<SchedulerCall>>,
    submitted: Mutex<Vec<Vec<u8>>>,
}

impl FakeScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_settings(mut self, path: &str, pairs: &[(&str, &str)]) -> Self {
        self.settings.insert(
            path.to_owned(),
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
        );
        self
    }

    /// Store `template` base64-encoded, as `nomad var get` would return it.
    #[must_use]
    pub fn with_jobspec(self, path: &str, template: &[u8]) -> Self {
        let encoded = format!("{}\n", STANDARD.encode(template));
        self.with_raw_item(path, encoded.as_bytes())
    }

    #[must_use]
    pub fn with_raw_item(mut self, path: &str, raw: &[u8]) -> Self {
        self.items.insert(path.to_owned(), raw.to_vec());
        self
    }

    #[must_use]
    pub fn with_node(mut self, name: &str, id: &str) -> Self {
        self.nodes.insert(name.to_owned(), id.to_owned());
        self
    }

    #[must_use]
    pub fn failing_put(mut self) -> Self {
        self.fail_put = true;
        self
    }

    #[must_use]
    pub fn failing_run(mut self) -> Self {
        self.fail_run = true;
        self
    }

    #[must_use]
    pub fn failing_drain(mut self) -> Self {
        self.fail_drain = true;
        self
    }

    pub fn calls(&self) -> Vec<SchedulerCall> {
        lock(&self.calls).clone()
    }

    /// Contents of every job specification passed to `run_job`, read at submit time.
    pub fn submitted(&self) -> Vec<Vec<u8>> {
        lock(&self.submitted).clone()
    }

    fn record(&self, call: SchedulerCall) {
        lock(&self.calls).push(call);
    }
}

#[async_trait]
impl SchedulerClient for FakeScheduler {
    async fn put_variable(
        &self,
        path: &str,
        items: &[(&str, &str)],
        progress: &ProgressSink,
    ) -> Result<(), CommandError> {
        self.record(SchedulerCall::PutVariable {
            path: path.to_owned(),
            items: items
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
        });
        if self.fail_put {
            progress.line("Error creating variable: permission denied\n").await;
            return Err(exit_failure("nomad"));
        }
        progress.line(format!("Created variable \"{path}\"\n")).await;
        Ok(())
    }

    async fn variable_items(&self, path: &str) -> Result<HashMap<String, String>, CommandError> {
        self.record(SchedulerCall::VariableItems(path.to_owned()));
        self.settings
            .get(path)
            .cloned()
            .ok_or_else(|| exit_failure("nomad"))
    }

    async fn variable_item(&self, path: &str, item: &str) -> Result<Vec<u8>, CommandError> {
        self.record(SchedulerCall::VariableItem(path.to_owned(), item.to_owned()));
        self.items
            .get(path)
            .cloned()
            .ok_or_else(|| exit_failure("nomad"))
    }

    async fn find_node(&self, name: &str) -> Result<Option<String>, CommandError> {
        self.record(SchedulerCall::FindNode(name.to_owned()));
        Ok(self.nodes.get(name).cloned())
    }

    async fn disable_eligibility(
        &self,
        node_id: &str,
        progress: &ProgressSink,
    ) -> Result<(), CommandError> {
        self.record(SchedulerCall::DisableEligibility(node_id.to_owned()));
        progress
            .line(format!("Node \"{node_id}\" scheduling eligibility set: ineligible\n"))
            .await;
        Ok(())
    }

    async fn drain_node(&self, node_id: &str, progress: &ProgressSink) -> Result<(), CommandError> {
        self.record(SchedulerCall::DrainNode(node_id.to_owned()));
        if self.fail_drain {
            return Err(exit_failure("nomad"));
        }
        progress
            .line(format!("Node \"{node_id}\" drain complete\n"))
            .await;
        Ok(())
    }

    async fn run_job(&self, jobspec: &Path, progress: &ProgressSink) -> Result<(), CommandError> {
        self.record(SchedulerCall::RunJob(jobspec.to_path_buf()));
        if let Ok(contents) = std::fs::read(jobspec) {
            lock(&self.submitted).push(contents);
        }
        if self.fail_run {
            progress.line("Error submitting job: 1 error occurred\n").await;
            return Err(exit_failure("nomad"));
        }
        progress.line("==> Evaluation status changed: \"complete\"\n").await;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Cloud
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloudCall {
    PrivateDnsName(String),
    SetHealth(String, InstanceHealth),
    CompleteLifecycle {
        instance: String,
        hook_name: String,
        group: String,
    },
}

#[derive(Default)]
pub struct FakeCloud {
    dns_names: HashMap<String, String>,
    fail_health: bool,
    fail_lifecycle: bool,
    calls: Mutex<Vec<CloudCall>>,
}

impl FakeCloud {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_dns_name(mut self, instance: &str, name: &str) -> Self {
        self.dns_names.insert(instance.to_owned(), name.to_owned());
        self
    }

    #[must_use]
    pub fn failing_health(mut self) -> Self {
        self.fail_health = true;
        self
    }

    #[must_use]
    pub fn failing_lifecycle(mut self) -> Self {
        self.fail_lifecycle = true;
        self
    }

    pub fn calls(&self) -> Vec<CloudCall> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl CloudClient for FakeCloud {
    async fn private_dns_name(&self, instance_id: &str) -> Result<Option<String>, CommandError> {
        lock(&self.calls).push(CloudCall::PrivateDnsName(instance_id.to_owned()));
        Ok(self.dns_names.get(instance_id).cloned())
    }

    async fn set_instance_health(
        &self,
        instance_id: &str,
        health: InstanceHealth,
        progress: &ProgressSink,
    ) -> Result<(), CommandError> {
        lock(&self.calls).push(CloudCall::SetHealth(instance_id.to_owned(), health));
        if self.fail_health {
            progress
                .line("An error occurred (ValidationError) when calling the SetInstanceHealth operation\n")
                .await;
            return Err(exit_failure("aws"));
        }
        Ok(())
    }

    async fn complete_lifecycle_action(
        &self,
        instance_id: &str,
        hook_name: &str,
        auto_scaling_group: &str,
        progress: &ProgressSink,
    ) -> Result<(), CommandError> {
        lock(&self.calls).push(CloudCall::CompleteLifecycle {
            instance: instance_id.to_owned(),
            hook_name: hook_name.to_owned(),
            group: auto_scaling_group.to_owned(),
        });
        if self.fail_lifecycle {
            progress
                .line("An error occurred (ValidationError) when calling the CompleteLifecycleAction operation\n")
                .await;
            return Err(exit_failure("aws"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Direct HTTP
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingCallout {
    failing_addresses: Vec<String>,
    fail_confirm: bool,
    confirmations: Mutex<Vec<String>>,
    reloads: Mutex<Vec<(ServiceInstance, String)>>,
}

impl RecordingCallout {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reload calls to `address` answer HTTP 500.
    #[must_use]
    pub fn failing_reload_for(mut self, address: &str) -> Self {
        self.failing_addresses.push(address.to_owned());
        self
    }

    #[must_use]
    pub fn failing_confirm(mut self) -> Self {
        self.fail_confirm = true;
        self
    }

    pub fn confirmations(&self) -> Vec<String> {
        lock(&self.confirmations).clone()
    }

    pub fn reloads(&self) -> Vec<(ServiceInstance, String)> {
        lock(&self.reloads).clone()
    }
}

#[async_trait]
impl CalloutClient for RecordingCallout {
    async fn confirm_subscription(&self, url: &str) -> Result<(), CalloutError> {
        lock(&self.confirmations).push(url.to_owned());
        if self.fail_confirm {
            return Err(CalloutError::Transport {
                url: url.to_owned(),
                detail: "connection refused".to_owned(),
            });
        }
        Ok(())
    }

    async fn reload_instance(
        &self,
        instance: &ServiceInstance,
        secret: &str,
    ) -> Result<(), CalloutError> {
        lock(&self.reloads).push((instance.clone(), secret.to_owned()));
        if self.failing_addresses.contains(&instance.address) {
            return Err(CalloutError::Status {
                url: instance.reload_url(),
                status: 500,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Command runner
// ---------------------------------------------------------------------------

/// Records argument vectors instead of running them. Captured commands
/// return the queued outputs in order (empty once the queue is drained).
#[derive(Default)]
pub struct RecordingRunner {
    outputs: Mutex<VecDeque<Vec<u8>>>,
    fail: bool,
    calls: Mutex<Vec<Vec<String>>>,
}

impl RecordingRunner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_output(self, output: impl AsRef<[u8]>) -> Self {
        lock(&self.outputs).push_back(output.as_ref().to_vec());
        self
    }

    #[must_use]
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        lock(&self.calls).clone()
    }

    fn record(&self, argv: &[String]) -> Result<(), CommandError> {
        lock(&self.calls).push(argv.to_vec());
        if self.fail {
            let program = argv.first().map_or("", String::as_str);
            return Err(exit_failure(program));
        }
        Ok(())
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn stream(&self, argv: &[String], progress: &ProgressSink) -> Result<(), CommandError> {
        self.record(argv)?;
        progress.line(Bytes::from(format!("ran {}\n", argv.join(" ")))).await;
        Ok(())
    }

    async fn capture(&self, argv: &[String]) -> Result<Vec<u8>, CommandError> {
        self.record(argv)?;
        Ok(lock(&self.outputs).pop_front().unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

/// Builds an [`AppState`] wired to fakes. Anything not supplied gets an
/// empty fake.
pub struct TestStateBuilder {
    credentials: Vec<(String, String)>,
    instances: Vec<(String, Vec<ServiceInstance>)>,
    scheduler: Arc<dyn SchedulerClient>,
    cloud: Arc<dyn CloudClient>,
    callout: Arc<dyn CalloutClient>,
    config: NomadServiceConfig,
}

impl Default for TestStateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestStateBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            credentials: Vec::new(),
            instances: Vec::new(),
            scheduler: Arc::new(FakeScheduler::new()),
            cloud: Arc::new(FakeCloud::new()),
            callout: Arc::new(RecordingCallout::new()),
            config: NomadServiceConfig::default(),
        }
    }

    #[must_use]
    pub fn with_key(mut self, service: &str, key: &str) -> Self {
        self.credentials.push((service.to_owned(), key.to_owned()));
        self
    }

    #[must_use]
    pub fn with_instances(mut self, service: &str, instances: Vec<ServiceInstance>) -> Self {
        self.instances.push((service.to_owned(), instances));
        self
    }

    #[must_use]
    pub fn with_scheduler(mut self, scheduler: Arc<dyn SchedulerClient>) -> Self {
        self.scheduler = scheduler;
        self
    }

    #[must_use]
    pub fn with_cloud(mut self, cloud: Arc<dyn CloudClient>) -> Self {
        self.cloud = cloud;
        self
    }

    #[must_use]
    pub fn with_callout(mut self, callout: Arc<dyn CalloutClient>) -> Self {
        self.callout = callout;
        self
    }

    /// Directory rendered job specifications are written to.
    #[must_use]
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.scratch_dir = dir.into();
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: NomadServiceConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn build(self) -> AppState {
        let credentials = Arc::new(CredentialStore::with_snapshot(
            self.config.service_keys_file.clone(),
            CredentialSnapshot::from_pairs(self.credentials),
        ));
        let instances = Arc::new(InstanceStore::with_snapshot(
            self.config.instances_file.clone(),
            InstanceDirectory::from_entries(self.instances),
        ));
        let deploy = Arc::new(DeployService::new(
            self.scheduler.clone(),
            VariableLayout::new(self.config.variable_prefix.clone(), self.config.stack.clone()),
            self.config.scratch_dir.clone(),
        ));
        let autoscaling = Arc::new(AutoscalingService::new(
            self.scheduler,
            self.cloud,
            self.callout.clone(),
        ));
        let reload = Arc::new(ReloadService::new(instances.clone(), self.callout));

        AppState::new(
            credentials,
            instances,
            deploy,
            autoscaling,
            reload,
            &self.config,
        )
    }
}
