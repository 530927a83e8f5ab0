use std::sync::Arc;

use anyhow::Context as _;
use tracing::info;

use crate::config::NomadServiceConfig;
use crate::domain::autoscaling::AutoscalingService;
use crate::domain::credentials::CredentialStore;
use crate::domain::deploy::{DeployService, VariableLayout};
use crate::domain::instances::InstanceStore;
use crate::domain::reload::ReloadService;
use crate::domain::runner::CommandRunner;
use crate::infra::{AwsCli, HttpCallout, NomadCli, ProcessRunner};

/// Request-independent settings the HTTP layer needs.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// Lowercased header name carrying the real client address.
    pub trusted_ip_header: Arc<str>,
    pub max_body_size_bytes: usize,
    pub stream_buffer: usize,
}

impl GatewaySettings {
    fn from_config(config: &NomadServiceConfig) -> Self {
        Self {
            trusted_ip_header: Arc::from(config.trusted_ip_header.to_ascii_lowercase()),
            max_body_size_bytes: config.max_body_size_bytes,
            stream_buffer: config.stream_buffer.max(1),
        }
    }
}

/// Everything a handler can reach. Cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub(crate) credentials: Arc<CredentialStore>,
    pub(crate) instances: Arc<InstanceStore>,
    pub(crate) deploy: Arc<DeployService>,
    pub(crate) autoscaling: Arc<AutoscalingService>,
    pub(crate) reload: Arc<ReloadService>,
    pub(crate) gateway: GatewaySettings,
}

impl AppState {
    #[must_use]
    pub fn new(
        credentials: Arc<CredentialStore>,
        instances: Arc<InstanceStore>,
        deploy: Arc<DeployService>,
        autoscaling: Arc<AutoscalingService>,
        reload: Arc<ReloadService>,
        config: &NomadServiceConfig,
    ) -> Self {
        Self {
            credentials,
            instances,
            deploy,
            autoscaling,
            reload,
            gateway: GatewaySettings::from_config(config),
        }
    }

    #[must_use]
    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    #[must_use]
    pub fn instances(&self) -> &InstanceStore {
        &self.instances
    }

    /// Re-read the key and instance files. A file that fails to load keeps
    /// its previous contents; the other one is still reloaded.
    pub fn reload_sources(&self) {
        if let Err(err) = self.credentials.reload() {
            tracing::error!(error = %err, "Keeping previous service keys");
        }
        if let Err(err) = self.instances.reload() {
            tracing::error!(error = %err, "Keeping previous instance list");
        }
    }
}

/// The control-plane module: owns the wired-up state and hands out a router.
pub struct NomadServiceModule {
    state: AppState,
}

impl NomadServiceModule {
    /// Load the key and instance files and wire the production collaborators.
    ///
    /// # Errors
    /// Fails if the service key file cannot be loaded, the instance file
    /// exists but is malformed, or the HTTP client cannot be built.
    pub fn init(config: &NomadServiceConfig) -> anyhow::Result<Self> {
        info!("Initializing nomad-service module");

        let credentials = CredentialStore::load(config.service_keys_file.clone())
            .context("loading service keys")?;
        let instances = InstanceStore::load_or_empty(config.instances_file.clone())
            .context("loading instance list")?;

        let runner: Arc<dyn CommandRunner> =
            Arc::new(ProcessRunner::new(config.command_timeout()));
        let scheduler = Arc::new(NomadCli::new(runner.clone(), config.nomad_bin.clone()));
        let cloud = Arc::new(AwsCli::new(
            runner,
            config.aws_bin.clone(),
            config.aws_region.clone(),
        ));
        let callout =
            Arc::new(HttpCallout::new(config.callout_timeout()).context("building HTTP client")?);

        let instances = Arc::new(instances);
        let deploy = Arc::new(DeployService::new(
            scheduler.clone(),
            VariableLayout::new(config.variable_prefix.clone(), config.stack.clone()),
            config.scratch_dir.clone(),
        ));
        let autoscaling = Arc::new(AutoscalingService::new(scheduler, cloud, callout.clone()));
        let reload = Arc::new(ReloadService::new(instances.clone(), callout));

        let state = AppState::new(
            Arc::new(credentials),
            instances,
            deploy,
            autoscaling,
            reload,
            config,
        );
        info!(
            scratch_dir = %config.scratch_dir.display(),
            variable_prefix = %config.variable_prefix,
            "nomad-service module initialized"
        );
        Ok(Self { state })
    }

    #[must_use]
    pub fn from_state(state: AppState) -> Self {
        Self { state }
    }

    #[must_use]
    pub fn state(&self) -> &AppState {
        &self.state
    }

    #[must_use]
    pub fn router(&self) -> axum::Router {
        crate::api::rest::routes::register_routes(axum::Router::new(), self.state.clone())
    }

    pub fn reload_sources(&self) {
        self.state.reload_sources();
    }
}
