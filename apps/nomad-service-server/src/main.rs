use std::future::IntoFuture as _;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use control_bootstrap::AppConfig;
use control_bootstrap::logging::init_logging;
use control_bootstrap::signals::{ReloadSignal, cancel_on_shutdown};
use nomad_service::NomadServiceModule;
use nomad_service::config::NomadServiceConfig;
use tokio_util::sync::CancellationToken;

/// Name of this module's entry under `modules:` in the YAML config.
const MODULE_NAME: &str = "nomad_service";

/// Nomad control-plane daemon: deploys, autoscaling lifecycle hooks and
/// instance reloads over HTTP.
#[derive(Parser)]
#[command(name = "nomad-service-server")]
#[command(version)]
struct Cli {
    /// TCP port to listen on
    port: u16,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print effective configuration (YAML) and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // defaults -> YAML -> NOMAD_SERVICE__* env -> CLI
    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    config.apply_cli_overrides(cli.verbose);

    if cli.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    init_logging(&config.logging, &config.server.home_dir);
    tracing::info!(port = cli.port, "nomad-service-server starting");

    // Registered before the slow startup work so an early SIGHUP is not fatal.
    let reload_signal = ReloadSignal::install()?;

    let module_config: NomadServiceConfig = config.module_config(MODULE_NAME)?;
    let module = Arc::new(NomadServiceModule::init(&module_config)?);

    run_server(&config, cli.port, module, reload_signal).await
}

async fn run_server(
    config: &AppConfig,
    port: u16,
    module: Arc<NomadServiceModule>,
    reload_signal: ReloadSignal,
) -> Result<()> {
    let shutdown = CancellationToken::new();
    let signals = cancel_on_shutdown(shutdown.clone());

    let reloader = module.clone();
    let reload_task = reload_signal.spawn(shutdown.child_token(), move || {
        reloader.reload_sources();
    });

    let addr = format!("{}:{port}", config.server.bind_address);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "Listening");

    let app = module
        .router()
        .into_make_service_with_connect_info::<SocketAddr>();
    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown.clone().cancelled_owned());

    // Open streams may outlive the grace period; deploys keep running in
    // their own tasks until the runtime exits.
    let grace = Duration::from_secs(config.server.shutdown_grace_secs);
    tokio::select! {
        result = server.into_future() => result.context("HTTP server failed")?,
        () = async {
            shutdown.cancelled().await;
            tokio::time::sleep(grace).await;
        } => {
            tracing::warn!(grace_secs = grace.as_secs(), "Grace period elapsed, closing remaining connections");
        }
    }

    shutdown.cancel();
    signals.abort();
    if let Err(e) = reload_task.await {
        tracing::error!(error = %e, "SIGHUP handling failed");
    }
    tracing::info!("nomad-service-server stopped");
    Ok(())
}
