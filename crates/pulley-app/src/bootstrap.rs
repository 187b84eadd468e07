use std::io;
use std::sync::Arc;

use pulley_config::UploaderConfig;
use pulley_telemetry::{GlobalContextGuard, LogFormat, LoggingConfig, Metrics};
use pulley_transport::{ConnectivityMonitor, StaticConnectivity};
use tracing::{info, warn};

use crate::cli::{self, Cli};
use crate::error::{AppError, AppResult};
use crate::manager::UploadManager;

/// Dependencies required to bootstrap the uploader.
pub(crate) struct BootstrapDependencies {
    config: UploaderConfig,
    metrics: Metrics,
    monitor: Arc<dyn ConnectivityMonitor>,
}

impl BootstrapDependencies {
    /// Construct production dependencies from the environment for the binary entrypoint.
    pub(crate) fn from_env() -> AppResult<Self> {
        let config =
            UploaderConfig::from_env().map_err(|err| AppError::config("config.load", err))?;
        let metrics =
            Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;
        Ok(Self {
            config,
            metrics,
            monitor: Arc::new(StaticConnectivity::new(false)),
        })
    }
}

/// Entry point for the `pulley` binary.
///
/// # Errors
///
/// Returns an error if configuration, logging or the transport cannot be set up, or if
/// the command fails.
pub async fn run_app(cli: Cli) -> AppResult<()> {
    let dependencies = BootstrapDependencies::from_env()?;
    let config = &dependencies.config;
    pulley_telemetry::init_logging(&LoggingConfig {
        level: &config.log_level,
        format: LogFormat::from_config(config.log_format.as_deref()),
        build_sha: env!("CARGO_PKG_VERSION"),
    })
    .map_err(|err| AppError::telemetry("telemetry.init", err))?;
    run_app_with(dependencies, cli).await
}

/// Boot sequence that relies entirely on injected dependencies to simplify testing.
///
/// Expects logging to be installed already.
pub(crate) async fn run_app_with(dependencies: BootstrapDependencies, cli: Cli) -> AppResult<()> {
    let BootstrapDependencies {
        config,
        metrics,
        monitor,
    } = dependencies;

    let _context = GlobalContextGuard::new(cli.command.name());

    info!(
        staging = %config.staging_dir.display(),
        data = %config.data_dir.display(),
        "pulley starting"
    );

    let handle = UploadManager::start(&config, monitor, metrics)?;
    let adopted = handle.manager.reconcile();
    if !adopted.is_empty() {
        info!(count = adopted.len(), "resumed in-flight uploads");
    }

    let mut stdout = io::stdout();
    let outcome = cli::execute(&handle.manager, cli.command, &mut stdout).await;
    if let Err(err) = handle.manager.flush_results().await {
        warn!(error = %err, "upload results may not have reached the log");
    }

    if let Ok(rendered) = handle.manager.metrics().render() {
        tracing::debug!(metrics = %rendered, "final upload metrics");
    }
    outcome
}
