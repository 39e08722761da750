//! Metrics Sidecar - load-shedding readiness probe
//!
//! This binary runs next to the application container in every Pod of a
//! Deployment. It answers the orchestrator's readiness probe from live
//! resource usage so an overloaded replica drops out of rotation.

use anyhow::{Context, Result};
use clap::Parser;
use sidecar_lib::{
    api::{self, AppState},
    provider::{KubeProvider, RetryPolicy},
    AdmissionEngine, StructuredLogger,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

const SIDECAR_VERSION: &str = env!("CARGO_PKG_VERSION");

const METRICS_API_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = config::Cli::parse();
    let config = config::SidecarConfig::load()?;

    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&config.log_level))
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(fmt::layer().json())
        .init();

    let target = config.target();
    let thresholds = config.thresholds();
    info!(
        namespace = %target.namespace,
        deployment = %target.deployment_name,
        container = %target.container_name,
        pod = %target.pod_name,
        cpu_threshold = thresholds.cpu_percent,
        memory_threshold = thresholds.memory_percent,
        minimum_pods_percent = thresholds.minimum_available_percent,
        "Sidecar configured"
    );

    let client = KubeProvider::connect(cli.kubeconfig_path().as_deref()).await?;
    let provider = KubeProvider::new(client, target.clone());

    provider
        .init_limits(&RetryPolicy::default())
        .await
        .context("Container limits are required to evaluate load")?;
    provider
        .check_metrics_api(METRICS_API_CHECK_TIMEOUT)
        .await
        .context("Container usage cannot be collected")?;

    let logger = StructuredLogger::new(&target.pod_name);
    let engine = Arc::new(AdmissionEngine::new(thresholds));
    let state = Arc::new(
        AppState::new(Arc::new(provider), engine, target.clone())
            .with_collect_timeout(config.collect_timeout())
            .with_request_timeout(config.request_timeout()),
    );

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let mut server = tokio::spawn(api::serve(config.http_port, state, async move {
        let _ = shutdown_rx.await;
    }));

    logger.log_startup(SIDECAR_VERSION, &target);

    let reason = tokio::select! {
        reason = shutdown_signal() => reason?,
        result = &mut server => {
            return match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e.context("API server failed")),
                Err(e) => Err(anyhow::Error::new(e).context("API server task panicked")),
            };
        }
    };

    logger.log_shutdown(reason);
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(config.shutdown_grace(), server).await {
        Ok(Ok(Ok(()))) => info!("Server stopped"),
        Ok(Ok(Err(e))) => error!(error = %e, "Server stopped with an error"),
        Ok(Err(e)) => error!(error = %e, "Server task failed"),
        Err(_) => warn!(
            grace_secs = config.shutdown_grace_secs,
            "Graceful shutdown timed out, exiting"
        ),
    }

    Ok(())
}

/// Wait for SIGINT or SIGTERM
async fn shutdown_signal() -> Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for SIGINT")?;
                Ok("SIGINT received")
            }
            _ = terminate.recv() => Ok("SIGTERM received"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for ctrl-c")?;
        Ok("SIGINT received")
    }
}
