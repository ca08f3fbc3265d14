//! pod-mutator - A Kubernetes mutating admission webhook for Pods.
//!
//! This is the main entry point that:
//! - Initializes structured logging
//! - Creates the Kubernetes client
//! - Starts the health server and the TLS webhook server
//! - Drains in-flight requests on SIGTERM or SIGINT

use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};

use pod_mutator::cli::Cli;
use pod_mutator::health::{HealthState, run_health_server};
use pod_mutator::{
    AdmissionDecoder, KubeConfigStore, WebhookState, build_client, run_webhook_server,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pod_mutator=info".parse()?)
                .add_directive("kube=info".parse()?),
        )
        .json()
        .init();

    // Both aws-lc-rs and ring may be linked in; pick one explicitly
    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
    {
        warn!("A rustls crypto provider was already installed");
    }

    let cli = Cli::parse();
    info!(
        port = cli.port,
        config_namespace = %cli.config_namespace,
        annotation = %cli.annotation,
        "Starting pod-mutator"
    );

    // Create Kubernetes client
    let client = build_client(cli.kubeconfig.as_deref()).await?;
    info!("Connected to Kubernetes cluster");

    // Create shared health state
    let health_state = Arc::new(HealthState::new());

    // Start health server immediately so liveness probes work during startup
    let health_handle = {
        let health_state = health_state.clone();
        let port = cli.health_port;
        tokio::spawn(async move {
            if let Err(e) = run_health_server(health_state, port).await {
                error!("Health server error: {}", e);
            }
        })
    };

    let store = KubeConfigStore::new(client, &cli.config_namespace);
    let state = Arc::new(
        WebhookState::new(Arc::new(store), AdmissionDecoder::default())
            .with_annotation(cli.annotation.clone())
            .with_health_state(health_state.clone()),
    );

    let server_handle = axum_server::Handle::new();
    let mut webhook_handle = {
        let config = cli.server_config();
        let handle = server_handle.clone();
        tokio::spawn(async move { run_webhook_server(state, &config, handle).await })
    };

    // Ready once the listener is bound
    let listening = server_handle.clone();
    let ready_state = health_state.clone();
    tokio::spawn(async move {
        if let Some(addr) = listening.listening().await {
            info!(%addr, "Webhook server accepting connections");
            ready_state.set_ready(true).await;
        }
    });

    // Wait for any task to complete (or fail), or shutdown signal
    tokio::select! {
        result = &mut webhook_handle => {
            match result {
                Ok(Ok(())) => warn!("Webhook server exited"),
                Ok(Err(e)) => {
                    error!("Webhook server error: {}", e);
                    return Err(e.into());
                }
                Err(e) => error!("Webhook server task panicked: {}", e),
            }
        }
        result = health_handle => {
            if let Err(e) = result {
                error!("Health server task panicked: {}", e);
            }
        }
        // Handle graceful shutdown on SIGTERM or SIGINT
        _ = shutdown_signal() => {
            info!("Received shutdown signal, initiating graceful shutdown...");

            // Mark as not ready to stop receiving new requests
            health_state.set_ready(false).await;
            info!("Marked webhook as not ready");

            let timeout = cli.shutdown_timeout();
            info!(
                "Waiting up to {}s for in-flight requests to complete...",
                timeout.as_secs()
            );
            server_handle.graceful_shutdown(Some(timeout));

            match (&mut webhook_handle).await {
                Ok(Ok(())) => info!("Webhook server drained"),
                Ok(Err(e)) => error!("Webhook server error during shutdown: {}", e),
                Err(e) => error!("Webhook server task panicked: {}", e),
            }
        }
    }

    info!("pod-mutator stopped");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
///
/// Note: Signal handler setup failures are fatal - the webhook cannot shut down
/// gracefully without them.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
