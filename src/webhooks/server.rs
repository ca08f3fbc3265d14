//! Admission webhook server.
//!
//! Serves `POST /mutate` over TLS. To enable the webhook:
//! 1. Deploy cert-manager (or any issuer) for the serving certificate
//! 2. Mount the certificate secret at /etc/webhook/certs/
//! 3. Create a MutatingWebhookConfiguration for Pods pointing at `/mutate`

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{Router, routing::post};
use axum_server::Handle;
use axum_server::tls_rustls::RustlsConfig;
use tracing::info;

use super::WebhookState;
use super::mutate::mutate_pod;
use crate::Error;

/// Default path to webhook TLS certificate
pub const WEBHOOK_CERT_PATH: &str = "/etc/webhook/certs/tls.crt";
/// Default path to webhook TLS private key
pub const WEBHOOK_KEY_PATH: &str = "/etc/webhook/certs/tls.key";
/// Default webhook server port
pub const WEBHOOK_PORT: u16 = 8443;

/// Listener settings for the webhook server
#[derive(Clone, Debug)]
pub struct WebhookServerConfig {
    pub port: u16,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

impl Default for WebhookServerConfig {
    fn default() -> Self {
        Self {
            port: WEBHOOK_PORT,
            cert_path: PathBuf::from(WEBHOOK_CERT_PATH),
            key_path: PathBuf::from(WEBHOOK_KEY_PATH),
        }
    }
}

/// Create the webhook router
pub fn create_webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/mutate", post(mutate_pod))
        .with_state(state)
}

/// Run the webhook server with TLS until `handle` shuts it down.
///
/// Each connection is served on its own task. Call
/// [`Handle::graceful_shutdown`] to stop accepting connections and drain.
pub async fn run_webhook_server(
    state: Arc<WebhookState>,
    config: &WebhookServerConfig,
    handle: Handle,
) -> Result<(), Error> {
    let app = create_webhook_router(state);

    let tls = RustlsConfig::from_pem_file(&config.cert_path, &config.key_path)
        .await
        .map_err(|e| Error::TlsConfig(e.to_string()))?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!(port = config.port, "Webhook server listening with TLS");

    axum_server::bind_rustls(addr, tls)
        .handle(handle)
        .serve(app.into_make_service())
        .await
        .map_err(|e| Error::Server(e.to_string()))?;

    info!("Webhook server stopped");
    Ok(())
}
