//! Command-line configuration.
//!
//! Every flag can also be set from the environment, which is how the Deployment
//! manifest usually configures the webhook.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::webhooks::{
    CONFIG_ANNOTATION, WEBHOOK_CERT_PATH, WEBHOOK_KEY_PATH, WEBHOOK_PORT, WebhookServerConfig,
};

/// Default port for the health and metrics server
pub const HEALTH_PORT: u16 = 8080;

/// Default bound on draining in-flight requests at shutdown
pub const SHUTDOWN_TIMEOUT_SECS: u64 = 5;

/// Mutating admission webhook that patches Pods from ConfigMap-held configs
#[derive(Parser, Debug, Clone)]
#[command(name = "pod-mutator", version, about, long_about = None)]
pub struct Cli {
    /// Webhook server port
    #[arg(long, env = "WEBHOOK_PORT", default_value_t = WEBHOOK_PORT)]
    pub port: u16,

    /// File containing the x509 certificate for HTTPS
    #[arg(long, env = "WEBHOOK_TLS_CERT_FILE", default_value = WEBHOOK_CERT_PATH)]
    pub tls_cert_file: PathBuf,

    /// File containing the x509 private key for --tls-cert-file
    #[arg(long, env = "WEBHOOK_TLS_KEY_FILE", default_value = WEBHOOK_KEY_PATH)]
    pub tls_key_file: PathBuf,

    /// Kubeconfig path, or a `KUBECONFIG`-style path list; in-cluster configuration is used when unset
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Namespace holding the mutation config maps
    #[arg(long, env = "CONFIG_NAMESPACE", default_value = "default")]
    pub config_namespace: String,

    /// Pod annotation naming the config map to apply
    #[arg(long, env = "MUTATE_ANNOTATION", default_value = CONFIG_ANNOTATION)]
    pub annotation: String,

    /// Port for /healthz, /readyz and /metrics
    #[arg(long, env = "HEALTH_PORT", default_value_t = HEALTH_PORT)]
    pub health_port: u16,

    /// Seconds to let in-flight requests finish after a shutdown signal
    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECS", default_value_t = SHUTDOWN_TIMEOUT_SECS)]
    pub shutdown_timeout: u64,
}

impl Cli {
    pub fn server_config(&self) -> WebhookServerConfig {
        WebhookServerConfig {
            port: self.port,
            cert_path: self.tls_cert_file.clone(),
            key_path: self.tls_key_file.clone(),
        }
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout)
    }
}
