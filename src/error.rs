//! Process-level error types.

use thiserror::Error;

/// Errors starting or running the webhook process
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Explicit kubeconfig could not be loaded
    #[error("kubeconfig error: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),

    /// No usable in-cluster or local configuration
    #[error("failed to infer Kubernetes configuration: {0}")]
    InferConfig(#[from] kube::config::InferConfigError),

    /// TLS configuration error
    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    /// Server error
    #[error("Webhook server error: {0}")]
    Server(String),
}

/// Result type alias for process-level operations
pub type Result<T> = std::result::Result<T, Error>;
