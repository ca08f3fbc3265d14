//! pod-mutator library crate
//!
//! This module exports the patch model, the ConfigMap-backed config layer and the
//! admission webhook that ties them together.

pub mod cli;
pub mod config;
pub mod error;
pub mod health;
pub mod patch;
pub mod webhooks;

pub use config::{ConfigSet, ConfigStore, KubeConfigStore, MutateConfig, StoreError};
pub use error::{Error, Result};
pub use health::HealthState;
pub use patch::{Op, PatchOp};
pub use webhooks::{
    AdmissionDecoder, WEBHOOK_CERT_PATH, WEBHOOK_KEY_PATH, WEBHOOK_PORT, WebhookError,
    WebhookServerConfig, WebhookState, run_webhook_server,
};

use std::path::{Path, PathBuf};

use kube::Client;
use kube::config::{KubeConfigOptions, Kubeconfig};
use tracing::info;

/// Build a Kubernetes client.
///
/// An explicit kubeconfig path list wins; otherwise the in-cluster service account or the
/// default local kubeconfig is used.
pub async fn build_client(kubeconfig: Option<&Path>) -> Result<Client> {
    let kubeconfig = match kubeconfig {
        Some(paths) => {
            info!(path = %paths.display(), "Loading kubeconfig");
            read_kubeconfig(paths)?
        }
        None => None,
    };
    let config = match kubeconfig {
        Some(kubeconfig) => {
            kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await?
        }
        None => kube::Config::infer().await?,
    };
    Ok(Client::try_from(config)?)
}

/// Read a kubeconfig path list in the `KUBECONFIG` format and merge the files in order.
///
/// Empty entries are ignored and the first file to set a value wins. Returns `None` when
/// the list names no files.
pub fn read_kubeconfig(paths: &Path) -> Result<Option<Kubeconfig>> {
    let paths: Vec<PathBuf> = std::env::split_paths(paths.as_os_str())
        .filter(|p| !p.as_os_str().is_empty())
        .collect();
    if paths.is_empty() {
        return Ok(None);
    }

    let merged = paths
        .iter()
        .try_fold(Kubeconfig::default(), |merged, path| {
            Kubeconfig::read_from(path).and_then(|next| merged.merge(next))
        })?;
    Ok(Some(merged))
}
