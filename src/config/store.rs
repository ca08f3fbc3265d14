//! Config resolution from ConfigMaps.
//!
//! The trigger annotation on a Pod names a ConfigMap. Every data entry of that ConfigMap
//! is parsed as a [`MutateConfig`](super::MutateConfig); entries that fail to parse are
//! skipped so one broken entry cannot block the others.

use std::collections::BTreeMap;
use std::time::Instant;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{Api, Client};
#[cfg(test)]
use mockall::automock;
use thiserror::Error;
use tracing::{debug, warn};

use super::ConfigSet;
use crate::health::Metrics;

/// Errors fetching configs from the store
#[derive(Error, Debug)]
pub enum StoreError {
    /// The named ConfigMap does not exist
    #[error("config map {namespace}/{name} not found")]
    NotFound { namespace: String, name: String },

    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
}

/// Source of raw config entries, keyed by entry name.
///
/// Implementations must be safe to share between concurrent admission requests.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Fetch all entries of the collection called `name`.
    async fn fetch(&self, name: &str) -> Result<BTreeMap<String, String>, StoreError>;
}

/// [`ConfigStore`] backed by ConfigMaps in a single namespace.
#[derive(Clone)]
pub struct KubeConfigStore {
    api: Api<ConfigMap>,
    namespace: String,
}

impl KubeConfigStore {
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            namespace: namespace.to_string(),
        }
    }
}

#[async_trait]
impl ConfigStore for KubeConfigStore {
    async fn fetch(&self, name: &str) -> Result<BTreeMap<String, String>, StoreError> {
        match self.api.get_opt(name).await? {
            Some(cm) => Ok(cm.data.unwrap_or_default()),
            None => {
                debug!(namespace = %self.namespace, config_map = %name, "Config map not found");
                Err(StoreError::NotFound {
                    namespace: self.namespace.clone(),
                    name: name.to_string(),
                })
            }
        }
    }
}

/// Resolve the configs for lookup key `key`.
///
/// Fetches fresh on every call. Unparseable entries are logged, counted on `metrics`
/// and left out of the returned set.
pub async fn resolve_configs<S: ConfigStore + ?Sized>(
    store: &S,
    key: &str,
    metrics: Option<&Metrics>,
) -> Result<ConfigSet, StoreError> {
    let started = Instant::now();
    let entries = store.fetch(key).await?;
    if let Some(m) = metrics {
        m.observe_config_fetch(started.elapsed().as_secs_f64());
    }

    let (configs, skipped) = ConfigSet::from_entries(&entries);
    for entry in &skipped {
        warn!(
            config_map = %key,
            entry = %entry.key,
            error = %entry.reason,
            "Skipping unparseable mutation config entry"
        );
        if let Some(m) = metrics {
            m.record_skipped_entry(key);
        }
    }

    debug!(
        config_map = %key,
        configs = ?configs.names(),
        skipped = skipped.len(),
        "Resolved mutation configs"
    );
    Ok(configs)
}
