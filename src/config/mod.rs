//! Mutation configs.
//!
//! A [`MutateConfig`] is one named rule set read from a ConfigMap entry:
//!
//! ```yaml
//! patch:
//!   - op: add
//!     path: /metadata/labels/injected
//!     value: "true"
//! containers:
//!   - name: sidecar
//!     image: envoyproxy/envoy:v1.30
//! initContainers:
//!   - op: add
//!     index: "0"
//!     name: setup
//!     image: busybox
//! volumes:
//!   - name: shared
//!     emptyDir: {}
//! ```
//!
//! Typed entries carry their container/volume fields inline next to `op` and `index`.
//! Compiling a config yields the typed insertions first (containers, init containers,
//! volumes) and the raw `patch` entries last.

mod store;

pub use store::{ConfigStore, KubeConfigStore, StoreError, resolve_configs};

#[cfg(test)]
pub use store::MockConfigStore;

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Container, Volume};
use serde::{Deserialize, Serialize};

use crate::patch::{ArrayField, PatchBase, PatchOp};

/// A typed payload plus the `op`/`index` shorthand that places it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Insertion<T> {
    #[serde(flatten)]
    pub base: PatchBase,
    #[serde(flatten)]
    pub item: T,
}

impl<T: Serialize> Insertion<T> {
    pub fn new(base: PatchBase, item: T) -> Self {
        Self { base, item }
    }

    /// Expand into a single operation against `field`.
    pub fn to_patch_op(&self, field: ArrayField) -> Result<PatchOp, serde_json::Error> {
        self.base.expand(field, &self.item)
    }
}

pub type ContainerInsertion = Insertion<Container>;
pub type VolumeInsertion = Insertion<Volume>;

/// One named mutation rule set.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutateConfig {
    #[serde(default)]
    pub name: String,
    /// Raw operations, applied after all typed insertions.
    #[serde(default, rename = "patch")]
    pub patches: Vec<PatchOp>,
    #[serde(default)]
    pub containers: Vec<ContainerInsertion>,
    #[serde(default)]
    pub init_containers: Vec<ContainerInsertion>,
    #[serde(default)]
    pub volumes: Vec<VolumeInsertion>,
}

impl MutateConfig {
    /// Parse one ConfigMap entry. YAML is accepted, which covers JSON documents too.
    ///
    /// The entry key names the config unless the document sets its own `name`.
    pub fn from_entry(key: &str, document: &str) -> Result<Self, serde_yaml::Error> {
        let mut config: MutateConfig = serde_yaml::from_str(document)?;
        if config.name.is_empty() {
            config.name = key.to_string();
        }
        Ok(config)
    }

    /// Compile into an ordered operation list.
    pub fn patch_ops(&self) -> Result<Vec<PatchOp>, serde_json::Error> {
        let mut ops = Vec::with_capacity(
            self.containers.len()
                + self.init_containers.len()
                + self.volumes.len()
                + self.patches.len(),
        );

        for c in &self.containers {
            ops.push(c.to_patch_op(ArrayField::Containers)?);
        }
        for c in &self.init_containers {
            ops.push(c.to_patch_op(ArrayField::InitContainers)?);
        }
        for v in &self.volumes {
            ops.push(v.to_patch_op(ArrayField::Volumes)?);
        }
        ops.extend(self.patches.iter().cloned());

        Ok(ops)
    }
}

/// A ConfigMap entry that could not be parsed or compiled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedEntry {
    pub key: String,
    pub reason: String,
}

/// Configs resolved for a single admission request, in application order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConfigSet(pub Vec<MutateConfig>);

impl ConfigSet {
    /// Parse every entry, keeping the ones that parse and compile and reporting the rest.
    pub fn from_entries(entries: &BTreeMap<String, String>) -> (Self, Vec<SkippedEntry>) {
        let mut configs = Vec::with_capacity(entries.len());
        let mut skipped = Vec::new();

        for (key, document) in entries {
            let compiled = MutateConfig::from_entry(key, document)
                .map_err(|e| e.to_string())
                .and_then(|config| {
                    config
                        .patch_ops()
                        .map(|_| config)
                        .map_err(|e| e.to_string())
                });
            match compiled {
                Ok(config) => configs.push(config),
                Err(reason) => skipped.push(SkippedEntry {
                    key: key.clone(),
                    reason,
                }),
            }
        }

        (Self(configs), skipped)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(|c| c.name.as_str()).collect()
    }

    /// Concatenate each config's operations in set order.
    pub fn patch_ops(&self) -> Result<Vec<PatchOp>, serde_json::Error> {
        let mut ops = Vec::new();
        for config in &self.0 {
            ops.extend(config.patch_ops()?);
        }
        Ok(ops)
    }
}

impl From<Vec<MutateConfig>> for ConfigSet {
    fn from(configs: Vec<MutateConfig>) -> Self {
        Self(configs)
    }
}
