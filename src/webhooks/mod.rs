//! Mutating admission webhook.
//!
//! Pods annotated with [`CONFIG_ANNOTATION`] are patched with the mutation configs stored
//! in the ConfigMap the annotation names. Everything else is allowed unchanged.

mod decoder;
mod error;
mod mutate;
mod server;

use std::sync::Arc;

pub use decoder::{AdmissionDecoder, DecodeError, JSON_CONTENT_TYPE, ReviewHead};
pub use error::WebhookError;
pub use mutate::{CONFIG_ANNOTATION, MutationDecision, mutate_pod, mutation_decision};
pub use server::{
    WEBHOOK_CERT_PATH, WEBHOOK_KEY_PATH, WEBHOOK_PORT, WebhookServerConfig,
    create_webhook_router, run_webhook_server,
};

// Re-export kube-rs admission types for contract testing
pub use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};

use crate::config::ConfigStore;
use crate::health::{AdmissionOutcome, HealthState, Metrics};

/// Shared state for webhook handlers.
///
/// Immutable after construction; requests only read from it.
pub struct WebhookState {
    /// Source of mutation configs
    pub store: Arc<dyn ConfigStore>,
    /// Request decoder
    pub decoder: AdmissionDecoder,
    /// Annotation that triggers mutation
    pub annotation: String,
    /// Optional health state for metrics
    pub health_state: Option<Arc<HealthState>>,
}

impl WebhookState {
    pub fn new(store: Arc<dyn ConfigStore>, decoder: AdmissionDecoder) -> Self {
        Self {
            store,
            decoder,
            annotation: CONFIG_ANNOTATION.to_string(),
            health_state: None,
        }
    }

    /// Use a different trigger annotation
    #[must_use]
    pub fn with_annotation(mut self, annotation: impl Into<String>) -> Self {
        self.annotation = annotation.into();
        self
    }

    /// Record metrics on `health_state`
    #[must_use]
    pub fn with_health_state(mut self, health_state: Arc<HealthState>) -> Self {
        self.health_state = Some(health_state);
        self
    }

    pub(crate) fn metrics(&self) -> Option<&Metrics> {
        self.health_state.as_deref().map(|h| &h.metrics)
    }

    pub(crate) fn record(&self, outcome: AdmissionOutcome) {
        if let Some(m) = self.metrics() {
            m.record_admission(outcome);
        }
    }
}
