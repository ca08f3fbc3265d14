//! Health server for Kubernetes probes and Prometheus metrics.
//!
//! Provides:
//! - `/healthz` - Liveness probe (always returns 200 if server is running)
//! - `/readyz` - Readiness probe (returns 200 while the webhook accepts requests)
//! - `/metrics` - Prometheus metrics endpoint

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabel, EncodeLabelSet, LabelSetEncoder};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use tokio::sync::RwLock;
use tracing::info;

/// How an admission request was answered
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AdmissionOutcome {
    /// Allowed without a patch
    Passthrough,
    /// Allowed with a patch
    Mutated,
    /// Answered with an error envelope
    Denied,
    /// Rejected before an envelope could be decoded
    Invalid,
    /// No envelope could be encoded (HTTP 500)
    Error,
}

impl AdmissionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdmissionOutcome::Passthrough => "passthrough",
            AdmissionOutcome::Mutated => "mutated",
            AdmissionOutcome::Denied => "denied",
            AdmissionOutcome::Invalid => "invalid",
            AdmissionOutcome::Error => "error",
        }
    }
}

/// Labels for admission request metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct OutcomeLabels {
    pub outcome: String,
}

impl EncodeLabelSet for OutcomeLabels {
    fn encode(&self, mut encoder: LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("outcome", self.outcome.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels for per-ConfigMap metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ConfigMapLabels {
    pub config_map: String,
}

impl EncodeLabelSet for ConfigMapLabels {
    fn encode(&self, mut encoder: LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("config_map", self.config_map.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Shared metrics for the webhook
pub struct Metrics {
    /// Admission requests by outcome
    pub admission_requests_total: Family<OutcomeLabels, Counter>,
    /// Config entries skipped because they failed to parse
    pub config_entries_skipped_total: Family<ConfigMapLabels, Counter>,
    /// Operations per mutating response
    pub patch_operations: Histogram,
    /// Config store fetch latency
    pub config_fetch_duration_seconds: Histogram,
    /// Prometheus registry
    registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create a new metrics instance with registered metrics
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let admission_requests_total = Family::<OutcomeLabels, Counter>::default();
        registry.register(
            "podmutator_admission_requests",
            "Total number of admission requests by outcome",
            admission_requests_total.clone(),
        );

        let config_entries_skipped_total = Family::<ConfigMapLabels, Counter>::default();
        registry.register(
            "podmutator_config_entries_skipped",
            "Total number of config map entries skipped because they could not be parsed",
            config_entries_skipped_total.clone(),
        );

        let patch_operations = Histogram::new(exponential_buckets(1.0, 2.0, 8));
        registry.register(
            "podmutator_patch_operations",
            "Number of JSON patch operations per mutating response",
            patch_operations.clone(),
        );

        let config_fetch_duration_seconds = Histogram::new(exponential_buckets(0.001, 2.0, 15));
        registry.register(
            "podmutator_config_fetch_duration_seconds",
            "Duration of config map fetches in seconds",
            config_fetch_duration_seconds.clone(),
        );

        Self {
            admission_requests_total,
            config_entries_skipped_total,
            patch_operations,
            config_fetch_duration_seconds,
            registry,
        }
    }

    /// Record the outcome of one admission request
    pub fn record_admission(&self, outcome: AdmissionOutcome) {
        let labels = OutcomeLabels {
            outcome: outcome.as_str().to_string(),
        };
        self.admission_requests_total.get_or_create(&labels).inc();
    }

    /// Record the size of a mutating patch
    pub fn observe_patch(&self, operations: usize) {
        self.patch_operations.observe(operations as f64);
    }

    /// Record a config store fetch
    pub fn observe_config_fetch(&self, duration_secs: f64) {
        self.config_fetch_duration_seconds.observe(duration_secs);
    }

    /// Record a skipped config entry
    pub fn record_skipped_entry(&self, config_map: &str) {
        let labels = ConfigMapLabels {
            config_map: config_map.to_string(),
        };
        self.config_entries_skipped_total
            .get_or_create(&labels)
            .inc();
    }

    /// Current count of admission requests with `outcome`
    pub fn admissions(&self, outcome: AdmissionOutcome) -> u64 {
        let labels = OutcomeLabels {
            outcome: outcome.as_str().to_string(),
        };
        self.admission_requests_total.get_or_create(&labels).get()
    }

    /// Current count of skipped entries for `config_map`
    pub fn skipped_entries(&self, config_map: &str) -> u64 {
        let labels = ConfigMapLabels {
            config_map: config_map.to_string(),
        };
        self.config_entries_skipped_total
            .get_or_create(&labels)
            .get()
    }

    /// Encode metrics to Prometheus text format
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if encode(&mut buffer, &self.registry).is_err() {
            tracing::error!("Failed to encode metrics");
            return "# Error encoding metrics".to_string();
        }
        buffer
    }
}

/// Shared state for the health server
pub struct HealthState {
    /// Whether the webhook listener is up and not draining
    ready: RwLock<bool>,
    /// Metrics registry
    pub metrics: Metrics,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    /// Create a new health state (starts as not ready)
    pub fn new() -> Self {
        Self {
            ready: RwLock::new(false),
            metrics: Metrics::new(),
        }
    }

    /// Mark the webhook as ready or not ready
    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    /// Check if the webhook is ready
    pub async fn is_ready(&self) -> bool {
        *self.ready.read().await
    }
}

/// Liveness probe handler
async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Readiness probe handler
///
/// Returns 503 Service Unavailable before the listener starts and while draining.
async fn readyz(State(state): State<Arc<HealthState>>) -> Response {
    if state.is_ready().await {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response()
    }
}

/// Metrics handler
async fn metrics_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let body = state.metrics.encode();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// Create the health server router
pub fn create_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Run the health server on plain HTTP.
pub async fn run_health_server(state: Arc<HealthState>, port: u16) -> Result<(), std::io::Error> {
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(port, "Starting health server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
