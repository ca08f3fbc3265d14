//! Shared test cluster singleton.
//!
//! Validates connectivity once; each test then builds its own client.

use kube::Client;
use std::sync::Arc;
use std::sync::OnceLock;
use tokio::sync::OnceCell;

/// Global shared test cluster instance.
static SHARED_CLUSTER: OnceCell<Arc<SharedTestCluster>> = OnceCell::const_new();

/// Shared test cluster providing Kubernetes connectivity.
pub struct SharedTestCluster {
    _marker: (),
}

impl SharedTestCluster {
    /// Get or create the shared test cluster.
    pub async fn get() -> Arc<SharedTestCluster> {
        SHARED_CLUSTER
            .get_or_init(|| async {
                let cluster = Self::connect().await.expect(
                    "Failed to connect to Kubernetes cluster. Is your kubeconfig configured?",
                );
                Arc::new(cluster)
            })
            .await
            .clone()
    }

    /// Create a new Kubernetes client the same way the webhook binary does.
    pub async fn new_client(&self) -> Client {
        pod_mutator::build_client(None)
            .await
            .expect("Failed to create kube client")
    }

    async fn connect() -> Result<Self, pod_mutator::Error> {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
        init_tracing();

        let client = pod_mutator::build_client(None).await?;
        let version = client.apiserver_version().await?;
        tracing::info!(
            "Connected to Kubernetes cluster: {} {}",
            version.platform,
            version.git_version
        );

        Ok(Self { _marker: () })
    }
}

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Initialize tracing for tests (once per process).
pub fn init_tracing() {
    TRACING_INIT.get_or_init(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}
