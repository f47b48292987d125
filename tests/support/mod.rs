//! Shared harness for integration tests.

use std::sync::Arc;

use podbench::db::{create_pool, run_migrations};
use podbench::images::ImageCatalog;
use podbench::lifecycle::LifecycleController;
use podbench::orchestrator::Orchestrator;
use podbench::registry::{DurableRegistry, LabelRegistry, OwnershipRegistry};
use podbench::streamer::StatusStreamer;
use podbench::testkit::FakeCluster;

/// Which ownership registry strategy a test system runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Labels,
    Durable,
}

/// A fully wired core against the in-memory cluster.
pub struct TestSystem {
    pub cluster: FakeCluster,
    pub registry: Arc<dyn OwnershipRegistry>,
    pub lifecycle: LifecycleController,
    pub streamer: StatusStreamer,
    // Keeps the durable registry's database alive for the test.
    _db_dir: Option<tempfile::TempDir>,
}

/// Allow-list used across tests; `hail` and `hail-jupyter` are the only
/// valid short names.
pub fn catalog() -> ImageCatalog {
    ImageCatalog::parse(
        "gcr.io/hail-vdc/hail:0.2.11\ngcr.io/hail-vdc/hail-jupyter:2024-08\n",
    )
    .expect("test catalog parses")
}

pub fn system(strategy: Strategy, endpoint_enabled: bool) -> TestSystem {
    let cluster = FakeCluster::new();
    let orchestrator: Arc<dyn Orchestrator> = Arc::new(cluster.clone());

    let (registry, db_dir): (Arc<dyn OwnershipRegistry>, Option<tempfile::TempDir>) =
        match strategy {
            Strategy::Labels => (Arc::new(LabelRegistry::new(orchestrator.clone())), None),
            Strategy::Durable => {
                let dir = tempfile::tempdir().expect("create temp dir");
                let url = dir.path().join("sessions.db").display().to_string();
                let pool = create_pool(&url).expect("create sqlite pool");
                run_migrations(&pool).expect("run migrations");
                (Arc::new(DurableRegistry::new(pool)), Some(dir))
            }
        };

    let lifecycle = LifecycleController::new(
        orchestrator.clone(),
        registry.clone(),
        catalog(),
        endpoint_enabled,
    );
    let streamer = StatusStreamer::new(orchestrator);

    TestSystem {
        cluster,
        registry,
        lifecycle,
        streamer,
        _db_dir: db_dir,
    }
}
