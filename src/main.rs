use std::sync::Arc;

use podbench::auth::GatewayVerifier;
use podbench::config::{Config, OwnershipStrategy};
use podbench::db;
use podbench::error::{Error, Result};
use podbench::images::ImageCatalog;
use podbench::lifecycle::LifecycleController;
use podbench::orchestrator::{KubeOrchestrator, Orchestrator};
use podbench::registry::{DurableRegistry, LabelRegistry, OwnershipRegistry};
use podbench::server::{self, AppState};
use podbench::streamer::StatusStreamer;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            std::process::exit(1);
        }
    };

    config.init_logging();
    info!("podbench starting");

    tokio::select! {
        result = run(config) => {
            if let Err(e) = result {
                error!(error = %e, "Fatal error");
                std::process::exit(1);
            }
        }
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    info!("podbench stopped");
}

async fn run(config: Config) -> Result<()> {
    let catalog = ImageCatalog::load(&config.images_file)?;
    info!(images = catalog.len(), "image allow-list loaded");

    // Infers in-cluster configuration, falling back to the local
    // kubeconfig for development.
    let client = kube::Client::try_default()
        .await
        .map_err(|e| Error::Internal(e.to_string()))?;
    let orchestrator: Arc<dyn Orchestrator> = Arc::new(KubeOrchestrator::new(
        client,
        &config.namespace,
        config.call_timeout,
    ));

    let registry: Arc<dyn OwnershipRegistry> = match config.ownership {
        OwnershipStrategy::Labels => Arc::new(LabelRegistry::new(orchestrator.clone())),
        OwnershipStrategy::Durable => {
            let url = config.database_url.as_deref().ok_or(Error::Internal(
                "durable ownership selected without a database url".to_string(),
            ))?;
            let pool = db::create_pool(url)?;
            db::run_migrations(&pool)?;
            info!("durable ownership registry ready");
            Arc::new(DurableRegistry::new(pool))
        }
    };

    let verifier = Arc::new(GatewayVerifier::new(
        &config.auth_gateway,
        config.call_timeout,
    )?);
    let lifecycle = Arc::new(LifecycleController::new(
        orchestrator.clone(),
        registry,
        catalog,
        config.endpoint_enabled,
    ));
    let streamer = Arc::new(StatusStreamer::new(orchestrator));

    let app = server::router(AppState {
        lifecycle,
        streamer,
        verifier,
    });

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .map_err(|e| Error::Internal(e.to_string()))?;
    info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app)
        .await
        .map_err(|e| Error::Internal(e.to_string()))
}
