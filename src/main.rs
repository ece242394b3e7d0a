use clap::Parser;
use order_cluster::api::{self, ApiState, PassthroughResolver};
use order_cluster::cluster::{ClusterService, HttpTransport};
use order_cluster::config::{Cli, Command, ServeArgs, StoreArgs, load_or_create_service_id};
use order_cluster::order::OrderRepository;
use order_cluster::pipeline::{PipelineManager, StepRegistry};
use order_cluster::storage::{self, HttpStore, MemoryStore, Store};
use order_cluster::transfer::TransferService;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.command.log_level()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Store(args) => serve_store(args).await,
    }
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let service_id = load_or_create_service_id(&args.data_dir)?;
    let address = args.advertised_addr();

    tracing::info!("Starting service {} on {}", service_id, address);

    // 1. Storage:
    let store: Arc<dyn Store> = match &args.store_url {
        Some(url) => {
            tracing::info!("Using shared store at {}", url);
            Arc::new(HttpStore::new(url))
        }
        None => {
            tracing::warn!("No --store-url given, orders are kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };
    let repository = OrderRepository::new(store);

    // 2. Pipelines and transfer:
    let registry = StepRegistry::simulated(args.step_delay(), args.failure_ratio());
    let manager = PipelineManager::new(
        service_id.clone(),
        repository.clone(),
        registry,
        args.pipeline_settings(),
    );
    let transfer = TransferService::new(service_id.clone(), repository.clone(), manager.clone());

    // 3. Cluster:
    let transport = Arc::new(HttpTransport::new()?);
    let cluster = ClusterService::new(
        service_id.clone(),
        address,
        args.cluster_settings(),
        transport,
        transfer.clone(),
    );

    // 4. HTTP server, up before joining so the leader can replicate to us:
    let state = Arc::new(ApiState {
        service_id: service_id.clone(),
        repository,
        dispatcher: manager.clone(),
        transfer,
        tokens: Arc::new(PassthroughResolver),
    });
    let app = api::app(state, cluster.clone());

    let listener = tokio::net::TcpListener::bind(args.listen_addr()).await?;
    tracing::info!("HTTP server listening on {}", args.listen_addr());
    let server = tokio::spawn(async move { axum::serve(listener, app).await });

    // 5. Consensus, then reload our own active orders:
    cluster.start(args.join.clone()).await?;

    let report = manager.start().await?;
    tracing::info!(
        "Service {} ready: reloaded {} of {} active order(s)",
        service_id,
        report.dispatched,
        report.scanned
    );
    tracing::info!("Press Ctrl+C to shutdown");

    tokio::select! {
        result = server => {
            result??;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down service {}", service_id);
        }
    }

    cluster.stop();
    manager.stop();
    Ok(())
}

async fn serve_store(args: StoreArgs) -> anyhow::Result<()> {
    let app = storage::handlers::router(MemoryStore::new());

    let listener = tokio::net::TcpListener::bind(args.listen_addr()).await?;
    tracing::info!("Store server listening on {}", args.listen_addr());

    axum::serve(listener, app).await?;
    Ok(())
}
