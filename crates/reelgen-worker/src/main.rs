//! Pipeline worker binary.

use std::net::SocketAddr;
use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use reelgen_firestore::FirestoreClient;
use reelgen_queue::{JobQueue, TaskQueue};
use reelgen_worker::{FirestoreStore, JobExecutor, Pipeline, Services, WorkerConfig};

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let mut env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    for directive in ["reelgen=info", "hyper=warn", "aws_config=warn"] {
        if let Ok(directive) = directive.parse() {
            env_filter = env_filter.add_directive(directive);
        }
    }

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        eprintln!("rustls crypto provider was already installed");
    }

    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting reelgen-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if config.metrics_port != 0 {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
        match PrometheusBuilder::new().with_http_listener(addr).install() {
            Ok(()) => info!("Metrics listening on {}", addr),
            Err(e) => warn!("Failed to start metrics listener: {}", e),
        }
    }

    let firestore = match FirestoreClient::from_env().await {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to create Firestore client: {}", e);
            std::process::exit(1);
        }
    };

    let services = match Services::from_env() {
        Ok(services) => services,
        Err(e) => {
            error!("Failed to create service clients: {}", e);
            std::process::exit(1);
        }
    };

    let queue = match JobQueue::from_env() {
        Ok(q) => Arc::new(q),
        Err(e) => {
            error!("Failed to create job queue: {}", e);
            std::process::exit(1);
        }
    };

    let store = Arc::new(FirestoreStore::new(firestore));
    let task_queue: Arc<dyn TaskQueue> = queue.clone();
    let pipeline = Pipeline::new(store, task_queue, services, &config);
    let executor = Arc::new(JobExecutor::new(config, queue, pipeline));

    let signal_executor = executor.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            signal_executor.shutdown();
        }
    });

    if let Err(e) = executor.run().await {
        error!("Executor error: {}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}
