//! Conversion worker binary.

use std::sync::Arc;

use tracing::{error, info};

use vrddt_worker::{init_tracing, Executor, ExitReason, Processor, Services, WorkerConfig};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    let _ = rustls::crypto::ring::default_provider().install_default();

    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting vrddt-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    let services = match Services::from_env(&config).await {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to build worker services: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = services.init_consumer().await {
        error!("Failed to initialize worker services: {}", e);
        services.cleanup().await;
        std::process::exit(1);
    }

    let processor = Processor::new(services.clone(), &config.work_dir);
    let executor = Arc::new(Executor::new(services, processor, config));

    tokio::spawn({
        let executor = Arc::clone(&executor);
        async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Received shutdown signal");
            executor.shutdown();
        }
    });

    match executor.run().await {
        Ok(summary) if summary.reason == ExitReason::MaxErrors => {
            error!(errors = summary.errors, "Worker stopped after too many errors");
            std::process::exit(1);
        }
        Ok(summary) => {
            info!(processed = summary.processed, "Worker shutdown complete");
        }
        Err(e) => {
            error!("Executor error: {}", e);
            std::process::exit(1);
        }
    }
}
