//! Compilation worker binary.

use std::sync::Arc;

use tracing::{error, info};

use weave_queue::JobQueue;
use weave_worker::{init_tracing, metrics, JobExecutor, Services, WorkerConfig};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS to Redis and Postgres)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting weave-worker");

    if let Err(e) = run().await {
        error!("Worker error: {:#}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}

async fn run() -> anyhow::Result<()> {
    let config = WorkerConfig::from_env()?;
    info!("Worker config: {:?}", config);

    if let Some(port) = config.metrics_port {
        metrics::init_metrics(port)?;
    }

    let services = Services::connect(config.clone()).await?;
    let pipeline = Arc::new(services.pipeline(services.transcoder()?));
    let queue = JobQueue::from_env()?;

    let executor = Arc::new(JobExecutor::new(config.clone(), queue, pipeline));

    let sweeper = services.sweeper();
    let sweep_shutdown = executor.shutdown_signal();
    let sweep_interval = config.sweep_interval;
    let sweep_task = tokio::spawn(async move {
        sweeper.run_periodic(sweep_interval, sweep_shutdown).await;
    });

    let signal_executor = Arc::clone(&executor);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            signal_executor.shutdown();
        }
    });

    executor.run().await?;
    sweep_task.await.ok();
    Ok(())
}
