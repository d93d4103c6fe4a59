use dotenv::dotenv;
use garageflow_core::billing::PaymentReconciler;
use garageflow_core::config::Config;
use garageflow_core::db;
use garageflow_core::gateway::{PersistenceGateway, PgGateway};
use garageflow_core::worker::ReconciliationWorker;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Worker binary entry point for invoice balance reconciliation.
///
/// This binary runs as a background worker that:
/// - Polls for invoices whose balance drifted from their payments
/// - Re-derives their paid amount from the recorded payments
/// - Writes back balances and statuses that drifted
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"))
        .add_directive(LevelFilter::INFO.into());

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();

    info!("Starting GarageFlow Reconciliation Worker...");

    let config = Config::from_env()?;
    let database_url = config
        .database_url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set for the worker"))?;

    let pool = db::create_pool(database_url, config.engine.persistence_timeout).await?;
    let gateway: Arc<dyn PersistenceGateway> = Arc::new(PgGateway::new(pool));

    let worker = Arc::new(ReconciliationWorker::new(
        gateway.clone(),
        PaymentReconciler::new(
            gateway,
            config.engine.overpayment_tolerance,
            config.engine.persistence_timeout,
        ),
        config.engine.persistence_timeout,
        config.worker_poll_interval,
    ));

    let worker_handle = {
        let worker = worker.clone();
        tokio::spawn(async move {
            if let Err(e) = worker.start().await {
                tracing::error!("Worker error: {}", e);
            }
        })
    };

    // Wait for shutdown signal
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
            worker.stop().await;
        }
        _ = worker_handle => {
            info!("Worker task completed");
        }
    }

    info!("GarageFlow Reconciliation Worker stopped");
    Ok(())
}
