use dotenv::dotenv;
use garageflow_core::api::{create_router, AppState};
use garageflow_core::auth::JwtKeys;
use garageflow_core::config::Config;
use garageflow_core::db;
use garageflow_core::gateway::{InMemoryGateway, LogDelivery, PersistenceGateway, PgGateway};
use garageflow_core::GarageEngine;
use std::sync::Arc;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

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

    info!("Starting GarageFlow Core Server...");

    let config = Config::from_env()?;

    let gateway: Arc<dyn PersistenceGateway> = match config.database_url.as_deref() {
        Some(url) => {
            let pool = db::create_pool(url, config.engine.persistence_timeout).await?;
            db::run_migrations(&pool).await?;
            Arc::new(PgGateway::new(pool))
        }
        None => {
            warn!("DATABASE_URL not set, using in-memory storage");
            Arc::new(InMemoryGateway::new())
        }
    };

    let engine = GarageEngine::new(gateway, Arc::new(LogDelivery), config.engine);

    // Create router
    let app = create_router(AppState {
        engine: Arc::new(engine),
        keys: JwtKeys::from_secret(&config.jwt_secret),
    });

    let listener = tokio::net::TcpListener::bind((config.server_host.as_str(), config.server_port))
        .await
        .map_err(|e| {
            anyhow::anyhow!(
                "Failed to bind to {}:{}: {}",
                config.server_host,
                config.server_port,
                e
            )
        })?;

    info!(
        "Server listening on {}:{}",
        config.server_host, config.server_port
    );

    // Start the server
    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}
