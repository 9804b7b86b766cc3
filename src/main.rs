use dotenvy::dotenv;
use gold_finger::{
    api::{AppState, build_router},
    config::{database, settings},
    core::exchange::{ExchangeRateCache, HttpRateProvider},
    errors::Result,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file, env vars can also be set externally
    dotenv().ok();

    // 3. Load the application configuration
    let app_config = settings::load_app_configuration()
        .inspect_err(|e| error!("Failed to load application configuration: {}", e))?;

    // 4. Connect and make sure the schema exists
    let db = database::create_connection()
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    database::create_tables(&db)
        .await
        .inspect(|()| info!("Database initialized successfully."))
        .inspect_err(|e| error!("Failed to create tables: {}", e))?;

    // 5. Shared state
    let cron_secret = settings::cron_secret_from_env();
    if cron_secret.is_none() {
        warn!("CRON_SECRET is not set; every cron trigger will be rejected");
    }
    let rates = ExchangeRateCache::new(
        Arc::new(HttpRateProvider::new(app_config.exchange.api_url.clone())),
        app_config.exchange.cache_ttl(),
    );
    let state = Arc::new(AppState::new(db, cron_secret, rates));

    // 6. Serve
    let listener = TcpListener::bind(&app_config.server.bind_address)
        .await
        .inspect_err(|e| error!("Failed to bind {}: {}", app_config.server.bind_address, e))?;
    info!("Gold-Finger listening on {}", app_config.server.bind_address);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        // Keep serving; only an explicit signal stops the server
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
