use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use protocol_registry::database::DatabaseManager;
use protocol_registry::state::AppState;
use protocol_registry::{app, config, is_production, storage};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .init();

    // Initialize configuration (this loads the config singleton)
    let config = config::config();
    info!("Starting Protocol Registry in {:?} mode", config.environment);

    if is_production!() && config.security.jwt_secret.is_empty() {
        anyhow::bail!("JWT_SECRET must be set in production");
    }

    let pool = DatabaseManager::connect(&config.database).await?;
    if config.database.apply_schema_on_start {
        DatabaseManager::apply_schema(&pool).await?;
    }

    let storage = storage::from_config(&config.storage)?;
    info!(backend = storage.name(), "Remote storage ready");

    let state = AppState::new(pool.clone(), config, storage);

    let bind_addr = format!("0.0.0.0:{}", config.api.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    info!("Protocol registry listening on http://{}", bind_addr);

    axum::serve(listener, app::app(state, config))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.close().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
