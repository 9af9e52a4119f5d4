use std::sync::Arc;

use workspace_gate::{
    config::{config, Environment},
    database::{DatabaseManager, PgStore},
    server,
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();
    server::init_tracing();

    let config = config().clone();
    tracing::info!("Starting workspace gate in {:?} mode", config.environment);

    if config.security.jwt_secret.is_empty() {
        anyhow::bail!("JWT_SECRET must be set when APP_ENV is not development");
    }
    if config.environment == Environment::Production && !config.sync.transactional {
        tracing::warn!("SYNC_TRANSACTIONAL is off: a failed prune leaves upserted rows in place");
    }

    let pool = DatabaseManager::connect(&config.database).await?;
    let store = Arc::new(PgStore::new(pool, &config.database, config.sync.transactional));

    let port = config.api.port;
    server::serve(AppState::new(store, config), port).await?;
    Ok(())
}
