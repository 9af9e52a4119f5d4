use std::sync::Arc;

use crate::cli::utils::connect_store;
use crate::config::config;
use crate::database::{MemoryStore, Store};
use crate::server;
use crate::state::AppState;

pub async fn handle(memory: bool, port: Option<u16>) -> anyhow::Result<()> {
    let config = config().clone();
    if config.security.jwt_secret.is_empty() {
        anyhow::bail!("JWT_SECRET must be set when APP_ENV is not development");
    }

    let store: Arc<dyn Store> = if memory {
        tracing::warn!("Serving from the in-memory store; data is lost on exit");
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(connect_store(&config).await?)
    };

    let port = port.unwrap_or(config.api.port);
    server::serve(AppState::new(store, config), port).await?;
    Ok(())
}
