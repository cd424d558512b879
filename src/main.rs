//! Person Registry service entry point.
//!
//! Reads configuration from the environment (and `.env`), opens the record
//! store, serves HTTP until Ctrl-C, then closes the store.

use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use person_registry::{server, AppState, RecordStore, RegistryConfig, SqliteRecordStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("person_registry=info,tower_http=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_line_number(true)
        .init();

    let config = RegistryConfig::from_env()?;
    info!("Database in use: {}", config.database);

    let store = Arc::new(SqliteRecordStore::open(&config.database).await?);
    let state = AppState::new(store.clone());

    let served = server::run_server(&config, state).await;

    store.close().await?;
    served
}
