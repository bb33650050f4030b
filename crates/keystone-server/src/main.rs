//! Keystone Server — process entry point.
//!
//! Connects to SurrealDB, applies migrations, and runs the cleanup
//! scheduler until interrupted. Request handling is embedded by callers
//! through the `keystone-auth` API.

use std::sync::Arc;

use anyhow::Context;
use keystone_auth::{CleanupScheduler, NonceRegistry, SessionConfig, SessionManager};
use keystone_db::repository::SurrealSessionRepository;
use keystone_db::{DbConfig, DbManager};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("keystone=info"));
    tracing_subscriber::fmt().with_env_filter(filter).json().init();

    tracing::info!("Starting Keystone server...");

    let config = SessionConfig::from_env().context("invalid session configuration")?;
    tracing::info!(
        session_ttl_secs = config.session_ttl.as_secs(),
        refresh_ttl_secs = config.refresh_ttl.as_secs(),
        max_sessions_per_subject = config.max_sessions_per_subject,
        nonce_ttl_secs = config.nonce_ttl.as_secs(),
        "Session configuration loaded"
    );

    let db = DbManager::connect(&DbConfig::from_env())
        .await
        .context("failed to connect to SurrealDB")?;
    keystone_db::run_migrations(db.client())
        .await
        .context("failed to apply migrations")?;

    let nonces = Arc::new(NonceRegistry::from_config(&config));
    let repo = SurrealSessionRepository::new(db.client().clone());
    let sessions = Arc::new(SessionManager::new(repo, config)?);

    let scheduler = CleanupScheduler::spawn(Arc::clone(&nonces), Arc::clone(&sessions));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received");

    scheduler.shutdown().await;

    tracing::info!("Keystone server stopped.");
    Ok(())
}
