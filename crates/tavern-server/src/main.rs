//! # tavern-server
//!
//! The Tavern economy service.
//!
//! This binary provides:
//! - **Ledger API** (axum) for earn/spend/transfer flows, wallet balances,
//!   and transaction history
//! - **XP/rank API** for activity-driven progression with weekly caps
//! - **Bot scheduler** firing ticks on a timer so active bots generate
//!   capped, treasury-funded engagement
//! - **Admin API** (bearer token) for treasury refills, wallet drains, bot
//!   management, and manual ticks
//! - **Idempotency-record GC** so replay keys age out after their
//!   retention window

mod api;
mod audit;
mod config;
mod error;

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tavern_bots::{BotRegistry, BotScheduler};
use tavern_economy::{LedgerEngine, RankAccumulator};
use tavern_store::Database;

use crate::api::AppState;
use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tavern_server=debug")),
        )
        .init();

    info!("Starting Tavern economy server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");
    info!(
        instance = %config.instance_name,
        bot_ticks_enabled = config.bot_ticks_enabled,
        admin_enabled = config.admin_token.is_some(),
        "Instance settings"
    );

    // -----------------------------------------------------------------------
    // 3. Open the database and wire up the economy core
    // -----------------------------------------------------------------------
    let database = match &config.db_path {
        Some(path) => Database::open_at(path)?,
        None => Database::new()?,
    };
    let db = Arc::new(Mutex::new(database));

    let engine = LedgerEngine::new(db.clone());
    let ranks = RankAccumulator::new(db.clone(), config.weekly_xp_cap);
    let registry = BotRegistry::new(db.clone());
    let scheduler = BotScheduler::new(db.clone(), engine.clone(), config.bot_config());

    let app_state = AppState {
        db: db.clone(),
        engine,
        ranks,
        registry,
        scheduler: scheduler.clone(),
        config: Arc::new(config.clone()),
    };

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Scheduled bot ticks.
    if config.bot_ticks_enabled {
        let tick_scheduler = scheduler.clone();
        let interval_secs = config.tick_interval_secs;
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(interval_secs));
            // The first tick fires immediately; skip it so a fresh deploy
            // does not act before the platform has synced any content.
            interval.tick().await;
            loop {
                interval.tick().await;
                tick_scheduler.tick().await;
            }
        });
    }

    // Idempotency-record GC (every 6 hours).
    let gc_db = db.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(6 * 3600));
        loop {
            interval.tick().await;
            let mut db = gc_db.lock().await;
            if let Err(e) = db.purge_expired_idempotency(chrono::Utc::now()) {
                tracing::warn!(error = %e, "idempotency GC failed");
            }
        }
    });

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    // tokio::select! ensures that if either the HTTP server or a shutdown
    // signal arrives, we exit cleanly.
    let http_addr = config.http_addr;
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
