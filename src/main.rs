//! Simple Bank server bootstrap
//!
//! ```text
//! config/<env>.yaml ──▶ logging ──▶ PostgreSQL pool ──▶ migrations
//!                                        │
//!                                        ▼
//!                      SqlStore + OutboxDistributor ──▶ BankService
//! ```
//!
//! The transport (gRPC / HTTP gateway) mounts on `BankService`; this binary
//! brings the core up and holds it until Ctrl-C.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use simple_bank::{AppConfig, BankService, Database, OutboxDistributor, TxBackend, logging};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let config = AppConfig::load(&env)?;
    let _guard = logging::init_logging(&config);

    info!(env = %env, "Starting simple_bank");

    let db = Database::connect(&config.postgres_url, config.db_max_connections)
        .await
        .context("cannot connect to db")?;
    db.health_check().await.context("database health check failed")?;
    db.migrate().await.context("cannot run migrations")?;

    let mut store = db.store();
    if let Some(timeout) = config.tx_timeout() {
        store = store.with_tx_timeout(timeout);
    }

    let service = BankService::new(config, Arc::new(store), Arc::new(OutboxDistributor))
        .context("cannot create service")?;
    info!(
        backend = service.store().backend().name(),
        "Bank service ready"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    Ok(())
}
