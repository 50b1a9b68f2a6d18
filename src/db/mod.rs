//! Storage layer
//!
//! - [`Database`] owns the PostgreSQL pool
//! - [`Querier`] is the Row Accessor Set, one implementation per backend
//! - [`Store`] runs units of work atomically and hosts the orchestrators
//!   ([`Store::transfer_tx`], [`Store::create_user_tx`], [`Store::verify_email_tx`])

pub mod create_user_tx;
pub mod error;
pub mod memory;
pub mod models;
pub mod pg;
pub mod querier;
pub mod store;
pub mod transfer_tx;
pub mod verify_email_tx;

pub use create_user_tx::{AfterCreateUser, CreateUserTxParams, CreateUserTxResult};
pub use error::{ErrorKind, StoreError};
pub use memory::MemoryBackend;
pub use models::*;
pub use pg::PgBackend;
pub use querier::Querier;
pub use store::{Store, TxBackend};
pub use transfer_tx::{TransferTxParams, TransferTxResult};
pub use verify_email_tx::{VerifyEmailTxParams, VerifyEmailTxResult};

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

/// Postgres-backed store
pub type SqlStore = Store<PgBackend>;

/// PostgreSQL database connection pool
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        tracing::info!(max_connections, "PostgreSQL connection pool established");
        Ok(Self { pool })
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health
    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Apply pending schema migrations from `migrations/`
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("Database migrations applied");
        Ok(())
    }

    /// Build a store over this pool
    pub fn store(&self) -> SqlStore {
        Store::new(PgBackend::new(self.pool.clone()))
    }
}
