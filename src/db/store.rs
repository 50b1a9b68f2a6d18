//! Transaction Executor
//!
//! `Store::exec_tx` opens one atomic scope, hands the scoped accessors to a
//! unit of work, then commits on `Ok` and rolls back on `Err`.
//!
//! # Guarantees
//!
//! 1. **All-or-nothing**: writes made through the scoped `Querier` become
//!    visible together on commit, or not at all.
//! 2. **Rollback never hides the cause**: if rollback fails too, the caller
//!    gets `StoreError::Rollback` carrying both errors.
//! 3. **Commit failure wins**: a unit of work that succeeded but could not
//!    commit is reported as failed.
//! 4. **Deadline**: with `with_tx_timeout`, a hung unit of work is abandoned
//!    and its scope rolled back.

use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::{debug, error};

use super::error::StoreError;
use super::models::{Account, User, VerifyEmail};
use super::querier::Querier;

/// Factory for atomic scopes
///
/// `begin` returns the scoped Row Accessor Set. The scope is consumed by
/// exactly one of `commit` or `rollback`; dropping it without either must
/// discard its writes.
#[async_trait]
pub trait TxBackend: Send + Sync {
    type Scope: Querier + 'static;

    /// Backend name for logging
    fn name(&self) -> &'static str;

    async fn begin(&self) -> Result<Self::Scope, StoreError>;

    async fn commit(&self, scope: Self::Scope) -> Result<(), StoreError>;

    async fn rollback(&self, scope: Self::Scope) -> Result<(), StoreError>;
}

/// Store: transaction executor plus the orchestrators built on it
pub struct Store<B: TxBackend> {
    backend: B,
    tx_timeout: Option<Duration>,
}

impl<B: TxBackend> Store<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            tx_timeout: None,
        }
    }

    /// Abort any unit of work running longer than `timeout`
    pub fn with_tx_timeout(mut self, timeout: Duration) -> Self {
        self.tx_timeout = Some(timeout);
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Run `unit_of_work` inside one atomic scope.
    ///
    /// ```ignore
    /// let account = store
    ///     .exec_tx(move |q| Box::pin(async move { q.add_account_balance(id, 10).await }))
    ///     .await?;
    /// ```
    pub async fn exec_tx<T, F>(&self, unit_of_work: F) -> Result<T, StoreError>
    where
        T: Send,
        F: for<'q> FnOnce(&'q mut dyn Querier) -> BoxFuture<'q, Result<T, StoreError>> + Send,
    {
        let mut scope = self.backend.begin().await?;
        debug!(backend = self.backend.name(), "Scope opened");

        let outcome = {
            let work = unit_of_work(&mut scope);
            match self.tx_timeout {
                Some(limit) => match tokio::time::timeout(limit, work).await {
                    Ok(result) => result,
                    Err(_) => Err(StoreError::Timeout(limit)),
                },
                None => work.await,
            }
        };

        match outcome {
            Ok(value) => {
                self.backend.commit(scope).await?;
                debug!(backend = self.backend.name(), "Scope committed");
                Ok(value)
            }
            Err(err) => match self.backend.rollback(scope).await {
                Ok(()) => {
                    debug!(backend = self.backend.name(), error = %err, "Scope rolled back");
                    Err(err)
                }
                Err(rollback_err) => {
                    error!(
                        backend = self.backend.name(),
                        error = %err,
                        rollback_error = %rollback_err,
                        "Rollback failed"
                    );
                    Err(StoreError::Rollback {
                        source: Box::new(err),
                        rollback: Box::new(rollback_err),
                    })
                }
            },
        }
    }

    // === Single-statement reads ===

    pub async fn get_account(&self, id: i64) -> Result<Account, StoreError> {
        self.exec_tx(move |q| q.get_account(id)).await
    }

    pub async fn get_user(&self, username: &str) -> Result<User, StoreError> {
        let username = username.to_string();
        self.exec_tx(move |q| Box::pin(async move { q.get_user(&username).await }))
            .await
    }

    pub async fn get_verify_email(&self, id: i64) -> Result<VerifyEmail, StoreError> {
        self.exec_tx(move |q| q.get_verify_email(id)).await
    }
}
