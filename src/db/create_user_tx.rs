//! User creation with transactional outbox
//!
//! The user row and the follow-up task (e.g. send verification email) are
//! scheduled in the same atomic scope. If the hook cannot schedule its task
//! the user row is rolled back with it: no user without a verification path,
//! and no task for a user that never committed.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::error::StoreError;
use super::models::{CreateUserParams, User};
use super::querier::Querier;
use super::store::{Store, TxBackend};

/// Side effect run right after the user row is written
///
/// `q` is bound to the same scope as the new user row. A dispatcher that can
/// enqueue transactionally writes through it; one that cannot is best-effort
/// and may fire for a user whose scope later fails to commit.
#[async_trait]
pub trait AfterCreateUser: Send + Sync {
    async fn after_create(&self, q: &mut dyn Querier, user: &User) -> anyhow::Result<()>;
}

pub struct CreateUserTxParams {
    pub user: CreateUserParams,
    pub after_create: Arc<dyn AfterCreateUser>,
}

#[derive(Debug, Clone)]
pub struct CreateUserTxResult {
    pub user: User,
}

impl<B: TxBackend> Store<B> {
    pub async fn create_user_tx(
        &self,
        arg: CreateUserTxParams,
    ) -> Result<CreateUserTxResult, StoreError> {
        let username = arg.user.username.clone();

        let result = self
            .exec_tx(move |q| {
                Box::pin(async move {
                    let user = q.create_user(arg.user).await?;
                    arg.after_create
                        .after_create(q, &user)
                        .await
                        .map_err(StoreError::OutboxEnqueueFailed)?;
                    Ok(CreateUserTxResult { user })
                })
            })
            .await;

        match &result {
            Ok(_) => info!(username = %username, "User created"),
            Err(e) => warn!(username = %username, error = %e, "User creation rolled back"),
        }
        result
    }
}
