//! PostgreSQL backend
//!
//! Each scope is a `sqlx::Transaction`. Balance updates are a single
//! `UPDATE ... SET balance = balance + $2`, which takes the row lock that
//! makes the transfer lock ordering meaningful.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use super::error::StoreError;
use super::models::{
    Account, CreateAccountParams, CreateEntryParams, CreateTransferParams, CreateUserParams,
    CreateVerifyEmailParams, EnqueueTaskParams, Entry, ListAccountsParams, ListEntriesParams,
    ListTransfersParams, TaskRecord, Transfer, UpdateUserParams, UpdateVerifyEmailParams, User,
    VerifyEmail,
};
use super::querier::Querier;
use super::store::TxBackend;

const ACCOUNT_COLUMNS: &str = "id, owner, balance, currency, created_at";
const USER_COLUMNS: &str =
    "username, hashed_password, full_name, email, is_email_verified, password_changed_at, created_at";
const VERIFY_EMAIL_COLUMNS: &str =
    "id, username, email, secret_code, is_used, created_at, expired_at";

pub struct PgBackend {
    pool: PgPool,
}

impl PgBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TxBackend for PgBackend {
    type Scope = PgQueries;

    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn begin(&self) -> Result<PgQueries, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(PgQueries { tx })
    }

    async fn commit(&self, scope: PgQueries) -> Result<(), StoreError> {
        scope.tx.commit().await?;
        Ok(())
    }

    async fn rollback(&self, scope: PgQueries) -> Result<(), StoreError> {
        scope.tx.rollback().await?;
        Ok(())
    }
}

/// Row accessors bound to one open transaction
pub struct PgQueries {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl Querier for PgQueries {
    async fn create_account(&mut self, arg: CreateAccountParams) -> Result<Account, StoreError> {
        sqlx::query_as::<_, Account>(&format!(
            "INSERT INTO accounts (owner, balance, currency) VALUES ($1, $2, $3) \
             RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(&arg.owner)
        .bind(arg.balance)
        .bind(&arg.currency)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| StoreError::from_sqlx(e, "user"))
    }

    async fn get_account(&mut self, id: i64) -> Result<Account, StoreError> {
        sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1"
        ))
        .bind(id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| StoreError::from_sqlx(e, "account"))
    }

    async fn get_account_for_update(&mut self, id: i64) -> Result<Account, StoreError> {
        sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1 FOR NO KEY UPDATE"
        ))
        .bind(id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| StoreError::from_sqlx(e, "account"))
    }

    async fn list_accounts(
        &mut self,
        arg: ListAccountsParams,
    ) -> Result<Vec<Account>, StoreError> {
        let rows = sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE owner = $1 \
             ORDER BY id LIMIT $2 OFFSET $3"
        ))
        .bind(&arg.owner)
        .bind(arg.limit)
        .bind(arg.offset)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| StoreError::from_sqlx(e, "account"))?;

        Ok(rows)
    }

    async fn add_account_balance(&mut self, id: i64, delta: i64) -> Result<Account, StoreError> {
        sqlx::query_as::<_, Account>(&format!(
            "UPDATE accounts SET balance = balance + $2 WHERE id = $1 \
             RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(id)
        .bind(delta)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| StoreError::from_sqlx(e, "account"))
    }

    async fn create_entry(&mut self, arg: CreateEntryParams) -> Result<Entry, StoreError> {
        sqlx::query_as::<_, Entry>(
            "INSERT INTO entries (account_id, amount) VALUES ($1, $2) \
             RETURNING id, account_id, amount, created_at",
        )
        .bind(arg.account_id)
        .bind(arg.amount)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| StoreError::from_sqlx(e, "account"))
    }

    async fn get_entry(&mut self, id: i64) -> Result<Entry, StoreError> {
        sqlx::query_as::<_, Entry>(
            "SELECT id, account_id, amount, created_at FROM entries WHERE id = $1",
        )
        .bind(id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| StoreError::from_sqlx(e, "entry"))
    }

    async fn list_entries(&mut self, arg: ListEntriesParams) -> Result<Vec<Entry>, StoreError> {
        let rows = sqlx::query_as::<_, Entry>(
            "SELECT id, account_id, amount, created_at FROM entries \
             WHERE account_id = $1 ORDER BY id LIMIT $2 OFFSET $3",
        )
        .bind(arg.account_id)
        .bind(arg.limit)
        .bind(arg.offset)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| StoreError::from_sqlx(e, "entry"))?;

        Ok(rows)
    }

    async fn create_transfer(
        &mut self,
        arg: CreateTransferParams,
    ) -> Result<Transfer, StoreError> {
        sqlx::query_as::<_, Transfer>(
            "INSERT INTO transfers (from_account_id, to_account_id, amount) VALUES ($1, $2, $3) \
             RETURNING id, from_account_id, to_account_id, amount, created_at",
        )
        .bind(arg.from_account_id)
        .bind(arg.to_account_id)
        .bind(arg.amount)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| StoreError::from_sqlx(e, "account"))
    }

    async fn get_transfer(&mut self, id: i64) -> Result<Transfer, StoreError> {
        sqlx::query_as::<_, Transfer>(
            "SELECT id, from_account_id, to_account_id, amount, created_at \
             FROM transfers WHERE id = $1",
        )
        .bind(id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| StoreError::from_sqlx(e, "transfer"))
    }

    async fn list_transfers(
        &mut self,
        arg: ListTransfersParams,
    ) -> Result<Vec<Transfer>, StoreError> {
        let rows = sqlx::query_as::<_, Transfer>(
            "SELECT id, from_account_id, to_account_id, amount, created_at FROM transfers \
             WHERE from_account_id = $1 OR to_account_id = $2 \
             ORDER BY id LIMIT $3 OFFSET $4",
        )
        .bind(arg.from_account_id)
        .bind(arg.to_account_id)
        .bind(arg.limit)
        .bind(arg.offset)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| StoreError::from_sqlx(e, "transfer"))?;

        Ok(rows)
    }

    async fn create_user(&mut self, arg: CreateUserParams) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (username, hashed_password, full_name, email) \
             VALUES ($1, $2, $3, $4) RETURNING {USER_COLUMNS}"
        ))
        .bind(&arg.username)
        .bind(&arg.hashed_password)
        .bind(&arg.full_name)
        .bind(&arg.email)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| StoreError::from_sqlx(e, "user"))
    }

    async fn get_user(&mut self, username: &str) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| StoreError::from_sqlx(e, "user"))
    }

    async fn update_user(&mut self, arg: UpdateUserParams) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET \
                hashed_password = COALESCE($2, hashed_password), \
                password_changed_at = COALESCE($3, password_changed_at), \
                full_name = COALESCE($4, full_name), \
                email = COALESCE($5, email), \
                is_email_verified = COALESCE($6, is_email_verified) \
             WHERE username = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(&arg.username)
        .bind(arg.hashed_password.as_deref())
        .bind(arg.password_changed_at)
        .bind(arg.full_name.as_deref())
        .bind(arg.email.as_deref())
        .bind(arg.is_email_verified)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| StoreError::from_sqlx(e, "user"))
    }

    async fn create_verify_email(
        &mut self,
        arg: CreateVerifyEmailParams,
    ) -> Result<VerifyEmail, StoreError> {
        sqlx::query_as::<_, VerifyEmail>(&format!(
            "INSERT INTO verify_emails (username, email, secret_code, expired_at) \
             VALUES ($1, $2, $3, $4) RETURNING {VERIFY_EMAIL_COLUMNS}"
        ))
        .bind(&arg.username)
        .bind(&arg.email)
        .bind(&arg.secret_code)
        .bind(arg.expired_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| StoreError::from_sqlx(e, "user"))
    }

    async fn get_verify_email(&mut self, id: i64) -> Result<VerifyEmail, StoreError> {
        sqlx::query_as::<_, VerifyEmail>(&format!(
            "SELECT {VERIFY_EMAIL_COLUMNS} FROM verify_emails WHERE id = $1"
        ))
        .bind(id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| StoreError::from_sqlx(e, "verify email"))
    }

    async fn update_verify_email(
        &mut self,
        arg: UpdateVerifyEmailParams,
    ) -> Result<Option<VerifyEmail>, StoreError> {
        let row = sqlx::query_as::<_, VerifyEmail>(&format!(
            "UPDATE verify_emails SET is_used = TRUE \
             WHERE id = $1 AND secret_code = $2 AND is_used = FALSE AND expired_at > NOW() \
             RETURNING {VERIFY_EMAIL_COLUMNS}"
        ))
        .bind(arg.id)
        .bind(&arg.secret_code)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| StoreError::from_sqlx(e, "verify email"))?;

        Ok(row)
    }

    async fn enqueue_task(&mut self, arg: EnqueueTaskParams) -> Result<TaskRecord, StoreError> {
        let row = sqlx::query_as::<_, TaskRecord>(
            "INSERT INTO tasks (task_type, payload, queue, max_retry, run_at) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, task_type, payload, queue, max_retry, run_at, created_at",
        )
        .bind(&arg.task_type)
        .bind(&arg.payload)
        .bind(&arg.queue)
        .bind(arg.max_retry)
        .bind(arg.run_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| StoreError::from_sqlx(e, "task"))?;

        Ok(row)
    }
}
