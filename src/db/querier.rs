//! Row Accessor Set
//!
//! Single-row reads and writes, each one round-trip. A `Querier` is always
//! bound to one atomic scope; obtain one through `TxBackend::begin`.
//!
//! Missing rows surface as `StoreError::NotFound`, unique index hits as
//! `DuplicateUsername` / `DuplicateEmail` / `Conflict`. Anything else is
//! `StoreError::Storage`.

use async_trait::async_trait;

use super::error::StoreError;
use super::models::{
    Account, CreateAccountParams, CreateEntryParams, CreateTransferParams, CreateUserParams,
    CreateVerifyEmailParams, EnqueueTaskParams, Entry, ListAccountsParams, ListEntriesParams,
    ListTransfersParams, TaskRecord, Transfer, UpdateUserParams, UpdateVerifyEmailParams, User,
    VerifyEmail,
};

#[async_trait]
pub trait Querier: Send {
    // === Accounts ===
    async fn create_account(&mut self, arg: CreateAccountParams) -> Result<Account, StoreError>;

    async fn get_account(&mut self, id: i64) -> Result<Account, StoreError>;

    /// Read and row-lock until the end of the scope
    async fn get_account_for_update(&mut self, id: i64) -> Result<Account, StoreError>;

    async fn list_accounts(&mut self, arg: ListAccountsParams)
    -> Result<Vec<Account>, StoreError>;

    /// `balance = balance + delta` as one statement; returns the updated row
    async fn add_account_balance(&mut self, id: i64, delta: i64) -> Result<Account, StoreError>;

    // === Ledger ===
    async fn create_entry(&mut self, arg: CreateEntryParams) -> Result<Entry, StoreError>;

    async fn get_entry(&mut self, id: i64) -> Result<Entry, StoreError>;

    async fn list_entries(&mut self, arg: ListEntriesParams) -> Result<Vec<Entry>, StoreError>;

    async fn create_transfer(&mut self, arg: CreateTransferParams)
    -> Result<Transfer, StoreError>;

    async fn get_transfer(&mut self, id: i64) -> Result<Transfer, StoreError>;

    async fn list_transfers(
        &mut self,
        arg: ListTransfersParams,
    ) -> Result<Vec<Transfer>, StoreError>;

    // === Users ===
    async fn create_user(&mut self, arg: CreateUserParams) -> Result<User, StoreError>;

    async fn get_user(&mut self, username: &str) -> Result<User, StoreError>;

    async fn update_user(&mut self, arg: UpdateUserParams) -> Result<User, StoreError>;

    // === Email Verification ===
    async fn create_verify_email(
        &mut self,
        arg: CreateVerifyEmailParams,
    ) -> Result<VerifyEmail, StoreError>;

    async fn get_verify_email(&mut self, id: i64) -> Result<VerifyEmail, StoreError>;

    /// Mark used iff id and code match, unused and not expired.
    ///
    /// `Ok(None)` when no row qualified.
    async fn update_verify_email(
        &mut self,
        arg: UpdateVerifyEmailParams,
    ) -> Result<Option<VerifyEmail>, StoreError>;

    // === Outbox ===
    async fn enqueue_task(&mut self, arg: EnqueueTaskParams) -> Result<TaskRecord, StoreError>;
}
