//! In-memory backend
//!
//! Behaves like a read-committed database with row-level locks:
//! - writes are staged in the scope and applied together on commit
//! - a row touched for update stays locked until commit/rollback, so a
//!   second scope updating the same row waits (and can deadlock if lock
//!   order is inconsistent, exactly like Postgres)
//! - unique keys (username, email, owner+currency) are locked on insert,
//!   so two scopes racing on the same key serialize
//! - ids come from one sequence and are burned on rollback
//!
//! Used by the integration tests and as a dev backend without Postgres.
//! The lock table only grows; it is not meant for long-running processes.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};

use super::error::StoreError;
use super::models::{
    Account, CreateAccountParams, CreateEntryParams, CreateTransferParams, CreateUserParams,
    CreateVerifyEmailParams, EnqueueTaskParams, Entry, ListAccountsParams, ListEntriesParams,
    ListTransfersParams, TaskRecord, Transfer, UpdateUserParams, UpdateVerifyEmailParams, User,
    VerifyEmail,
};
use super::querier::Querier;
use super::store::TxBackend;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum LockKey {
    Account(i64),
    OwnerCurrency(String, String),
    Username(String),
    Email(String),
    VerifyEmail(i64),
}

#[derive(Debug, Default, Clone)]
struct Tables {
    accounts: BTreeMap<i64, Account>,
    entries: BTreeMap<i64, Entry>,
    transfers: BTreeMap<i64, Transfer>,
    users: BTreeMap<String, User>,
    verify_emails: BTreeMap<i64, VerifyEmail>,
    tasks: BTreeMap<i64, TaskRecord>,
}

impl Tables {
    fn apply(&mut self, staged: Tables) {
        self.accounts.extend(staged.accounts);
        self.entries.extend(staged.entries);
        self.transfers.extend(staged.transfers);
        self.users.extend(staged.users);
        self.verify_emails.extend(staged.verify_emails);
        self.tasks.extend(staged.tasks);
    }
}

/// Committed rows overlaid with this scope's staged rows
fn merged<K: Ord + Clone, V: Clone>(
    committed: &BTreeMap<K, V>,
    staged: &BTreeMap<K, V>,
) -> BTreeMap<K, V> {
    let mut view = committed.clone();
    view.extend(staged.iter().map(|(k, v)| (k.clone(), v.clone())));
    view
}

fn page<T>(rows: impl Iterator<Item = T>, limit: i64, offset: i64) -> Vec<T> {
    rows.skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}

struct Shared {
    tables: Mutex<Tables>,
    locks: Mutex<HashMap<LockKey, Arc<RowLock<()>>>>,
    next_id: AtomicI64,
}

impl Shared {
    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn row_lock(&self, key: &LockKey) -> Arc<RowLock<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(RowLock::new(())))
            .clone()
    }
}

#[derive(Clone)]
pub struct MemoryBackend {
    shared: Arc<Shared>,
    fail_commit: Arc<AtomicBool>,
    fail_rollback: Arc<AtomicBool>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                tables: Mutex::new(Tables::default()),
                locks: Mutex::new(HashMap::new()),
                next_id: AtomicI64::new(1),
            }),
            fail_commit: Arc::new(AtomicBool::new(false)),
            fail_rollback: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Make the next commit fail (its writes are discarded)
    pub fn set_fail_commit(&self, fail: bool) {
        self.fail_commit.store(fail, Ordering::SeqCst);
    }

    /// Make the next rollback report failure (its writes are still discarded)
    pub fn set_fail_rollback(&self, fail: bool) {
        self.fail_rollback.store(fail, Ordering::SeqCst);
    }

    /// Committed outbox rows, oldest first
    pub fn tasks(&self) -> Vec<TaskRecord> {
        self.shared.tables().tasks.values().cloned().collect()
    }
}

/// Simulated lost connection during commit/rollback
fn injected_fault(what: &str) -> StoreError {
    StoreError::Storage(sqlx::Error::Io(std::io::Error::new(
        std::io::ErrorKind::ConnectionReset,
        format!("injected {} failure", what),
    )))
}

#[async_trait]
impl TxBackend for MemoryBackend {
    type Scope = MemoryScope;

    fn name(&self) -> &'static str {
        "memory"
    }

    async fn begin(&self) -> Result<MemoryScope, StoreError> {
        Ok(MemoryScope {
            shared: self.shared.clone(),
            held: HashMap::new(),
            staged: Tables::default(),
        })
    }

    async fn commit(&self, scope: MemoryScope) -> Result<(), StoreError> {
        if self.fail_commit.swap(false, Ordering::SeqCst) {
            return Err(injected_fault("commit"));
        }

        let MemoryScope {
            shared,
            held,
            staged,
        } = scope;
        shared.tables().apply(staged);
        // Row locks are released only after the writes are visible
        drop(held);
        Ok(())
    }

    async fn rollback(&self, scope: MemoryScope) -> Result<(), StoreError> {
        drop(scope);
        if self.fail_rollback.swap(false, Ordering::SeqCst) {
            return Err(injected_fault("rollback"));
        }
        Ok(())
    }
}

/// One open scope: held row locks plus staged writes
pub struct MemoryScope {
    shared: Arc<Shared>,
    held: HashMap<LockKey, OwnedMutexGuard<()>>,
    staged: Tables,
}

impl MemoryScope {
    async fn lock(&mut self, key: LockKey) {
        if self.held.contains_key(&key) {
            return;
        }
        let row_lock = self.shared.row_lock(&key);
        let guard = row_lock.lock_owned().await;
        self.held.insert(key, guard);
    }

    fn next_id(&self) -> i64 {
        self.shared.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn account(&self, id: i64) -> Option<Account> {
        if let Some(account) = self.staged.accounts.get(&id) {
            return Some(account.clone());
        }
        self.shared.tables().accounts.get(&id).cloned()
    }

    fn user(&self, username: &str) -> Option<User> {
        if let Some(user) = self.staged.users.get(username) {
            return Some(user.clone());
        }
        self.shared.tables().users.get(username).cloned()
    }

    fn email_taken(&self, email: &str, except: Option<&str>) -> bool {
        let tables = self.shared.tables();
        merged(&tables.users, &self.staged.users)
            .values()
            .any(|u| u.email == email && Some(u.username.as_str()) != except)
    }

    fn verify_email(&self, id: i64) -> Option<VerifyEmail> {
        if let Some(record) = self.staged.verify_emails.get(&id) {
            return Some(record.clone());
        }
        self.shared.tables().verify_emails.get(&id).cloned()
    }
}

#[async_trait]
impl Querier for MemoryScope {
    async fn create_account(&mut self, arg: CreateAccountParams) -> Result<Account, StoreError> {
        self.lock(LockKey::OwnerCurrency(arg.owner.clone(), arg.currency.clone()))
            .await;

        if self.user(&arg.owner).is_none() {
            return Err(StoreError::NotFound("user"));
        }
        let exists = {
            let tables = self.shared.tables();
            merged(&tables.accounts, &self.staged.accounts)
                .values()
                .any(|a| a.owner == arg.owner && a.currency == arg.currency)
        };
        if exists {
            return Err(StoreError::Conflict("owner_currency_key".to_string()));
        }

        let account = Account {
            id: self.next_id(),
            owner: arg.owner,
            balance: arg.balance,
            currency: arg.currency,
            created_at: Utc::now(),
        };
        self.staged.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn get_account(&mut self, id: i64) -> Result<Account, StoreError> {
        self.account(id).ok_or(StoreError::NotFound("account"))
    }

    async fn get_account_for_update(&mut self, id: i64) -> Result<Account, StoreError> {
        self.lock(LockKey::Account(id)).await;
        self.account(id).ok_or(StoreError::NotFound("account"))
    }

    async fn list_accounts(
        &mut self,
        arg: ListAccountsParams,
    ) -> Result<Vec<Account>, StoreError> {
        let view = {
            let tables = self.shared.tables();
            merged(&tables.accounts, &self.staged.accounts)
        };
        let rows = view.into_values().filter(|a| a.owner == arg.owner);
        Ok(page(rows, arg.limit, arg.offset))
    }

    async fn add_account_balance(&mut self, id: i64, delta: i64) -> Result<Account, StoreError> {
        self.lock(LockKey::Account(id)).await;

        let mut account = self.account(id).ok_or(StoreError::NotFound("account"))?;
        account.balance = account
            .balance
            .checked_add(delta)
            .ok_or_else(|| StoreError::InvalidData("bigint out of range".to_string()))?;
        self.staged.accounts.insert(id, account.clone());
        Ok(account)
    }

    async fn create_entry(&mut self, arg: CreateEntryParams) -> Result<Entry, StoreError> {
        if self.account(arg.account_id).is_none() {
            return Err(StoreError::NotFound("account"));
        }

        let entry = Entry {
            id: self.next_id(),
            account_id: arg.account_id,
            amount: arg.amount,
            created_at: Utc::now(),
        };
        self.staged.entries.insert(entry.id, entry.clone());
        Ok(entry)
    }

    async fn get_entry(&mut self, id: i64) -> Result<Entry, StoreError> {
        if let Some(entry) = self.staged.entries.get(&id) {
            return Ok(entry.clone());
        }
        self.shared
            .tables()
            .entries
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound("entry"))
    }

    async fn list_entries(&mut self, arg: ListEntriesParams) -> Result<Vec<Entry>, StoreError> {
        let view = {
            let tables = self.shared.tables();
            merged(&tables.entries, &self.staged.entries)
        };
        let rows = view.into_values().filter(|e| e.account_id == arg.account_id);
        Ok(page(rows, arg.limit, arg.offset))
    }

    async fn create_transfer(
        &mut self,
        arg: CreateTransferParams,
    ) -> Result<Transfer, StoreError> {
        if self.account(arg.from_account_id).is_none() || self.account(arg.to_account_id).is_none()
        {
            return Err(StoreError::NotFound("account"));
        }

        let transfer = Transfer {
            id: self.next_id(),
            from_account_id: arg.from_account_id,
            to_account_id: arg.to_account_id,
            amount: arg.amount,
            created_at: Utc::now(),
        };
        self.staged.transfers.insert(transfer.id, transfer.clone());
        Ok(transfer)
    }

    async fn get_transfer(&mut self, id: i64) -> Result<Transfer, StoreError> {
        if let Some(transfer) = self.staged.transfers.get(&id) {
            return Ok(transfer.clone());
        }
        self.shared
            .tables()
            .transfers
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound("transfer"))
    }

    async fn list_transfers(
        &mut self,
        arg: ListTransfersParams,
    ) -> Result<Vec<Transfer>, StoreError> {
        let view = {
            let tables = self.shared.tables();
            merged(&tables.transfers, &self.staged.transfers)
        };
        let rows = view.into_values().filter(|t| {
            t.from_account_id == arg.from_account_id || t.to_account_id == arg.to_account_id
        });
        Ok(page(rows, arg.limit, arg.offset))
    }

    async fn create_user(&mut self, arg: CreateUserParams) -> Result<User, StoreError> {
        self.lock(LockKey::Username(arg.username.clone())).await;
        self.lock(LockKey::Email(arg.email.clone())).await;

        if self.user(&arg.username).is_some() {
            return Err(StoreError::DuplicateUsername);
        }
        if self.email_taken(&arg.email, None) {
            return Err(StoreError::DuplicateEmail);
        }

        let now = Utc::now();
        let user = User {
            username: arg.username,
            hashed_password: arg.hashed_password,
            full_name: arg.full_name,
            email: arg.email,
            is_email_verified: false,
            password_changed_at: now,
            created_at: now,
        };
        self.staged.users.insert(user.username.clone(), user.clone());
        Ok(user)
    }

    async fn get_user(&mut self, username: &str) -> Result<User, StoreError> {
        self.user(username).ok_or(StoreError::NotFound("user"))
    }

    async fn update_user(&mut self, arg: UpdateUserParams) -> Result<User, StoreError> {
        self.lock(LockKey::Username(arg.username.clone())).await;
        if let Some(email) = &arg.email {
            self.lock(LockKey::Email(email.clone())).await;
            if self.email_taken(email, Some(&arg.username)) {
                return Err(StoreError::DuplicateEmail);
            }
        }

        let mut user = self.user(&arg.username).ok_or(StoreError::NotFound("user"))?;
        if let Some(hashed_password) = arg.hashed_password {
            user.hashed_password = hashed_password;
        }
        if let Some(changed_at) = arg.password_changed_at {
            user.password_changed_at = changed_at;
        }
        if let Some(full_name) = arg.full_name {
            user.full_name = full_name;
        }
        if let Some(email) = arg.email {
            user.email = email;
        }
        if let Some(verified) = arg.is_email_verified {
            user.is_email_verified = verified;
        }
        self.staged.users.insert(user.username.clone(), user.clone());
        Ok(user)
    }

    async fn create_verify_email(
        &mut self,
        arg: CreateVerifyEmailParams,
    ) -> Result<VerifyEmail, StoreError> {
        if self.user(&arg.username).is_none() {
            return Err(StoreError::NotFound("user"));
        }

        let record = VerifyEmail {
            id: self.next_id(),
            username: arg.username,
            email: arg.email,
            secret_code: arg.secret_code,
            is_used: false,
            created_at: Utc::now(),
            expired_at: arg.expired_at,
        };
        self.staged.verify_emails.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_verify_email(&mut self, id: i64) -> Result<VerifyEmail, StoreError> {
        self.verify_email(id)
            .ok_or(StoreError::NotFound("verify email"))
    }

    async fn update_verify_email(
        &mut self,
        arg: UpdateVerifyEmailParams,
    ) -> Result<Option<VerifyEmail>, StoreError> {
        self.lock(LockKey::VerifyEmail(arg.id)).await;

        let Some(mut record) = self.verify_email(arg.id) else {
            return Ok(None);
        };
        if record.secret_code != arg.secret_code || record.is_used || record.expired_at <= Utc::now()
        {
            return Ok(None);
        }

        record.is_used = true;
        self.staged.verify_emails.insert(record.id, record.clone());
        Ok(Some(record))
    }

    async fn enqueue_task(&mut self, arg: EnqueueTaskParams) -> Result<TaskRecord, StoreError> {
        let task = TaskRecord {
            id: self.next_id(),
            task_type: arg.task_type,
            payload: arg.payload,
            queue: arg.queue,
            max_retry: arg.max_retry,
            run_at: arg.run_at,
            created_at: Utc::now(),
        };
        self.staged.tasks.insert(task.id, task.clone());
        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn user_params(name: &str) -> CreateUserParams {
        CreateUserParams {
            username: name.to_string(),
            hashed_password: "hash".to_string(),
            full_name: "Test User".to_string(),
            email: format!("{}@example.com", name),
        }
    }

    #[tokio::test]
    async fn test_staged_writes_invisible_until_commit() {
        let backend = MemoryBackend::new();

        let mut scope = backend.begin().await.unwrap();
        scope.create_user(user_params("alice")).await.unwrap();

        let mut other = backend.begin().await.unwrap();
        assert!(matches!(
            other.get_user("alice").await,
            Err(StoreError::NotFound("user"))
        ));
        backend.rollback(other).await.unwrap();

        backend.commit(scope).await.unwrap();

        let mut after = backend.begin().await.unwrap();
        assert_eq!(after.get_user("alice").await.unwrap().username, "alice");
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let backend = MemoryBackend::new();

        let mut scope = backend.begin().await.unwrap();
        scope.create_user(user_params("bob")).await.unwrap();
        backend.rollback(scope).await.unwrap();

        let mut after = backend.begin().await.unwrap();
        assert!(after.get_user("bob").await.is_err());
    }

    #[tokio::test]
    async fn test_row_lock_blocks_second_writer() {
        let backend = MemoryBackend::new();

        let mut setup = backend.begin().await.unwrap();
        setup.create_user(user_params("carol")).await.unwrap();
        let account = setup
            .create_account(CreateAccountParams {
                owner: "carol".to_string(),
                balance: 100,
                currency: "USD".to_string(),
            })
            .await
            .unwrap();
        backend.commit(setup).await.unwrap();

        let mut first = backend.begin().await.unwrap();
        first.add_account_balance(account.id, -10).await.unwrap();

        let mut second = backend.begin().await.unwrap();
        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            second.add_account_balance(account.id, -10),
        )
        .await;
        assert!(blocked.is_err(), "second writer must wait for the row lock");

        backend.commit(first).await.unwrap();
        let updated = second.add_account_balance(account.id, -10).await.unwrap();
        assert_eq!(updated.balance, 80);
    }

    #[tokio::test]
    async fn test_duplicate_user_detected() {
        let backend = MemoryBackend::new();

        let mut scope = backend.begin().await.unwrap();
        scope.create_user(user_params("dave")).await.unwrap();
        backend.commit(scope).await.unwrap();

        let mut scope = backend.begin().await.unwrap();
        assert!(matches!(
            scope.create_user(user_params("dave")).await,
            Err(StoreError::DuplicateUsername)
        ));

        let mut same_email = user_params("dave2");
        same_email.email = "dave@example.com".to_string();
        assert!(matches!(
            scope.create_user(same_email).await,
            Err(StoreError::DuplicateEmail)
        ));
    }

    #[tokio::test]
    async fn test_balance_overflow_is_final() {
        let backend = MemoryBackend::new();

        let mut setup = backend.begin().await.unwrap();
        setup.create_user(user_params("erin")).await.unwrap();
        let account = setup
            .create_account(CreateAccountParams {
                owner: "erin".to_string(),
                balance: i64::MAX - 5,
                currency: "USD".to_string(),
            })
            .await
            .unwrap();
        backend.commit(setup).await.unwrap();

        let mut scope = backend.begin().await.unwrap();
        let err = scope.add_account_balance(account.id, 10).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidData(_)));
        assert!(!err.is_retryable());
        backend.rollback(scope).await.unwrap();

        let mut after = backend.begin().await.unwrap();
        assert_eq!(after.get_account(account.id).await.unwrap().balance, i64::MAX - 5);
    }

    #[tokio::test]
    async fn test_injected_commit_fault_is_retryable() {
        let backend = MemoryBackend::new();
        backend.set_fail_commit(true);

        let mut scope = backend.begin().await.unwrap();
        scope.create_user(user_params("frank")).await.unwrap();
        let err = backend.commit(scope).await.unwrap_err();
        assert!(err.is_retryable());

        let mut after = backend.begin().await.unwrap();
        assert!(after.get_user("frank").await.is_err());
    }

    #[tokio::test]
    async fn test_entry_requires_account() {
        let backend = MemoryBackend::new();
        let mut scope = backend.begin().await.unwrap();

        let result = scope
            .create_entry(CreateEntryParams {
                account_id: 404,
                amount: 1,
            })
            .await;
        assert!(matches!(result, Err(StoreError::NotFound("account"))));
    }
}
