//! Shared fixtures for integration tests (in-memory backend)

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use simple_bank::db::{
    Account, AfterCreateUser, CreateAccountParams, CreateUserParams, CreateUserTxParams,
    MemoryBackend, Querier, Store, User,
};
use simple_bank::util::random_string;

pub type MemStore = Store<MemoryBackend>;

pub fn new_store() -> MemStore {
    Store::new(MemoryBackend::new())
}

/// Hook that counts calls and optionally fails
#[derive(Default)]
pub struct RecordingHook {
    pub calls: AtomicUsize,
    pub fail: bool,
}

impl RecordingHook {
    pub fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AfterCreateUser for RecordingHook {
    async fn after_create(&self, _q: &mut dyn Querier, _user: &User) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("task queue unavailable");
        }
        Ok(())
    }
}

pub fn random_user_params() -> CreateUserParams {
    let username = random_string(8).to_lowercase();
    CreateUserParams {
        email: format!("{}@example.com", username),
        username,
        hashed_password: "hashed".to_string(),
        full_name: "Test Owner".to_string(),
    }
}

pub async fn create_random_user(store: &MemStore) -> User {
    store
        .create_user_tx(CreateUserTxParams {
            user: random_user_params(),
            after_create: Arc::new(RecordingHook::default()),
        })
        .await
        .expect("create user")
        .user
}

pub async fn create_account(store: &MemStore, balance: i64, currency: &str) -> Account {
    let owner = create_random_user(store).await;
    let arg = CreateAccountParams {
        owner: owner.username,
        balance,
        currency: currency.to_string(),
    };
    store
        .exec_tx(move |q| q.create_account(arg))
        .await
        .expect("create account")
}
