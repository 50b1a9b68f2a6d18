//! Simple Bank - transactional core of a banking backend
//!
//! Money moves and user lifecycle writes run inside atomic scopes with a
//! fixed row-lock order, so concurrent transfers never deadlock and callers
//! never observe half a transfer.
//!
//! # Modules
//!
//! - [`db`] - Row accessors, transaction executor, transfer / user / verify orchestrators
//! - [`worker`] - Task enqueue contract (transactional outbox)
//! - [`token`] - Access token issuing and verification
//! - [`service`] - Request validation and authorization in front of the store
//! - [`util`] - Currencies, password hashing, random codes
//! - [`config`] - YAML configuration
//! - [`logging`] - tracing subscriber setup

pub mod config;
pub mod db;
pub mod logging;
pub mod service;
pub mod token;
pub mod util;
pub mod worker;

// Convenient re-exports at crate root
pub use config::AppConfig;
pub use db::{
    Database, ErrorKind, MemoryBackend, PgBackend, Querier, SqlStore, Store, StoreError,
    TxBackend,
};
pub use service::{BankService, ServiceError};
pub use token::{JwtMaker, Maker, Payload, TokenError};
pub use worker::{OutboxDistributor, SendVerifyEmail, TaskDistributor, TaskOptions};
