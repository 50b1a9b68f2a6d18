//! Access tokens
//!
//! [`Maker`] is the capability the service layer consumes; [`JwtMaker`] is
//! the HS256 implementation.

pub mod jwt;

pub use jwt::JwtMaker;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Token has expired")]
    Expired,

    #[error("Token is invalid")]
    Invalid,

    #[error("Invalid key size: must be at least {min} characters")]
    InvalidKeySize { min: usize },

    #[error("Failed to sign token: {0}")]
    Signing(String),
}

/// Data carried inside a token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub id: Uuid,
    pub username: String,
    pub issued_at: DateTime<Utc>,
    pub expired_at: DateTime<Utc>,
}

impl Payload {
    pub fn new(username: &str, duration: Duration) -> Result<Self, TokenError> {
        let issued_at = Utc::now();
        let ttl = chrono::Duration::from_std(duration)
            .map_err(|e| TokenError::Signing(e.to_string()))?;
        Ok(Self {
            id: Uuid::new_v4(),
            username: username.to_string(),
            issued_at,
            expired_at: issued_at + ttl,
        })
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expired_at
    }
}

/// Issues and checks signed, time-bounded identity tokens
pub trait Maker: Send + Sync {
    fn create_token(&self, username: &str, duration: Duration)
    -> Result<(String, Payload), TokenError>;

    fn verify_token(&self, token: &str) -> Result<Payload, TokenError>;
}
