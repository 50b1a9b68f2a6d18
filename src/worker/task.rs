use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::distributor::TaskDistributor;
use crate::config::TaskConfig;
use crate::db::{AfterCreateUser, Querier, User};

pub const TASK_SEND_VERIFY_EMAIL: &str = "task:send_verify_email";

pub const QUEUE_CRITICAL: &str = "critical";
pub const QUEUE_DEFAULT: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOptions {
    /// Earliest processing time, relative to enqueue
    pub delay: Duration,
    pub queue: String,
    pub max_retry: i32,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            delay: Duration::ZERO,
            queue: QUEUE_DEFAULT.to_string(),
            max_retry: 25,
        }
    }
}

impl From<&TaskConfig> for TaskOptions {
    fn from(config: &TaskConfig) -> Self {
        Self {
            delay: Duration::from_secs(config.delay_secs),
            queue: config.queue.clone(),
            max_retry: config.max_retry,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadSendVerifyEmail {
    pub username: String,
}

/// Outbox hook: schedule the verification email for a new user
pub struct SendVerifyEmail {
    distributor: Arc<dyn TaskDistributor>,
    options: TaskOptions,
}

impl SendVerifyEmail {
    pub fn new(distributor: Arc<dyn TaskDistributor>, options: TaskOptions) -> Self {
        Self {
            distributor,
            options,
        }
    }
}

#[async_trait]
impl AfterCreateUser for SendVerifyEmail {
    async fn after_create(&self, q: &mut dyn Querier, user: &User) -> anyhow::Result<()> {
        let payload = serde_json::to_value(PayloadSendVerifyEmail {
            username: user.username.clone(),
        })?;

        self.distributor
            .enqueue(q, TASK_SEND_VERIFY_EMAIL, payload, &self.options)
            .await?;

        info!(
            task_type = TASK_SEND_VERIFY_EMAIL,
            username = %user.username,
            queue = %self.options.queue,
            max_retry = self.options.max_retry,
            "Enqueued task"
        );
        Ok(())
    }
}
