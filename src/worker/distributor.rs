use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use super::task::TaskOptions;
use crate::db::{EnqueueTaskParams, Querier};

/// Schedules a task for the background worker
///
/// `q` is the caller's open scope. Implementations that write through it are
/// transactional: the task exists iff the scope commits.
#[async_trait]
pub trait TaskDistributor: Send + Sync {
    async fn enqueue(
        &self,
        q: &mut dyn Querier,
        task_type: &str,
        payload: serde_json::Value,
        opts: &TaskOptions,
    ) -> anyhow::Result<()>;
}

/// Writes tasks into the `tasks` table of the current scope
#[derive(Debug, Default, Clone, Copy)]
pub struct OutboxDistributor;

#[async_trait]
impl TaskDistributor for OutboxDistributor {
    async fn enqueue(
        &self,
        q: &mut dyn Querier,
        task_type: &str,
        payload: serde_json::Value,
        opts: &TaskOptions,
    ) -> anyhow::Result<()> {
        let delay = chrono::Duration::from_std(opts.delay).context("Task delay out of range")?;

        let task = q
            .enqueue_task(EnqueueTaskParams {
                task_type: task_type.to_string(),
                payload,
                queue: opts.queue.clone(),
                max_retry: opts.max_retry,
                run_at: Utc::now() + delay,
            })
            .await
            .context("Failed to write outbox row")?;

        debug!(task_id = task.id, task_type, queue = %task.queue, "Outbox row written");
        Ok(())
    }
}
