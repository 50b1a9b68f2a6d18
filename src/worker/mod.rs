//! Task enqueue contract
//!
//! Only scheduling lives here: tasks are written to the `tasks` outbox in the
//! caller's atomic scope. Draining and executing them is the background
//! worker's job.

pub mod distributor;
pub mod task;

pub use distributor::{OutboxDistributor, TaskDistributor};
pub use task::{
    PayloadSendVerifyEmail, QUEUE_CRITICAL, QUEUE_DEFAULT, SendVerifyEmail,
    TASK_SEND_VERIFY_EMAIL, TaskOptions,
};
