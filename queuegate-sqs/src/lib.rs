//! SQS declarations for queuegate
//!
//! Declares a queue with:
//! - Visibility timeout, retention, long-poll wait and delivery delay
//! - Optional FIFO ordering
//! - Send and consume grants into an IAM role's default policy

mod queue;

pub use queue::{Queue, QueueProps, SqsError, CONSUME_ACTIONS, SEND_ACTIONS};
