//! Transports: where planned messages get submitted.
//!
//! The engine composes and tracks; it does not execute. Execution happens
//! wherever the [`Transport`] delivers messages, normally an external broker
//! feeding a worker pool. [`LocalTransport`] runs that loop in-process,
//! which is enough for local development and for the integration tests.

pub mod local;

pub use local::{LocalTransport, WorkerHandle};

use async_trait::async_trait;

use crate::error::TaskError;
use crate::message::TaskMessage;

/// Submission surface of a broker.
///
/// Exactly one `submit` happens per planned message. Ids are assigned at
/// planning time, so implementations deliver the message as-is and echo
/// `message.id` back. A submission fault is fatal for the dispatch that
/// caused it: it surfaces as [`TaskError::Transport`] immediately and is
/// never retried by this layer.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Delivers `message` to its queue; returns the task id.
    async fn submit(&self, message: TaskMessage) -> Result<String, TaskError>;
}
