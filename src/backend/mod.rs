//! Result backends: shared storage for task state and outcomes.
//!
//! The backend is a deliberately dumb key-value surface
//! ([`ResultBackend`]): read, write, and delete one [`TaskMeta`] per task
//! id. All result-tracking rules (implicit `PENDING`, transition
//! validation, expiry) live one layer up in [`ResultStore`], so every
//! backend behaves identically.
//!
//! [`InMemoryBackend`] ships by default and backs the local transport and
//! the test suites. `RedisBackend` is available behind the `redis` feature
//! for state shared across processes.

mod memory;
#[cfg(feature = "redis")]
mod redis;
mod store;

pub use memory::InMemoryBackend;
#[cfg(feature = "redis")]
pub use redis::RedisBackend;
pub use store::ResultStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorInfo, TaskError};
use crate::state::TaskState;

/// Everything a backend stores about one task id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMeta {
    /// Current state.
    pub state: TaskState,

    /// Result value, set on `SUCCESS`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Error descriptor, set on `FAILURE` (and optionally alongside
    /// `RETRY` to expose the triggering error).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,

    /// Retry attempts performed so far.
    #[serde(default)]
    pub retries: u32,

    /// When the task reached a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_done: Option<DateTime<Utc>>,

    /// When this record stops being readable. Absent means it never
    /// expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl TaskMeta {
    /// The synthesized record for an id the backend has never seen.
    /// `PENDING` is implicit and never written.
    pub fn pending() -> Self {
        Self {
            state: TaskState::Pending,
            result: None,
            error: None,
            retries: 0,
            date_done: None,
            expires_at: None,
        }
    }

    /// Whether the state is `SUCCESS` or `FAILURE`.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Whether the record has outlived its expiry. Expired records read as
    /// absent.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Key-value storage for task records.
///
/// Implementations hold no tracking logic: absent ids are `Ok(None)`, not
/// an error, and writes replace whatever is stored. [`ResultStore`] layers
/// the state machine on top.
#[async_trait]
pub trait ResultBackend: Send + Sync {
    /// Reads the record for `task_id`, or `None` if nothing is stored.
    async fn read_state(&self, task_id: &str) -> Result<Option<TaskMeta>, TaskError>;

    /// Writes (replacing) the record for `task_id`.
    async fn write_state(&self, task_id: &str, meta: &TaskMeta) -> Result<(), TaskError>;

    /// Deletes the record for `task_id`; returns whether one existed.
    async fn delete_state(&self, task_id: &str) -> Result<bool, TaskError>;

    /// Removes expired records eagerly; returns how many were removed.
    /// Backends with native expiry keep the default no-op.
    async fn cleanup_expired(&self) -> Result<usize, TaskError> {
        Ok(0)
    }
}
