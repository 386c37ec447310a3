//! Result tracking rules layered over any [`ResultBackend`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::backend::{ResultBackend, TaskMeta};
use crate::config::Config;
use crate::error::{ErrorInfo, TaskError};
use crate::state::TaskState;

/// Wraps a backend with the tracking semantics every caller relies on.
///
/// Reads synthesize `PENDING` for ids the backend has never seen and for
/// expired records. Writes validate the state machine (no transition leaves
/// a terminal state, `STARTED` does not repeat within an attempt) and stamp
/// the configured expiry. Backends themselves stay dumb key-value stores.
///
/// Each task id is written by exactly one producer, the worker executing
/// it, so read-validate-write here needs no cross-process locking.
#[derive(Clone)]
pub struct ResultStore {
    backend: Arc<dyn ResultBackend>,
    result_expires: Option<Duration>,
}

impl ResultStore {
    /// Creates a store over `backend` with expiry taken from
    /// [`Config::result_expires`].
    pub fn new(backend: Arc<dyn ResultBackend>, config: &Config) -> Self {
        Self {
            backend,
            result_expires: config.result_expires,
        }
    }

    /// Reads the current record for `task_id`.
    ///
    /// Always hits the backend; results are never cached across calls
    /// because the producing worker runs concurrently. Absent and expired
    /// records both read as the implicit `PENDING`.
    pub async fn fetch(&self, task_id: &str) -> Result<TaskMeta, TaskError> {
        match self.backend.read_state(task_id).await? {
            Some(meta) if !meta.is_expired(Utc::now()) => Ok(meta),
            _ => Ok(TaskMeta::pending()),
        }
    }

    /// Records the start of an attempt. Only called when start tracking is
    /// enabled for the task.
    pub async fn record_started(&self, task_id: &str, retries: u32) -> Result<(), TaskError> {
        self.record(
            task_id,
            TaskMeta {
                state: TaskState::Started,
                retries,
                ..TaskMeta::pending()
            },
        )
        .await
    }

    /// Records a retry signal, optionally with the error that triggered it.
    pub async fn record_retry(
        &self,
        task_id: &str,
        retries: u32,
        error: Option<ErrorInfo>,
    ) -> Result<(), TaskError> {
        self.record(
            task_id,
            TaskMeta {
                state: TaskState::Retry,
                error,
                retries,
                ..TaskMeta::pending()
            },
        )
        .await
    }

    /// Records terminal success with the task's return value.
    pub async fn record_success(
        &self,
        task_id: &str,
        result: Value,
        retries: u32,
    ) -> Result<(), TaskError> {
        self.record(
            task_id,
            TaskMeta {
                state: TaskState::Success,
                result: Some(result),
                retries,
                date_done: Some(Utc::now()),
                ..TaskMeta::pending()
            },
        )
        .await
    }

    /// Records terminal failure with the error descriptor.
    pub async fn record_failure(
        &self,
        task_id: &str,
        error: ErrorInfo,
        retries: u32,
    ) -> Result<(), TaskError> {
        self.record(
            task_id,
            TaskMeta {
                state: TaskState::Failure,
                error: Some(error),
                retries,
                date_done: Some(Utc::now()),
                ..TaskMeta::pending()
            },
        )
        .await
    }

    /// Deletes the record for `task_id`, returning whether one existed.
    ///
    /// Deletion bypasses the state machine: it is the caller declaring the
    /// outcome no longer matters, and the id reads `PENDING` afterwards.
    pub async fn forget(&self, task_id: &str) -> Result<bool, TaskError> {
        self.backend.delete_state(task_id).await
    }

    async fn record(&self, task_id: &str, mut meta: TaskMeta) -> Result<(), TaskError> {
        let current = self.fetch(task_id).await?;
        current.state.validate_transition(task_id, &meta.state)?;
        meta.expires_at = self.expiry_from(Utc::now());
        tracing::debug!(task_id, state = %meta.state, retries = meta.retries, "recording task state");
        self.backend.write_state(task_id, &meta).await
    }

    fn expiry_from(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let ttl = self.result_expires?;
        chrono::Duration::from_std(ttl).ok().map(|ttl| now + ttl)
    }
}

impl std::fmt::Debug for ResultStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultStore")
            .field("result_expires", &self.result_expires)
            .finish_non_exhaustive()
    }
}
