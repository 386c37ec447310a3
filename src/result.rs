//! Result handles: polling task state and retrieving outcomes.
//!
//! An [`AsyncResult`] tracks one task id against the result store. Every
//! accessor reads the backend fresh; nothing is cached between calls,
//! because the producing worker runs concurrently and the handle would
//! otherwise report stale state.
//!
//! Handles for chain members carry a link to their predecessor's handle.
//! When an upstream link fails, nothing downstream is ever submitted, so
//! the downstream id would stay `PENDING` forever; [`AsyncResult::get`]
//! walks the ancestry while waiting and surfaces the upstream failure
//! instead of timing out.

use std::time::{Duration, Instant};

use serde_json::Value;

use crate::backend::ResultStore;
use crate::error::{ErrorInfo, TaskError};
use crate::state::TaskState;

/// Options for blocking retrieval.
///
/// Defaults: wait without deadline, re-raise stored failures
/// (`propagate = true`), poll at the engine's configured interval.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use baton::GetOptions;
///
/// let opts = GetOptions::default()
///     .with_timeout(Duration::from_secs(5))
///     .with_propagate(false);
/// assert!(!opts.propagate);
/// ```
#[derive(Debug, Clone)]
pub struct GetOptions {
    /// Deadline for the whole call. `None` waits indefinitely.
    pub timeout: Option<Duration>,

    /// When true (the default), a stored failure is re-raised as
    /// [`TaskError::Remote`]; when false, the error descriptor is returned
    /// as an ordinary JSON value.
    pub propagate: bool,

    /// Poll interval override.
    pub interval: Option<Duration>,
}

impl Default for GetOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl GetOptions {
    /// Options with the defaults described above.
    pub fn new() -> Self {
        Self {
            timeout: None,
            propagate: true,
            interval: None,
        }
    }

    /// Bounds the wait.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets whether stored failures re-raise (`true`) or return as values
    /// (`false`).
    #[must_use]
    pub fn with_propagate(mut self, propagate: bool) -> Self {
        self.propagate = propagate;
        self
    }

    /// Overrides the poll interval.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }
}

/// Handle to one submitted task's eventual outcome.
#[derive(Debug, Clone)]
pub struct AsyncResult {
    id: String,
    store: ResultStore,
    poll_interval: Duration,
    parent: Option<Box<AsyncResult>>,
}

impl AsyncResult {
    pub(crate) fn new(id: String, store: ResultStore, poll_interval: Duration) -> Self {
        Self {
            id,
            store,
            poll_interval,
            parent: None,
        }
    }

    pub(crate) fn with_parent(mut self, parent: AsyncResult) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }

    /// The task id this handle tracks.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The preceding task's handle, for handles produced by chain dispatch.
    pub fn parent(&self) -> Option<&AsyncResult> {
        self.parent.as_deref()
    }

    /// Current state, read fresh from the backend. Unknown ids report
    /// `PENDING`, never an error.
    pub async fn state(&self) -> Result<TaskState, TaskError> {
        Ok(self.store.fetch(&self.id).await?.state)
    }

    /// True iff the task has succeeded.
    pub async fn successful(&self) -> Result<bool, TaskError> {
        Ok(self.state().await? == TaskState::Success)
    }

    /// True iff the task has failed.
    pub async fn failed(&self) -> Result<bool, TaskError> {
        Ok(self.state().await? == TaskState::Failure)
    }

    /// Non-blocking peek at the stored outcome.
    ///
    /// `Some(value)` once the task has succeeded, `Some(descriptor)` once
    /// it has failed, `None` while it is still in flight.
    pub async fn result(&self) -> Result<Option<Value>, TaskError> {
        let meta = self.store.fetch(&self.id).await?;
        match meta.state {
            TaskState::Success => Ok(Some(meta.result.unwrap_or(Value::Null))),
            TaskState::Failure => {
                Ok(Some(meta.error.unwrap_or_else(missing_descriptor).as_value()))
            },
            _ => Ok(None),
        }
    }

    /// Deletes the stored record, returning whether one existed.
    ///
    /// Afterwards the id reads as `PENDING` again, indistinguishable from
    /// a task that was never submitted.
    pub async fn forget(&self) -> Result<bool, TaskError> {
        self.store.forget(&self.id).await
    }

    /// Blocks until the task is terminal, then yields its outcome, with
    /// the default [`GetOptions`].
    pub async fn get(&self) -> Result<Value, TaskError> {
        self.get_with(GetOptions::default()).await
    }

    /// Blocks until the task is terminal, then yields its outcome.
    ///
    /// On `SUCCESS` the stored value is returned. On `FAILURE` the stored
    /// descriptor re-raises as [`TaskError::Remote`], or is returned as a
    /// JSON value when `propagate` is off. Reaching the deadline first
    /// fails with [`TaskError::Timeout`]; the poll loop ends with it, and
    /// the remote task keeps running regardless.
    pub async fn get_with(&self, options: GetOptions) -> Result<Value, TaskError> {
        let started = Instant::now();
        let deadline = options.timeout.map(|timeout| started + timeout);
        let interval = options.interval.unwrap_or(self.poll_interval);

        loop {
            let meta = self.store.fetch(&self.id).await?;
            match meta.state {
                TaskState::Success => return Ok(meta.result.unwrap_or(Value::Null)),
                TaskState::Failure => {
                    return finish_failed(&self.id, meta.error, options.propagate)
                },
                _ => {},
            }

            if let Some(parent) = &self.parent {
                if let Some((ancestor_id, info)) = parent.first_failed_ancestor().await? {
                    return finish_failed(&ancestor_id, Some(info), options.propagate);
                }
            }

            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    return Err(TaskError::Timeout {
                        task_id: self.id.clone(),
                        waited: started.elapsed(),
                    });
                }
                tokio::time::sleep(interval.min(deadline - now)).await;
            } else {
                tokio::time::sleep(interval).await;
            }
        }
    }

    /// Walks this handle and its ancestry for the first `FAILURE`.
    async fn first_failed_ancestor(&self) -> Result<Option<(String, ErrorInfo)>, TaskError> {
        let mut cursor = Some(self);
        while let Some(node) = cursor {
            let meta = node.store.fetch(&node.id).await?;
            if meta.state == TaskState::Failure {
                let info = meta.error.unwrap_or_else(missing_descriptor);
                return Ok(Some((node.id.clone(), info)));
            }
            cursor = node.parent.as_deref();
        }
        Ok(None)
    }
}

fn missing_descriptor() -> ErrorInfo {
    ErrorInfo::new("UnknownError", "failure recorded without a descriptor")
}

fn finish_failed(
    task_id: &str,
    error: Option<ErrorInfo>,
    propagate: bool,
) -> Result<Value, TaskError> {
    let info = error.unwrap_or_else(missing_descriptor);
    if propagate {
        Err(TaskError::Remote {
            task_id: task_id.to_string(),
            info,
        })
    } else {
        Ok(info.as_value())
    }
}

/// Handle to a dispatched group: one [`AsyncResult`] per member, in
/// submission order.
#[derive(Debug, Clone)]
pub struct GroupResult {
    group_id: String,
    results: Vec<AsyncResult>,
}

impl GroupResult {
    pub(crate) fn new(group_id: String, results: Vec<AsyncResult>) -> Self {
        Self { group_id, results }
    }

    /// The group id (distinct from any member's task id).
    pub fn id(&self) -> &str {
        &self.group_id
    }

    /// Member handles in submission order.
    pub fn results(&self) -> &[AsyncResult] {
        &self.results
    }

    /// Iterates member handles in submission order.
    pub fn iter(&self) -> std::slice::Iter<'_, AsyncResult> {
        self.results.iter()
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Whether the group has no members.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Aggregate state: `SUCCESS` when every member succeeded, `FAILURE`
    /// when any member failed, `PENDING` otherwise. An empty group is
    /// vacuously `SUCCESS`.
    pub async fn state(&self) -> Result<TaskState, TaskError> {
        let mut all_success = true;
        for result in &self.results {
            match result.state().await? {
                TaskState::Failure => return Ok(TaskState::Failure),
                TaskState::Success => {},
                _ => all_success = false,
            }
        }
        if all_success {
            Ok(TaskState::Success)
        } else {
            Ok(TaskState::Pending)
        }
    }

    /// True iff every member succeeded.
    pub async fn successful(&self) -> Result<bool, TaskError> {
        Ok(self.state().await? == TaskState::Success)
    }

    /// True iff any member failed.
    pub async fn failed(&self) -> Result<bool, TaskError> {
        Ok(self.state().await? == TaskState::Failure)
    }

    /// Number of members that have succeeded so far.
    pub async fn completed_count(&self) -> Result<usize, TaskError> {
        let mut count = 0;
        for result in &self.results {
            if result.successful().await? {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Waits for every member with the default [`GetOptions`] and returns
    /// their values in submission order.
    pub async fn join(&self) -> Result<Vec<Value>, TaskError> {
        self.join_with(GetOptions::default()).await
    }

    /// Waits for every member and returns their values in submission order.
    ///
    /// The timeout bounds the whole call, not each member. With
    /// `propagate = true` the first failure (in submission order) re-raises;
    /// with `propagate = false` failed members yield their error
    /// descriptors in place.
    pub async fn join_with(&self, options: GetOptions) -> Result<Vec<Value>, TaskError> {
        let deadline = options.timeout.map(|timeout| Instant::now() + timeout);
        let mut values = Vec::with_capacity(self.results.len());
        for result in &self.results {
            let mut member_options = options.clone();
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    return Err(TaskError::Timeout {
                        task_id: result.id().to_string(),
                        waited: options.timeout.unwrap_or_default(),
                    });
                }
                member_options.timeout = Some(deadline - now);
            }
            values.push(result.get_with(member_options).await?);
        }
        Ok(values)
    }
}

impl<'a> IntoIterator for &'a GroupResult {
    type Item = &'a AsyncResult;
    type IntoIter = std::slice::Iter<'a, AsyncResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
