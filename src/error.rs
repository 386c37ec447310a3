//! Error types for dispatch, retrieval, and task execution.
//!
//! Errors fall into two layers:
//!
//! - [`TaskError`] -- errors surfaced to callers of this crate: composition
//!   errors raised synchronously at dispatch (`Arity`, `Lookup`,
//!   `InvalidWorkflow`), retrieval errors (`Timeout`, `Remote`), and
//!   infrastructure faults (`Transport`, `Backend`, `GroupSubmission`,
//!   `InvalidTransition`).
//! - [`ErrorInfo`] -- the stored error descriptor a worker records against a
//!   task id when the task itself raises. It carries the original error type
//!   name, message, and a stringified trace, and round-trips through the
//!   result backend so `get(propagate = false)` can hand it back as a value.
//!
//! Task handlers do not return `TaskError`; they return [`TaskFailure`],
//! which distinguishes an ordinary failure from a retry signal.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::TaskState;

/// Stored descriptor for an error raised inside a task.
///
/// Written by the executing worker against the task id, read back during
/// retrieval. With `propagate = true` (the default) it is re-raised as
/// [`TaskError::Remote`]; with `propagate = false` it is returned to the
/// caller as an ordinary JSON value.
///
/// # Examples
///
/// ```
/// use baton::ErrorInfo;
///
/// let info = ErrorInfo::new("ValueError", "x must be positive");
/// assert_eq!(info.to_string(), "ValueError: x must be positive");
///
/// let json = serde_json::to_value(&info).unwrap();
/// assert_eq!(json["kind"], "ValueError");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Original error type name (e.g. `"ValueError"`, `"ChordError"`).
    pub kind: String,

    /// Human-readable error message.
    pub message: String,

    /// Stringified trace of where the error originated.
    pub trace: String,
}

impl ErrorInfo {
    /// Creates a descriptor with a default trace of `"kind: message"`.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        let kind = kind.into();
        let message = message.into();
        let trace = format!("{kind}: {message}");
        Self {
            kind,
            message,
            trace,
        }
    }

    /// Replaces the trace (builder pattern).
    #[must_use]
    pub fn with_trace(mut self, trace: impl Into<String>) -> Self {
        self.trace = trace.into();
        self
    }

    /// The descriptor as a JSON value, the form handed to errbacks and
    /// returned by `get(propagate = false)`.
    pub fn as_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::Value::String(self.to_string()))
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ErrorInfo {}

/// Failure signal returned by a task handler.
///
/// `Error` ends the task (final failure, after which errbacks fire and chord
/// members report). `Retry` asks the worker to resubmit the task; the worker
/// honors it while the retry budget lasts and converts it into a
/// `MaxRetriesExceeded` failure once the budget is spent.
///
/// # Examples
///
/// ```
/// use baton::TaskFailure;
///
/// let _fail = TaskFailure::error("ValueError", "bad input");
/// let _again = TaskFailure::retry();
/// let _later = TaskFailure::retry_in(0.5);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum TaskFailure {
    /// The task raised an ordinary error.
    Error {
        /// Error type name recorded into the descriptor.
        kind: String,
        /// Error message.
        message: String,
        /// Optional trace; the worker synthesizes one when absent.
        trace: Option<String>,
    },
    /// The task asked to be retried.
    Retry {
        /// Seconds to wait before the retry becomes eligible; `None` retries
        /// immediately.
        countdown: Option<f64>,
    },
}

impl TaskFailure {
    /// An ordinary failure with the given type name and message.
    pub fn error(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            kind: kind.into(),
            message: message.into(),
            trace: None,
        }
    }

    /// A retry signal with no delay.
    pub fn retry() -> Self {
        Self::Retry { countdown: None }
    }

    /// A retry signal that becomes eligible after `countdown` seconds.
    pub fn retry_in(countdown: f64) -> Self {
        Self::Retry {
            countdown: Some(countdown),
        }
    }
}

/// Errors surfaced by dispatch, retrieval, and state tracking.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The signature does not satisfy the named task's parameter contract.
    ///
    /// Raised at dispatch time, before anything is submitted. Covers both
    /// incomplete signatures (missing parameters) and over-specified ones
    /// (excess positionals, unexpected or duplicated keywords).
    #[error("arity mismatch for task '{task_name}': {detail}")]
    Arity {
        /// Task the signature named.
        task_name: String,
        /// What exactly is wrong with the argument list.
        detail: String,
    },

    /// No task is registered under the given name.
    #[error("no task registered under the name '{task_name}'")]
    Lookup {
        /// The unknown task name.
        task_name: String,
    },

    /// The workflow is structurally unusable (e.g. an empty chain).
    #[error("invalid workflow: {reason}")]
    InvalidWorkflow {
        /// Why the workflow cannot be dispatched.
        reason: String,
    },

    /// A state write would leave a terminal state or repeat `STARTED`.
    #[error("invalid state transition for task {task_id}: {from} -> {to}")]
    InvalidTransition {
        /// Task whose record was being written.
        task_id: String,
        /// State currently stored.
        from: TaskState,
        /// State the write attempted.
        to: TaskState,
    },

    /// Blocking retrieval reached its deadline while the task was still
    /// non-terminal.
    #[error("timed out after {waited:?} waiting on task {task_id}")]
    Timeout {
        /// Task being waited on.
        task_id: String,
        /// How long the caller waited.
        waited: Duration,
    },

    /// The task itself raised; the stored descriptor is re-raised to the
    /// caller (`propagate = true`).
    #[error("task {task_id} raised {info}")]
    Remote {
        /// Task that failed.
        task_id: String,
        /// Stored error descriptor.
        #[source]
        info: ErrorInfo,
    },

    /// Submission to the transport failed. Fatal: surfaced immediately and
    /// never retried by this layer.
    #[error("transport submission failed: {message}")]
    Transport {
        /// Transport-reported reason.
        message: String,
    },

    /// The transport failed partway through submitting a group.
    ///
    /// Members are validated and their messages fully built before the first
    /// submission, so only a transport fault can interrupt the loop; the ids
    /// already accepted are listed so the caller knows exactly what is in
    /// flight.
    #[error("group {group_id} submission failed after {}/{total} members were sent", .submitted.len())]
    GroupSubmission {
        /// Id of the group being submitted.
        group_id: String,
        /// Task ids accepted by the transport before the failure.
        submitted: Vec<String>,
        /// Total member count.
        total: usize,
        /// The underlying transport error.
        #[source]
        source: Box<TaskError>,
    },

    /// The result backend failed (I/O or serialization).
    #[error("result backend error: {message}")]
    Backend {
        /// What failed.
        message: String,
        /// Underlying backend error, when one exists.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl TaskError {
    /// Backend error without an underlying source.
    pub(crate) fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
            source: None,
        }
    }

    /// Backend error wrapping an underlying source error.
    pub(crate) fn backend_with(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Backend {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Transport error with the given reason.
    pub(crate) fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_info_display_is_kind_colon_message() {
        let info = ErrorInfo::new("TypeError", "add() takes 2 arguments");
        assert_eq!(info.to_string(), "TypeError: add() takes 2 arguments");
    }

    #[test]
    fn error_info_default_trace_mirrors_display() {
        let info = ErrorInfo::new("ValueError", "boom");
        assert_eq!(info.trace, "ValueError: boom");
    }

    #[test]
    fn error_info_with_trace_overrides() {
        let info = ErrorInfo::new("ValueError", "boom").with_trace("at add:1");
        assert_eq!(info.trace, "at add:1");
    }

    #[test]
    fn error_info_serde_round_trip() {
        let info = ErrorInfo::new("ChordError", "dependency failed").with_trace("member 3");
        let json = serde_json::to_value(&info).unwrap();
        let back: ErrorInfo = serde_json::from_value(json).unwrap();
        assert_eq!(info, back);
    }

    #[test]
    fn remote_error_exposes_info_as_source() {
        let err = TaskError::Remote {
            task_id: "t1".to_string(),
            info: ErrorInfo::new("ValueError", "boom"),
        };
        let source = std::error::Error::source(&err).expect("source");
        assert_eq!(source.to_string(), "ValueError: boom");
    }

    #[test]
    fn group_submission_display_counts_members() {
        let err = TaskError::GroupSubmission {
            group_id: "g1".to_string(),
            submitted: vec!["a".to_string(), "b".to_string()],
            total: 5,
            source: Box::new(TaskError::transport("broker down")),
        };
        let text = err.to_string();
        assert!(text.contains("2/5"), "unexpected display: {text}");
    }

    #[test]
    fn retry_constructors() {
        assert_eq!(TaskFailure::retry(), TaskFailure::Retry { countdown: None });
        assert_eq!(
            TaskFailure::retry_in(2.5),
            TaskFailure::Retry {
                countdown: Some(2.5)
            }
        );
    }
}
