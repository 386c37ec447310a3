//! Task state machine.
//!
//! Tracks a task id through `PENDING -> STARTED -> RETRY -> SUCCESS|FAILURE`.
//! `PENDING` is implicit: it is the reported state for any unknown or
//! unrecorded task id and is never written to the backend. `STARTED` is
//! recorded only when start tracking is enabled (see
//! [`Config::track_started`](crate::Config::track_started)). `SUCCESS` and
//! `FAILURE` are terminal; nothing transitions out of them.
//!
//! # Transition matrix
//!
//! | from \ to | STARTED | RETRY | SUCCESS | FAILURE |
//! |-----------|---------|-------|---------|---------|
//! | PENDING   | yes     | yes   | yes     | yes     |
//! | STARTED   | no      | yes   | yes     | yes     |
//! | RETRY     | yes     | yes   | yes     | yes     |
//! | SUCCESS   | no      | no    | no      | no      |
//! | FAILURE   | no      | no    | no      | no      |
//!
//! `PENDING` is never a transition *target*. `RETRY -> RETRY` is legal
//! (consecutive retries with start tracking disabled write back-to-back
//! `RETRY` records); `STARTED -> STARTED` is not -- each attempt records at
//! most one start, separated by `RETRY`.

use serde::{Deserialize, Serialize};

use crate::error::TaskError;

/// Execution state of a task id.
///
/// Serialized as the uppercase state name (`"PENDING"`, `"STARTED"`, ...),
/// which is also the `Display` form.
///
/// # Examples
///
/// ```
/// use baton::TaskState;
///
/// assert!(TaskState::Success.is_terminal());
/// assert!(!TaskState::Retry.is_terminal());
/// assert_eq!(TaskState::Failure.to_string(), "FAILURE");
/// assert_eq!(
///     serde_json::to_value(TaskState::Started).unwrap(),
///     "STARTED"
/// );
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskState {
    /// Waiting for execution, or unknown. Never written to the backend.
    #[default]
    Pending,
    /// Execution has begun. Recorded only when start tracking is enabled.
    Started,
    /// The task raised a retry signal and will be re-executed.
    Retry,
    /// The task completed and its return value is stored. Terminal.
    Success,
    /// The task failed and its error descriptor is stored. Terminal.
    Failure,
}

impl TaskState {
    /// Returns the uppercase state name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Started => "STARTED",
            Self::Retry => "RETRY",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
        }
    }

    /// True for `SUCCESS` and `FAILURE` -- no further transitions occur.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }

    /// Whether a stored record in this state may be overwritten with `next`.
    ///
    /// Encodes the transition matrix in the module docs: terminal states
    /// admit nothing, `PENDING` is never a target, and `STARTED` does not
    /// repeat without an intervening `RETRY`.
    ///
    /// # Examples
    ///
    /// ```
    /// use baton::TaskState;
    ///
    /// assert!(TaskState::Pending.can_transition_to(&TaskState::Failure));
    /// assert!(TaskState::Retry.can_transition_to(&TaskState::Retry));
    /// assert!(!TaskState::Started.can_transition_to(&TaskState::Started));
    /// assert!(!TaskState::Success.can_transition_to(&TaskState::Retry));
    /// ```
    pub fn can_transition_to(&self, next: &TaskState) -> bool {
        match (self, next) {
            (_, Self::Pending) => false,
            (Self::Success | Self::Failure, _) => false,
            (Self::Started, Self::Started) => false,
            _ => true,
        }
    }

    /// Validates a transition, returning [`TaskError::InvalidTransition`]
    /// with the offending task id when the matrix rejects it.
    pub fn validate_transition(&self, task_id: &str, next: &TaskState) -> Result<(), TaskError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(TaskError::InvalidTransition {
                task_id: task_id.to_string(),
                from: *self,
                to: *next,
            })
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
