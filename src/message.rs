//! Wire-level task messages and pre-planned continuations.
//!
//! Dispatch compiles a [`Signature`](crate::Signature) or workflow into
//! [`TaskMessage`]s before anything is submitted: ids are assigned, queues
//! resolved, callbacks and chain successors linearized into an
//! [`Continuation`] tree hanging off each message. Workers never see
//! signatures -- they execute messages and submit the attached continuations
//! themselves, which is what makes chain execution deferred rather than
//! eagerly scheduled by the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::signature::{Args, Kwargs};

/// A fully planned task invocation, ready for the transport.
///
/// The id is assigned at planning time, so callers hold their result handle
/// before the message is ever submitted. Everything a worker needs travels
/// in the message itself; workers do not consult routing tables or
/// composition state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMessage {
    /// Pre-assigned task id (UUID v4, canonical hyphenated form).
    pub id: String,

    /// Registered task name.
    pub task_name: String,

    /// Positional arguments as planned. A worker prepends the predecessor's
    /// result before execution when this message runs as a continuation and
    /// is not [`immutable`](Self::immutable).
    pub args: Args,

    /// Keyword arguments.
    pub kwargs: Kwargs,

    /// Resolved target queue.
    pub queue: String,

    /// Absolute earliest execution time. Countdown delays are resolved to
    /// an eta at planning time, so only an instant travels on the wire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta: Option<DateTime<Utc>>,

    /// When true, no predecessor result is prepended.
    #[serde(default)]
    pub immutable: bool,

    /// Retry attempts performed so far.
    #[serde(default)]
    pub retries: u32,

    /// Retry ceiling resolved from the task spec or configuration.
    pub max_retries: u32,

    /// Override of the started-tracking setting for this invocation,
    /// resolved from the task spec at planning time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_started: Option<bool>,

    /// Submitted by the worker after success, with this task's result
    /// prepended where applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_success: Option<Box<Continuation>>,

    /// Submitted by the worker after final failure, with the error
    /// descriptor prepended unless the errback is immutable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errback: Option<Box<TaskMessage>>,

    /// Present when this task is a chord member; drives aggregation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chord: Option<ChordInfo>,
}

impl TaskMessage {
    /// Inserts `value` as the new first positional argument.
    pub fn prepend_arg(&mut self, value: Value) {
        self.args.insert(0, value);
    }

    /// Id of the last task that will run as a consequence of this message:
    /// the innermost success continuation, following chord plans through
    /// their callbacks. This is the id a chain's overall result handle
    /// tracks.
    pub fn terminal_id(&self) -> &str {
        match self.on_success.as_deref() {
            Some(Continuation::Task(next)) => next.terminal_id(),
            Some(Continuation::Chord(plan)) => plan.callback.terminal_id(),
            None => &self.id,
        }
    }

    /// Ids along the success spine, outermost first, ending with
    /// [`terminal_id`](Self::terminal_id). Chord members are not part of the
    /// spine; their failures surface through the chord callback instead.
    pub fn spine_ids(&self) -> Vec<String> {
        let mut ids = vec![self.id.clone()];
        let mut cursor = self.on_success.as_deref();
        while let Some(cont) = cursor {
            let next = match cont {
                Continuation::Task(msg) => msg,
                Continuation::Chord(plan) => &plan.callback,
            };
            ids.push(next.id.clone());
            cursor = next.on_success.as_deref();
        }
        ids
    }
}

/// What a worker submits after a task succeeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Continuation {
    /// Submit one follow-up task (the next chain link or a callback).
    Task(TaskMessage),
    /// Fan out a planned chord: submit every member; the aggregator
    /// dispatches the callback once all members are terminal.
    Chord(ChordPlan),
}

/// A chord compiled to messages: the fanned-out members plus the callback
/// the aggregator will dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChordPlan {
    /// Member messages in submission order, each carrying [`ChordInfo`].
    pub members: Vec<TaskMessage>,
    /// The fan-in callback message.
    pub callback: Box<TaskMessage>,
}

/// Chord membership carried by each member message.
///
/// The chord id doubles as the callback's task id, so the callback's state
/// is readable before the callback is ever submitted (the aggregator writes
/// chord-level failures there under the propagate policy).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChordInfo {
    /// Chord identity; equals the callback message's id.
    pub chord_id: String,

    /// Total number of members.
    pub size: usize,

    /// This member's slot in submission order.
    pub index: usize,

    /// The callback to dispatch once every member is terminal. Carried by
    /// every member so whichever member finishes last can hand it to the
    /// aggregator.
    pub callback: Box<TaskMessage>,
}

/// Converts a countdown delay in seconds into an absolute eta.
///
/// Non-positive, non-finite, and unrepresentably large delays all mean
/// immediate eligibility.
pub(crate) fn eta_after(seconds: f64) -> Option<DateTime<Utc>> {
    if seconds <= 0.0 {
        return None;
    }
    let delay = std::time::Duration::try_from_secs_f64(seconds).ok()?;
    chrono::Duration::from_std(delay)
        .ok()
        .map(|delay| Utc::now() + delay)
}
