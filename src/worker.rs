//! Worker-side execution of planned messages.
//!
//! A [`Worker`] consumes [`TaskMessage`]s from a transport and runs the
//! full task protocol: honor the delay, record `STARTED` when tracking is
//! on, execute the handler, record the terminal state, then drive whatever
//! hangs off the message -- the success continuation (next chain link or
//! chord fan-out), the errback on final failure, and chord member
//! accounting.
//!
//! Nothing here returns errors to a caller; there is no caller. Outcomes
//! are written to the result store and infrastructure faults are logged.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};

use crate::aggregator::{ChordAggregator, ChordCompletion, MemberOutcome};
use crate::backend::ResultStore;
use crate::config::{ChordErrorPolicy, Config};
use crate::error::{ErrorInfo, TaskError, TaskFailure};
use crate::message::{Continuation, TaskMessage};
use crate::registry::TaskRegistry;
use crate::transport::Transport;

/// Executes planned messages against the registry and records outcomes.
///
/// Holds the transport it resubmits through (continuations, retries, chord
/// callbacks) and the process-wide [`ChordAggregator`]. All methods take
/// `&self`; share a worker across executor tasks with an `Arc`.
pub struct Worker {
    transport: Arc<dyn Transport>,
    store: ResultStore,
    registry: Arc<TaskRegistry>,
    config: Arc<Config>,
    aggregator: Arc<ChordAggregator>,
}

impl Worker {
    /// Creates a worker with its own chord aggregator.
    pub fn new(
        transport: Arc<dyn Transport>,
        store: ResultStore,
        registry: Arc<TaskRegistry>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            transport,
            store,
            registry,
            config,
            aggregator: Arc::new(ChordAggregator::new()),
        }
    }

    /// Runs one message to its outcome.
    pub async fn process(&self, message: TaskMessage) {
        self.wait_until_eligible(&message).await;

        let track_started = message.track_started.unwrap_or(self.config.track_started);
        if track_started {
            if let Err(err) = self.store.record_started(&message.id, message.retries).await {
                tracing::warn!(task_id = %message.id, error = %err, "failed to record STARTED");
            }
        }

        let task = match self.registry.lookup(&message.task_name) {
            Ok(task) => task,
            Err(err) => {
                let info = ErrorInfo::new("LookupError", err.to_string());
                self.fail(&message, info).await;
                return;
            },
        };
        // Arity holds as planned unless a runtime prepend changed the
        // argument list; recheck so a broken call fails here instead of
        // inside the handler.
        if let Err(err) = task.spec.check_arity(&message.args, &message.kwargs) {
            let info = ErrorInfo::new("ArityError", err.to_string());
            self.fail(&message, info).await;
            return;
        }

        tracing::debug!(
            task_id = %message.id,
            task = %message.task_name,
            retries = message.retries,
            "executing task"
        );
        match task
            .handler
            .run(message.args.clone(), message.kwargs.clone())
            .await
        {
            Ok(value) => self.succeed(&message, value).await,
            Err(TaskFailure::Retry { countdown }) => self.retry(&message, countdown).await,
            Err(TaskFailure::Error {
                kind,
                message: error_message,
                trace,
            }) => {
                let mut info = ErrorInfo::new(kind, error_message);
                if let Some(trace) = trace {
                    info = info.with_trace(trace);
                }
                self.fail(&message, info).await;
            },
        }
    }

    async fn wait_until_eligible(&self, message: &TaskMessage) {
        if let Some(eta) = message.eta {
            // A past eta yields a negative delta, which to_std rejects.
            if let Ok(wait) = (eta - Utc::now()).to_std() {
                tokio::time::sleep(wait).await;
            }
        }
    }

    async fn succeed(&self, message: &TaskMessage, value: Value) {
        if let Err(err) = self
            .store
            .record_success(&message.id, value.clone(), message.retries)
            .await
        {
            tracing::error!(task_id = %message.id, error = %err, "failed to record SUCCESS");
        }

        if let Some(chord) = &message.chord {
            if let Some(done) = self.aggregator.record(chord, MemberOutcome::Success(value.clone()))
            {
                self.dispatch_chord_callback(done).await;
            }
        }
        if let Some(continuation) = message.on_success.as_deref() {
            self.submit_continuation(continuation.clone(), value).await;
        }
    }

    async fn retry(&self, message: &TaskMessage, countdown: Option<f64>) {
        let attempt = message.retries + 1;
        if message.retries >= message.max_retries {
            let info = ErrorInfo::new(
                "MaxRetriesExceededError",
                format!(
                    "task '{}' exhausted its {} retries",
                    message.task_name, message.max_retries
                ),
            );
            self.fail(message, info).await;
            return;
        }

        if let Err(err) = self.store.record_retry(&message.id, attempt, None).await {
            tracing::warn!(task_id = %message.id, error = %err, "failed to record RETRY");
        }

        let mut next = message.clone();
        next.retries = attempt;
        next.eta = countdown.and_then(crate::message::eta_after);
        tracing::debug!(
            task_id = %next.id,
            task = %next.task_name,
            attempt,
            countdown = ?countdown,
            "resubmitting for retry"
        );
        if let Err(err) = self.transport.submit(next).await {
            // The id would otherwise sit in RETRY forever.
            let info = ErrorInfo::new("TransportError", err.to_string());
            self.fail(message, info).await;
        }
    }

    async fn fail(&self, message: &TaskMessage, info: ErrorInfo) {
        tracing::debug!(task_id = %message.id, kind = %info.kind, "task failed");
        if let Err(err) = self
            .store
            .record_failure(&message.id, info.clone(), message.retries)
            .await
        {
            tracing::error!(task_id = %message.id, error = %err, "failed to record FAILURE");
        }

        if let Some(errback) = message.errback.as_deref() {
            let mut errback = errback.clone();
            if !errback.immutable {
                errback.prepend_arg(info.as_value());
            }
            if let Err(err) = self.transport.submit(errback).await {
                tracing::error!(task_id = %message.id, error = %err, "failed to submit errback");
            }
        }

        if let Some(chord) = &message.chord {
            if let Some(done) = self.aggregator.record(chord, MemberOutcome::Failure(info)) {
                self.dispatch_chord_callback(done).await;
            }
        }
    }

    async fn submit_continuation(&self, continuation: Continuation, value: Value) {
        match continuation {
            Continuation::Task(mut next) => {
                if !next.immutable {
                    next.prepend_arg(value);
                }
                let next_id = next.id.clone();
                if let Err(err) = self.transport.submit(next).await {
                    self.strand(&next_id, err).await;
                }
            },
            Continuation::Chord(plan) => {
                if plan.members.is_empty() {
                    // Nothing to aggregate; the callback gets an empty
                    // result list right away.
                    let mut callback = *plan.callback;
                    if !callback.immutable {
                        callback.prepend_arg(json!([]));
                    }
                    let callback_id = callback.id.clone();
                    if let Err(err) = self.transport.submit(callback).await {
                        self.strand(&callback_id, err).await;
                    }
                    return;
                }
                let callback_id = plan.callback.id.clone();
                for mut member in plan.members {
                    if !member.immutable {
                        member.prepend_arg(value.clone());
                    }
                    if let Err(err) = self.transport.submit(member).await {
                        // Remaining members are withheld; the chord can
                        // never complete, so its callback id carries the
                        // fault.
                        self.strand(&callback_id, err).await;
                        return;
                    }
                }
            },
        }
    }

    async fn dispatch_chord_callback(&self, done: ChordCompletion) {
        let failures = done.failure_count();
        if failures > 0 && self.config.chord_error_policy == ChordErrorPolicy::Propagate {
            let (index, first) = match done.first_failure() {
                Some(found) => found,
                None => return,
            };
            let info = ErrorInfo::new(
                "ChordError",
                format!(
                    "{failures} of {} chord member(s) failed; first was member {index}: {first}",
                    done.outcomes.len()
                ),
            );
            Box::pin(self.fail(&done.callback, info)).await;
            return;
        }

        let mut callback = done.callback.clone();
        if !callback.immutable {
            callback.prepend_arg(Value::Array(done.collect_values()));
        }
        let callback_id = callback.id.clone();
        tracing::debug!(chord_id = %callback_id, members = done.outcomes.len(), "dispatching chord callback");
        if let Err(err) = self.transport.submit(callback).await {
            self.strand(&callback_id, err).await;
        }
    }

    /// Marks a task that can no longer be submitted as failed, so waiters
    /// observe the fault instead of polling a forever-`PENDING` id.
    async fn strand(&self, task_id: &str, err: TaskError) {
        tracing::error!(task_id, error = %err, "failed to submit follow-up task");
        let info = ErrorInfo::new("TransportError", err.to_string());
        if let Err(record_err) = self.store.record_failure(task_id, info, 0).await {
            tracing::error!(task_id, error = %record_err, "failed to record FAILURE");
        }
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("aggregator", &self.aggregator)
            .finish_non_exhaustive()
    }
}
