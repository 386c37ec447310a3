//! Client-side dispatch: from signatures and workflows to submitted
//! messages and result handles.
//!
//! Dispatch happens in two phases. *Planning* turns the signature or
//! combinator into [`TaskMessage`]s: ids are assigned, queues resolved
//! through the routing table, callback chains linearized, chords compiled
//! to member-plus-callback plans, and every involved signature checked
//! against its task's parameter contract. Planning is where `Arity`,
//! `Lookup`, and `InvalidWorkflow` errors surface -- before anything is
//! submitted. *Submission* then hands the planned messages to the
//! transport; for multi-member workflows the full plan exists first, so a
//! validation problem can never leave a partially submitted group behind.

use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use crate::backend::ResultStore;
use crate::config::Config;
use crate::error::{ErrorInfo, TaskError, TaskFailure};
use crate::message::{eta_after, ChordInfo, ChordPlan, Continuation, TaskMessage};
use crate::registry::TaskRegistry;
use crate::result::{AsyncResult, GroupResult};
use crate::signature::{Args, Signature, SignatureOptions};
use crate::transport::Transport;
use crate::workflow::{Chain, Chord, Group, Workflow};

/// Outcome of dispatching a [`Workflow`]: a single tracked task or a group
/// of them.
#[derive(Debug, Clone)]
pub enum Dispatched {
    /// Handle for a signature, chain, or chord dispatch.
    Task(AsyncResult),
    /// Handles for a group dispatch.
    Group(GroupResult),
}

impl Dispatched {
    /// The single-task handle, if this dispatch produced one.
    pub fn task(&self) -> Option<&AsyncResult> {
        match self {
            Self::Task(result) => Some(result),
            Self::Group(_) => None,
        }
    }

    /// The group handle, if this dispatch produced one.
    pub fn group(&self) -> Option<&GroupResult> {
        match self {
            Self::Task(_) => None,
            Self::Group(result) => Some(result),
        }
    }
}

/// Dispatches tasks and workflows and hands out result handles.
///
/// Holds the transport, result store, registry, and configuration
/// explicitly; there is no process-global state. Clone-cheap parts are
/// shared via `Arc`, so clients themselves are cheap to clone.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use baton::{Client, Config, TaskFailure, TaskRegistry, TaskSpec, s};
/// use serde_json::json;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), baton::TaskError> {
/// let registry = Arc::new(TaskRegistry::new());
/// registry.register_fn(TaskSpec::new("tasks.add", ["x", "y"]), |args, _| async move {
///     match (args[0].as_i64(), args[1].as_i64()) {
///         (Some(x), Some(y)) => Ok(json!(x + y)),
///         _ => Err(TaskFailure::error("TypeError", "add expects integers")),
///     }
/// });
///
/// let (client, worker) = Client::local(registry, Config::default());
/// let result = client.apply_async(&s("tasks.add", [4, 4])).await?;
/// assert_eq!(result.get().await?, json!(8));
/// worker.shutdown();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
    store: ResultStore,
    registry: Arc<TaskRegistry>,
    config: Arc<Config>,
}

impl Client {
    /// Creates a client over an explicit transport and store.
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
        }
    }

    /// Wires up a fully local engine: in-memory backend, in-process worker
    /// loop, and a client submitting to it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn local(
        registry: Arc<TaskRegistry>,
        config: Config,
    ) -> (Self, crate::transport::WorkerHandle) {
        let config = Arc::new(config);
        let backend = Arc::new(crate::backend::InMemoryBackend::new());
        let store = ResultStore::new(backend, &config);
        let (transport, worker) = crate::transport::local::spawn(
            Arc::clone(&registry),
            store.clone(),
            Arc::clone(&config),
        );
        let client = Self::new(transport, store, registry, config);
        (client, worker)
    }

    /// A handle for an arbitrary task id.
    pub fn result(&self, task_id: impl Into<String>) -> AsyncResult {
        AsyncResult::new(task_id.into(), self.store.clone(), self.config.poll_interval)
    }

    // === Signature dispatch ===

    /// Submits one complete signature; returns the handle for its id.
    ///
    /// Fails with [`TaskError::Lookup`] for an unregistered name and
    /// [`TaskError::Arity`] for a partial or over-specified signature, in
    /// both cases before any submission.
    pub async fn apply_async(&self, sig: &Signature) -> Result<AsyncResult, TaskError> {
        let message = self.plan_signature(sig, None, false)?;
        let id = message.id.clone();
        self.transport.submit(message).await?;
        Ok(self.result(id))
    }

    /// [`bind`](Signature::bind) plus a per-key options overlay, then
    /// [`apply_async`](Self::apply_async).
    pub async fn apply_async_with<A, K>(
        &self,
        sig: &Signature,
        extra_args: A,
        extra_kwargs: K,
        extra_options: &SignatureOptions,
    ) -> Result<AsyncResult, TaskError>
    where
        A: IntoIterator<Item = Value>,
        K: IntoIterator<Item = (String, Value)>,
    {
        let bound = sig.bind(extra_args, extra_kwargs).with_options(extra_options);
        self.apply_async(&bound).await
    }

    /// Shorthand: builds a signature from the name and positional args and
    /// submits it.
    pub async fn delay<N, I, T>(&self, task_name: N, args: I) -> Result<AsyncResult, TaskError>
    where
        N: Into<String>,
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        self.apply_async(&crate::signature::s(task_name, args)).await
    }

    /// Executes the signature locally and synchronously.
    ///
    /// No message is submitted and no state is recorded; the value (or the
    /// failure, as [`TaskError::Remote`]) goes straight to the caller.
    /// Retry signals are honored inline up to the task's retry budget.
    /// `countdown`/`eta` options are ignored: local execution is immediate.
    pub async fn apply(&self, sig: &Signature) -> Result<Value, TaskError> {
        let task = self.registry.lookup(&sig.task_name)?;
        task.spec.check_arity(&sig.args, &sig.kwargs)?;
        let max_retries = task.spec.max_retries.unwrap_or(self.config.default_max_retries);
        // Local runs are externally untracked; the id only labels errors.
        let local_id = Uuid::new_v4().to_string();

        let mut retries = 0u32;
        loop {
            match task.handler.run(sig.args.clone(), sig.kwargs.clone()).await {
                Ok(value) => return Ok(value),
                Err(TaskFailure::Retry { countdown }) => {
                    if retries >= max_retries {
                        return Err(TaskError::Remote {
                            task_id: local_id,
                            info: ErrorInfo::new(
                                "MaxRetriesExceededError",
                                format!(
                                    "task '{}' exhausted its {max_retries} retries",
                                    sig.task_name
                                ),
                            ),
                        });
                    }
                    retries += 1;
                    if let Some(countdown) = countdown {
                        if countdown > 0.0 && countdown.is_finite() {
                            tokio::time::sleep(std::time::Duration::from_secs_f64(countdown))
                                .await;
                        }
                    }
                },
                Err(TaskFailure::Error {
                    kind,
                    message,
                    trace,
                }) => {
                    let mut info = ErrorInfo::new(kind, message);
                    if let Some(trace) = trace {
                        info = info.with_trace(trace);
                    }
                    return Err(TaskError::Remote {
                        task_id: local_id,
                        info,
                    });
                },
            }
        }
    }

    // === Workflow dispatch ===

    /// Dispatches any workflow variant, pattern-matched on shape.
    pub async fn dispatch(&self, workflow: impl Into<Workflow>) -> Result<Dispatched, TaskError> {
        match workflow.into() {
            Workflow::Signature(sig) => Ok(Dispatched::Task(self.apply_async(&sig).await?)),
            Workflow::Group(group) => Ok(Dispatched::Group(self.apply_group(&group).await?)),
            Workflow::Chain(chain) => Ok(Dispatched::Task(self.apply_chain(&chain).await?)),
            Workflow::Chord(chord) => Ok(Dispatched::Task(self.apply_chord(&chord).await?)),
        }
    }

    /// Submits every member of the group independently, in order.
    pub async fn apply_group(&self, group: &Group) -> Result<GroupResult, TaskError> {
        self.apply_group_with(group, Args::new()).await
    }

    /// Group submission with `extra_args` broadcast to every member.
    ///
    /// Each member receives the *same* extra args prepended (a partial
    /// group resolves every member's shared missing parameter to one
    /// value), not one element each.
    ///
    /// All members are planned and validated before the first submission,
    /// so validation problems are all-or-nothing. A transport fault mid-way
    /// fails with [`TaskError::GroupSubmission`] naming the already
    /// submitted ids.
    pub async fn apply_group_with(
        &self,
        group: &Group,
        extra_args: Args,
    ) -> Result<GroupResult, TaskError> {
        let mut messages = Vec::with_capacity(group.len());
        for member in group.iter() {
            let bound = member.bind(extra_args.iter().cloned(), []);
            messages.push(self.plan_signature(&bound, None, false)?);
        }

        let group_id = Uuid::new_v4().to_string();
        let handles: Vec<AsyncResult> =
            messages.iter().map(|m| self.result(m.id.clone())).collect();
        self.submit_all(&group_id, messages).await?;
        Ok(GroupResult::new(group_id, handles))
    }

    /// Submits the first link of the chain; every later link runs off its
    /// predecessor's completion. The handle tracks the last task overall.
    pub async fn apply_chain(&self, chain: &Chain) -> Result<AsyncResult, TaskError> {
        self.apply_chain_with(chain, Args::new()).await
    }

    /// Chain dispatch with `extra_args` bound into the first link.
    pub async fn apply_chain_with(
        &self,
        chain: &Chain,
        extra_args: Args,
    ) -> Result<AsyncResult, TaskError> {
        if chain.is_empty() {
            return Err(TaskError::InvalidWorkflow {
                reason: "cannot dispatch an empty chain".to_string(),
            });
        }

        let mut chain = chain.clone();
        if !extra_args.is_empty() {
            if let Some(first) = chain.links.first_mut() {
                *first = first.bind(extra_args, []);
            } else if let Some(first_tail) = chain.tails.first_mut() {
                // No plain links: the extra args broadcast into the first
                // chord's header, same as binding a partial group.
                for member in &mut first_tail.header.tasks {
                    *member = member.bind(extra_args.iter().cloned(), []);
                }
            }
        }

        // Plan back to front so each stage's continuation already exists.
        let mut next: Option<Continuation> = None;
        for (index, tail) in chain.tails.iter().enumerate().rev() {
            let fed_by_previous = index > 0 || !chain.links.is_empty();
            let plan = self.plan_chord(tail, next.take(), fed_by_previous)?;
            next = Some(Continuation::Chord(plan));
        }
        for (index, link) in chain.links.iter().enumerate().rev() {
            let message = self.plan_signature(link, next.take(), index > 0)?;
            next = Some(Continuation::Task(message));
        }

        match next {
            Some(Continuation::Task(message)) => {
                let handle = self.spine_handle(&message);
                self.transport.submit(message).await?;
                Ok(handle)
            },
            Some(Continuation::Chord(plan)) => {
                let handle = self.spine_handle(&plan.callback);
                self.submit_chord_plan(plan).await?;
                Ok(handle)
            },
            // Unreachable: emptiness was rejected above.
            None => Err(TaskError::InvalidWorkflow {
                reason: "cannot dispatch an empty chain".to_string(),
            }),
        }
    }

    /// Submits the chord's members; the callback follows once every member
    /// is terminal. The handle tracks the callback, or -- when further
    /// signatures were piped after it -- the last of those.
    pub async fn apply_chord(&self, chord: &Chord) -> Result<AsyncResult, TaskError> {
        let plan = self.plan_chord(chord, None, false)?;
        let handle = self.spine_handle(&plan.callback);
        self.submit_chord_plan(plan).await?;
        Ok(handle)
    }

    // === Planning ===

    /// Compiles one signature (and its callback/errback chains) into a
    /// message.
    ///
    /// `next` is attached after the innermost success callback, which is
    /// how a chain successor runs after work the signature already had
    /// scheduled. `expects_prepend` accounts for the one positional
    /// argument a predecessor's result will add at runtime, so arity is
    /// checked against the call as it will actually happen.
    fn plan_signature(
        &self,
        sig: &Signature,
        next: Option<Continuation>,
        expects_prepend: bool,
    ) -> Result<TaskMessage, TaskError> {
        let task = self.registry.lookup(&sig.task_name)?;

        let will_prepend = expects_prepend && !sig.options.immutable;
        if will_prepend {
            let mut simulated = Args::with_capacity(sig.args.len() + 1);
            simulated.push(Value::Null);
            simulated.extend(sig.args.iter().cloned());
            task.spec.check_arity(&simulated, &sig.kwargs)?;
        } else {
            task.spec.check_arity(&sig.args, &sig.kwargs)?;
        }

        let on_success = match &sig.options.callback {
            Some(callback) => Some(Box::new(Continuation::Task(
                self.plan_signature(callback, next, true)?,
            ))),
            None => next.map(Box::new),
        };
        let errback = match &sig.options.errback {
            Some(errback) => Some(Box::new(self.plan_signature(errback, None, true)?)),
            None => None,
        };

        Ok(TaskMessage {
            id: Uuid::new_v4().to_string(),
            task_name: sig.task_name.clone(),
            args: sig.args.clone(),
            kwargs: sig.kwargs.clone(),
            queue: self.resolve_queue(sig),
            // An explicit eta wins; a countdown becomes one, anchored here
            // at planning time rather than at pickup.
            eta: sig
                .options
                .eta
                .or_else(|| sig.options.countdown.and_then(eta_after)),
            immutable: sig.options.immutable,
            retries: 0,
            max_retries: task
                .spec
                .max_retries
                .unwrap_or(self.config.default_max_retries),
            track_started: task.spec.track_started,
            on_success,
            errback,
            chord: None,
        })
    }

    /// Compiles a chord: callback first (so members can reference it), then
    /// members tagged with their slot.
    fn plan_chord(
        &self,
        chord: &Chord,
        next: Option<Continuation>,
        members_expect_prepend: bool,
    ) -> Result<ChordPlan, TaskError> {
        let callback = self.plan_signature(&chord.callback, next, true)?;
        let size = chord.header.len();

        let mut members = Vec::with_capacity(size);
        for (index, member) in chord.header.iter().enumerate() {
            let mut message = self.plan_signature(member, None, members_expect_prepend)?;
            message.chord = Some(ChordInfo {
                chord_id: callback.id.clone(),
                size,
                index,
                callback: Box::new(callback.clone()),
            });
            members.push(message);
        }

        Ok(ChordPlan {
            members,
            callback: Box::new(callback),
        })
    }

    fn resolve_queue(&self, sig: &Signature) -> String {
        match &sig.options.queue {
            Some(queue) => queue.clone(),
            None => self.config.route_for(&sig.task_name).to_string(),
        }
    }

    /// Builds the chain handle: the terminal task's result, parent-linked
    /// through every spine id so upstream failures are visible to `get`.
    fn spine_handle(&self, first: &TaskMessage) -> AsyncResult {
        let mut handle: Option<AsyncResult> = None;
        for id in first.spine_ids() {
            let result = self.result(id);
            handle = Some(match handle {
                Some(parent) => result.with_parent(parent),
                None => result,
            });
        }
        // The spine always contains at least the first message's own id.
        handle.unwrap_or_else(|| self.result(first.id.clone()))
    }

    // === Submission ===

    async fn submit_all(
        &self,
        group_id: &str,
        messages: Vec<TaskMessage>,
    ) -> Result<(), TaskError> {
        let total = messages.len();
        let mut submitted = Vec::with_capacity(total);
        for message in messages {
            let id = message.id.clone();
            if let Err(err) = self.transport.submit(message).await {
                return Err(TaskError::GroupSubmission {
                    group_id: group_id.to_string(),
                    submitted,
                    total,
                    source: Box::new(err),
                });
            }
            submitted.push(id);
        }
        Ok(())
    }

    async fn submit_chord_plan(&self, plan: ChordPlan) -> Result<(), TaskError> {
        if plan.members.is_empty() {
            // Nothing to wait for; the callback runs now with no results.
            let mut callback = *plan.callback;
            if !callback.immutable {
                callback.prepend_arg(Value::Array(Vec::new()));
            }
            self.transport.submit(callback).await?;
            return Ok(());
        }
        let chord_id = plan.callback.id.clone();
        self.submit_all(&chord_id, plan.members).await
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::registry::TaskSpec;
    use crate::signature::{s, signature};
    use crate::workflow::{chord, group};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    /// Captures submissions instead of executing them; optionally fails
    /// after a fixed number of accepts.
    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<TaskMessage>>,
        accept_limit: Option<usize>,
    }

    impl RecordingTransport {
        fn failing_after(accepts: usize) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                accept_limit: Some(accepts),
            }
        }

        fn sent(&self) -> Vec<TaskMessage> {
            self.sent.lock().clone()
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn submit(&self, message: TaskMessage) -> Result<String, TaskError> {
            let mut sent = self.sent.lock();
            if let Some(limit) = self.accept_limit {
                if sent.len() >= limit {
                    return Err(TaskError::transport("broker unavailable"));
                }
            }
            let id = message.id.clone();
            sent.push(message);
            Ok(id)
        }
    }

    fn test_registry() -> Arc<TaskRegistry> {
        let registry = TaskRegistry::new();
        registry.register_fn(TaskSpec::new("t.add", ["x", "y"]), |args, _| async move {
            match (args[0].as_i64(), args[1].as_i64()) {
                (Some(x), Some(y)) => Ok(json!(x + y)),
                _ => Err(TaskFailure::error("TypeError", "add expects integers")),
            }
        });
        registry.register_fn(TaskSpec::new("t.double", ["x"]), |args, _| async move {
            Ok(json!(args[0].as_i64().unwrap_or(0) * 2))
        });
        registry.register_fn(TaskSpec::new("t.sum", ["values"]), |args, _| async move {
            let total: i64 = args[0]
                .as_array()
                .map(|vs| vs.iter().filter_map(Value::as_i64).sum())
                .unwrap_or(0);
            Ok(json!(total))
        });
        registry.register_fn(TaskSpec::new("t.report", ["payload"]), |_, _| async move {
            Ok(Value::Null)
        });
        Arc::new(registry)
    }

    fn recording_client(transport: Arc<RecordingTransport>) -> Client {
        let config = Arc::new(
            Config::default()
                .with_route("t.add", "math")
                .with_default_queue("general"),
        );
        let store = ResultStore::new(Arc::new(InMemoryBackend::new()), &config);
        Client::new(transport, store, test_registry(), config)
    }

    #[tokio::test]
    async fn apply_async_assigns_uuid_and_routes_by_table() {
        let transport = Arc::new(RecordingTransport::default());
        let client = recording_client(Arc::clone(&transport));

        let result = client.apply_async(&s("t.add", [4, 4])).await.unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].id, result.id());
        assert_eq!(sent[0].queue, "math");
        assert!(Uuid::parse_str(result.id()).is_ok());
        // Canonical hyphenated rendering.
        assert_eq!(result.id().len(), 36);
    }

    #[tokio::test]
    async fn signature_queue_option_beats_routing_table() {
        let transport = Arc::new(RecordingTransport::default());
        let client = recording_client(Arc::clone(&transport));

        client
            .apply_async(&s("t.add", [4, 4]).with_queue("hipri"))
            .await
            .unwrap();
        assert_eq!(transport.sent()[0].queue, "hipri");
    }

    #[tokio::test]
    async fn unrouted_task_lands_on_default_queue() {
        let transport = Arc::new(RecordingTransport::default());
        let client = recording_client(Arc::clone(&transport));

        client.apply_async(&s("t.double", [3])).await.unwrap();
        assert_eq!(transport.sent()[0].queue, "general");
    }

    #[tokio::test]
    async fn partial_signature_fails_before_submission() {
        let transport = Arc::new(RecordingTransport::default());
        let client = recording_client(Arc::clone(&transport));

        let err = client.apply_async(&s("t.add", [4])).await.unwrap_err();
        assert!(matches!(err, TaskError::Arity { .. }));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn unknown_task_fails_lookup_before_submission() {
        let transport = Arc::new(RecordingTransport::default());
        let client = recording_client(Arc::clone(&transport));

        let err = client.apply_async(&s("t.nope", [1])).await.unwrap_err();
        assert!(matches!(err, TaskError::Lookup { .. }));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn apply_async_with_binds_and_overlays_options() {
        let transport = Arc::new(RecordingTransport::default());
        let client = recording_client(Arc::clone(&transport));

        let partial = s("t.add", [2]);
        let overlay = SignatureOptions {
            queue: Some("hipri".to_string()),
            ..SignatureOptions::default()
        };
        client
            .apply_async_with(&partial, vec![json!(8)], [], &overlay)
            .await
            .unwrap();

        let sent = transport.sent();
        assert_eq!(sent[0].args, vec![json!(8), json!(2)]);
        assert_eq!(sent[0].queue, "hipri");
    }

    #[tokio::test]
    async fn chain_submits_only_first_link_and_tracks_last() {
        let transport = Arc::new(RecordingTransport::default());
        let client = recording_client(Arc::clone(&transport));

        let chain = s("t.add", [4, 4]) | s("t.double", Vec::<i64>::new());
        let handle = client.apply_chain(&chain).await.unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].task_name, "t.add");
        let next = match sent[0].on_success.as_deref() {
            Some(Continuation::Task(msg)) => msg,
            other => panic!("expected a task continuation, got {other:?}"),
        };
        assert_eq!(next.task_name, "t.double");
        assert_eq!(handle.id(), next.id);
        assert_eq!(handle.parent().map(AsyncResult::id), Some(sent[0].id.as_str()));
    }

    #[tokio::test]
    async fn chain_validates_every_link_upfront() {
        let transport = Arc::new(RecordingTransport::default());
        let client = recording_client(Arc::clone(&transport));

        // The second link would receive the prepended result on top of its
        // own two args, overfilling t.add.
        let chain = s("t.add", [4, 4]) | s("t.add", [1, 2]);
        let err = client.apply_chain(&chain).await.unwrap_err();
        assert!(matches!(err, TaskError::Arity { .. }));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn immutable_link_is_checked_without_prepend() {
        let transport = Arc::new(RecordingTransport::default());
        let client = recording_client(Arc::clone(&transport));

        let chain = s("t.add", [4, 4]) | crate::signature::si("t.add", [1, 2]);
        client.apply_chain(&chain).await.unwrap();
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn empty_chain_is_rejected() {
        let transport = Arc::new(RecordingTransport::default());
        let client = recording_client(Arc::clone(&transport));

        let err = client.apply_chain(&Chain::default()).await.unwrap_err();
        assert!(matches!(err, TaskError::InvalidWorkflow { .. }));
    }

    #[tokio::test]
    async fn group_members_submit_in_order_with_broadcast_args() {
        let transport = Arc::new(RecordingTransport::default());
        let client = recording_client(Arc::clone(&transport));

        let g = group([s("t.add", [1]), s("t.add", [2]), s("t.add", [3])]);
        let result = client
            .apply_group_with(&g, vec![json!(10)])
            .await
            .unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 3);
        for (i, message) in sent.iter().enumerate() {
            assert_eq!(message.args, vec![json!(10), json!(i as i64 + 1)]);
            assert_eq!(message.id, result.results()[i].id());
        }
    }

    #[tokio::test]
    async fn group_validation_failure_submits_nothing() {
        let transport = Arc::new(RecordingTransport::default());
        let client = recording_client(Arc::clone(&transport));

        // Last member is partial; nothing may reach the transport.
        let g = group([s("t.add", [1, 2]), s("t.add", [3])]);
        let err = client.apply_group(&g).await.unwrap_err();
        assert!(matches!(err, TaskError::Arity { .. }));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn group_transport_fault_reports_submitted_ids() {
        let transport = Arc::new(RecordingTransport::failing_after(2));
        let client = recording_client(Arc::clone(&transport));

        let g = group([
            s("t.double", [1]),
            s("t.double", [2]),
            s("t.double", [3]),
        ]);
        let err = client.apply_group(&g).await.unwrap_err();
        match err {
            TaskError::GroupSubmission {
                submitted, total, ..
            } => {
                assert_eq!(total, 3);
                assert_eq!(submitted.len(), 2);
                let sent_ids: Vec<String> =
                    transport.sent().iter().map(|m| m.id.clone()).collect();
                assert_eq!(submitted, sent_ids);
            },
            other => panic!("expected GroupSubmission, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn chord_members_carry_slots_and_callback() {
        let transport = Arc::new(RecordingTransport::default());
        let client = recording_client(Arc::clone(&transport));

        let c = chord(
            group([s("t.double", [1]), s("t.double", [2])]),
            s("t.sum", Vec::<i64>::new()),
        );
        let handle = client.apply_chord(&c).await.unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        for (index, message) in sent.iter().enumerate() {
            let info = message.chord.as_ref().expect("member chord info");
            assert_eq!(info.index, index);
            assert_eq!(info.size, 2);
            assert_eq!(info.chord_id, handle.id());
            assert_eq!(info.callback.task_name, "t.sum");
        }
    }

    #[tokio::test]
    async fn empty_chord_submits_callback_immediately() {
        let transport = Arc::new(RecordingTransport::default());
        let client = recording_client(Arc::clone(&transport));

        let c = chord(group(Vec::<Signature>::new()), s("t.sum", Vec::<i64>::new()));
        let handle = client.apply_chord(&c).await.unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].id, handle.id());
        assert_eq!(sent[0].args, vec![json!([])]);
    }

    #[tokio::test]
    async fn trailing_group_chain_compiles_to_chord_continuation() {
        let transport = Arc::new(RecordingTransport::default());
        let client = recording_client(Arc::clone(&transport));

        let wf = s("t.double", [1])
            | group([s("t.double", Vec::<i64>::new()), s("t.double", Vec::<i64>::new())])
            | s("t.sum", Vec::<i64>::new());
        let handle = client.apply_chain(&wf).await.unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        let plan = match sent[0].on_success.as_deref() {
            Some(Continuation::Chord(plan)) => plan,
            other => panic!("expected a chord continuation, got {other:?}"),
        };
        assert_eq!(plan.members.len(), 2);
        assert_eq!(plan.callback.task_name, "t.sum");
        assert_eq!(handle.id(), plan.callback.id);
    }

    #[tokio::test]
    async fn callback_chain_linearizes_behind_own_callbacks() {
        let transport = Arc::new(RecordingTransport::default());
        let client = recording_client(Arc::clone(&transport));

        let sig = s("t.double", [2]).with_callback(s("t.double", Vec::<i64>::new()));
        client.apply_async(&sig).await.unwrap();

        let sent = transport.sent();
        let next = match sent[0].on_success.as_deref() {
            Some(Continuation::Task(msg)) => msg,
            other => panic!("expected a task continuation, got {other:?}"),
        };
        assert_eq!(next.task_name, "t.double");
        assert!(next.on_success.is_none());
    }

    #[tokio::test]
    async fn errback_is_planned_with_prepend_allowance() {
        let transport = Arc::new(RecordingTransport::default());
        let client = recording_client(Arc::clone(&transport));

        // t.report takes one parameter, filled by the prepended descriptor.
        let sig = s("t.add", [4, 4]).with_errback(signature("t.report"));
        client.apply_async(&sig).await.unwrap();

        let sent = transport.sent();
        let errback = sent[0].errback.as_deref().expect("planned errback");
        assert_eq!(errback.task_name, "t.report");
        assert!(errback.args.is_empty());
    }

    #[tokio::test]
    async fn apply_runs_locally_without_submitting() {
        let transport = Arc::new(RecordingTransport::default());
        let client = recording_client(Arc::clone(&transport));

        let value = client.apply(&s("t.add", [4, 4])).await.unwrap();
        assert_eq!(value, json!(8));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn apply_propagates_failures_immediately() {
        let transport = Arc::new(RecordingTransport::default());
        let client = recording_client(Arc::clone(&transport));

        let err = client
            .apply(&s("t.add", ["oops", "nope"]))
            .await
            .unwrap_err();
        match err {
            TaskError::Remote { info, .. } => assert_eq!(info.kind, "TypeError"),
            other => panic!("expected Remote, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn dispatch_matches_workflow_shape() {
        let transport = Arc::new(RecordingTransport::default());
        let client = recording_client(Arc::clone(&transport));

        let single = client.dispatch(s("t.double", [1])).await.unwrap();
        assert!(single.task().is_some());

        let grouped = client
            .dispatch(group([s("t.double", [1]), s("t.double", [2])]))
            .await
            .unwrap();
        assert_eq!(grouped.group().map(GroupResult::len), Some(2));
    }

    #[tokio::test]
    async fn countdown_resolves_to_eta_at_planning() {
        let transport = Arc::new(RecordingTransport::default());
        let client = recording_client(Arc::clone(&transport));

        let eta = chrono::Utc::now() + chrono::Duration::seconds(30);
        client
            .apply_async(&s("t.double", [1]).with_countdown(5.0))
            .await
            .unwrap();
        client
            .apply_async(&s("t.double", [1]).with_eta(eta))
            .await
            .unwrap();
        client
            .apply_async(&s("t.double", [1]).with_countdown(5.0).with_eta(eta))
            .await
            .unwrap();

        let sent = transport.sent();
        let resolved = sent[0].eta.expect("countdown resolved to an eta");
        let delay = resolved - chrono::Utc::now();
        assert!(delay <= chrono::Duration::seconds(5));
        assert!(delay > chrono::Duration::seconds(3));
        assert_eq!(sent[1].eta, Some(eta));
        // An explicit eta beats a countdown.
        assert_eq!(sent[2].eta, Some(eta));
    }
}
