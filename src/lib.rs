//! Composable task signatures, workflow combinators, and result tracking
//! for distributed task queues.
//!
//! `baton` is the caller-side core of a task queue: it describes work as
//! [`Signature`]s, composes them into groups, chains, and chords, plans
//! them into transport messages, and tracks their outcomes through a
//! shared result backend. Execution itself lives behind two small traits
//! ([`Transport`](transport::Transport) and
//! [`ResultBackend`](backend::ResultBackend)); the bundled local transport
//! runs a worker loop in-process, which covers development and tests.
//!
//! # Overview
//!
//! - A **signature** names a registered task and carries args, kwargs, and
//!   options (queue, countdown/eta, immutability, callbacks). Partial
//!   signatures are bound late; completeness is enforced at dispatch.
//! - **Combinators** compose signatures with the pipe operator:
//!   [`Chain`](workflow::Chain) threads each result into the next link,
//!   [`Group`](workflow::Group) fans out independent tasks, and
//!   [`Chord`](workflow::Chord) calls back once a whole group is done. A
//!   chain ending in a group rewrites to a chord at composition time.
//! - **Results** are polled through [`AsyncResult`]/[`GroupResult`]
//!   against the result store; every read is fresh, unknown ids report
//!   `PENDING`, and `SUCCESS`/`FAILURE` are final.
//!
//! # Quick start
//!
//! ```
//! use std::sync::Arc;
//! use baton::{group, s, Client, Config, TaskRegistry, TaskSpec};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), baton::TaskError> {
//! let registry = Arc::new(TaskRegistry::new());
//! registry.register_fn(TaskSpec::new("tasks.add", ["x", "y"]), |args, _| async move {
//!     Ok(json!(args[0].as_i64().unwrap_or(0) + args[1].as_i64().unwrap_or(0)))
//! });
//! registry.register_fn(TaskSpec::new("tasks.sum", ["values"]), |args, _| async move {
//!     let total: i64 = args[0]
//!         .as_array()
//!         .map(|vs| vs.iter().filter_map(|v| v.as_i64()).sum())
//!         .unwrap_or(0);
//!     Ok(json!(total))
//! });
//!
//! let (client, worker) = Client::local(registry, Config::default());
//!
//! // A single task.
//! let result = client.apply_async(&s("tasks.add", [4, 4])).await?;
//! assert_eq!(result.get().await?, json!(8));
//!
//! // A chord: fan out three adds, then sum the collected results.
//! let workflow = group((0..3).map(|i| s("tasks.add", [i, i]))) | s("tasks.sum", Vec::<i64>::new());
//! let result = client.apply_chord(&workflow).await?;
//! assert_eq!(result.get().await?, json!(6));
//!
//! worker.shutdown();
//! # Ok(())
//! # }
//! ```
//!
//! # Module organization
//!
//! - [`signature`] - call descriptors, late binding, execution options
//! - [`workflow`] - group/chain/chord combinators and the pipe operator
//! - [`registry`] - task name to handler resolution and arity contracts
//! - [`client`] - dispatch: planning, validation, submission, handles
//! - [`result`] - `AsyncResult`/`GroupResult` polling
//! - [`worker`] - message execution, retries, callbacks, chord accounting
//! - [`backend`] - result storage (in-memory; Redis behind the `redis`
//!   feature)
//! - [`transport`] - submission trait and the in-process local transport
//! - [`state`], [`error`], [`config`] - the state machine, error types,
//!   and engine configuration
//!
//! # Feature flags
//!
//! - `redis` - enables [`backend::RedisBackend`]
//! - `redis-tests` - additionally compiles the live-server tests (needs a
//!   reachable Redis; see `REDIS_URL`)

pub mod aggregator;
pub mod backend;
pub mod client;
pub mod config;
pub mod error;
pub mod message;
pub mod registry;
pub mod result;
pub mod signature;
pub mod state;
pub mod transport;
pub mod worker;
pub mod workflow;

// Re-exports for ergonomic access
pub use client::{Client, Dispatched};
pub use config::{ChordErrorPolicy, Config, DEFAULT_QUEUE};
pub use error::{ErrorInfo, TaskError, TaskFailure};
pub use registry::{TaskHandler, TaskRegistry, TaskSpec};
pub use result::{AsyncResult, GetOptions, GroupResult};
pub use signature::{s, si, signature, Signature, SignatureOptions};
pub use state::TaskState;
pub use worker::Worker;
pub use workflow::{chain, chord, group, Chain, Chord, Group, Workflow};
