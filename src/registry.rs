//! Task registry: name to handler resolution.
//!
//! Every invokable unit is registered up front under a string name together
//! with a [`TaskSpec`] describing its parameter contract. Dispatch resolves
//! names through the registry and rejects unknown ones with
//! [`TaskError::Lookup`] before anything is submitted; the parameter contract
//! backs the completeness check that raises [`TaskError::Arity`] for partial
//! signatures.
//!
//! There is no ambient global registry. Each [`Client`](crate::Client) and
//! [`Worker`](crate::Worker) is handed its registry explicitly, normally a
//! shared [`Arc`].
//!
//! # Examples
//!
//! ```
//! use baton::{TaskFailure, TaskRegistry, TaskSpec};
//! use serde_json::{json, Value};
//!
//! let registry = TaskRegistry::new();
//! registry.register_fn(TaskSpec::new("tasks.add", ["x", "y"]), |args, _kwargs| async move {
//!     let x = args[0].as_i64().ok_or_else(|| TaskFailure::error("TypeError", "x: not an int"))?;
//!     let y = args[1].as_i64().ok_or_else(|| TaskFailure::error("TypeError", "y: not an int"))?;
//!     Ok(json!(x + y))
//! });
//! assert!(registry.get("tasks.add").is_some());
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use crate::error::{TaskError, TaskFailure};
use crate::signature::{Args, Kwargs};
use crate::workflow::COLLECT_TASK;

/// Future returned by a task handler.
pub type TaskFuture = Pin<Box<dyn Future<Output = Result<Value, TaskFailure>> + Send>>;

/// The executable side of a task.
///
/// Handlers receive the fully resolved positional and keyword arguments and
/// either produce a JSON value or fail with a [`TaskFailure`] (a final error
/// or a retry request). Most callers register plain async functions via
/// [`TaskRegistry::register_fn`] instead of implementing this directly.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Executes the task.
    async fn run(&self, args: Args, kwargs: Kwargs) -> Result<Value, TaskFailure>;
}

struct FnHandler {
    func: Box<dyn Fn(Args, Kwargs) -> TaskFuture + Send + Sync>,
}

#[async_trait]
impl TaskHandler for FnHandler {
    async fn run(&self, args: Args, kwargs: Kwargs) -> Result<Value, TaskFailure> {
        (self.func)(args, kwargs).await
    }
}

/// Declared contract and execution policy of a registered task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    /// Unique task name, e.g. `"tasks.add"`.
    pub name: String,

    /// Required parameter names, in declaration order. Positional arguments
    /// fill them left to right; keyword arguments fill them by name.
    pub params: Vec<String>,

    /// Per-task retry ceiling, overriding
    /// [`Config::default_max_retries`](crate::Config::default_max_retries).
    pub max_retries: Option<u32>,

    /// Per-task override of
    /// [`Config::track_started`](crate::Config::track_started).
    pub track_started: Option<bool>,
}

impl TaskSpec {
    /// Creates a spec with the given parameter names and no overrides.
    pub fn new<N, I, P>(name: N, params: I) -> Self
    where
        N: Into<String>,
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Self {
            name: name.into(),
            params: params.into_iter().map(Into::into).collect(),
            max_retries: None,
            track_started: None,
        }
    }

    /// Sets the per-task retry ceiling.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Sets the per-task `STARTED`-tracking override.
    #[must_use]
    pub fn with_track_started(mut self, track_started: bool) -> Self {
        self.track_started = Some(track_started);
        self
    }

    /// Checks `args`/`kwargs` against the parameter contract.
    ///
    /// A call is complete when every parameter is bound exactly once:
    /// positionals fill parameters left to right, keywords fill the rest by
    /// name. Anything else is an arity error: surplus positionals, an
    /// unknown keyword, a parameter bound both ways, or a parameter left
    /// unbound.
    pub fn check_arity(&self, args: &Args, kwargs: &Kwargs) -> Result<(), TaskError> {
        if args.len() > self.params.len() {
            return Err(self.arity_error(format!(
                "takes {} positional argument(s) but {} were given",
                self.params.len(),
                args.len()
            )));
        }
        for key in kwargs.keys() {
            if !self.params.iter().any(|p| p == key) {
                return Err(self.arity_error(format!("got an unexpected keyword argument '{key}'")));
            }
        }
        for (index, param) in self.params.iter().enumerate() {
            if index < args.len() {
                if kwargs.contains_key(param) {
                    return Err(
                        self.arity_error(format!("got multiple values for argument '{param}'"))
                    );
                }
            } else if !kwargs.contains_key(param) {
                return Err(self.arity_error(format!("missing required argument '{param}'")));
            }
        }
        Ok(())
    }

    fn arity_error(&self, detail: String) -> TaskError {
        TaskError::Arity {
            task_name: self.name.clone(),
            detail,
        }
    }
}

/// A registered task: its contract plus its handler.
#[derive(Clone)]
pub struct RegisteredTask {
    /// Declared contract and policy.
    pub spec: TaskSpec,
    /// The executable handler.
    pub handler: Arc<dyn TaskHandler>,
}

impl std::fmt::Debug for RegisteredTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredTask")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

/// Maps task names to handlers.
///
/// Interior-mutable so a shared `Arc<TaskRegistry>` can be handed to clients
/// and workers; registration normally happens once at startup.
pub struct TaskRegistry {
    tasks: RwLock<HashMap<String, RegisteredTask>>,
}

impl TaskRegistry {
    /// Creates a registry pre-populated with the builtin passthrough
    /// callback ([`COLLECT_TASK`]) used by the trailing-group rewrite.
    pub fn new() -> Self {
        let registry = Self {
            tasks: RwLock::new(HashMap::new()),
        };
        registry.register_fn(
            TaskSpec::new(COLLECT_TASK, ["results"]),
            |mut args, mut kwargs| async move {
                if !args.is_empty() {
                    Ok(args.remove(0))
                } else {
                    Ok(kwargs.remove("results").unwrap_or(Value::Null))
                }
            },
        );
        registry
    }

    /// Registers a handler under `spec.name`, replacing (with a warning) any
    /// existing registration of the same name.
    pub fn register(&self, spec: TaskSpec, handler: Arc<dyn TaskHandler>) {
        let name = spec.name.clone();
        let previous = self
            .tasks
            .write()
            .insert(name.clone(), RegisteredTask { spec, handler });
        if previous.is_some() {
            tracing::warn!(task = %name, "replacing existing task registration");
        }
    }

    /// Registers a plain async function as a task handler.
    pub fn register_fn<F, Fut>(&self, spec: TaskSpec, func: F)
    where
        F: Fn(Args, Kwargs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, TaskFailure>> + Send + 'static,
    {
        let handler = FnHandler {
            func: Box::new(move |args, kwargs| Box::pin(func(args, kwargs))),
        };
        self.register(spec, Arc::new(handler));
    }

    /// Looks a task up by name.
    pub fn get(&self, name: &str) -> Option<RegisteredTask> {
        self.tasks.read().get(name).cloned()
    }

    /// Looks a task up by name, failing with [`TaskError::Lookup`] for
    /// unknown names.
    pub fn lookup(&self, name: &str) -> Result<RegisteredTask, TaskError> {
        self.get(name).ok_or_else(|| TaskError::Lookup {
            task_name: name.to_string(),
        })
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.tasks.read().contains_key(name)
    }

    /// Registered task names, unordered.
    pub fn task_names(&self) -> Vec<String> {
        self.tasks.read().keys().cloned().collect()
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names = self.task_names();
        names.sort();
        f.debug_struct("TaskRegistry").field("tasks", &names).finish()
    }
}
