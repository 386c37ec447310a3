//! In-process transport: a worker loop on the local runtime.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::backend::ResultStore;
use crate::config::Config;
use crate::error::TaskError;
use crate::message::TaskMessage;
use crate::registry::TaskRegistry;
use crate::transport::Transport;
use crate::worker::Worker;

/// Transport that hands every submitted message to an in-process worker.
///
/// Messages are executed concurrently: the pump spawns one task per
/// message, so a delayed or slow task never blocks later submissions.
/// Queue names are carried through but not partitioned; one loop serves
/// all queues.
///
/// Created via [`spawn`], which wires the worker back to this transport so
/// chain continuations, retries, and chord callbacks are resubmitted
/// through the same loop.
#[derive(Debug)]
pub struct LocalTransport {
    sender: mpsc::UnboundedSender<TaskMessage>,
}

/// Handle to the spawned worker loop.
///
/// Dropping the handle detaches the loop (it keeps running on the
/// runtime); [`shutdown`](WorkerHandle::shutdown) stops it.
#[derive(Debug)]
pub struct WorkerHandle {
    pump: JoinHandle<()>,
}

impl WorkerHandle {
    /// Stops the worker loop. In-flight tasks are aborted with it.
    pub fn shutdown(self) {
        self.pump.abort();
    }
}

/// Spawns a local worker loop and returns the transport feeding it.
///
/// Must be called from within a tokio runtime.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use baton::backend::{InMemoryBackend, ResultStore};
/// use baton::transport::local;
/// use baton::{Config, TaskRegistry};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let config = Arc::new(Config::default());
/// let registry = Arc::new(TaskRegistry::new());
/// let store = ResultStore::new(Arc::new(InMemoryBackend::new()), &config);
/// let (transport, worker) = local::spawn(Arc::clone(&registry), store, Arc::clone(&config));
/// # drop(transport);
/// # worker.shutdown();
/// # }
/// ```
pub fn spawn(
    registry: Arc<TaskRegistry>,
    store: ResultStore,
    config: Arc<Config>,
) -> (Arc<LocalTransport>, WorkerHandle) {
    let (sender, mut receiver) = mpsc::unbounded_channel::<TaskMessage>();
    let transport = Arc::new(LocalTransport { sender });

    let worker = Arc::new(Worker::new(
        Arc::clone(&transport) as Arc<dyn Transport>,
        store,
        registry,
        config,
    ));

    let pump = tokio::spawn(async move {
        while let Some(message) = receiver.recv().await {
            let worker = Arc::clone(&worker);
            tokio::spawn(async move {
                worker.process(message).await;
            });
        }
    });

    (transport, WorkerHandle { pump })
}

#[async_trait]
impl Transport for LocalTransport {
    async fn submit(&self, message: TaskMessage) -> Result<String, TaskError> {
        let id = message.id.clone();
        tracing::debug!(task_id = %id, task = %message.task_name, queue = %message.queue, "submitting task");
        self.sender
            .send(message)
            .map_err(|_| TaskError::transport("local worker is not running"))?;
        Ok(id)
    }
}
