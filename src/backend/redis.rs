//! Redis result backend (feature `redis`).
//!
//! Stores one JSON-serialized [`TaskMeta`] per task id under
//! `{prefix}-task-meta-{task_id}`. Expiry rides on Redis's native TTL:
//! records with an `expires_at` are written with `SET EX`, so Redis reclaims
//! them without any sweeper. [`ResultStore`](crate::backend::ResultStore)
//! still applies its lazy expiry check, which keeps behavior identical
//! across backends when clocks disagree.

use async_trait::async_trait;
use chrono::Utc;

// `::redis` disambiguates the crate from this module.
use ::redis::aio::MultiplexedConnection;
use ::redis::AsyncCommands;

use crate::backend::{ResultBackend, TaskMeta};
use crate::error::TaskError;

const DEFAULT_KEY_PREFIX: &str = "baton";

/// Result backend backed by a shared Redis instance.
///
/// Holds a [`MultiplexedConnection`], which clones cheaply; every operation
/// clones it so concurrent callers never contend on `&mut self`.
///
/// # Examples
///
/// ```rust,no_run
/// use baton::backend::RedisBackend;
///
/// # async fn example() -> Result<(), baton::TaskError> {
/// let backend = RedisBackend::new("redis://127.0.0.1:6379").await?;
///
/// // Unique prefixes isolate concurrent test runs.
/// let backend = RedisBackend::new("redis://127.0.0.1:6379")
///     .await?
///     .with_prefix("myapp-test");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RedisBackend {
    conn: MultiplexedConnection,
    key_prefix: String,
}

impl RedisBackend {
    /// Connects to Redis at `url` (`redis://[:<password>@]<host>:<port>[/<db>]`).
    ///
    /// Fails fast with [`TaskError::Backend`] if the client cannot be
    /// created or the connection cannot be established.
    pub async fn new(url: &str) -> Result<Self, TaskError> {
        let client = ::redis::Client::open(url)
            .map_err(|e| TaskError::backend_with(format!("failed to create Redis client: {e}"), e))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| TaskError::backend_with(format!("failed to connect to Redis: {e}"), e))?;
        Ok(Self {
            conn,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        })
    }

    /// Creates a backend over a pre-built multiplexed connection.
    pub fn with_connection(conn: MultiplexedConnection) -> Self {
        Self {
            conn,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }

    /// Sets a custom key prefix. Keys become
    /// `{prefix}-task-meta-{task_id}`.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    fn meta_key(&self, task_id: &str) -> String {
        format!("{}-task-meta-{}", self.key_prefix, task_id)
    }
}

fn map_redis_error(err: ::redis::RedisError, key: &str) -> TaskError {
    TaskError::backend_with(format!("Redis error for key {key}: {err}"), err)
}

#[async_trait]
impl ResultBackend for RedisBackend {
    async fn read_state(&self, task_id: &str) -> Result<Option<TaskMeta>, TaskError> {
        let key = self.meta_key(task_id);
        let mut conn = self.conn.clone();

        let data: Option<String> = conn
            .get(&key)
            .await
            .map_err(|e| map_redis_error(e, &key))?;
        match data {
            None => Ok(None),
            Some(json) => {
                let meta = serde_json::from_str(&json).map_err(|e| {
                    TaskError::backend_with(format!("corrupt task record for key {key}: {e}"), e)
                })?;
                Ok(Some(meta))
            },
        }
    }

    async fn write_state(&self, task_id: &str, meta: &TaskMeta) -> Result<(), TaskError> {
        let key = self.meta_key(task_id);
        let json = serde_json::to_string(meta).map_err(|e| {
            TaskError::backend_with(format!("failed to serialize task record for key {key}: {e}"), e)
        })?;
        let mut conn = self.conn.clone();

        let ttl_seconds = meta
            .expires_at
            .map(|at| (at - Utc::now()).num_seconds().max(1) as u64);
        match ttl_seconds {
            Some(secs) => conn
                .set_ex::<_, _, ()>(&key, json, secs)
                .await
                .map_err(|e| map_redis_error(e, &key))?,
            None => conn
                .set::<_, _, ()>(&key, json)
                .await
                .map_err(|e| map_redis_error(e, &key))?,
        }
        Ok(())
    }

    async fn delete_state(&self, task_id: &str) -> Result<bool, TaskError> {
        let key = self.meta_key(task_id);
        let mut conn = self.conn.clone();

        let removed: i64 = conn
            .del(&key)
            .await
            .map_err(|e| map_redis_error(e, &key))?;
        Ok(removed > 0)
    }
}
