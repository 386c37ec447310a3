//! Engine configuration.
//!
//! [`Config`] is constructed once at startup and shared (by `Arc`) with the
//! [`Client`](crate::Client) and [`Worker`](crate::Worker). There is no
//! ambient global configuration; everything that used to be "app state" in
//! classic task-queue frameworks is an explicit field here.

use std::collections::HashMap;
use std::time::Duration;

/// Queue used when a signature carries no override and no route matches.
///
/// # Examples
///
/// ```
/// use baton::config::DEFAULT_QUEUE;
///
/// assert_eq!(DEFAULT_QUEUE, "default");
/// ```
pub const DEFAULT_QUEUE: &str = "default";

/// What the chord aggregator does when a member fails.
///
/// The choice is deliberate configuration, not inferred behavior: a chord
/// callback's contract changes completely depending on whether it can
/// receive error descriptors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChordErrorPolicy {
    /// Do not invoke the callback. A `ChordError` failure naming the first
    /// failed member is written to the callback's task id instead, and the
    /// callback's errback (if any) fires.
    #[default]
    Propagate,
    /// Invoke the callback once all members are terminal, with error
    /// descriptors standing in for the values of failed members.
    InvokeWithErrors,
}

/// Engine configuration.
///
/// # Defaults
///
/// | Setting               | Default        | Description                                  |
/// |-----------------------|----------------|----------------------------------------------|
/// | `default_queue`       | `"default"`    | Queue when no route matches                  |
/// | `task_routes`         | empty          | Task name -> queue routing table             |
/// | `track_started`       | `false`        | Record `STARTED` states                      |
/// | `default_max_retries` | `3`            | Retry budget unless the task overrides it    |
/// | `poll_interval`       | `50 ms`        | Default polling cadence for `get()`          |
/// | `result_expires`      | `Some(24 h)`   | TTL stamped on terminal task metadata        |
/// | `chord_error_policy`  | `Propagate`    | Chord behavior under member failure          |
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use baton::{ChordErrorPolicy, Config};
///
/// let config = Config::default();
/// assert_eq!(config.default_queue, "default");
/// assert!(!config.track_started);
///
/// let config = Config::default()
///     .with_default_queue("general")
///     .with_route("proj.tasks.add", "hipri")
///     .with_track_started(true)
///     .with_poll_interval(Duration::from_millis(10))
///     .with_chord_error_policy(ChordErrorPolicy::InvokeWithErrors);
/// assert_eq!(config.route_for("proj.tasks.add"), "hipri");
/// assert_eq!(config.route_for("proj.tasks.mul"), "general");
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Queue used when the signature has no override and no route matches.
    pub default_queue: String,

    /// Central routing table: task name -> queue.
    ///
    /// A runtime `queue` option on the signature takes precedence over this
    /// table; the table takes precedence over [`default_queue`](Self::default_queue).
    pub task_routes: HashMap<String, String>,

    /// Whether workers record the `STARTED` state. Individual tasks may
    /// override this via
    /// [`TaskSpec::track_started`](crate::TaskSpec::track_started).
    pub track_started: bool,

    /// Retry budget for tasks that do not set their own
    /// [`TaskSpec::max_retries`](crate::TaskSpec::max_retries).
    pub default_max_retries: u32,

    /// Default backend polling cadence for blocking retrieval. Overridable
    /// per call via [`GetOptions::with_interval`](crate::GetOptions::with_interval).
    pub poll_interval: Duration,

    /// Time-to-live stamped on terminal task metadata; expired records read
    /// back as absent (state `PENDING`). `None` keeps results forever.
    pub result_expires: Option<Duration>,

    /// Chord behavior when a member fails.
    pub chord_error_policy: ChordErrorPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_queue: DEFAULT_QUEUE.to_string(),
            task_routes: HashMap::new(),
            track_started: false,
            default_max_retries: 3,
            poll_interval: Duration::from_millis(50),
            result_expires: Some(Duration::from_secs(24 * 60 * 60)),
            chord_error_policy: ChordErrorPolicy::default(),
        }
    }
}

impl Config {
    /// Sets the default queue name.
    #[must_use]
    pub fn with_default_queue(mut self, queue: impl Into<String>) -> Self {
        self.default_queue = queue.into();
        self
    }

    /// Adds one routing table entry.
    ///
    /// # Examples
    ///
    /// ```
    /// use baton::Config;
    ///
    /// let config = Config::default().with_route("proj.tasks.add", "hipri");
    /// assert_eq!(config.route_for("proj.tasks.add"), "hipri");
    /// ```
    #[must_use]
    pub fn with_route(mut self, task_name: impl Into<String>, queue: impl Into<String>) -> Self {
        self.task_routes.insert(task_name.into(), queue.into());
        self
    }

    /// Replaces the whole routing table.
    #[must_use]
    pub fn with_routes(mut self, routes: HashMap<String, String>) -> Self {
        self.task_routes = routes;
        self
    }

    /// Enables or disables `STARTED` recording.
    #[must_use]
    pub fn with_track_started(mut self, track: bool) -> Self {
        self.track_started = track;
        self
    }

    /// Sets the default retry budget.
    #[must_use]
    pub fn with_default_max_retries(mut self, max_retries: u32) -> Self {
        self.default_max_retries = max_retries;
        self
    }

    /// Sets the default polling cadence for blocking retrieval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets (or clears) the result TTL.
    #[must_use]
    pub fn with_result_expires(mut self, expires: Option<Duration>) -> Self {
        self.result_expires = expires;
        self
    }

    /// Sets the chord partial-failure policy.
    #[must_use]
    pub fn with_chord_error_policy(mut self, policy: ChordErrorPolicy) -> Self {
        self.chord_error_policy = policy;
        self
    }

    /// Resolves the queue for a task name from the routing table, falling
    /// back to the default queue.
    ///
    /// A runtime `queue` option on the signature is applied by the
    /// dispatcher *before* consulting this method, giving the documented
    /// precedence: runtime override > route table > default queue.
    pub fn route_for(&self, task_name: &str) -> &str {
        self.task_routes
            .get(task_name)
            .map(String::as_str)
            .unwrap_or(&self.default_queue)
    }
}
