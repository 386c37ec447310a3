//! Task signatures: deferred, serializable call descriptors.
//!
//! A [`Signature`] names a task and carries the positional args, keyword
//! args, and execution options the call will eventually be made with. It is
//! the unit everything else composes: chains link signatures, groups fan
//! them out, chords aggregate them.
//!
//! Signatures are never mutated in place. [`Signature::bind`] returns a new
//! signature with late-bound arguments merged in; whether the result is
//! *complete* (satisfies the named task's parameter contract) is checked
//! only at dispatch, against the [`TaskRegistry`](crate::TaskRegistry).
//!
//! # Examples
//!
//! ```
//! use baton::{s, si, signature};
//! use serde_json::json;
//!
//! // Complete signature: add(2, 2).
//! let add = s("tasks.add", [2, 2]);
//! assert_eq!(add.args.len(), 2);
//!
//! // Partial signature: add(?, 2) -- bind fills the earliest slot first.
//! let partial = s("tasks.add", [2]);
//! let bound = partial.bind([json!(8)], []);
//! assert_eq!(bound.args, vec![json!(8), json!(2)]);
//!
//! // Immutable shorthand: ignores a predecessor's result in a chain.
//! assert!(si("tasks.cleanup", [1]).options.immutable);
//! assert!(!signature("tasks.cleanup").options.immutable);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Ordered positional arguments.
pub type Args = Vec<Value>;

/// Keyword arguments. Keys are unique; insertion order is preserved.
pub type Kwargs = serde_json::Map<String, Value>;

/// Execution options attached to a [`Signature`].
///
/// Every field is optional in the sense that the zero value means "engine
/// default": no queue override, no delay, not immutable, no callbacks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignatureOptions {
    /// Target queue, overriding the routing table and default queue.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,

    /// Seconds before the task becomes eligible for execution. Ignored when
    /// [`eta`](Self::eta) is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub countdown: Option<f64>,

    /// Absolute earliest execution time. Takes precedence over
    /// [`countdown`](Self::countdown).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta: Option<DateTime<Utc>>,

    /// When true, the signature runs with its own arguments even inside a
    /// chain or as a callback -- the predecessor's result is not prepended.
    #[serde(default)]
    pub immutable: bool,

    /// Fired on success with the result prepended (unless the callback is
    /// itself immutable).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback: Option<Box<Signature>>,

    /// Fired on final failure with the error descriptor prepended (unless
    /// the errback is itself immutable).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errback: Option<Box<Signature>>,
}

impl SignatureOptions {
    /// Per-key overlay merge: `overlay`'s set fields win, unset fields keep
    /// the receiver's values. `immutable` is OR-merged -- an overlay can set
    /// it but not unset it.
    #[must_use]
    pub fn merged(&self, overlay: &SignatureOptions) -> SignatureOptions {
        SignatureOptions {
            queue: overlay.queue.clone().or_else(|| self.queue.clone()),
            countdown: overlay.countdown.or(self.countdown),
            eta: overlay.eta.or(self.eta),
            immutable: self.immutable || overlay.immutable,
            callback: overlay.callback.clone().or_else(|| self.callback.clone()),
            errback: overlay.errback.clone().or_else(|| self.errback.clone()),
        }
    }
}

/// A deferred, serializable description of a single task invocation.
///
/// # Completeness
///
/// A signature is *complete* when its args/kwargs satisfy the parameter
/// contract of the task it names, and *partial* otherwise. Binding never
/// fails -- a still-partial signature fails with
/// [`TaskError::Arity`](crate::TaskError::Arity) at dispatch, before
/// anything is submitted.
///
/// # Examples
///
/// ```
/// use baton::Signature;
///
/// let sig = Signature::new("tasks.add")
///     .with_args([2, 2])
///     .with_queue("hipri")
///     .with_countdown(10.0);
/// assert_eq!(sig.task_name, "tasks.add");
/// assert_eq!(sig.options.queue.as_deref(), Some("hipri"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    /// Name of the invokable unit, resolved through the registry.
    pub task_name: String,

    /// Ordered positional arguments bound so far.
    #[serde(default)]
    pub args: Args,

    /// Keyword arguments bound so far.
    #[serde(default)]
    pub kwargs: Kwargs,

    /// Execution options.
    #[serde(default)]
    pub options: SignatureOptions,
}

impl Signature {
    /// Creates a signature with no arguments and default options.
    pub fn new(task_name: impl Into<String>) -> Self {
        Self {
            task_name: task_name.into(),
            args: Args::new(),
            kwargs: Kwargs::new(),
            options: SignatureOptions::default(),
        }
    }

    /// Replaces the positional arguments.
    #[must_use]
    pub fn with_args<I, T>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Appends one positional argument.
    #[must_use]
    pub fn with_arg(mut self, arg: impl Into<Value>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Inserts one keyword argument, replacing any existing value.
    #[must_use]
    pub fn with_kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(key.into(), value.into());
        self
    }

    /// Replaces the keyword arguments.
    #[must_use]
    pub fn with_kwargs(mut self, kwargs: Kwargs) -> Self {
        self.kwargs = kwargs;
        self
    }

    /// Sets the target queue override.
    #[must_use]
    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.options.queue = Some(queue.into());
        self
    }

    /// Sets the countdown (seconds until eligible for execution).
    #[must_use]
    pub fn with_countdown(mut self, seconds: f64) -> Self {
        self.options.countdown = Some(seconds);
        self
    }

    /// Sets the absolute earliest execution time.
    #[must_use]
    pub fn with_eta(mut self, eta: DateTime<Utc>) -> Self {
        self.options.eta = Some(eta);
        self
    }

    /// Marks the signature immutable (or not).
    #[must_use]
    pub fn with_immutable(mut self, immutable: bool) -> Self {
        self.options.immutable = immutable;
        self
    }

    /// Attaches a success callback.
    #[must_use]
    pub fn with_callback(mut self, callback: Signature) -> Self {
        self.options.callback = Some(Box::new(callback));
        self
    }

    /// Attaches a failure callback.
    #[must_use]
    pub fn with_errback(mut self, errback: Signature) -> Self {
        self.options.errback = Some(Box::new(errback));
        self
    }

    /// Merges late-bound arguments into a new signature.
    ///
    /// `extra_args` are **prepended** -- they fill the earliest missing
    /// positional slots, so a partial `add(?, 2)` bound with `8` calls
    /// `add(8, 2)`. `extra_kwargs` merge with **new keys winning** on
    /// conflict and unrelated keys preserved. The receiver is unchanged and
    /// the merge itself never fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use baton::s;
    /// use serde_json::json;
    ///
    /// let partial = s("tasks.add", [2]);
    /// let bound = partial.bind([json!(8)], []);
    /// assert_eq!(bound.args, vec![json!(8), json!(2)]);
    /// // The receiver is untouched.
    /// assert_eq!(partial.args.len(), 1);
    ///
    /// let sig = baton::signature("tasks.report")
    ///     .with_kwarg("a", 1)
    ///     .with_kwarg("b", 2);
    /// let bound = sig.bind([], [("a".to_string(), json!(10))]);
    /// assert_eq!(bound.kwargs["a"], 10);
    /// assert_eq!(bound.kwargs["b"], 2);
    /// ```
    #[must_use]
    pub fn bind<A, K>(&self, extra_args: A, extra_kwargs: K) -> Signature
    where
        A: IntoIterator<Item = Value>,
        K: IntoIterator<Item = (String, Value)>,
    {
        let mut bound = self.clone();
        let mut args: Args = extra_args.into_iter().collect();
        args.append(&mut bound.args);
        bound.args = args;
        for (key, value) in extra_kwargs {
            bound.kwargs.insert(key, value);
        }
        bound
    }

    /// Returns a copy with `overlay` merged into the options per key.
    #[must_use]
    pub fn with_options(mut self, overlay: &SignatureOptions) -> Signature {
        self.options = self.options.merged(overlay);
        self
    }

    /// Appends `next` at the end of this signature's success-callback chain.
    ///
    /// Used by workflow composition when a link is attached behind a chord
    /// callback that already has work scheduled after it.
    pub(crate) fn push_callback(&mut self, next: Signature) {
        match &mut self.options.callback {
            Some(callback) => callback.push_callback(next),
            None => self.options.callback = Some(Box::new(next)),
        }
    }
}

/// Creates an empty signature for `task_name`.
///
/// # Examples
///
/// ```
/// use baton::signature;
///
/// let sig = signature("tasks.refresh");
/// assert!(sig.args.is_empty());
/// ```
pub fn signature(task_name: impl Into<String>) -> Signature {
    Signature::new(task_name)
}

/// Creates a signature with positional arguments: `s("tasks.add", [2, 2])`.
pub fn s<N, I, T>(task_name: N, args: I) -> Signature
where
    N: Into<String>,
    I: IntoIterator<Item = T>,
    T: Into<Value>,
{
    Signature::new(task_name).with_args(args)
}

/// Creates an **immutable** signature with positional arguments.
///
/// Immutable signatures keep their own arguments inside chains and
/// callbacks; the predecessor's result is not prepended.
pub fn si<N, I, T>(task_name: N, args: I) -> Signature
where
    N: Into<String>,
    I: IntoIterator<Item = T>,
    T: Into<Value>,
{
    s(task_name, args).with_immutable(true)
}
