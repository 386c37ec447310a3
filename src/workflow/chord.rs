//! Fan-out plus fan-in: a group with a completion callback.

use std::ops::BitOr;

use serde::{Deserialize, Serialize};

use crate::signature::Signature;
use crate::workflow::group::Group;

/// Task name of the builtin passthrough callback.
///
/// When a chain ends in a group, composition rewrites the trailing group
/// into a chord whose callback is this builtin, so the chain's overall
/// result is the ordered list of the group's results. The builtin is
/// registered automatically by
/// [`TaskRegistry::new`](crate::TaskRegistry::new).
///
/// # Examples
///
/// ```
/// use baton::workflow::COLLECT_TASK;
///
/// assert_eq!(COLLECT_TASK, "baton.collect");
/// ```
pub const COLLECT_TASK: &str = "baton.collect";

/// Returns the synthetic passthrough callback signature.
pub(crate) fn collect_signature() -> Signature {
    Signature::new(COLLECT_TASK)
}

/// A [`Group`] (the *header*) plus a callback invoked exactly once with the
/// ordered sequence of the group's results, after every member reaches a
/// terminal state.
///
/// The callback receives the results as a single prepended positional
/// argument (unless it is immutable). Member failure handling follows
/// [`Config::chord_error_policy`](crate::Config::chord_error_policy).
///
/// # Examples
///
/// ```
/// use baton::{chord, group, s};
///
/// let header = group((0..10).map(|i| s("tasks.double", [i])));
/// let c = chord(header, s("tasks.sum", Vec::<i64>::new()));
/// assert_eq!(c.header.len(), 10);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chord {
    /// The fanned-out group.
    pub header: Group,
    /// The fan-in callback.
    pub callback: Signature,
}

impl Chord {
    /// Creates a chord from a header group and a callback signature.
    pub fn new(header: Group, callback: Signature) -> Self {
        Self { header, callback }
    }

    /// Chord whose callback is the builtin passthrough -- produced by the
    /// trailing-group rewrite so the aggregated results flow onward
    /// unchanged.
    pub(crate) fn collecting(header: Group) -> Self {
        Self::new(header, collect_signature())
    }

    /// Whether the callback is still the untouched synthetic passthrough
    /// (and may therefore be replaced by a later-composed signature).
    pub(crate) fn has_synthetic_callback(&self) -> bool {
        self.callback == collect_signature()
    }
}

/// Creates a [`Chord`] from a header group and a callback.
pub fn chord(header: Group, callback: Signature) -> Chord {
    Chord::new(header, callback)
}

/// `chord | sig` -- the signature runs after the chord callback.
///
/// If the callback is the synthetic passthrough left by a trailing-group
/// rewrite, the signature simply replaces it (passthrough-then-`sig` and
/// `sig` compute the same thing). Otherwise the signature is appended to
/// the callback's success-callback chain.
impl BitOr<Signature> for Chord {
    type Output = Chord;

    fn bitor(mut self, rhs: Signature) -> Chord {
        if self.has_synthetic_callback() {
            self.callback = rhs;
        } else {
            self.callback.push_callback(rhs);
        }
        self
    }
}
