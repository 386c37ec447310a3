//! Sequential pipelines where each result feeds the next link.
//!
//! A [`Chain`] is built with the pipe operator (or [`chain`]) and holds its
//! links as plain signatures. Execution is deferred link by link: the
//! dispatcher submits only the first link, and each worker submits the next
//! link when its own completes, prepending the fresh result as the sole new
//! positional argument (unless the next link is immutable).
//!
//! Groups never appear *between* links. Composing a group onto the end of a
//! chain immediately rewrites it into a trailing [`Chord`] whose callback is
//! the builtin passthrough ([`COLLECT_TASK`](crate::workflow::COLLECT_TASK)),
//! so the ordered member results flow onward as a single value; composing a
//! further signature replaces that passthrough. The rewrite happens once, at
//! composition time -- there is nothing left to reinterpret at dispatch.
//!
//! # Examples
//!
//! ```
//! use baton::{group, s};
//!
//! // add(4, 4) then mul(8) -- mul receives add's result prepended.
//! let pipeline = s("tasks.add", [4, 4]) | s("tasks.mul", [8]);
//! assert_eq!(pipeline.links.len(), 2);
//!
//! // A trailing group becomes a chord with the passthrough callback.
//! let fan_out = pipeline | group((0..3).map(|i| s("tasks.double", [i])));
//! assert_eq!(fan_out.links.len(), 2);
//! assert_eq!(fan_out.tails.len(), 1);
//! ```

use std::ops::BitOr;

use serde::{Deserialize, Serialize};

use crate::signature::Signature;
use crate::workflow::chord::Chord;
use crate::workflow::group::Group;

/// A sequential pipeline of signatures, optionally ending in one or more
/// chords (each fed by the previous stage's result).
///
/// The overall result handle of a dispatched chain is the handle of its
/// *last* task -- the final link, or the final trailing chord's callback
/// (including anything chained after that callback).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Chain {
    /// Plain links, executed in order.
    pub links: Vec<Signature>,

    /// Trailing chords produced by composing groups (or chords) onto the
    /// chain; each runs after the previous stage completes.
    pub tails: Vec<Chord>,
}

impl Chain {
    /// Creates a chain of plain links.
    pub fn new<I: IntoIterator<Item = Signature>>(links: I) -> Self {
        Self {
            links: links.into_iter().collect(),
            tails: Vec::new(),
        }
    }

    /// True when the chain has neither links nor trailing chords. Empty
    /// chains fail dispatch with
    /// [`TaskError::InvalidWorkflow`](crate::TaskError::InvalidWorkflow).
    pub fn is_empty(&self) -> bool {
        self.links.is_empty() && self.tails.is_empty()
    }

    /// Appends a signature: a new link, or -- when the chain already ends in
    /// a chord -- the chord callback's successor (replacing a synthetic
    /// passthrough outright).
    fn append_signature(&mut self, sig: Signature) {
        match self.tails.last_mut() {
            None => self.links.push(sig),
            Some(tail) => {
                if tail.has_synthetic_callback() {
                    tail.callback = sig;
                } else {
                    tail.callback.push_callback(sig);
                }
            },
        }
    }
}

/// Creates a [`Chain`] of plain links.
pub fn chain<I: IntoIterator<Item = Signature>>(links: I) -> Chain {
    Chain::new(links)
}

/// `chain | sig` -- appends the signature as the new last task.
impl BitOr<Signature> for Chain {
    type Output = Chain;

    fn bitor(mut self, rhs: Signature) -> Chain {
        self.append_signature(rhs);
        self
    }
}

/// `chain | group` -- the trailing-group rewrite: the group arrives as a
/// chord with the synthetic passthrough callback.
impl BitOr<Group> for Chain {
    type Output = Chain;

    fn bitor(mut self, rhs: Group) -> Chain {
        self.tails.push(Chord::collecting(rhs));
        self
    }
}

/// `chain | chord` -- appends the chord as a trailing stage.
impl BitOr<Chord> for Chain {
    type Output = Chain;

    fn bitor(mut self, rhs: Chord) -> Chain {
        self.tails.push(rhs);
        self
    }
}

/// `sig | sig` -- a two-link chain.
impl BitOr<Signature> for Signature {
    type Output = Chain;

    fn bitor(self, rhs: Signature) -> Chain {
        Chain::new([self, rhs])
    }
}

/// `sig | group` -- a chain whose trailing group is rewritten to a chord
/// with the synthetic passthrough callback.
impl BitOr<Group> for Signature {
    type Output = Chain;

    fn bitor(self, rhs: Group) -> Chain {
        Chain::new([self]) | rhs
    }
}

/// `sig | chain` -- prepends the signature as the first link.
impl BitOr<Chain> for Signature {
    type Output = Chain;

    fn bitor(self, mut rhs: Chain) -> Chain {
        rhs.links.insert(0, self);
        rhs
    }
}

/// `sig | chord` -- a chain with the chord as its trailing stage.
impl BitOr<Chord> for Signature {
    type Output = Chain;

    fn bitor(self, rhs: Chord) -> Chain {
        Chain::new([self]) | rhs
    }
}
