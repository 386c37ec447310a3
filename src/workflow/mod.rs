//! Workflow combinators: groups, chains, and chords.
//!
//! All three are plain descriptions built out of [`Signature`]s; nothing is
//! submitted until they reach [`Client`](crate::Client). Composition uses the
//! pipe operator:
//!
//! | Expression        | Result                                                  |
//! |-------------------|---------------------------------------------------------|
//! | `sig \| sig`      | [`Chain`] of two links                                  |
//! | `chain \| sig`    | chain with the signature appended                       |
//! | `sig \| chain`    | chain with the signature prepended                      |
//! | `group \| sig`    | [`Chord`]: the group as header, the signature as callback |
//! | `chain \| group`  | chain ending in a chord with the passthrough callback   |
//! | `chord \| sig`    | chord with the signature as (or chained after) its callback |
//!
//! `group | group` and `chord | group` are deliberately not implemented:
//! nesting a group inside another group's slot has no execution order, so the
//! compositions are rejected at the type level.

mod chain;
mod chord;
mod group;

pub use chain::{chain, Chain};
pub use chord::{chord, Chord, COLLECT_TASK};
pub use group::{group, Group};

use serde::{Deserialize, Serialize};

use crate::signature::Signature;

/// Any dispatchable unit: a lone signature or one of the combinators.
///
/// Serialized as a tagged union so stored or transported workflows
/// identify their shape explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Workflow {
    /// A single task invocation.
    Signature(Signature),
    /// Independent tasks submitted together.
    Group(Group),
    /// A sequential pipeline.
    Chain(Chain),
    /// A group with a completion callback.
    Chord(Chord),
}

impl From<Signature> for Workflow {
    fn from(sig: Signature) -> Self {
        Self::Signature(sig)
    }
}

impl From<Group> for Workflow {
    fn from(g: Group) -> Self {
        Self::Group(g)
    }
}

impl From<Chain> for Workflow {
    fn from(c: Chain) -> Self {
        Self::Chain(c)
    }
}

impl From<Chord> for Workflow {
    fn from(c: Chord) -> Self {
        Self::Chord(c)
    }
}
