//! Parallel fan-out of independent signatures.

use std::ops::BitOr;

use serde::{Deserialize, Serialize};

use crate::signature::Signature;
use crate::workflow::chord::Chord;

/// An ordered collection of signatures executed independently.
///
/// Dispatching a group submits every member (in order) and yields a
/// [`GroupResult`](crate::GroupResult) whose children follow submission
/// order -- completion order is unconstrained. Piping a signature onto a
/// group (`group | sig`) upgrades it to a [`Chord`] with that signature as
/// the callback.
///
/// # Examples
///
/// ```
/// use baton::{group, s};
///
/// let g = group((0..3).map(|i| s("tasks.double", [i])));
/// assert_eq!(g.len(), 3);
///
/// let chord = g | s("tasks.sum", Vec::<i64>::new());
/// assert_eq!(chord.header.len(), 3);
/// assert_eq!(chord.callback.task_name, "tasks.sum");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Group {
    /// Member signatures, in submission order.
    pub tasks: Vec<Signature>,
}

impl Group {
    /// Creates a group from member signatures.
    pub fn new<I: IntoIterator<Item = Signature>>(tasks: I) -> Self {
        Self {
            tasks: tasks.into_iter().collect(),
        }
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// True when the group has no members.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Iterates over members in submission order.
    pub fn iter(&self) -> std::slice::Iter<'_, Signature> {
        self.tasks.iter()
    }
}

/// Creates a [`Group`] from member signatures.
pub fn group<I: IntoIterator<Item = Signature>>(tasks: I) -> Group {
    Group::new(tasks)
}

/// `group | sig` -- the signature becomes the chord callback.
impl BitOr<Signature> for Group {
    type Output = Chord;

    fn bitor(self, callback: Signature) -> Chord {
        Chord::new(self, callback)
    }
}
