//! Chord aggregation: counting members down to the callback dispatch.
//!
//! Workers report every chord member's terminal outcome here. The
//! aggregator fills the member's slot (submission order, not completion
//! order) and, when the last outstanding member lands, hands the completed
//! chord back to exactly one caller, who submits the callback. Entries are
//! removed at completion, so a late duplicate report can never re-fire a
//! callback.

use dashmap::DashMap;
use serde_json::Value;

use crate::error::ErrorInfo;
use crate::message::{ChordInfo, TaskMessage};

/// Terminal outcome of one chord member.
#[derive(Debug, Clone, PartialEq)]
pub enum MemberOutcome {
    /// The member succeeded with this value.
    Success(Value),
    /// The member failed with this descriptor.
    Failure(ErrorInfo),
}

/// A chord whose members are all terminal, ready for callback dispatch.
#[derive(Debug, Clone)]
pub struct ChordCompletion {
    /// The planned callback message.
    pub callback: TaskMessage,
    /// Member outcomes in submission order.
    pub outcomes: Vec<MemberOutcome>,
}

impl ChordCompletion {
    /// Number of members that failed.
    pub fn failure_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, MemberOutcome::Failure(_)))
            .count()
    }

    /// The lowest-indexed failure, if any member failed.
    pub fn first_failure(&self) -> Option<(usize, &ErrorInfo)> {
        self.outcomes.iter().enumerate().find_map(|(i, o)| match o {
            MemberOutcome::Failure(info) => Some((i, info)),
            MemberOutcome::Success(_) => None,
        })
    }

    /// Member values in submission order, with failed members represented
    /// by their serialized error descriptors.
    pub fn collect_values(&self) -> Vec<Value> {
        self.outcomes
            .iter()
            .map(|o| match o {
                MemberOutcome::Success(value) => value.clone(),
                MemberOutcome::Failure(info) => info.as_value(),
            })
            .collect()
    }
}

struct ChordEntry {
    slots: Vec<Option<MemberOutcome>>,
    remaining: usize,
    callback: TaskMessage,
}

/// Tracks outstanding chord members per chord id.
///
/// Shared by every worker in the process. Each member outcome is recorded
/// under the chord's shard lock, so exactly one reporter observes the count
/// reach zero and receives the [`ChordCompletion`].
#[derive(Default)]
pub struct ChordAggregator {
    entries: DashMap<String, ChordEntry>,
}

impl ChordAggregator {
    /// Creates an empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one member's terminal outcome.
    ///
    /// Returns the completion exactly once, to the caller that recorded the
    /// final outstanding member. Duplicate reports for an already-filled
    /// slot are ignored with a warning.
    pub fn record(&self, info: &ChordInfo, outcome: MemberOutcome) -> Option<ChordCompletion> {
        let completed = {
            let mut entry = self
                .entries
                .entry(info.chord_id.clone())
                .or_insert_with(|| ChordEntry {
                    slots: vec![None; info.size],
                    remaining: info.size,
                    callback: (*info.callback).clone(),
                });

            let Some(slot) = entry.slots.get_mut(info.index) else {
                tracing::warn!(
                    chord_id = %info.chord_id,
                    index = info.index,
                    size = info.size,
                    "chord member index out of range; ignoring"
                );
                return None;
            };
            if slot.is_some() {
                tracing::warn!(
                    chord_id = %info.chord_id,
                    index = info.index,
                    "duplicate chord member outcome; ignoring"
                );
                return None;
            }
            *slot = Some(outcome);
            entry.remaining -= 1;
            entry.remaining == 0
        };

        if !completed {
            return None;
        }
        // Sole remover: only the reporter that took `remaining` to zero gets
        // here for this chord id.
        let (_, entry) = self.entries.remove(&info.chord_id)?;
        let outcomes = entry.slots.into_iter().flatten().collect();
        Some(ChordCompletion {
            callback: entry.callback,
            outcomes,
        })
    }

    /// Number of chords still awaiting members.
    pub fn pending_chords(&self) -> usize {
        self.entries.len()
    }
}

impl std::fmt::Debug for ChordAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChordAggregator")
            .field("pending_chords", &self.entries.len())
            .finish()
    }
}
