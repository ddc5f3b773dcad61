//! In-memory aggregate of relayed message texts.
//!
//! The store is drained by the periodic emitter: `snapshot_and_reset` swaps
//! the live tally for an empty one under the same lock that guards `record`,
//! so every recorded event lands in exactly one snapshot.
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

pub mod free_form;
pub mod vocabulary;

pub use free_form::{FreeFormSnapshot, FreeFormTally};
pub use vocabulary::{VocabularySnapshot, VocabularyTally};

use crate::error::Result;
use crate::settings::AggregateMode;

#[derive(Clone, Debug)]
enum Tally {
    FreeForm(FreeFormTally),
    Vocabulary(VocabularyTally),
}

impl Tally {
    fn empty_like(&self) -> Self {
        match self {
            Tally::FreeForm(_) => Tally::FreeForm(FreeFormTally::default()),
            Tally::Vocabulary(t) => Tally::Vocabulary(VocabularyTally::new(t.vocabulary().clone())),
        }
    }

    fn into_snapshot(self) -> Snapshot {
        match self {
            Tally::FreeForm(t) => Snapshot::FreeForm(t.into_snapshot()),
            Tally::Vocabulary(t) => Snapshot::Vocabulary(t.into_snapshot()),
        }
    }
}

/// Immutable point-in-time copy of the aggregate.
///
/// Serializes to `{"counts": {...}, "timestamps": {...}}` in free-form mode
/// and to a flat array of counts in vocabulary mode.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Snapshot {
    FreeForm(FreeFormSnapshot),
    Vocabulary(VocabularySnapshot),
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Sum of all counts
    pub fn total(&self) -> u64 {
        match self {
            Snapshot::FreeForm(s) => s.counts.values().sum(),
            Snapshot::Vocabulary(s) => s.counts().iter().sum(),
        }
    }

    /// Encode as the UTF-8 JSON datagram payload
    pub fn to_payload(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Restoring an unsent free-form snapshot never grows the live tally past
/// this many distinct texts.
pub const MAX_RETAINED_KEYS: usize = 4_096;

#[derive(Debug)]
pub struct AggregateStore {
    tally: Mutex<Tally>,
}

impl AggregateStore {
    pub fn new(mode: &AggregateMode) -> Self {
        let tally = match mode {
            AggregateMode::FreeForm => Tally::FreeForm(FreeFormTally::default()),
            AggregateMode::Vocabulary(vocabulary) => {
                Tally::Vocabulary(VocabularyTally::new(vocabulary.clone()))
            }
        };
        Self {
            tally: Mutex::new(tally),
        }
    }

    /// Count one occurrence of `key` seen at `at`.
    ///
    /// In vocabulary mode keys that are not a single vocabulary character
    /// are ignored; the return value tells whether the key was counted.
    pub fn record(&self, key: &str, at: DateTime<Utc>) -> bool {
        let mut tally = self.tally.lock().unwrap_or_else(PoisonError::into_inner);
        match &mut *tally {
            Tally::FreeForm(t) => {
                t.record(key, at.timestamp_millis());
                true
            }
            Tally::Vocabulary(t) => t.record(key),
        }
    }

    /// Capture the current state and replace it with an empty one atomically.
    pub fn snapshot_and_reset(&self) -> Snapshot {
        let mut tally = self.tally.lock().unwrap_or_else(PoisonError::into_inner);
        let fresh = tally.empty_like();
        std::mem::replace(&mut *tally, fresh).into_snapshot()
    }

    /// Merge an unsent snapshot back into the live state.
    ///
    /// Counts add up; for free-form timestamps the live value wins since it
    /// was recorded after the snapshot was taken. Returns false when the
    /// snapshot was dropped instead: it belongs to the other mode, or merging
    /// it would leave more than `MAX_RETAINED_KEYS` distinct texts.
    pub fn restore(&self, snapshot: Snapshot) -> bool {
        let mut tally = self.tally.lock().unwrap_or_else(PoisonError::into_inner);
        match (&mut *tally, snapshot) {
            (Tally::FreeForm(t), Snapshot::FreeForm(s)) => {
                let keys = t.len_after_merge(&s);
                if keys > MAX_RETAINED_KEYS {
                    warn!(
                        "Dropping unsent snapshot: {} distinct texts exceeds {}",
                        keys, MAX_RETAINED_KEYS
                    );
                    return false;
                }
                t.merge(s);
                true
            }
            (Tally::Vocabulary(t), Snapshot::Vocabulary(s)) => {
                t.merge(s);
                true
            }
            _ => {
                warn!("Dropping snapshot of a different aggregate mode");
                false
            }
        }
    }

    /// Total of the counts recorded since the last reset
    pub fn pending(&self) -> u64 {
        let tally = self.tally.lock().unwrap_or_else(PoisonError::into_inner);
        match &*tally {
            Tally::FreeForm(t) => t.total(),
            Tally::Vocabulary(t) => t.total(),
        }
    }

    /// Vocabulary-mode snapshots are always sent, even when all zero
    pub fn is_vocabulary(&self) -> bool {
        matches!(
            &*self.tally.lock().unwrap_or_else(PoisonError::into_inner),
            Tally::Vocabulary(_)
        )
    }
}
