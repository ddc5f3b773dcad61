//! Fixed-vocabulary tally: one positional counter per vocabulary key.
use serde::{Serialize, Serializer};

use crate::settings::Vocabulary;

#[derive(Clone, Debug)]
pub struct VocabularyTally {
    vocabulary: Vocabulary,
    counts: Vec<u64>,
}

impl VocabularyTally {
    pub fn new(vocabulary: Vocabulary) -> Self {
        let counts = vec![0; vocabulary.len()];
        Self { vocabulary, counts }
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    /// Returns false for texts outside the vocabulary
    pub fn record(&mut self, text: &str) -> bool {
        match self.vocabulary.slot_for(text) {
            Some(slot) => {
                self.counts[slot] += 1;
                true
            }
            None => false,
        }
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn into_snapshot(self) -> VocabularySnapshot {
        VocabularySnapshot {
            keys: self.vocabulary.keys().to_vec(),
            counts: self.counts,
        }
    }

    pub fn merge(&mut self, snapshot: VocabularySnapshot) {
        for (slot, count) in snapshot.counts.into_iter().enumerate() {
            if let Some(live) = self.counts.get_mut(slot) {
                *live += count;
            }
        }
    }
}

/// Counts aligned with the vocabulary order; serialized as a bare array.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VocabularySnapshot {
    keys: Vec<char>,
    counts: Vec<u64>,
}

impl VocabularySnapshot {
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn count_for(&self, key: char) -> Option<u64> {
        self.keys
            .iter()
            .position(|k| *k == key)
            .map(|slot| self.counts[slot])
    }
}

impl Serialize for VocabularySnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(&self.counts)
    }
}
