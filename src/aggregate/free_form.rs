//! Free-form tally: any text is a key.
use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

#[derive(Clone, Debug, Default)]
pub struct FreeFormTally {
    counts: HashMap<String, u64>,
    // unix milliseconds of the most recent occurrence
    timestamps: HashMap<String, i64>,
}

impl FreeFormTally {
    pub fn record(&mut self, text: &str, at_ms: i64) {
        *self.counts.entry(text.to_string()).or_insert(0) += 1;
        self.timestamps.insert(text.to_string(), at_ms);
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Number of distinct texts
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Distinct texts the tally would hold after merging `snapshot`
    pub fn len_after_merge(&self, snapshot: &FreeFormSnapshot) -> usize {
        self.len()
            + snapshot
                .counts
                .keys()
                .filter(|text| !self.counts.contains_key(*text))
                .count()
    }

    pub fn into_snapshot(self) -> FreeFormSnapshot {
        FreeFormSnapshot {
            counts: self.counts.into_iter().collect(),
            timestamps: self.timestamps.into_iter().collect(),
        }
    }

    pub fn merge(&mut self, snapshot: FreeFormSnapshot) {
        for (text, count) in snapshot.counts {
            *self.counts.entry(text).or_insert(0) += count;
        }
        for (text, at_ms) in snapshot.timestamps {
            self.timestamps.entry(text).or_insert(at_ms);
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FreeFormSnapshot {
    pub counts: BTreeMap<String, u64>,
    pub timestamps: BTreeMap<String, i64>,
}
