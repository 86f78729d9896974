// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Contains [`Batch`], the accumulator counts are merged into between two submissions.

use std::time::SystemTime;

use hashbrown::HashMap;

use crate::{Count, CowStr};

/// An aggregation of [`Count`]s keyed by counter name, plus a tally of merged calls.
///
/// A batch has exactly one mutator at a time: the engine's worker thread while it is
/// being filled, then the [`BatchSubmitter`](crate::BatchSubmitter) it was handed to.
///
/// ```
/// # use count_batcher_core::{Batch, Count};
/// let mut batch = Batch::new();
/// batch.merge(Count::new("a", 1));
/// batch.merge(Count::new("a", 2));
/// batch.merge(Count::new("b", 5));
/// assert_eq!(batch.get("a"), Some(3));
/// assert_eq!(batch.get("b"), Some(5));
/// assert_eq!(batch.local_call_count(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Batch {
    entries: HashMap<CowStr, i64>,
    local_call_count: u64,
    earliest: Option<SystemTime>,
    latest: Option<SystemTime>,
}

impl Batch {
    /// Create a new, empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `count` into this batch.
    ///
    /// The entry for the count's name is created if missing, even for a value of 0. Sums
    /// saturate at the bounds of `i64`.
    pub fn merge(&mut self, count: Count) {
        let (name, value, timestamp) = count.into_parts();
        let amount = self.entries.entry(name).or_insert(0);
        *amount = amount.saturating_add(value);
        self.local_call_count += 1;

        if let Some(timestamp) = timestamp {
            self.earliest = Some(self.earliest.map_or(timestamp, |t| t.min(timestamp)));
            self.latest = Some(self.latest.map_or(timestamp, |t| t.max(timestamp)));
        }
    }

    /// The aggregated amount for `name`, if any count with that name was merged.
    pub fn get(&self, name: &str) -> Option<i64> {
        self.entries.get(name).copied()
    }

    /// Iterate over `(name, amount)` pairs, in no particular order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, i64)> + '_ {
        self.entries.iter().map(|(name, amount)| (&**name, *amount))
    }

    /// Consume the batch, returning its `(name, amount)` pairs.
    pub fn into_entries(self) -> impl Iterator<Item = (CowStr, i64)> {
        self.entries.into_iter()
    }

    /// Number of distinct counter names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing has been merged.
    pub fn is_empty(&self) -> bool {
        self.local_call_count == 0
    }

    /// Number of counts merged since the batch was opened.
    pub fn local_call_count(&self) -> u64 {
        self.local_call_count
    }

    /// The earliest timestamp of any merged count that carried one.
    pub fn earliest(&self) -> Option<SystemTime> {
        self.earliest
    }

    /// The latest timestamp of any merged count that carried one.
    pub fn latest(&self) -> Option<SystemTime> {
        self.latest
    }
}

impl Extend<Count> for Batch {
    fn extend<T: IntoIterator<Item = Count>>(&mut self, iter: T) {
        for count in iter {
            self.merge(count);
        }
    }
}

impl FromIterator<Count> for Batch {
    fn from_iter<T: IntoIterator<Item = Count>>(iter: T) -> Self {
        let mut batch = Batch::new();
        batch.extend(iter);
        batch
    }
}
