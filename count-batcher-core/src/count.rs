// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Contains [`Count`], the single measurement event submitted by producers.

use std::time::SystemTime;

use crate::CowStr;

/// A named, signed measurement event.
///
/// Counts are immutable once built. Negative values are decrements.
///
/// ```
/// # use count_batcher_core::Count;
/// let count = Count::new("requests", 3);
/// assert_eq!(count.name(), "requests");
/// assert_eq!(count.value(), 3);
/// assert_eq!(Count::decrement("requests").value(), -1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Count {
    name: CowStr,
    value: i64,
    #[cfg_attr(feature = "serde", serde(default))]
    timestamp: Option<SystemTime>,
}

impl Count {
    /// Create a new count adding `value` to the counter called `name`.
    pub fn new(name: impl Into<CowStr>, value: i64) -> Self {
        Self {
            name: name.into(),
            value,
            timestamp: None,
        }
    }

    /// Shorthand for a count of `1`.
    pub fn increment(name: impl Into<CowStr>) -> Self {
        Self::new(name, 1)
    }

    /// Shorthand for a count of `-1`.
    pub fn decrement(name: impl Into<CowStr>) -> Self {
        Self::new(name, -1)
    }

    /// Attach the time the measured event happened.
    pub fn with_timestamp(mut self, timestamp: SystemTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// The counter name this count is aggregated under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The signed amount.
    pub fn value(&self) -> i64 {
        self.value
    }

    /// The event time, if one was attached.
    pub fn timestamp(&self) -> Option<SystemTime> {
        self.timestamp
    }

    pub(crate) fn into_parts(self) -> (CowStr, i64, Option<SystemTime>) {
        (self.name, self.value, self.timestamp)
    }
}
