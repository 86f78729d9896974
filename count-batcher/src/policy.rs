// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Flush policies decide when the batch being filled is handed off for submission.

use count_batcher_core::Batch;

/// Decides, after every merge, whether the current [`Batch`] should be submitted.
///
/// The policy is owned by the aggregation thread and consulted once per merged count, so it
/// may keep state of its own without synchronization.
pub trait FlushPolicy: Send {
    /// Return true to submit `batch` now and start a fresh one.
    fn should_submit(&mut self, batch: &Batch) -> bool;

    /// If true, every submission is awaited (with the configured submit timeout) before the
    /// next count is taken from the queue, and producers wait until their count was processed.
    fn synchronous(&self) -> bool {
        false
    }
}

impl<F> FlushPolicy for F
where
    F: FnMut(&Batch) -> bool + Send,
{
    fn should_submit(&mut self, batch: &Batch) -> bool {
        self(batch)
    }
}

/// Submit every `batch_size`-th merged count, or every count (synchronously) when the batch
/// size is zero.
///
/// ```
/// # use count_batcher::{Batch, Count, FlushPolicy, SimpleBatchPolicy};
/// let mut policy = SimpleBatchPolicy::new(2);
/// let mut batch = Batch::new();
/// batch.merge(Count::increment("a"));
/// assert!(!policy.should_submit(&batch));
/// batch.merge(Count::increment("a"));
/// assert!(policy.should_submit(&batch));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimpleBatchPolicy {
    batch_size: u64,
}

impl SimpleBatchPolicy {
    /// Batch size used when none is configured.
    pub const DEFAULT_BATCH_SIZE: u64 = 500;

    /// Create a policy flushing every `batch_size` counts. Zero disables batching.
    pub const fn new(batch_size: u64) -> Self {
        Self { batch_size }
    }

    /// The configured batch size.
    pub fn batch_size(&self) -> u64 {
        self.batch_size
    }
}

impl Default for SimpleBatchPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BATCH_SIZE)
    }
}

impl FlushPolicy for SimpleBatchPolicy {
    fn should_submit(&mut self, batch: &Batch) -> bool {
        let calls = batch.local_call_count();
        self.batch_size == 0 || (calls > 0 && calls % self.batch_size == 0)
    }

    fn synchronous(&self) -> bool {
        self.batch_size == 0
    }
}
