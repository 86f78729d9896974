// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::log_limit::LogLimiter;

/// A point-in-time snapshot of a [`Batcher`](crate::Batcher)'s lifetime counters.
///
/// Fields are read independently, so a snapshot taken while counts are flowing may be
/// slightly inconsistent across fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct BatcherStats {
    /// Counts accepted into the intake queue.
    pub counts_accepted: u64,
    /// Counts rejected by `submit`, for either [`RejectReason`](crate::RejectReason).
    pub counts_rejected: u64,
    /// Counts merged into a batch by the aggregation thread.
    pub counts_merged: u64,
    /// Batches handed to the submitter. Counts attempts, not successful writes.
    pub batches_submitted: u64,
    /// Submissions that resolved to an error, including timeouts.
    pub submissions_failed: u64,
    /// Submissions whose bounded wait expired.
    pub submissions_timed_out: u64,
    /// Asynchronous submissions whose outcome has not been observed yet.
    pub in_flight: usize,
}

// Relaxed everywhere: these are monitoring counters, nothing is synchronized through them.
pub(crate) struct Stats {
    #[cfg_attr(not(feature = "metrics-rs-024"), allow(dead_code))]
    name: String,
    counts_accepted: AtomicU64,
    counts_rejected: AtomicU64,
    counts_merged: AtomicU64,
    batches_submitted: AtomicU64,
    submissions_failed: AtomicU64,
    submissions_timed_out: AtomicU64,
    in_flight: AtomicUsize,
    queue_full_log: LogLimiter,
    failure_log: LogLimiter,
}

impl Stats {
    pub(crate) fn new(name: String) -> Self {
        Self {
            name,
            counts_accepted: AtomicU64::new(0),
            counts_rejected: AtomicU64::new(0),
            counts_merged: AtomicU64::new(0),
            batches_submitted: AtomicU64::new(0),
            submissions_failed: AtomicU64::new(0),
            submissions_timed_out: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            queue_full_log: LogLimiter::default(),
            failure_log: LogLimiter::default(),
        }
    }

    pub(crate) fn accepted(&self) {
        self.counts_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn rejected(&self) {
        self.counts_rejected.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics-rs-024")]
        metrics_024::counter!("count_batcher_counts_rejected", "batcher" => self.name.clone())
            .increment(1);
    }

    pub(crate) fn merged(&self) {
        self.counts_merged.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn submitted(&self) {
        self.batches_submitted.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics-rs-024")]
        metrics_024::counter!("count_batcher_batches_submitted", "batcher" => self.name.clone())
            .increment(1);
    }

    pub(crate) fn failed(&self, timed_out: bool) {
        self.submissions_failed.fetch_add(1, Ordering::Relaxed);
        if timed_out {
            self.submissions_timed_out.fetch_add(1, Ordering::Relaxed);
        }
        #[cfg(feature = "metrics-rs-024")]
        metrics_024::counter!("count_batcher_submissions_failed", "batcher" => self.name.clone())
            .increment(1);
    }

    pub(crate) fn set_in_flight(&self, in_flight: usize) {
        self.in_flight.store(in_flight, Ordering::Relaxed);
    }

    /// See [`LogLimiter::admit`].
    pub(crate) fn admit_queue_full_log(&self) -> Option<u64> {
        self.queue_full_log.admit()
    }

    pub(crate) fn admit_failure_log(&self) -> Option<u64> {
        self.failure_log.admit()
    }

    pub(crate) fn batches_submitted(&self) -> u64 {
        self.batches_submitted.load(Ordering::Relaxed)
    }

    pub(crate) fn snapshot(&self) -> BatcherStats {
        BatcherStats {
            counts_accepted: self.counts_accepted.load(Ordering::Relaxed),
            counts_rejected: self.counts_rejected.load(Ordering::Relaxed),
            counts_merged: self.counts_merged.load(Ordering::Relaxed),
            batches_submitted: self.batches_submitted(),
            submissions_failed: self.submissions_failed.load(Ordering::Relaxed),
            submissions_timed_out: self.submissions_timed_out.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
        }
    }
}
