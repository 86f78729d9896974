// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! In-memory submitters and stores for testing code that produces batches.
//!
//! This requires that the `test-util` feature be enabled.

use std::{
    collections::VecDeque,
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
};

use crate::{
    Batch, BatchSubmitter, CounterStore, StoreError, SubmitCompleter, SubmitError, SubmitHandle,
};

/// How a [`TestSubmitter`] resolves a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Outcome {
    /// Resolve the handle to `Ok(())` immediately.
    #[default]
    Succeed,
    /// Resolve the handle to a [`SubmitError::Store`] immediately.
    Fail,
    /// Keep the handle pending until [`TestSubmitter::release_hung`] is called.
    Hang,
}

#[derive(Default)]
struct SubmitterState {
    batches: Vec<Batch>,
    submissions: usize,
    scripted: VecDeque<Outcome>,
    default_outcome: Outcome,
    hung: Vec<SubmitCompleter>,
}

/// A [`BatchSubmitter`] that records every batch it is handed and resolves handles inline.
///
/// Cloning will provide another reference to the same underlying recorder.
///
/// ```
/// # use count_batcher_core::{Batch, BatchSubmitter, Count};
/// # use count_batcher_core::test_util::{Outcome, TestSubmitter};
/// let submitter = TestSubmitter::new();
/// submitter.script([Outcome::Fail]);
///
/// let batch: Batch = [Count::new("a", 1)].into_iter().collect();
/// assert!(submitter.submit(batch.clone()).wait().is_err());
/// assert!(submitter.submit(batch).wait().is_ok());
/// assert_eq!(submitter.submissions(), 2);
/// ```
#[derive(Clone, Default)]
pub struct TestSubmitter(Arc<Mutex<SubmitterState>>);

impl TestSubmitter {
    /// Create a submitter that succeeds every submission.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a submitter that resolves every submission with `outcome`, unless scripted otherwise.
    pub fn with_outcome(outcome: Outcome) -> Self {
        let submitter = Self::default();
        submitter.lock().default_outcome = outcome;
        submitter
    }

    /// Queue outcomes for the next submissions, in order.
    pub fn script(&self, outcomes: impl IntoIterator<Item = Outcome>) {
        self.lock().scripted.extend(outcomes);
    }

    /// A copy of every batch submitted so far, in submission order.
    pub fn batches(&self) -> Vec<Batch> {
        self.lock().batches.clone()
    }

    /// Take every batch submitted so far.
    pub fn drain(&self) -> Vec<Batch> {
        std::mem::take(&mut self.lock().batches)
    }

    /// Total number of submissions, including drained ones.
    pub fn submissions(&self) -> usize {
        self.lock().submissions
    }

    /// Resolve all hung submissions with `result`.
    pub fn release_hung(&self, result: impl Fn() -> Result<(), SubmitError>) {
        let hung = std::mem::take(&mut self.lock().hung);
        for completer in hung {
            completer.complete(result());
        }
    }

    fn lock(&self) -> MutexGuard<'_, SubmitterState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl BatchSubmitter for TestSubmitter {
    fn submit(&self, batch: Batch) -> SubmitHandle {
        let mut state = self.lock();
        state.batches.push(batch);
        state.submissions += 1;
        let outcome = state
            .scripted
            .pop_front()
            .unwrap_or(state.default_outcome);
        match outcome {
            Outcome::Succeed => SubmitHandle::ready(Ok(())),
            Outcome::Fail => SubmitHandle::ready(Err(StoreError::msg("scripted failure").into())),
            Outcome::Hang => {
                let (completer, handle) = SubmitHandle::pending();
                state.hung.push(completer);
                handle
            }
        }
    }
}

#[derive(Default)]
struct StoreState {
    batches: Vec<Batch>,
    fail_next: usize,
    paused: bool,
    writes_started: usize,
}

/// A [`CounterStore`] that records written batches, with failure injection and a gate
/// to hold writes in flight.
///
/// Cloning will provide another reference to the same underlying store.
#[derive(Clone, Default)]
pub struct TestStore(Arc<(Mutex<StoreState>, Condvar)>);

impl TestStore {
    /// Create an empty store that accepts every write.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` writes.
    pub fn fail_next(&self, n: usize) {
        self.lock().fail_next += n;
    }

    /// Block writes until [`TestStore::resume`] is called.
    pub fn pause(&self) {
        self.lock().paused = true;
    }

    /// Let blocked and future writes proceed.
    pub fn resume(&self) {
        self.lock().paused = false;
        self.0.1.notify_all();
    }

    /// A copy of every batch successfully written so far, in completion order.
    pub fn batches(&self) -> Vec<Batch> {
        self.lock().batches.clone()
    }

    /// Number of writes that have started, including blocked and failed ones.
    pub fn writes_started(&self) -> usize {
        self.lock().writes_started
    }

    /// Sum of the amounts written for `name` across all recorded batches.
    pub fn total(&self, name: &str) -> i64 {
        self.lock()
            .batches
            .iter()
            .filter_map(|batch| batch.get(name))
            .sum()
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.0.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CounterStore for TestStore {
    fn write(&self, batch: &Batch) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.writes_started += 1;
        while state.paused {
            state = self.0.1.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(StoreError::msg("injected store failure"));
        }
        state.batches.push(batch.clone());
        Ok(())
    }
}
