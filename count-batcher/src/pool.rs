// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::{
    any::Any,
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread,
    time::Instant,
};

use count_batcher_core::{
    Batch, BatchSubmitter, CounterStore, StoreError, SubmitCompleter, SubmitError, SubmitHandle,
};
use crossbeam_channel::{Receiver, Sender};

use crate::log_limit::LogLimiter;

/// Builder for [`PooledSubmitter`]
pub struct PooledSubmitterBuilder {
    threads: usize,
    queue_capacity: usize,
    thread_name: String,
}

impl Default for PooledSubmitterBuilder {
    fn default() -> Self {
        Self {
            threads: 4,
            queue_capacity: 1024,
            thread_name: "count-batcher-submit".into(),
        }
    }
}

impl PooledSubmitterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of threads writing batches to the store concurrently. Defaults to 4.
    ///
    /// With more than one thread, writes of successive batches can complete out of order.
    pub fn threads(mut self, threads: usize) -> Self {
        assert!(threads > 0, "a submitter pool needs at least one thread");
        self.threads = threads;
        self
    }

    /// Number of batches that can wait for a pool thread. Defaults to 1024.
    ///
    /// When the queue is full, [`BatchSubmitter::submit`] blocks until a thread picks up a
    /// batch, which in turn holds up the batcher's aggregation thread.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        assert!(capacity > 0, "queue_capacity must be greater than zero");
        self.queue_capacity = capacity;
        self
    }

    /// Prefix of the pool thread names, each thread is suffixed with its index.
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        assert!(!name.is_empty());
        self.thread_name = name;
        self
    }

    /// Spawn the pool, writing every submitted batch to `store`.
    ///
    /// # Panics
    /// Panics if a pool thread can't be spawned.
    pub fn build(self, store: impl CounterStore + 'static) -> PooledSubmitter {
        let store: Arc<dyn CounterStore> = Arc::new(store);
        let panic_log = Arc::new(LogLimiter::default());
        let (sender, receiver) = crossbeam_channel::bounded(self.queue_capacity);
        let threads = (0..self.threads)
            .map(|index| {
                let store = Arc::clone(&store);
                let panic_log = Arc::clone(&panic_log);
                let jobs = receiver.clone();
                thread::Builder::new()
                    .name(format!("{}-{index}", self.thread_name))
                    .spawn(move || run(&*store, &panic_log, jobs))
                    .expect("failed to spawn submitter pool thread")
            })
            .collect();

        PooledSubmitter {
            sender: Some(sender),
            threads,
        }
    }
}

struct Job {
    batch: Batch,
    completer: SubmitCompleter,
}

/// A [`BatchSubmitter`] that writes batches to a [`CounterStore`] on a fixed pool of threads.
///
/// `submit` only queues the batch and doesn't wait for the write. The job queue is bounded
/// (see [`PooledSubmitterBuilder::queue_capacity`]): once it is full, `submit` blocks, so a
/// stalled store eventually pushes back on the batcher's producers.
///
/// Dropping the submitter closes the job queue; the pool threads finish the batches already
/// queued and then exit. Use [`PooledSubmitter::shut_down`] to also wait for them.
pub struct PooledSubmitter {
    sender: Option<Sender<Job>>,
    threads: Vec<thread::JoinHandle<()>>,
}

impl PooledSubmitter {
    /// Create a pool with the [`PooledSubmitterBuilder`] defaults.
    pub fn new(store: impl CounterStore + 'static) -> Self {
        PooledSubmitterBuilder::new().build(store)
    }

    /// Number of batches queued but not yet picked up by a pool thread.
    pub fn queued(&self) -> usize {
        self.sender.as_ref().map_or(0, Sender::len)
    }

    /// Close the job queue and block until every queued batch has been written.
    pub fn shut_down(mut self) {
        self.sender = None;
        for thread in std::mem::take(&mut self.threads) {
            if thread.join().is_err() {
                tracing::error!("submitter pool thread panicked");
            }
        }
    }
}

impl BatchSubmitter for PooledSubmitter {
    fn submit(&self, batch: Batch) -> SubmitHandle {
        let (completer, handle) = SubmitHandle::pending();
        if let Some(sender) = &self.sender {
            // if every pool thread is gone, the job (and its completer) is dropped, which
            // cancels the handle
            let _ = sender.send(Job { batch, completer });
        }
        handle
    }
}

impl fmt::Debug for PooledSubmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledSubmitter")
            .field("threads", &self.threads.len())
            .field("queued", &self.queued())
            .finish()
    }
}

fn run(store: &dyn CounterStore, panic_log: &LogLimiter, jobs: Receiver<Job>) {
    for Job { batch, completer } in jobs {
        let start = Instant::now();
        let result = match panic::catch_unwind(AssertUnwindSafe(|| store.write(&batch))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(SubmitError::Store(err)),
            Err(panic) => {
                let reason = panic_message(&*panic);
                if let Some(suppressed) = panic_log.admit() {
                    tracing::error!(
                        reason,
                        suppressed,
                        "counter store panicked while writing a batch"
                    );
                }
                Err(SubmitError::Store(StoreError::msg(format!(
                    "counter store panicked: {reason}"
                ))))
            }
        };
        tracing::trace!(
            names = batch.len(),
            elapsed = ?start.elapsed(),
            ok = result.is_ok(),
            "batch write finished"
        );
        completer.complete(result);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic payload"
    }
}
