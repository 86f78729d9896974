// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::{
    collections::VecDeque,
    fmt, mem,
    sync::{Arc, Mutex, PoisonError},
    thread,
    time::{Duration, Instant},
};

use count_batcher_core::{Batch, BatchSubmitter, Count, FlushWait, SubmitError, SubmitHandle};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use crossbeam_utils::sync::ShardedLock;

use crate::{
    Backpressure, BatcherConfig, BatcherStats, ConfigError, FlushPolicy, LifecycleError,
    RejectReason, Rejected, SimpleBatchPolicy,
    config::{
        DEFAULT_MAX_IN_FLIGHT, DEFAULT_QUEUE_CAPACITY, DEFAULT_SHUTDOWN_TIMEOUT,
        DEFAULT_SUBMIT_TIMEOUT, DEFAULT_THREAD_NAME,
    },
    stats::Stats,
};

// How often the aggregation thread checks on in-flight submissions while no counts arrive.
const REAP_INTERVAL: Duration = Duration::from_millis(100);

/// Builder for [`Batcher`]
pub struct BatcherBuilder {
    queue_capacity: usize,
    policy: Box<dyn FlushPolicy>,
    backpressure: Backpressure,
    max_in_flight: usize,
    submit_timeout: Duration,
    shutdown_timeout: Duration,
    thread_name: String,
    name: Option<String>,
}

impl Default for BatcherBuilder {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            policy: Box::new(SimpleBatchPolicy::default()),
            backpressure: Backpressure::default(),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            submit_timeout: DEFAULT_SUBMIT_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            thread_name: DEFAULT_THREAD_NAME.into(),
            name: None,
        }
    }
}

impl BatcherBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder from deserialized settings, validating them first.
    pub fn from_config(config: &BatcherConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut builder = Self::new()
            .queue_capacity(config.queue_capacity)
            .batch_size(config.batch_size)
            .backpressure(config.backpressure)
            .max_in_flight(config.max_in_flight)
            .submit_timeout(config.submit_timeout())
            .shutdown_timeout(config.shutdown_timeout())
            .thread_name(config.thread_name.clone());
        if let Some(name) = &config.name {
            builder = builder.name(name.clone());
        }
        Ok(builder)
    }

    /// Sets the number of counts the intake queue can hold before producers are blocked or
    /// rejected, depending on [`BatcherBuilder::backpressure`].
    ///
    /// Defaults to `64*1024`. On-demand flush and shutdown requests share the same queue.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        assert!(capacity > 0, "queue_capacity must be greater than zero");
        self.queue_capacity = capacity;
        self
    }

    /// Use a [`SimpleBatchPolicy`] submitting every `batch_size` counts.
    ///
    /// Defaults to 500. A batch size of zero submits every count and waits for each write
    /// (bounded by [`BatcherBuilder::submit_timeout`]) before taking the next count. In that
    /// mode [`Batcher::submit`] only returns once its count has been submitted.
    pub fn batch_size(self, batch_size: u64) -> Self {
        self.flush_policy(SimpleBatchPolicy::new(batch_size))
    }

    /// Use a custom [`FlushPolicy`], replacing any configured batch size.
    pub fn flush_policy(mut self, policy: impl FlushPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    /// What producers experience when the intake queue is full.
    ///
    /// Defaults to [`Backpressure::Block`].
    pub fn backpressure(mut self, backpressure: Backpressure) -> Self {
        self.backpressure = backpressure;
        self
    }

    /// Caps the asynchronous submissions whose outcome hasn't been observed yet.
    ///
    /// Defaults to 64. Past the cap the aggregation thread waits for the oldest submission
    /// (bounded by [`BatcherBuilder::submit_timeout`]) before taking more counts, so a stalled
    /// store fills the intake queue and reaches producers as backpressure.
    pub fn max_in_flight(mut self, max: usize) -> Self {
        assert!(max > 0, "max_in_flight must be greater than zero");
        self.max_in_flight = max;
        self
    }

    /// How long the aggregation thread waits on a submission before treating it as failed and
    /// moving on.
    ///
    /// Defaults to 30 seconds. Used by synchronous flush policies, and for the oldest
    /// submission once [`BatcherBuilder::max_in_flight`] is exceeded.
    pub fn submit_timeout(mut self, timeout: Duration) -> Self {
        assert!(timeout > Duration::ZERO, "submit_timeout must not be zero");
        self.submit_timeout = timeout;
        self
    }

    /// Sets how long [`Batcher::stop`] waits for submissions still in flight, including the
    /// final partial batch, before giving up on them.
    ///
    /// Defaults to 30 seconds. `Duration::MAX` waits for every submission to complete.
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        assert!(timeout > Duration::ZERO, "shutdown_timeout must not be zero");
        self.shutdown_timeout = timeout;
        self
    }

    /// Thread name assigned to the aggregation thread.
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        assert!(!name.is_empty());
        self.thread_name = name;
        self
    }

    /// Name used for the tracing span and metrics emitted. Defaults to the thread name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        assert!(!name.is_empty());
        self.name = Some(name);
        self
    }

    /// Build a [`Batcher`] handing its batches to `submitter`. The batcher doesn't accept
    /// counts until [`Batcher::start`] is called.
    pub fn build(self, submitter: impl BatchSubmitter + Send + 'static) -> Batcher {
        let (sender, receiver) = crossbeam_channel::bounded(self.queue_capacity);
        let name = self.name.unwrap_or_else(|| self.thread_name.clone());
        let stats = Arc::new(Stats::new(name.clone()));
        let synchronous = self.policy.synchronous();

        let worker = Worker {
            name: name.clone(),
            receiver,
            submitter: Box::new(submitter),
            policy: self.policy,
            current: Batch::new(),
            in_flight: VecDeque::new(),
            max_in_flight: self.max_in_flight,
            stats: Arc::clone(&stats),
            submit_timeout: self.submit_timeout,
            shutdown_timeout: self.shutdown_timeout,
        };

        Batcher(Arc::new(Shared {
            name,
            thread_name: self.thread_name,
            sender,
            backpressure: self.backpressure,
            synchronous,
            state: ShardedLock::new(State::Created),
            pending_worker: Mutex::new(Some(worker)),
            join: Mutex::new(None),
            stats,
        }))
    }

    /// Build and start a [`Batcher`].
    pub fn start(
        self,
        submitter: impl BatchSubmitter + Send + 'static,
    ) -> Result<Batcher, LifecycleError> {
        let batcher = self.build(submitter);
        batcher.start()?;
        Ok(batcher)
    }
}

/// Aggregates [`Count`]s from any number of threads into [`Batch`]es and hands them to a
/// [`BatchSubmitter`].
///
/// Counts are queued on a bounded intake queue and merged by a single background thread,
/// which asks the [`FlushPolicy`] after every merge whether to submit. Cloning is cheap and
/// still feeds the same queue. Dropping the last clone stops the batcher.
///
/// ```
/// # use count_batcher::{BatcherBuilder, Count};
/// # use count_batcher_core::test_util::TestSubmitter;
/// let submitter = TestSubmitter::new();
/// let batcher = BatcherBuilder::new()
///     .batch_size(3)
///     .start(submitter.clone())
///     .unwrap();
///
/// batcher.submit(Count::new("a", 1)).unwrap();
/// batcher.submit(Count::new("a", 2)).unwrap();
/// batcher.submit(Count::new("b", 5)).unwrap();
/// batcher.stop();
///
/// let batches = submitter.batches();
/// assert_eq!(batches.len(), 1);
/// assert_eq!(batches[0].get("a"), Some(3));
/// assert_eq!(batcher.submission_count(), 1);
/// ```
#[derive(Clone)]
pub struct Batcher(Arc<Shared>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Created,
    Running,
    Stopped,
}

enum Message {
    // dropping `ack` tells a waiting producer that its count was processed
    Count { count: Count, ack: Option<Sender<()>> },
    Flush(tokio::sync::oneshot::Sender<()>),
    Shutdown,
}

struct Shared {
    name: String,
    thread_name: String,
    sender: Sender<Message>,
    backpressure: Backpressure,
    synchronous: bool,
    // Producers hold the read side across check-and-enqueue, `stop` takes the write side to
    // flip the state, so every count accepted before the flip is queued ahead of `Shutdown`.
    state: ShardedLock<State>,
    pending_worker: Mutex<Option<Worker>>,
    join: Mutex<Option<thread::JoinHandle<()>>>,
    stats: Arc<Stats>,
}

impl Batcher {
    /// Spawn the aggregation thread. Batchers are one-shot: once stopped they can't be restarted.
    pub fn start(&self) -> Result<(), LifecycleError> {
        let shared = &*self.0;
        let mut state = shared
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match *state {
            State::Running => return Err(LifecycleError::AlreadyStarted),
            State::Stopped => return Err(LifecycleError::Stopped),
            State::Created => {}
        }
        let Some(worker) = shared
            .pending_worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            *state = State::Stopped;
            return Err(LifecycleError::Stopped);
        };

        let handle = thread::Builder::new()
            .name(shared.thread_name.clone())
            .spawn(move || worker.run())
            .map_err(|err| {
                *state = State::Stopped;
                LifecycleError::Spawn(err)
            })?;
        *shared.join.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        *state = State::Running;
        Ok(())
    }

    /// Queue `count` for aggregation.
    ///
    /// When the intake queue is full this blocks until there is space, or rejects the count
    /// immediately under [`Backpressure::Reject`]. Counts are also rejected, and handed back,
    /// before [`Batcher::start`] and after [`Batcher::stop`].
    ///
    /// Under a synchronous policy (batch size 0) this additionally waits until the count was
    /// merged and its submission completed or timed out. Submission failures are never
    /// reported here: they are logged and counted in [`Batcher::stats`].
    pub fn submit(&self, count: Count) -> Result<(), Rejected> {
        let shared = &*self.0;
        let state = shared.state.read().unwrap_or_else(PoisonError::into_inner);
        if *state != State::Running {
            drop(state);
            return Err(shared.reject(RejectReason::NotRunning, count));
        }

        let (ack, processed) = if shared.synchronous {
            let (ack, processed) = crossbeam_channel::bounded(1);
            (Some(ack), Some(processed))
        } else {
            (None, None)
        };
        let message = Message::Count { count, ack };
        let sent = match shared.backpressure {
            Backpressure::Block => shared
                .sender
                .send(message)
                .map_err(|err| (RejectReason::NotRunning, err.into_inner())),
            Backpressure::Reject => shared.sender.try_send(message).map_err(|err| match err {
                TrySendError::Full(message) => (RejectReason::QueueFull, message),
                TrySendError::Disconnected(message) => (RejectReason::NotRunning, message),
            }),
        };
        drop(state);

        match sent {
            Ok(()) => {
                shared.stats.accepted();
                if let Some(processed) = processed {
                    // disconnects once the aggregation thread is done with the count
                    let _ = processed.recv();
                }
                Ok(())
            }
            Err((reason, Message::Count { count, .. })) => Err(shared.reject(reason, count)),
            Err(_) => unreachable!("submit only sends counts"),
        }
    }

    /// Request the current partial batch to be submitted now, without waiting for the flush
    /// policy. The returned [`FlushWait`] resolves once the batch was handed to the submitter
    /// (not once it was written).
    ///
    /// The request goes through the intake queue and follows the configured [`Backpressure`]:
    /// it blocks while the queue is full, or under [`Backpressure::Reject`] is dropped and
    /// resolves immediately. Also resolves immediately if the batcher isn't running.
    pub fn flush_async(&self) -> FlushWait {
        let shared = &*self.0;
        let state = shared.state.read().unwrap_or_else(PoisonError::into_inner);
        if *state != State::Running {
            return FlushWait::ready();
        }
        let (signal, wait) = FlushWait::signal();
        let message = Message::Flush(signal);
        // on failure the signal is dropped with the message, which resolves `wait`
        let queued = match shared.backpressure {
            Backpressure::Block => shared.sender.send(message).is_ok(),
            Backpressure::Reject => shared.sender.try_send(message).is_ok(),
        };
        if !queued {
            tracing::debug!(batcher = %shared.name, "flush request dropped, intake queue is full");
        }
        wait
    }

    /// Stop accepting counts, submit everything accepted so far as a final batch, wait for
    /// in-flight submissions (bounded by the shutdown timeout), and join the aggregation thread.
    ///
    /// Calling this more than once is fine, later calls wait for the first one to finish.
    pub fn stop(&self) {
        self.0.shut_down();
    }

    /// Number of batches handed to the submitter so far, whether or not their writes succeeded.
    pub fn submission_count(&self) -> u64 {
        self.0.stats.batches_submitted()
    }

    /// A snapshot of this batcher's lifetime counters.
    pub fn stats(&self) -> BatcherStats {
        self.0.stats.snapshot()
    }

    /// True between [`Batcher::start`] and [`Batcher::stop`].
    pub fn is_running(&self) -> bool {
        *self.0.state.read().unwrap_or_else(PoisonError::into_inner) == State::Running
    }

    /// The name used in logs and metrics.
    pub fn name(&self) -> &str {
        &self.0.name
    }
}

impl fmt::Debug for Batcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Batcher")
            .field("name", &self.0.name)
            .field("backpressure", &self.0.backpressure)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl Shared {
    fn reject(&self, reason: RejectReason, count: Count) -> Rejected {
        self.stats.rejected();
        if reason == RejectReason::QueueFull {
            if let Some(suppressed) = self.stats.admit_queue_full_log() {
                tracing::warn!(
                    batcher = %self.name,
                    suppressed,
                    "count batcher queue is full, rejecting counts"
                );
            }
        }
        Rejected::new(reason, count)
    }

    fn shut_down(&self) {
        let was_running = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let was_running = *state == State::Running;
            *state = State::Stopped;
            was_running
        };
        // never started: nothing was accepted, drop the worker with its submitter
        drop(
            self.pending_worker
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );

        if was_running {
            tracing::info!(batcher = %self.name, "stopping count batcher");
            // fails only if the aggregation thread is already gone
            let _ = self.sender.send(Message::Shutdown);
        }

        let mut join = self.join.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = join.take() {
            if handle.join().is_err() {
                tracing::error!(batcher = %self.name, "count batcher thread panicked");
            }
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.shut_down();
    }
}

// Runs on the aggregation thread and is the only owner of the batch being filled.
struct Worker {
    name: String,
    receiver: Receiver<Message>,
    submitter: Box<dyn BatchSubmitter + Send>,
    policy: Box<dyn FlushPolicy>,
    current: Batch,
    // oldest first
    in_flight: VecDeque<SubmitHandle>,
    max_in_flight: usize,
    stats: Arc<Stats>,
    submit_timeout: Duration,
    shutdown_timeout: Duration,
}

impl Worker {
    fn run(mut self) {
        let span = tracing::span!(tracing::Level::TRACE, "count batcher", batcher = ?self.name);
        let _enter = span.enter();
        tracing::info!("count batcher started");

        loop {
            let message = if self.in_flight.is_empty() {
                match self.receiver.recv() {
                    Ok(message) => message,
                    Err(_) => break,
                }
            } else {
                match self.receiver.recv_timeout(REAP_INTERVAL) {
                    Ok(message) => message,
                    Err(RecvTimeoutError::Timeout) => {
                        self.reap();
                        continue;
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            };
            match message {
                Message::Count { count, ack } => {
                    self.accept(count);
                    drop(ack);
                }
                Message::Flush(signal) => {
                    if !self.current.is_empty() {
                        self.submit_current();
                    }
                    drop(signal);
                }
                Message::Shutdown => break,
            }
        }
        self.shut_down();
    }

    fn accept(&mut self, count: Count) {
        self.current.merge(count);
        self.stats.merged();
        if self.policy.should_submit(&self.current) {
            self.submit_current();
        }
    }

    fn submit_current(&mut self) {
        let batch = mem::take(&mut self.current);
        tracing::debug!(
            calls = batch.local_call_count(),
            names = batch.len(),
            "submit triggered"
        );
        let handle = self.submitter.submit(batch);
        self.stats.submitted();

        if self.policy.synchronous() {
            observe(&self.stats, handle.wait_timeout(self.submit_timeout));
            return;
        }

        self.in_flight.push_back(handle);
        self.reap();
        if self.in_flight.len() > self.max_in_flight {
            tracing::debug!(
                max_in_flight = self.max_in_flight,
                "in-flight limit reached, waiting for the oldest submission"
            );
            while self.in_flight.len() > self.max_in_flight {
                if let Some(oldest) = self.in_flight.pop_front() {
                    observe(&self.stats, oldest.wait_timeout(self.submit_timeout));
                }
            }
            self.stats.set_in_flight(self.in_flight.len());
        }
    }

    // Log and count the outcomes of the oldest submissions, up to the first one still pending.
    fn reap(&mut self) {
        while let Some(result) = self.in_flight.front().and_then(SubmitHandle::try_wait) {
            self.in_flight.pop_front();
            observe(&self.stats, result);
        }
        self.stats.set_in_flight(self.in_flight.len());
    }

    fn shut_down(mut self) {
        // Normally empty, since every accepted count is queued ahead of the shutdown message.
        // Left over messages only exist if the batcher handle was dropped without stopping.
        while let Ok(message) = self.receiver.try_recv() {
            if let Message::Count { count, ack } = message {
                self.accept(count);
                drop(ack);
            }
        }

        if !self.current.is_empty() {
            tracing::info!(
                calls = self.current.local_call_count(),
                "submitting final partial batch"
            );
            self.submit_current();
        }

        // `None` when the timeout is too large to represent: wait without a deadline
        let deadline = Instant::now().checked_add(self.shutdown_timeout);
        let mut unfinished = 0usize;
        while let Some(handle) = self.in_flight.pop_front() {
            let result = match deadline {
                Some(deadline) => {
                    handle.wait_timeout(deadline.saturating_duration_since(Instant::now()))
                }
                None => handle.wait(),
            };
            if matches!(result, Err(SubmitError::TimedOut(_))) {
                unfinished += 1;
            }
            observe(&self.stats, result);
            self.stats.set_in_flight(self.in_flight.len());
        }
        if unfinished > 0 {
            tracing::warn!(unfinished, "submissions still in flight after the shutdown timeout");
        }
        tracing::info!("count batcher has shut down");
    }
}

fn observe(stats: &Stats, result: Result<(), SubmitError>) {
    if let Err(err) = result {
        stats.failed(err.is_timeout());
        if let Some(suppressed) = stats.admit_failure_log() {
            tracing::error!(?err, suppressed, "batch submission failed, its counts are lost");
        }
    }
}
