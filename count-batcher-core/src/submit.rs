// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Contains the [`BatchSubmitter`] trait, which hands completed [`Batch`]es to a durable
//! store, and the [`SubmitHandle`] used to observe the outcome of each write.

use std::{fmt, sync::Arc, time::Duration};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::{Batch, SubmitError};

/// Accepts completed batches and writes them to a durable store.
///
/// `submit` takes ownership of the batch and should return quickly: the slow write is
/// expected to happen elsewhere (e.g. on a pool of threads), with its outcome reported
/// through the returned [`SubmitHandle`]. Submitters do not retry; a failed write is
/// reported once and the batch is dropped.
pub trait BatchSubmitter {
    /// Start writing `batch`, returning a handle to its eventual completion.
    fn submit(&self, batch: Batch) -> SubmitHandle;

    /// Returns a [`BoxBatchSubmitter`] that is a type-erased version of this submitter.
    fn boxed(self) -> BoxBatchSubmitter
    where
        Self: Sized + Send + Sync + 'static,
    {
        BoxBatchSubmitter::new(self)
    }
}

impl<T: BatchSubmitter + ?Sized> BatchSubmitter for Arc<T> {
    fn submit(&self, batch: Batch) -> SubmitHandle {
        (**self).submit(batch)
    }
}

impl<T: BatchSubmitter + ?Sized> BatchSubmitter for Box<T> {
    fn submit(&self, batch: Batch) -> SubmitHandle {
        (**self).submit(batch)
    }
}

/// A type-erased [`BatchSubmitter`]. Cloning gives another reference to the same submitter.
#[derive(Clone)]
pub struct BoxBatchSubmitter(Arc<dyn BatchSubmitter + Send + Sync + 'static>);

impl BoxBatchSubmitter {
    /// Create a new [`BoxBatchSubmitter`]
    pub fn new(submitter: impl BatchSubmitter + Send + Sync + 'static) -> Self {
        Self(Arc::new(submitter))
    }
}

impl fmt::Debug for BoxBatchSubmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BoxBatchSubmitter").finish()
    }
}

impl BatchSubmitter for BoxBatchSubmitter {
    fn submit(&self, batch: Batch) -> SubmitHandle {
        self.0.submit(batch)
    }

    fn boxed(self) -> BoxBatchSubmitter {
        self
    }
}

/// Handle on the eventual completion of a single batch write.
///
/// Dropping the handle detaches from the write; it does not cancel it.
#[must_use = "dropping a SubmitHandle ignores the outcome of the write"]
pub struct SubmitHandle(Receiver<Result<(), SubmitError>>);

/// The write side of a [`SubmitHandle`], held by whoever performs the write.
///
/// Dropping a completer without calling [`SubmitCompleter::complete`] resolves the handle to
/// [`SubmitError::Cancelled`].
pub struct SubmitCompleter(Sender<Result<(), SubmitError>>);

impl SubmitHandle {
    /// Create a handle that resolves once the returned completer is completed or dropped.
    pub fn pending() -> (SubmitCompleter, SubmitHandle) {
        let (sender, receiver) = crossbeam_channel::bounded(1);
        (SubmitCompleter(sender), SubmitHandle(receiver))
    }

    /// Create a handle that is already resolved to `result`.
    pub fn ready(result: Result<(), SubmitError>) -> Self {
        let (completer, handle) = Self::pending();
        completer.complete(result);
        handle
    }

    /// Block until the write completes.
    pub fn wait(self) -> Result<(), SubmitError> {
        self.0.recv().unwrap_or(Err(SubmitError::Cancelled))
    }

    /// Block for at most `timeout` waiting for the write to complete.
    ///
    /// On expiry this returns [`SubmitError::TimedOut`]; the write itself may still finish
    /// later, but its outcome is no longer observable.
    pub fn wait_timeout(self, timeout: Duration) -> Result<(), SubmitError> {
        match self.0.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(SubmitError::TimedOut(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(SubmitError::Cancelled),
        }
    }

    /// Return the outcome if the write already completed, without blocking.
    ///
    /// Returns `None` while the write is pending. Once `Some` is returned, the outcome has
    /// been consumed and later calls report [`SubmitError::Cancelled`].
    pub fn try_wait(&self) -> Option<Result<(), SubmitError>> {
        match self.0.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(SubmitError::Cancelled)),
        }
    }
}

impl fmt::Debug for SubmitHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmitHandle")
            .field("completed", &!self.0.is_empty())
            .finish()
    }
}

impl SubmitCompleter {
    /// Resolve the paired [`SubmitHandle`] to `result`.
    pub fn complete(self, result: Result<(), SubmitError>) {
        // the handle may have been dropped, in which case nobody is interested
        let _ = self.0.send(result);
    }
}

impl fmt::Debug for SubmitCompleter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SubmitCompleter").finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{thread, time::Duration};

    use assert2::{check, let_assert};

    use super::*;
    use crate::{Count, StoreError};

    struct Inline;

    impl BatchSubmitter for Inline {
        fn submit(&self, batch: Batch) -> SubmitHandle {
            if batch.get("poison").is_some() {
                SubmitHandle::ready(Err(StoreError::msg("poisoned").into()))
            } else {
                SubmitHandle::ready(Ok(()))
            }
        }
    }

    #[test]
    fn ready_handles_resolve_immediately() {
        check!(SubmitHandle::ready(Ok(())).wait().is_ok());

        let handle = SubmitHandle::ready(Err(SubmitError::Cancelled));
        let_assert!(Some(Err(SubmitError::Cancelled)) = handle.try_wait());
    }

    #[test]
    fn dropping_the_completer_cancels() {
        let (completer, handle) = SubmitHandle::pending();
        check!(handle.try_wait().is_none());
        drop(completer);
        let_assert!(Err(SubmitError::Cancelled) = handle.wait());
    }

    #[test]
    fn wait_timeout_expires_while_pending() {
        let (_completer, handle) = SubmitHandle::pending();
        let_assert!(
            Err(SubmitError::TimedOut(after)) = handle.wait_timeout(Duration::from_millis(10))
        );
        check!(after == Duration::from_millis(10));
    }

    #[test]
    fn completes_from_another_thread() {
        let (completer, handle) = SubmitHandle::pending();
        let writer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(5));
            completer.complete(Ok(()));
        });
        check!(handle.wait_timeout(Duration::from_secs(60)).is_ok());
        writer.join().unwrap();
    }

    #[test]
    fn boxed_and_shared_submitters_forward() {
        let boxed = Inline.boxed();
        let shared = Arc::new(Inline);

        let mut batch = Batch::new();
        batch.merge(Count::increment("ok"));
        check!(boxed.clone().submit(batch.clone()).wait().is_ok());
        check!(shared.submit(batch).wait().is_ok());

        let mut poisoned = Batch::new();
        poisoned.merge(Count::increment("poison"));
        let_assert!(Err(SubmitError::Store(err)) = boxed.submit(poisoned).wait());
        check!(err.to_string() == "poisoned");
    }
}
