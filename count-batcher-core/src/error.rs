// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::{error::Error, fmt, time::Duration};

/// An error reported by a [`CounterStore`](crate::CounterStore) write.
///
/// The store owns its retry policy, so by the time one of these is returned the batch is
/// considered lost.
pub struct StoreError(Box<dyn Error + Send + Sync + 'static>);

impl StoreError {
    /// Wrap any error returned by the durable store client.
    pub fn new(err: impl Into<Box<dyn Error + Send + Sync + 'static>>) -> Self {
        Self(err.into())
    }

    /// Create an error from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self(message.into().into())
    }

    /// Return the wrapped error.
    pub fn into_inner(self) -> Box<dyn Error + Send + Sync + 'static> {
        self.0
    }
}

impl fmt::Debug for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StoreError").field(&self.0).finish()
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.0.source()
    }
}

/// The ways a submitted [`Batch`](crate::Batch) can fail to be written.
#[derive(Debug)]
pub enum SubmitError {
    /// The store rejected or failed the write.
    Store(StoreError),
    /// The submitter dropped the batch without completing it, e.g. because it was shut down.
    Cancelled,
    /// A bounded wait on the [`SubmitHandle`](crate::SubmitHandle) expired.
    TimedOut(Duration),
}

impl SubmitError {
    /// True for [`SubmitError::TimedOut`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut(_))
    }
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store(err) => write!(f, "batch write failed: {err}"),
            Self::Cancelled => f.write_str("batch submission was cancelled"),
            Self::TimedOut(after) => write!(f, "batch submission timed out after {after:?}"),
        }
    }
}

impl Error for SubmitError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::Cancelled | Self::TimedOut(_) => None,
        }
    }
}

impl From<StoreError> for SubmitError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

#[cfg(test)]
mod tests {
    use std::{error::Error, io, time::Duration};

    use super::{StoreError, SubmitError};

    #[test]
    fn store_error_keeps_message() {
        let err = SubmitError::from(StoreError::new(io::Error::other("disk on fire")));
        assert_eq!(err.to_string(), "batch write failed: disk on fire");
        assert!(err.source().is_some());
        assert!(!err.is_timeout());
    }

    #[test]
    fn timeout_mentions_duration() {
        let err = SubmitError::TimedOut(Duration::from_millis(250));
        assert!(err.is_timeout());
        assert!(err.to_string().contains("250ms"));
    }

    #[test]
    fn msg_round_trips_through_debug() {
        let err = StoreError::msg("throttled");
        assert_eq!(err.to_string(), "throttled");
        assert!(format!("{err:?}").contains("throttled"));
    }

    #[test]
    fn into_inner_returns_the_original_error() {
        let err = StoreError::new(io::Error::new(io::ErrorKind::TimedOut, "slow disk"));
        let inner = err.into_inner();
        let source = inner.downcast::<io::Error>().unwrap();
        assert_eq!(source.kind(), io::ErrorKind::TimedOut);
    }
}
