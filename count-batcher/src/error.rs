// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::{error::Error, fmt, io};

use count_batcher_core::Count;

/// Why [`Batcher::submit`](crate::Batcher::submit) did not accept a count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The intake queue is full and the batcher is configured with
    /// [`Backpressure::Reject`](crate::Backpressure::Reject).
    QueueFull,
    /// The batcher has not been started yet, or has been stopped.
    NotRunning,
}

/// A count that was not accepted by the batcher. The count is handed back so the caller can
/// retry or drop it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejected {
    reason: RejectReason,
    count: Count,
}

impl Rejected {
    pub(crate) fn new(reason: RejectReason, count: Count) -> Self {
        Self { reason, count }
    }

    /// Why the count was rejected.
    pub fn reason(&self) -> RejectReason {
        self.reason
    }

    /// The rejected count.
    pub fn count(&self) -> &Count {
        &self.count
    }

    /// Take back ownership of the rejected count.
    pub fn into_count(self) -> Count {
        self.count
    }
}

impl fmt::Display for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let why = match self.reason {
            RejectReason::QueueFull => "intake queue full",
            RejectReason::NotRunning => "batcher not running",
        };
        write!(f, "{why}, count `{}` rejected", self.count.name())
    }
}

impl Error for Rejected {}

/// Errors from [`Batcher::start`](crate::Batcher::start).
#[derive(Debug)]
pub enum LifecycleError {
    /// `start` was already called.
    AlreadyStarted,
    /// The batcher was stopped; batchers can't be restarted.
    Stopped,
    /// The aggregation thread could not be spawned.
    Spawn(io::Error),
}

impl fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyStarted => f.write_str("batcher already started"),
            Self::Stopped => f.write_str("batcher was stopped and can't be restarted"),
            Self::Spawn(err) => write!(f, "couldn't spawn aggregation thread: {err}"),
        }
    }
}

impl Error for LifecycleError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Spawn(err) => Some(err),
            Self::AlreadyStarted | Self::Stopped => None,
        }
    }
}

/// An invalid [`BatcherConfig`](crate::BatcherConfig).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `queue_capacity` must be positive.
    ZeroQueueCapacity,
    /// `max_in_flight` must be positive.
    ZeroMaxInFlight,
    /// The named timeout must be positive.
    ZeroTimeout(&'static str),
    /// The named string must not be empty.
    EmptyName(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroQueueCapacity => f.write_str("queue_capacity must be greater than zero"),
            Self::ZeroMaxInFlight => f.write_str("max_in_flight must be greater than zero"),
            Self::ZeroTimeout(field) => write!(f, "{field} must be greater than zero"),
            Self::EmptyName(field) => write!(f, "{field} must not be empty"),
        }
    }
}

impl Error for ConfigError {}

#[cfg(test)]
mod tests {
    use count_batcher_core::Count;

    use super::*;

    #[test]
    fn rejected_hands_back_the_count() {
        let rejected = Rejected::new(RejectReason::QueueFull, Count::new("hits", 3));
        assert_eq!(rejected.to_string(), "intake queue full, count `hits` rejected");
        assert_eq!(rejected.reason(), RejectReason::QueueFull);
        assert_eq!(rejected.count().value(), 3);
        assert_eq!(rejected.into_count(), Count::new("hits", 3));
    }

    #[test]
    fn not_running_message() {
        let rejected = Rejected::new(RejectReason::NotRunning, Count::increment("late"));
        assert_eq!(rejected.to_string(), "batcher not running, count `late` rejected");
        assert_eq!(rejected.count().name(), "late");
    }

    #[test]
    fn spawn_error_has_source() {
        let err = LifecycleError::Spawn(io::Error::other("no threads"));
        assert!(err.source().is_some());
        assert!(LifecycleError::Stopped.source().is_none());
    }
}
