// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use crate::ConfigError;

/// What [`Batcher::submit`](crate::Batcher::submit) does when the intake queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Backpressure {
    /// Block the calling thread until the aggregation thread frees up space. No counts are lost.
    #[default]
    Block,
    /// Return [`RejectReason::QueueFull`](crate::RejectReason::QueueFull) immediately, for
    /// latency-sensitive producers that prefer dropping a count over waiting.
    Reject,
}

/// Deserializable batcher settings, for loading from a service's configuration file.
///
/// Every field is optional and defaults to the [`BatcherBuilder`](crate::BatcherBuilder)
/// default. Timeouts are in milliseconds.
///
/// ```
/// # use count_batcher::{BatcherBuilder, BatcherConfig};
/// let config = BatcherConfig {
///     batch_size: 0,
///     ..BatcherConfig::default()
/// };
/// assert!(config.validate().is_ok());
/// let _builder = BatcherBuilder::from_config(&config).unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct BatcherConfig {
    /// Capacity of the intake queue, in counts.
    pub queue_capacity: usize,
    /// Counts per batch. Zero submits every count synchronously.
    pub batch_size: u64,
    /// Behavior when the intake queue is full.
    pub backpressure: Backpressure,
    /// Asynchronous submissions allowed to be in flight before the aggregation thread waits.
    pub max_in_flight: usize,
    /// Bounded wait for synchronous submissions.
    pub submit_timeout_ms: u64,
    /// Bounded wait for in-flight submissions while stopping.
    pub shutdown_timeout_ms: u64,
    /// Name of the aggregation thread.
    pub thread_name: String,
    /// Name used in logs and metrics. Defaults to the thread name.
    pub name: Option<String>,
}

pub(crate) const DEFAULT_QUEUE_CAPACITY: usize = 64 * 1024;
pub(crate) const DEFAULT_MAX_IN_FLIGHT: usize = 64;
pub(crate) const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(30);
pub(crate) const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);
pub(crate) const DEFAULT_THREAD_NAME: &str = "count-batcher";

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            batch_size: crate::SimpleBatchPolicy::DEFAULT_BATCH_SIZE,
            backpressure: Backpressure::default(),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            submit_timeout_ms: DEFAULT_SUBMIT_TIMEOUT.as_millis() as u64,
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT.as_millis() as u64,
            thread_name: DEFAULT_THREAD_NAME.into(),
            name: None,
        }
    }
}

impl BatcherConfig {
    /// Check the settings without panicking, unlike the builder setters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        if self.max_in_flight == 0 {
            return Err(ConfigError::ZeroMaxInFlight);
        }
        if self.submit_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout("submit_timeout_ms"));
        }
        if self.shutdown_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout("shutdown_timeout_ms"));
        }
        if self.thread_name.is_empty() {
            return Err(ConfigError::EmptyName("thread_name"));
        }
        if self.name.as_deref() == Some("") {
            return Err(ConfigError::EmptyName("name"));
        }
        Ok(())
    }

    pub(crate) fn submit_timeout(&self) -> Duration {
        Duration::from_millis(self.submit_timeout_ms)
    }

    pub(crate) fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use assert2::check;

    use super::*;

    #[test]
    fn defaults_are_valid() {
        check!(BatcherConfig::default().validate() == Ok(()));
    }

    #[test]
    fn rejects_zero_values() {
        let config = BatcherConfig {
            queue_capacity: 0,
            ..Default::default()
        };
        check!(config.validate() == Err(ConfigError::ZeroQueueCapacity));

        let config = BatcherConfig {
            max_in_flight: 0,
            ..Default::default()
        };
        check!(config.validate() == Err(ConfigError::ZeroMaxInFlight));

        let config = BatcherConfig {
            submit_timeout_ms: 0,
            ..Default::default()
        };
        check!(config.validate() == Err(ConfigError::ZeroTimeout("submit_timeout_ms")));

        let config = BatcherConfig {
            name: Some(String::new()),
            ..Default::default()
        };
        check!(config.validate() == Err(ConfigError::EmptyName("name")));
    }

    #[test]
    fn zero_batch_size_is_allowed() {
        let config = BatcherConfig {
            batch_size: 0,
            ..Default::default()
        };
        check!(config.validate().is_ok());
    }
}
