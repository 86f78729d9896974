// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

#![doc = include_str!("../README.md")]

pub use count_batcher_core::{
    Batch, BatchSubmitter, BoxBatchSubmitter, Count, CounterStore, FlushWait, StoreError,
    SubmitCompleter, SubmitError, SubmitHandle,
};

pub use crate::batcher::{Batcher, BatcherBuilder};
pub use crate::config::{Backpressure, BatcherConfig};
pub use crate::error::{ConfigError, LifecycleError, RejectReason, Rejected};
pub use crate::policy::{FlushPolicy, SimpleBatchPolicy};
pub use crate::pool::{PooledSubmitter, PooledSubmitterBuilder};
pub use crate::stats::BatcherStats;

mod batcher;
mod config;
mod error;
mod log_limit;
pub mod policy;
mod pool;
mod stats;

#[doc(hidden)]
pub use count_batcher_core as core;
