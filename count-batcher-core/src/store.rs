// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Contains the [`CounterStore`] trait, the seam to the durable store that persists batches.

use std::sync::Arc;

use crate::{Batch, StoreError};

/// Persists a [`Batch`] into whatever counter representation the store uses.
///
/// Writes are synchronous and may be slow; the engine never calls this from its
/// aggregation thread, only from a submitter's own threads. Any retrying belongs here.
pub trait CounterStore: Send + Sync {
    /// Durably apply every `(name, amount)` entry of `batch`.
    fn write(&self, batch: &Batch) -> Result<(), StoreError>;
}

impl<F> CounterStore for F
where
    F: Fn(&Batch) -> Result<(), StoreError> + Send + Sync,
{
    fn write(&self, batch: &Batch) -> Result<(), StoreError> {
        self(batch)
    }
}

impl<T: CounterStore + ?Sized> CounterStore for Arc<T> {
    fn write(&self, batch: &Batch) -> Result<(), StoreError> {
        (**self).write(batch)
    }
}
