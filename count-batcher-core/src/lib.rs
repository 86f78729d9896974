// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub use crate::batch::Batch;
pub use crate::count::Count;
pub use crate::error::{StoreError, SubmitError};
pub use crate::flush::FlushWait;
pub use crate::store::CounterStore;
pub use crate::submit::{BatchSubmitter, BoxBatchSubmitter, SubmitCompleter, SubmitHandle};

pub(crate) type CowStr = std::borrow::Cow<'static, str>;

pub mod batch;
pub mod count;
mod error;
mod flush;
pub mod store;
pub mod submit;

#[cfg(feature = "test-util")]
pub mod test_util;
