// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Batch application error types.

use crate::clock::{ClockError, Timestamp};
use crate::store::StoreError;

/// Errors that can occur while applying a batch of operation records.
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    #[error(
        "out-of-order timestamp at record {index}: {ts} is below the preceding record's {prev}"
    )]
    OutOfOrderTimestamp {
        index: usize,
        ts: Timestamp,
        prev: Timestamp,
    },

    #[error("malformed grouped record: {0}")]
    MalformedGroup(String),

    #[error("record {index} targets container {expected} but namespace {namespace:?} is {actual}")]
    ContainerMismatch {
        index: usize,
        namespace: String,
        expected: uuid::Uuid,
        actual: uuid::Uuid,
    },

    #[error("clock error: {0}")]
    Clock(#[from] ClockError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
