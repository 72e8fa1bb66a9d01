// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Store error types.

use crate::clock::Timestamp;

/// Errors that can occur in snapshot and record store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("namespace {0:?} does not exist")]
    UnknownNamespace(String),

    #[error("namespace {0:?} already exists")]
    NamespaceExists(String),

    #[error("no record with _id {id} in namespace {namespace:?}")]
    RecordNotFound { namespace: String, id: String },

    /// A concurrent writer invalidated the target's expected version.
    /// Recoverable: retry the whole operation from a fresh snapshot.
    #[error("write conflict: {0}")]
    Conflict(String),

    /// The historical state needed for the requested view has been retired.
    /// Not retryable with the same timestamp.
    #[error("snapshot unavailable: requested {requested}, oldest retained {oldest}")]
    SnapshotUnavailable {
        requested: Timestamp,
        oldest: Timestamp,
    },
}
