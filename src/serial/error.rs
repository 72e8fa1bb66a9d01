// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Serialized-mutation result codes.

/// Failure codes a serialized mutation can publish through
/// [`complete_mutation`](super::SerialScheduler::complete_mutation).
///
/// Detailed, typed errors belong to the layer that ran the mutation; this is
/// the scheduler's narrow channel between the completing thread and the
/// caller blocked in `serialize`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MutationError {
    #[error("write conflict: page generation advanced past {expected}")]
    Conflict { expected: u64 },

    #[error("mutation failed: {0}")]
    Failed(String),
}

/// Outcome of one serialized mutation.
pub type MutationResult = Result<(), MutationError>;
