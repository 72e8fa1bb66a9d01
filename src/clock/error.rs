// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Clock error types.

use super::LogicalTime;

/// Errors that can occur in logical clock operations.
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    #[error("candidate time {candidate} is below the minimum epoch {epoch}")]
    BelowEpoch {
        candidate: LogicalTime,
        epoch: LogicalTime,
    },

    #[error("invalid tick reservation: {0}")]
    InvalidReservation(String),
}
