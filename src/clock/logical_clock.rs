// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Logical clock with atomic ticket-block reservation.
//!
//! The clock issues strictly increasing [`LogicalTime`] values per process.
//! A batch about to be committed reserves a contiguous ticket block up front
//! with [`LogicalClock::reserve_ticks`], then stamps its operations with
//! `base.add_ticks(0..n)`; concurrent reservations never overlap.

use std::sync::atomic::{AtomicU64, Ordering};

use super::error::ClockError;
use super::{LogicalTime, Timestamp};

/// A monotonic logical clock.
///
/// The current value lives in a single `AtomicU64` (the packed form of
/// [`Timestamp`]), so both `advance` and `reserve_ticks` are lock-free CAS
/// loops. Nothing here blocks.
pub struct LogicalClock {
    current: AtomicU64,
    epoch: u64,
}

impl LogicalClock {
    /// Creates a clock whose minimum accepted time is `epoch`.
    ///
    /// The clock starts at the epoch; `advance` rejects candidates below it.
    pub fn new(epoch: LogicalTime) -> Self {
        let packed = epoch.as_timestamp().as_u64();
        Self {
            current: AtomicU64::new(packed),
            epoch: packed,
        }
    }

    /// Returns the clock's current value.
    pub fn current(&self) -> LogicalTime {
        LogicalTime::new(Timestamp::from_u64(self.current.load(Ordering::Acquire)))
    }

    /// Advances the clock to `max(current, candidate)`.
    ///
    /// Used when an externally observed time (e.g. from a replicated log)
    /// must not be re-issued locally. Fails if `candidate` is below the
    /// process's minimum epoch.
    pub fn advance(&self, candidate: LogicalTime) -> Result<(), ClockError> {
        let packed = candidate.as_timestamp().as_u64();
        if packed < self.epoch {
            return Err(ClockError::BelowEpoch {
                candidate,
                epoch: LogicalTime::new(Timestamp::from_u64(self.epoch)),
            });
        }

        // fetch_max is sufficient: we only ever move forward.
        self.current.fetch_max(packed, Ordering::AcqRel);
        Ok(())
    }

    /// Atomically reserves `n` consecutive ticks.
    ///
    /// Advances the clock by `n` and returns the first reserved stamp; the
    /// caller derives its `n` unique stamps as `base.add_ticks(0..n)`.
    /// Concurrent reservations yield disjoint ranges.
    pub fn reserve_ticks(&self, n: u64) -> Result<LogicalTime, ClockError> {
        if n == 0 {
            return Err(ClockError::InvalidReservation(
                "cannot reserve zero ticks".to_string(),
            ));
        }

        loop {
            let last = self.current.load(Ordering::Acquire);
            let new = last.checked_add(n).ok_or_else(|| {
                ClockError::InvalidReservation(format!(
                    "reserving {n} ticks overflows the timestamp domain"
                ))
            })?;

            match self.current.compare_exchange_weak(
                last,
                new,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(LogicalTime::new(Timestamp::from_u64(last + 1))),
                Err(_) => continue,
            }
        }
    }

    /// Reserves a single tick and returns its stamp directly.
    pub fn tick(&self) -> Result<LogicalTime, ClockError> {
        self.reserve_ticks(1)
    }
}
