// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Logical timestamps for stamping mutations and selecting read views.

use serde::{Deserialize, Serialize};

/// A logical timestamp: a (seconds, counter) pair packed into 64 bits.
///
/// This is not wall-clock time. The `seconds` component is an epoch chosen by
/// the clock owner; the `counter` component disambiguates events within one
/// second. Ordering is lexicographic, which the packed representation gives
/// for free as integer comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    seconds: u32,
    counter: u32,
}

impl Timestamp {
    /// Creates a timestamp from its components.
    #[inline]
    pub fn new(seconds: u32, counter: u32) -> Self {
        Self { seconds, counter }
    }

    /// The smallest timestamp. Visible to every snapshot.
    #[inline]
    pub fn min() -> Self {
        Self {
            seconds: 0,
            counter: 0,
        }
    }

    /// The largest representable timestamp.
    #[inline]
    pub fn max() -> Self {
        Self {
            seconds: u32::MAX,
            counter: u32::MAX,
        }
    }

    /// Returns the seconds component.
    #[inline]
    pub fn seconds(&self) -> u32 {
        self.seconds
    }

    /// Returns the counter component.
    #[inline]
    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Packs the timestamp into a single ordered u64.
    #[inline]
    pub fn as_u64(&self) -> u64 {
        (u64::from(self.seconds) << 32) | u64::from(self.counter)
    }

    /// Reconstructs a timestamp from its packed form.
    #[inline]
    pub fn from_u64(packed: u64) -> Self {
        Self {
            seconds: (packed >> 32) as u32,
            counter: packed as u32,
        }
    }

    /// Returns true if this is the minimum timestamp.
    #[inline]
    pub fn is_min(&self) -> bool {
        *self == Self::min()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.seconds, self.counter)
    }
}

/// A point in the logical time domain issued by the [`LogicalClock`].
///
/// Wraps a [`Timestamp`] and adds tick arithmetic: a reserved ticket block of
/// size N is addressed as `base.add_ticks(0)` through `base.add_ticks(N - 1)`.
///
/// [`LogicalClock`]: super::LogicalClock
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogicalTime(Timestamp);

impl LogicalTime {
    /// Creates a logical time from a timestamp.
    #[inline]
    pub fn new(ts: Timestamp) -> Self {
        Self(ts)
    }

    /// The externally visible timestamp projection.
    #[inline]
    pub fn as_timestamp(&self) -> Timestamp {
        self.0
    }

    /// Returns this time advanced by `ticks` counter increments.
    ///
    /// Carries into the seconds component on counter overflow, preserving
    /// total order.
    #[inline]
    pub fn add_ticks(&self, ticks: u64) -> Self {
        Self(Timestamp::from_u64(
            self.0.as_u64().saturating_add(ticks),
        ))
    }
}

impl From<Timestamp> for LogicalTime {
    fn from(ts: Timestamp) -> Self {
        Self(ts)
    }
}

impl std::fmt::Display for LogicalTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
