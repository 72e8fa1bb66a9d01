// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Logical clock service.
//!
//! Issues monotonically increasing logical timestamps and supports atomic
//! reservation of a contiguous ticket block for a batch of operations about
//! to be committed:
//!
//! - [`Timestamp`]: the (seconds, counter) value used to tag mutations and
//!   select snapshots.
//! - [`LogicalTime`]: a clock-issued point with tick arithmetic.
//! - [`LogicalClock`]: `advance` to an externally observed time, or
//!   `reserve_ticks(n)` to claim `n` consecutive stamps.
//!
//! The clock is an explicit service object created by the engine entry point
//! and shared by `Arc`; there is no ambient global clock.

mod error;
mod logical_clock;
mod timestamp;

pub use error::ClockError;
pub use logical_clock::LogicalClock;
pub use timestamp::{LogicalTime, Timestamp};
