// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Batch mutation application.
//!
//! Operation records arrive from an external operation log with explicit
//! timestamps, either one per record or as a grouped encoding with parallel
//! timestamp/term/payload arrays. The [`BatchApplier`] validates ordering,
//! stamps each mutation's visibility point, and applies it through the
//! serialization scheduler.

mod applier;
mod error;
mod record;

pub use applier::BatchApplier;
pub use error::ApplyError;
pub use record::{BatchEntry, GroupedRecord, OpKind, OperationRecord};
