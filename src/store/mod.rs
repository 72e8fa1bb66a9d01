// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Snapshot manager and versioned record store.
//!
//! Mutations are stamped with explicit timestamps; reads are qualified by a
//! snapshot bound to an [`OperationContext`]. The central contract: a read
//! under view `ts` observes the result of every mutation stamped at or
//! before `ts` and none stamped later, regardless of real-time commit order.
//!
//! History retirement is driven by eviction through a pluggable
//! [`RetentionPolicy`]; views older than the oldest retained version fail
//! with [`StoreError::SnapshotUnavailable`].

mod container;
mod error;
mod retention;
mod retry;
mod snapshot;
#[allow(clippy::module_inception)]
mod store;

pub use container::{Container, Cursor, Document, RecordId};
pub use error::StoreError;
pub use retention::{RetainAll, RetainWindow, RetentionPolicy};
pub use retry::with_write_conflict_retry;
pub use snapshot::{OperationContext, Snapshot};
pub use store::VersionedStore;
