// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! BasaltDB: the concurrency and visibility core of a multiversion storage
//! engine: logical timestamps, serialized page mutation, and snapshot reads.
//!
//! This crate provides the building blocks a timestamped storage engine is
//! assembled from: a lock-free [`clock::LogicalClock`] issuing strictly
//! increasing stamps, a [`serial::SerialScheduler`] funnelling page
//! mutations through a short process-wide critical section with an eviction
//! hand-off, a [`store::VersionedStore`] whose reads are qualified by
//! explicit snapshots, and an [`apply::BatchApplier`] replaying timestamped
//! operation batches. [`engine::Engine`] wires them together.

pub mod apply;
pub mod clock;
pub mod engine;
pub mod serial;
pub mod store;

pub use apply::{ApplyError, BatchApplier, BatchEntry, GroupedRecord, OpKind, OperationRecord};
pub use clock::{ClockError, LogicalClock, LogicalTime, Timestamp};
pub use engine::{Engine, EngineConfig};
pub use serial::{
    EvictionCoordinator, EvictionTarget, EvictorHandle, MutationError, MutationResult, OpState,
    Page, SerialContext, SerialMode, SerialScheduler, Session,
};
pub use store::{
    Container, Cursor, Document, OperationContext, RecordId, RetainAll, RetainWindow,
    RetentionPolicy, Snapshot, StoreError, VersionedStore,
};
