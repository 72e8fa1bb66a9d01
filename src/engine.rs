// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Engine wiring and lifecycle.
//!
//! The engine is the explicit service object tying the core together: it
//! owns the logical clock, the serialization scheduler, the versioned store,
//! the batch applier, and the eviction coordinator's thread. Components are
//! shared by `Arc`, never through ambient globals; teardown stops and joins
//! the coordinator.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::apply::BatchApplier;
use crate::clock::{LogicalClock, LogicalTime, Timestamp};
use crate::serial::{
    EvictionCoordinator, EvictionTarget, EvictorHandle, SerialScheduler, Session,
};
use crate::store::{OperationContext, RetainAll, RetentionPolicy, VersionedStore};

/// Engine construction parameters.
pub struct EngineConfig {
    /// Minimum logical time the clock accepts.
    pub epoch: Timestamp,
    /// Page size past which a container requests eviction.
    pub page_eviction_threshold: u64,
    /// Attempts the applier gives a mutation before surfacing its conflict.
    pub max_write_retries: u32,
    /// How much multiversion history eviction may retire.
    pub retention: Box<dyn RetentionPolicy>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            epoch: Timestamp::new(1, 0),
            page_eviction_threshold: 1 << 20,
            max_write_retries: 100,
            retention: Box::new(RetainAll),
        }
    }
}

/// The assembled concurrency and visibility core.
pub struct Engine {
    clock: Arc<LogicalClock>,
    scheduler: Arc<SerialScheduler>,
    store: Arc<VersionedStore>,
    applier: BatchApplier,
    evictor: EvictionCoordinator,
    next_session_id: AtomicU64,
}

impl Engine {
    /// Builds the engine and spawns its eviction coordinator.
    pub fn new(config: EngineConfig) -> Self {
        let handle = EvictorHandle::new();
        let scheduler = Arc::new(SerialScheduler::new(handle.clone()));
        let clock = Arc::new(LogicalClock::new(LogicalTime::new(config.epoch)));
        let store = Arc::new(VersionedStore::new(
            Arc::clone(&scheduler),
            config.page_eviction_threshold,
            config.retention,
        ));
        let evictor = EvictionCoordinator::spawn(
            handle,
            Arc::clone(&scheduler),
            Arc::clone(&store) as Arc<dyn EvictionTarget>,
        );
        let applier = BatchApplier::new(
            Arc::clone(&clock),
            Arc::clone(&store),
            config.max_write_retries,
        );

        Self {
            clock,
            scheduler,
            store,
            applier,
            evictor,
            next_session_id: AtomicU64::new(1),
        }
    }

    /// The engine's logical clock.
    pub fn clock(&self) -> &Arc<LogicalClock> {
        &self.clock
    }

    /// The serialization scheduler.
    pub fn scheduler(&self) -> &Arc<SerialScheduler> {
        &self.scheduler
    }

    /// The versioned record store.
    pub fn store(&self) -> &Arc<VersionedStore> {
        &self.store
    }

    /// The batch mutation applier.
    pub fn applier(&self) -> &BatchApplier {
        &self.applier
    }

    /// Attaches a new operation context with its own session.
    pub fn new_context(&self) -> OperationContext {
        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        OperationContext::new(Arc::new(Session::new(id)), self.store.retention_state())
    }

    /// Stops and joins the eviction coordinator. Idempotent; also runs on
    /// drop.
    pub fn shutdown(&mut self) {
        self.evictor.shutdown();
    }
}
