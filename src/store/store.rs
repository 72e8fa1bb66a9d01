// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! The versioned record store.
//!
//! Routes every container mutation through the serialization scheduler and
//! qualifies every read by the operation context's snapshot. Implements
//! [`EvictionTarget`] so the eviction coordinator can reclaim container
//! pages and retire history per the engine's retention policy.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::clock::Timestamp;
use crate::serial::{
    EvictionTarget, MutationError, MutationResult, Page, SerialMode, SerialScheduler,
};

use super::container::{Container, Cursor, Document, RecordId};
use super::error::StoreError;
use super::retention::{RetentionPolicy, RetentionState};
use super::snapshot::OperationContext;

fn result_code(result: &Result<RecordId, StoreError>, page: &Page) -> MutationResult {
    match result {
        Ok(_) => Ok(()),
        Err(StoreError::Conflict(_)) => Err(MutationError::Conflict {
            expected: page.generation(),
        }),
        Err(err) => Err(MutationError::Failed(err.to_string())),
    }
}

/// Container of containers: the engine's mutable record state.
pub struct VersionedStore {
    scheduler: Arc<SerialScheduler>,
    containers: RwLock<HashMap<String, Arc<Container>>>,
    retention: Arc<RetentionState>,
    policy: Box<dyn RetentionPolicy>,
    /// Newest stamp successfully applied; input to the retention policy.
    newest_applied: AtomicU64,
    page_threshold: u64,
}

impl VersionedStore {
    /// Creates an empty store whose container pages request eviction past
    /// `page_threshold` bytes.
    pub fn new(
        scheduler: Arc<SerialScheduler>,
        page_threshold: u64,
        policy: Box<dyn RetentionPolicy>,
    ) -> Self {
        Self {
            scheduler,
            containers: RwLock::new(HashMap::new()),
            retention: Arc::new(RetentionState::new()),
            policy,
            newest_applied: AtomicU64::new(Timestamp::min().as_u64()),
            page_threshold,
        }
    }

    pub(crate) fn retention_state(&self) -> Arc<RetentionState> {
        Arc::clone(&self.retention)
    }

    /// Oldest timestamp a snapshot may still be selected at.
    pub fn oldest_retained(&self) -> Timestamp {
        self.retention.oldest()
    }

    /// Creates a container, registering its page with the eviction sweep.
    pub fn create_container(&self, namespace: &str) -> Result<Arc<Container>, StoreError> {
        let mut containers = self.containers.write();
        if containers.contains_key(namespace) {
            return Err(StoreError::NamespaceExists(namespace.to_string()));
        }

        let container = Arc::new(Container::new(namespace.to_string(), self.page_threshold));
        self.scheduler.evictor().register_page(container.page());
        containers.insert(namespace.to_string(), Arc::clone(&container));
        Ok(container)
    }

    /// Looks up a container by namespace.
    pub fn container(&self, namespace: &str) -> Result<Arc<Container>, StoreError> {
        self.containers
            .read()
            .get(namespace)
            .cloned()
            .ok_or_else(|| StoreError::UnknownNamespace(namespace.to_string()))
    }

    /// Looks up a container by identity.
    pub fn container_by_id(&self, id: Uuid) -> Option<Arc<Container>> {
        self.containers
            .read()
            .values()
            .find(|c| c.id() == id)
            .cloned()
    }

    fn write_timestamp(ctx: &OperationContext) -> Result<Timestamp, StoreError> {
        ctx.write_timestamp().ok_or_else(|| {
            StoreError::InvalidArgument("no write timestamp bound to context".to_string())
        })
    }

    fn apply_serialized<F>(
        &self,
        ctx: &OperationContext,
        container: &Arc<Container>,
        mutate: F,
    ) -> Result<RecordId, StoreError>
    where
        F: FnOnce() -> Result<RecordId, StoreError>,
    {
        let mut outcome = None;
        // The session's result code mirrors `outcome`; the typed error is
        // what callers want, so the code itself is only checked for the
        // invariant that the closure ran.
        let _ = self
            .scheduler
            .serialize(ctx.session(), SerialMode::Exclusive, |sctx| {
                let result = mutate();
                let code = result_code(&result, container.page());
                outcome = Some(result);
                sctx.complete(Some(container.page().as_ref()), code);
            });

        outcome.unwrap_or_else(|| unreachable!("serialized mutation closure did not run"))
    }

    /// Inserts `doc` at the context's bound write timestamp, which becomes
    /// the earliest timestamp at which the record is visible to snapshot
    /// reads.
    pub fn insert(
        &self,
        ctx: &OperationContext,
        namespace: &str,
        doc: Document,
    ) -> Result<RecordId, StoreError> {
        let ts = Self::write_timestamp(ctx)?;
        let container = self.container(namespace)?;
        self.newest_applied.fetch_max(ts.as_u64(), Ordering::AcqRel);
        self.apply_serialized(ctx, &container, || container.insert_at(ts, doc))
    }

    /// Replaces the record matching `doc`'s `_id` at the bound timestamp.
    pub fn update(
        &self,
        ctx: &OperationContext,
        namespace: &str,
        doc: Document,
    ) -> Result<RecordId, StoreError> {
        let ts = Self::write_timestamp(ctx)?;
        let container = self.container(namespace)?;
        self.newest_applied.fetch_max(ts.as_u64(), Ordering::AcqRel);
        self.apply_serialized(ctx, &container, || container.update_at(ts, doc))
    }

    /// Tombstones the record with the given `_id` value at the bound
    /// timestamp.
    pub fn delete(
        &self,
        ctx: &OperationContext,
        namespace: &str,
        id: &str,
    ) -> Result<RecordId, StoreError> {
        let ts = Self::write_timestamp(ctx)?;
        let container = self.container(namespace)?;
        self.newest_applied.fetch_max(ts.as_u64(), Ordering::AcqRel);
        self.apply_serialized(ctx, &container, || container.delete_at(ts, id))
    }

    /// Opens a forward cursor over records visible at the context's view.
    pub fn cursor(&self, ctx: &OperationContext, namespace: &str) -> Result<Cursor, StoreError> {
        let container = self.container(namespace)?;
        Ok(Cursor::new(container, ctx.read_timestamp()))
    }

    /// The last record visible at the context's view.
    pub fn find_last(
        &self,
        ctx: &OperationContext,
        namespace: &str,
    ) -> Result<Option<(RecordId, Document)>, StoreError> {
        let container = self.container(namespace)?;
        Ok(container.last_visible(ctx.read_timestamp()))
    }

    /// Removes every record in the namespace, through the scheduler.
    pub fn truncate(&self, ctx: &OperationContext, namespace: &str) -> Result<(), StoreError> {
        let container = self.container(namespace)?;
        self.apply_serialized(ctx, &container, || {
            container.truncate();
            Ok(0)
        })
        .map(drop)
    }

    /// Registers an index name on the namespace.
    pub fn create_index(
        &self,
        ctx: &OperationContext,
        namespace: &str,
        index: &str,
    ) -> Result<(), StoreError> {
        let container = self.container(namespace)?;
        self.apply_serialized(ctx, &container, || {
            container.create_index(index)?;
            Ok(0)
        })
        .map(drop)
    }

    /// Drops all index names on the namespace.
    pub fn drop_all_indexes(
        &self,
        ctx: &OperationContext,
        namespace: &str,
    ) -> Result<(), StoreError> {
        let container = self.container(namespace)?;
        self.apply_serialized(ctx, &container, || {
            container.drop_all_indexes();
            Ok(0)
        })
        .map(drop)
    }

    /// Retires history older than `cutoff` in every container and raises the
    /// oldest-retained watermark. Snapshots older than the effective cutoff
    /// become unavailable.
    ///
    /// The cutoff is clamped to the oldest bound snapshot: a live view never
    /// loses the versions it reads, the retirement simply retires less until
    /// the view is abandoned.
    pub fn retire_history_before(&self, cutoff: Timestamp) -> u64 {
        let cutoff = self.retention.clamp_and_raise(cutoff);
        let containers: Vec<_> = self.containers.read().values().cloned().collect();
        let mut dropped = 0;
        for container in containers {
            dropped += container.retire_before(cutoff);
        }
        if dropped > 0 {
            tracing::debug!(%cutoff, dropped, "retired multiversion history");
        }
        dropped
    }
}

impl EvictionTarget for VersionedStore {
    /// Reclaims a container page: retires history per the retention policy,
    /// recomputes the page's live footprint, and resets its accounting so
    /// the written-back state is considered clean.
    fn evict_page(&self, page: &Page) -> MutationResult {
        let container = self
            .containers
            .read()
            .values()
            .find(|c| std::ptr::eq(c.page().as_ref(), page))
            .cloned();

        let Some(container) = container else {
            // Page belongs to a dropped container; nothing to write back.
            return Ok(());
        };

        let newest = Timestamp::from_u64(self.newest_applied.load(Ordering::Acquire));
        if let Some(cutoff) = self.policy.retirement_point(newest) {
            self.retire_history_before(cutoff);
            container.recompute_size();
        }
        page.reset_size(0);
        tracing::debug!(namespace = container.name(), "page written back");
        Ok(())
    }
}
