// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! The batch mutation applier.
//!
//! Consumes an ordered list of operation records, validates their timestamp
//! ordering, and applies each to its target container through the
//! serialization scheduler, with the record's timestamp as the mutation's
//! visibility point. Batches are not atomic: application stops at the first
//! invalid record, leaving earlier records applied and visible.

use std::sync::Arc;

use crate::clock::{LogicalClock, LogicalTime, Timestamp};
use crate::store::{with_write_conflict_retry, OperationContext, StoreError, VersionedStore};

use super::error::ApplyError;
use super::record::{BatchEntry, OpKind, OperationRecord};

/// Applies timestamped operation batches to the versioned store.
pub struct BatchApplier {
    clock: Arc<LogicalClock>,
    store: Arc<VersionedStore>,
    max_write_retries: u32,
}

impl BatchApplier {
    /// Creates an applier over the given clock and store.
    pub fn new(clock: Arc<LogicalClock>, store: Arc<VersionedStore>, max_write_retries: u32) -> Self {
        Self {
            clock,
            store,
            max_write_retries,
        }
    }

    /// Reserves a ticket block for a batch of `n` operations about to be
    /// stamped: operation `i` takes `base.add_ticks(i)`.
    pub fn reserve_batch(&self, n: u64) -> Result<LogicalTime, ApplyError> {
        Ok(self.clock.reserve_ticks(n)?)
    }

    /// Applies `batch` in order, returning the number of records applied.
    ///
    /// Grouped entries are expanded first; both encodings behave
    /// identically. Within the expanded batch, timestamps must be
    /// non-decreasing; the first out-of-order record fails the batch with
    /// earlier records already applied.
    pub fn apply(
        &self,
        ctx: &mut OperationContext,
        batch: Vec<BatchEntry>,
    ) -> Result<usize, ApplyError> {
        let mut records = Vec::new();
        for entry in batch {
            records.extend(entry.expand()?);
        }

        let mut applied = 0;
        let mut prev = Timestamp::min();
        for (index, record) in records.into_iter().enumerate() {
            if record.ts < prev {
                return Err(ApplyError::OutOfOrderTimestamp {
                    index,
                    ts: record.ts,
                    prev,
                });
            }
            prev = record.ts;

            self.apply_one(ctx, index, record)?;
            applied += 1;
        }

        tracing::trace!(applied, "batch applied");
        Ok(applied)
    }

    fn apply_one(
        &self,
        ctx: &mut OperationContext,
        index: usize,
        record: OperationRecord,
    ) -> Result<(), ApplyError> {
        // Keep the clock at or past every stamp we apply, so locally issued
        // times can never collide with replayed ones.
        self.clock.advance(LogicalTime::new(record.ts))?;

        if record.kind == OpKind::Command {
            return Ok(());
        }

        if let Some(expected) = record.container_id {
            let container = self.store.container(&record.namespace)?;
            if container.id() != expected {
                return Err(ApplyError::ContainerMismatch {
                    index,
                    namespace: record.namespace,
                    expected,
                    actual: container.id(),
                });
            }
        }

        ctx.set_write_timestamp(record.ts);
        let result = with_write_conflict_retry(ctx, self.max_write_retries, |ctx| {
            match record.kind {
                OpKind::Insert => self
                    .store
                    .insert(ctx, &record.namespace, record.payload.clone())
                    .map(drop),
                OpKind::Update => self
                    .store
                    .update(ctx, &record.namespace, record.payload.clone())
                    .map(drop),
                OpKind::Delete => {
                    let id = record
                        .payload
                        .get("_id")
                        .map(|v| v.to_string())
                        .ok_or_else(|| {
                            StoreError::InvalidArgument(
                                "delete payload has no _id field".to_string(),
                            )
                        })?;
                    self.store.delete(ctx, &record.namespace, &id).map(drop)
                }
                OpKind::Command => unreachable!("commands are filtered above"),
            }
        });
        ctx.clear_write_timestamp();

        result?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::record::GroupedRecord;
    use crate::engine::{Engine, EngineConfig};
    use serde_json::json;

    const NS: &str = "unittests.timestamped_updates";

    fn insert_record(ts: Timestamp, payload: serde_json::Value) -> OperationRecord {
        OperationRecord {
            ts,
            term: 1,
            op_hash: 0xBEEF,
            schema_version: 2,
            kind: OpKind::Insert,
            namespace: NS.to_string(),
            container_id: None,
            payload,
        }
    }

    fn engine() -> Engine {
        let engine = Engine::new(EngineConfig::default());
        engine.store().create_container(NS).unwrap();
        engine
    }

    /// Reads the last visible record under each of the batch's stamps and
    /// checks it is exactly the record stamped there.
    fn assert_per_timestamp_visibility(engine: &Engine, base: LogicalTime, n: u64) {
        let mut ctx = engine.new_context();
        for i in 0..n {
            ctx.abandon_snapshot();
            ctx.select_snapshot(base.add_ticks(i).as_timestamp()).unwrap();
            let (_, doc) = engine
                .store()
                .find_last(&ctx, NS)
                .unwrap()
                .unwrap_or_else(|| panic!("no record visible at tick {i}"));
            assert_eq!(doc, json!({"_id": i}), "wrong record visible at tick {i}");
        }
    }

    #[test]
    fn test_monotonic_visibility_per_record() {
        let engine = engine();
        let applier = engine.applier();

        let docs = 10u64;
        let base = applier.reserve_batch(docs).unwrap();
        let batch: Vec<BatchEntry> = (0..docs)
            .map(|i| {
                insert_record(base.add_ticks(i).as_timestamp(), json!({"_id": i})).into()
            })
            .collect();

        let mut ctx = engine.new_context();
        assert_eq!(applier.apply(&mut ctx, batch).unwrap(), 10);
        assert_per_timestamp_visibility(&engine, base, docs);
    }

    #[test]
    fn test_grouped_batch_equivalence() {
        let engine = engine();
        let applier = engine.applier();

        let docs = 10u64;
        let base = applier.reserve_batch(docs).unwrap();
        let grouped = GroupedRecord {
            ts: (0..docs).map(|i| base.add_ticks(i).as_timestamp()).collect(),
            term: vec![1; docs as usize],
            op_hash: 0xBEEF,
            schema_version: 2,
            kind: OpKind::Insert,
            namespace: NS.to_string(),
            container_id: None,
            payload: (0..docs).map(|i| json!({"_id": i})).collect(),
        };

        let mut ctx = engine.new_context();
        assert_eq!(applier.apply(&mut ctx, vec![grouped.into()]).unwrap(), 10);

        // Identical per-timestamp visibility to ten separate records.
        assert_per_timestamp_visibility(&engine, base, docs);
    }

    #[test]
    fn test_command_records_apply_nothing() {
        let engine = engine();
        let applier = engine.applier();

        let base = applier.reserve_batch(2).unwrap();
        let batch = vec![
            insert_record(base.as_timestamp(), json!({"_id": 0})).into(),
            BatchEntry::Single(OperationRecord {
                kind: OpKind::Command,
                payload: json!({"applyOps": []}),
                ..insert_record(base.add_ticks(1).as_timestamp(), json!({}))
            }),
        ];

        let mut ctx = engine.new_context();
        assert_eq!(applier.apply(&mut ctx, batch).unwrap(), 2);

        ctx.select_snapshot(base.add_ticks(1).as_timestamp()).unwrap();
        let cursor = engine.store().cursor(&ctx, NS).unwrap();
        assert_eq!(cursor.count(), 1);
    }

    #[test]
    fn test_out_of_order_fails_leaving_prior_applied() {
        let engine = engine();
        let applier = engine.applier();

        let base = applier.reserve_batch(3).unwrap();
        let batch = vec![
            insert_record(base.add_ticks(1).as_timestamp(), json!({"_id": 0})).into(),
            insert_record(base.add_ticks(2).as_timestamp(), json!({"_id": 1})).into(),
            // Below its predecessor: caller contract violation.
            insert_record(base.as_timestamp(), json!({"_id": 2})).into(),
        ];

        let mut ctx = engine.new_context();
        let result = applier.apply(&mut ctx, batch);
        assert!(matches!(
            result,
            Err(ApplyError::OutOfOrderTimestamp { index: 2, .. })
        ));

        // The first two records stayed applied and visible.
        ctx.abandon_snapshot();
        let cursor = engine.store().cursor(&ctx, NS).unwrap();
        assert_eq!(cursor.count(), 2);
    }

    #[test]
    fn test_equal_timestamps_allowed_within_batch() {
        let engine = engine();
        let applier = engine.applier();

        let base = applier.reserve_batch(1).unwrap();
        let ts = base.as_timestamp();
        let batch = vec![
            insert_record(ts, json!({"_id": 0})).into(),
            insert_record(ts, json!({"_id": 1})).into(),
        ];

        let mut ctx = engine.new_context();
        assert_eq!(applier.apply(&mut ctx, batch).unwrap(), 2);
    }

    #[test]
    fn test_container_identity_checked() {
        let engine = engine();
        let applier = engine.applier();

        let base = applier.reserve_batch(1).unwrap();
        let mut record = insert_record(base.as_timestamp(), json!({"_id": 0}));
        record.container_id = Some(uuid::Uuid::new_v4());

        let mut ctx = engine.new_context();
        let result = applier.apply(&mut ctx, vec![record.into()]);
        assert!(matches!(result, Err(ApplyError::ContainerMismatch { .. })));
    }

    #[test]
    fn test_applied_stamps_advance_the_clock() {
        let engine = engine();
        let applier = engine.applier();

        let future = Timestamp::new(40, 0);
        let mut ctx = engine.new_context();
        applier
            .apply(&mut ctx, vec![insert_record(future, json!({"_id": 0})).into()])
            .unwrap();

        assert!(engine.clock().current().as_timestamp() >= future);
    }

    #[test]
    fn test_update_and_delete_records() {
        let engine = engine();
        let applier = engine.applier();

        let base = applier.reserve_batch(3).unwrap();
        let t0 = base.as_timestamp();
        let t1 = base.add_ticks(1).as_timestamp();
        let t2 = base.add_ticks(2).as_timestamp();

        let batch: Vec<BatchEntry> = vec![
            insert_record(t0, json!({"_id": 0, "v": "a"})).into(),
            BatchEntry::Single(OperationRecord {
                kind: OpKind::Update,
                ..insert_record(t1, json!({"_id": 0, "v": "b"}))
            }),
            BatchEntry::Single(OperationRecord {
                kind: OpKind::Delete,
                ..insert_record(t2, json!({"_id": 0}))
            }),
        ];

        let mut ctx = engine.new_context();
        assert_eq!(applier.apply(&mut ctx, batch).unwrap(), 3);

        ctx.select_snapshot(t1).unwrap();
        let (_, doc) = engine.store().find_last(&ctx, NS).unwrap().unwrap();
        assert_eq!(doc["v"], json!("b"));
        ctx.abandon_snapshot();

        ctx.select_snapshot(t2).unwrap();
        assert!(engine.store().find_last(&ctx, NS).unwrap().is_none());
    }
}
