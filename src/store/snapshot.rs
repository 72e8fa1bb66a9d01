// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Snapshots and the operation context that owns them.

use std::sync::Arc;

use crate::clock::Timestamp;
use crate::serial::Session;

use super::error::StoreError;
use super::retention::RetentionState;

/// A named, immutable point-in-time view.
///
/// A read performed under a snapshot observes every mutation stamped at or
/// before its timestamp and none stamped later, regardless of real-time
/// commit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    ts: Timestamp,
}

impl Snapshot {
    /// The view's timestamp boundary.
    #[inline]
    pub fn timestamp(&self) -> Timestamp {
        self.ts
    }
}

/// Per-operation execution context.
///
/// Owns at most one active [`Snapshot`] at a time, the session used for
/// serialized mutations, and the write timestamp bound by the batch applier
/// for the mutation currently being applied.
pub struct OperationContext {
    session: Arc<Session>,
    retention: Arc<RetentionState>,
    snapshot: Option<Snapshot>,
    write_ts: Option<Timestamp>,
}

impl OperationContext {
    pub(crate) fn new(session: Arc<Session>, retention: Arc<RetentionState>) -> Self {
        Self {
            session,
            retention,
            snapshot: None,
            write_ts: None,
        }
    }

    /// The session this context's serialized mutations run under.
    #[inline]
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Binds this context's view to `ts`.
    ///
    /// Fails with [`StoreError::SnapshotUnavailable`] if history needed to
    /// reconstruct that view has been retired. A bound view pins its
    /// timestamp: history retirement clamps its cutoff to the oldest bound
    /// view, so the versions this view reads stay reconstructable until
    /// [`abandon_snapshot`](Self::abandon_snapshot). Re-binding while a
    /// snapshot is active is a fatal programming error: the old view's
    /// resources must be released first.
    pub fn select_snapshot(&mut self, ts: Timestamp) -> Result<(), StoreError> {
        assert!(
            self.snapshot.is_none(),
            "session {}: snapshot selected while another view is active",
            self.session.id()
        );

        self.retention
            .pin_if_retained(ts)
            .map_err(|oldest| StoreError::SnapshotUnavailable {
                requested: ts,
                oldest,
            })?;

        self.snapshot = Some(Snapshot { ts });
        Ok(())
    }

    /// Releases the current view and its retention pin. Idempotent.
    pub fn abandon_snapshot(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            self.retention.unpin(snapshot.ts);
        }
    }

    /// The active view, if any.
    #[inline]
    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    /// The timestamp reads under this context are qualified by. With no
    /// snapshot bound, reads observe the latest committed state.
    #[inline]
    pub fn read_timestamp(&self) -> Timestamp {
        self.snapshot
            .map_or_else(Timestamp::max, |snapshot| snapshot.ts)
    }

    /// Binds the visibility point for the mutation about to be applied.
    pub fn set_write_timestamp(&mut self, ts: Timestamp) {
        self.write_ts = Some(ts);
    }

    /// Clears the bound write timestamp.
    pub fn clear_write_timestamp(&mut self) {
        self.write_ts = None;
    }

    /// The visibility point for the mutation being applied, if bound.
    #[inline]
    pub fn write_timestamp(&self) -> Option<Timestamp> {
        self.write_ts
    }
}

impl Drop for OperationContext {
    fn drop(&mut self) {
        self.abandon_snapshot();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_context() -> (OperationContext, Arc<RetentionState>) {
        let retention = Arc::new(RetentionState::new());
        let ctx = OperationContext::new(Arc::new(Session::new(1)), Arc::clone(&retention));
        (ctx, retention)
    }

    #[test]
    fn test_select_and_abandon() {
        let (mut ctx, _) = test_context();
        assert_eq!(ctx.read_timestamp(), Timestamp::max());

        ctx.select_snapshot(Timestamp::new(3, 0)).unwrap();
        assert_eq!(ctx.read_timestamp(), Timestamp::new(3, 0));

        ctx.abandon_snapshot();
        assert!(ctx.snapshot().is_none());
        assert_eq!(ctx.read_timestamp(), Timestamp::max());
    }

    #[test]
    fn test_abandon_is_idempotent() {
        let (mut ctx, _) = test_context();
        ctx.abandon_snapshot();
        ctx.abandon_snapshot();
    }

    #[test]
    fn test_rebind_after_abandon() {
        let (mut ctx, _) = test_context();
        ctx.select_snapshot(Timestamp::new(3, 0)).unwrap();
        ctx.abandon_snapshot();
        ctx.select_snapshot(Timestamp::new(4, 0)).unwrap();
        assert_eq!(ctx.read_timestamp(), Timestamp::new(4, 0));
    }

    #[test]
    #[should_panic(expected = "another view is active")]
    fn test_rebind_without_abandon_panics() {
        let (mut ctx, _) = test_context();
        ctx.select_snapshot(Timestamp::new(3, 0)).unwrap();
        let _ = ctx.select_snapshot(Timestamp::new(4, 0));
    }

    #[test]
    fn test_retired_view_unavailable() {
        let (mut ctx, retention) = test_context();
        retention.raise_to(Timestamp::new(10, 0));

        let result = ctx.select_snapshot(Timestamp::new(5, 0));
        assert!(matches!(
            result,
            Err(StoreError::SnapshotUnavailable { .. })
        ));

        // At or past the watermark is fine.
        ctx.select_snapshot(Timestamp::new(10, 0)).unwrap();
    }

    #[test]
    fn test_min_timestamp_always_selectable() {
        let (mut ctx, retention) = test_context();
        retention.raise_to(Timestamp::new(10, 0));
        ctx.select_snapshot(Timestamp::min()).unwrap();
    }

    #[test]
    fn test_dropped_context_releases_its_pin() {
        let retention = Arc::new(RetentionState::new());
        {
            let mut ctx =
                OperationContext::new(Arc::new(Session::new(1)), Arc::clone(&retention));
            ctx.select_snapshot(Timestamp::new(5, 0)).unwrap();
            // The bound view clamps retirement.
            assert_eq!(
                retention.clamp_and_raise(Timestamp::new(9, 0)),
                Timestamp::new(5, 0)
            );
        }
        assert_eq!(
            retention.clamp_and_raise(Timestamp::new(9, 0)),
            Timestamp::new(9, 0)
        );
    }

    #[test]
    fn test_write_timestamp_binding() {
        let (mut ctx, _) = test_context();
        assert!(ctx.write_timestamp().is_none());

        ctx.set_write_timestamp(Timestamp::new(7, 1));
        assert_eq!(ctx.write_timestamp(), Some(Timestamp::new(7, 1)));

        ctx.clear_write_timestamp();
        assert!(ctx.write_timestamp().is_none());
    }
}
