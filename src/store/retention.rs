// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! History retention policy and the oldest-retained watermark.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::clock::Timestamp;

/// Decides how much multiversion history eviction may retire.
///
/// The policy is deliberately external to the core: the engine consults it
/// when reclaiming a page and retires everything older than the point it
/// returns. Snapshots older than the retirement point fail with
/// [`SnapshotUnavailable`](super::StoreError::SnapshotUnavailable).
pub trait RetentionPolicy: Send + Sync {
    /// The oldest timestamp that must remain reconstructable, given the
    /// newest stamp applied so far. `None` retires nothing.
    fn retirement_point(&self, newest: Timestamp) -> Option<Timestamp>;
}

/// Retains all history; eviction never retires versions.
pub struct RetainAll;

impl RetentionPolicy for RetainAll {
    fn retirement_point(&self, _newest: Timestamp) -> Option<Timestamp> {
        None
    }
}

/// Retains a fixed window of `ticks` behind the newest applied stamp.
pub struct RetainWindow {
    ticks: u64,
}

impl RetainWindow {
    /// Creates a policy retaining `ticks` of history behind the newest
    /// applied timestamp.
    pub fn new(ticks: u64) -> Self {
        Self { ticks }
    }
}

impl RetentionPolicy for RetainWindow {
    fn retirement_point(&self, newest: Timestamp) -> Option<Timestamp> {
        let cutoff = newest.as_u64().saturating_sub(self.ticks);
        (cutoff > 0).then(|| Timestamp::from_u64(cutoff))
    }
}

/// The oldest timestamp for which a snapshot can still be selected.
///
/// Raised monotonically by history retirement; read by every
/// `select_snapshot`. Bound views pin their timestamp here: retirement
/// clamps its cutoff to the oldest pin, so a live view never loses the
/// versions it reads. Pin and clamp share one lock, closing the window
/// between checking the watermark and binding the view.
pub(crate) struct RetentionState {
    oldest: AtomicU64,
    /// Pinned view timestamps with bind counts.
    pins: Mutex<BTreeMap<u64, usize>>,
}

impl RetentionState {
    pub(crate) fn new() -> Self {
        Self {
            oldest: AtomicU64::new(Timestamp::min().as_u64()),
            pins: Mutex::new(BTreeMap::new()),
        }
    }

    pub(crate) fn oldest(&self) -> Timestamp {
        Timestamp::from_u64(self.oldest.load(Ordering::Acquire))
    }

    pub(crate) fn raise_to(&self, ts: Timestamp) {
        self.oldest.fetch_max(ts.as_u64(), Ordering::AcqRel);
    }

    /// Pins `ts` as a bound view, or reports the watermark if the history it
    /// needs is already retired. `Timestamp::min()` is always selectable.
    pub(crate) fn pin_if_retained(&self, ts: Timestamp) -> Result<(), Timestamp> {
        let mut pins = self.pins.lock();
        let oldest = self.oldest();
        if ts < oldest && !ts.is_min() {
            return Err(oldest);
        }
        *pins.entry(ts.as_u64()).or_insert(0) += 1;
        Ok(())
    }

    /// Releases one pin on `ts`.
    pub(crate) fn unpin(&self, ts: Timestamp) {
        let mut pins = self.pins.lock();
        match pins.get_mut(&ts.as_u64()) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                pins.remove(&ts.as_u64());
            }
            None => unreachable!("unpinned view {ts} that was never pinned"),
        }
    }

    /// Clamps a retirement cutoff to the oldest pinned view and raises the
    /// watermark to the clamped value, atomically with respect to
    /// [`pin_if_retained`]. Returns the effective cutoff.
    pub(crate) fn clamp_and_raise(&self, cutoff: Timestamp) -> Timestamp {
        let pins = self.pins.lock();
        let cutoff = match pins.keys().next().copied().map(Timestamp::from_u64) {
            Some(pinned) if pinned < cutoff => pinned,
            _ => cutoff,
        };
        self.oldest.fetch_max(cutoff.as_u64(), Ordering::AcqRel);
        cutoff
    }
}
