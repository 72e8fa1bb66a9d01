// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Per-thread session state for serialized mutations.

use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::{Condvar, Mutex};

use super::error::MutationResult;

/// Published state of a session's in-flight serialized operation.
///
/// Stored with release semantics on every transition and read with acquire
/// semantics, so a thread that observes [`OpState::Idle`] after a mutation
/// also observes the mutation's result code and the page's updated write
/// generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpState {
    /// No serialized operation in flight.
    Idle = 0,
    /// A mutation closure is executing inside the locked region.
    Executing = 1,
    /// The owning thread is blocked awaiting completion by the eviction
    /// coordinator.
    Sleeping = 2,
}

impl OpState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => OpState::Idle,
            1 => OpState::Executing,
            2 => OpState::Sleeping,
            _ => unreachable!("corrupt session state {raw}"),
        }
    }
}

struct SessionSlot {
    /// True while the owning thread intends to block until completion.
    sleeping: bool,
    /// Guards against a second completion for the same operation.
    completed: bool,
    /// Result code published by `complete_mutation`.
    result: Option<MutationResult>,
}

/// Per-thread execution context for the serialization scheduler.
///
/// A session admits exactly one in-flight serialized operation at a time;
/// arming a second one before the first completes is a fatal programming
/// error, as is completing the same operation twice. Both indicate a
/// lost-wakeup bug upstream and are not recoverable.
pub struct Session {
    id: u64,
    state: AtomicU8,
    slot: Mutex<SessionSlot>,
    cond: Condvar,
}

impl Session {
    /// Creates a detached session. Engines hand these out on attach.
    pub fn new(id: u64) -> Self {
        Self {
            id,
            state: AtomicU8::new(OpState::Idle as u8),
            slot: Mutex::new(SessionSlot {
                sleeping: false,
                completed: false,
                result: None,
            }),
            cond: Condvar::new(),
        }
    }

    /// The session's identity, for logging.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Lock-free observer of the pending-operation state (acquire load).
    #[inline]
    pub fn op_state(&self) -> OpState {
        OpState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Arms the session for one serialized operation.
    ///
    /// `sleeping` is set when the owner will block until the eviction
    /// coordinator completes the operation.
    pub(crate) fn arm(&self, sleeping: bool) {
        let mut slot = self.slot.lock();
        assert_eq!(
            self.op_state(),
            OpState::Idle,
            "session {} armed with an operation still in flight",
            self.id
        );
        slot.sleeping = sleeping;
        slot.completed = false;
        slot.result = None;
        self.state.store(OpState::Executing as u8, Ordering::Release);
    }

    /// Publishes the operation's result and wakes the owner if it sleeps.
    ///
    /// The state store is the release barrier pairing with `op_state`'s
    /// acquire load: any observer of `Idle` sees the result and every memory
    /// effect of the mutation.
    pub(crate) fn publish(&self, result: MutationResult) {
        let mut slot = self.slot.lock();
        assert!(
            !slot.completed,
            "session {}: mutation completed twice",
            self.id
        );
        slot.completed = true;
        slot.result = Some(result);
        self.state.store(OpState::Idle as u8, Ordering::Release);
        if slot.sleeping {
            self.cond.notify_one();
        }
    }

    /// Collects the operation's result, blocking first if the session was
    /// armed sleeping and the completion has not arrived yet.
    pub(crate) fn finish(&self) -> MutationResult {
        let mut slot = self.slot.lock();
        if slot.sleeping && slot.result.is_none() {
            self.state.store(OpState::Sleeping as u8, Ordering::Release);
            while slot.result.is_none() {
                self.cond.wait(&mut slot);
            }
        }
        slot.sleeping = false;
        slot.result
            .take()
            .unwrap_or_else(|| panic!("session {}: mutation finished without completion", self.id))
    }
}
