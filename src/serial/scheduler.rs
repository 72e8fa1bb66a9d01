// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! The page serialization scheduler.
//!
//! Threads serializing access to shared page state hand the scheduler a
//! mutation closure. The scheduler runs the closure while holding a
//! process-wide short-duration lock, records the outcome on the calling
//! session, and for eviction hand-offs wakes the background eviction
//! coordinator and blocks the caller until it acknowledges.
//!
//! The lock is held only for the duration of the closure, never across the
//! blocking wait, so the eviction coordinator is never stuck behind a
//! sleeping mutator.

use std::sync::Arc;

use parking_lot::Mutex;

use super::error::MutationResult;
use super::evict::{EvictRequest, EvictorHandle};
use super::page::Page;
use super::session::Session;

/// Behavior selector for [`SerialScheduler::serialize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialMode {
    /// Acquire the serial lock, run the closure, release. The closure must
    /// report its outcome via [`SerialContext::complete`].
    Exclusive,
    /// Like `Exclusive`, but the closure defers completion to the eviction
    /// coordinator via [`SerialContext::request_eviction`]; the caller
    /// blocks until the coordinator publishes the result.
    Evict,
    /// The caller already holds the serial lock (re-entrant call from inside
    /// an `Exclusive` closure); run without re-acquiring it.
    Reenter,
}

/// Capability handle passed to mutation closures.
///
/// A closure reports its outcome exactly once: either immediately with
/// [`complete`](SerialContext::complete), or by arming an eviction hand-off
/// with [`request_eviction`](SerialContext::request_eviction) and leaving
/// completion to the coordinator.
pub struct SerialContext<'a> {
    scheduler: &'a SerialScheduler,
    session: &'a Arc<Session>,
    evict_page: Option<Arc<Page>>,
}

impl SerialContext<'_> {
    /// Publishes the mutation's result. See
    /// [`SerialScheduler::complete_mutation`].
    pub fn complete(&self, page: Option<&Page>, result: MutationResult) {
        self.scheduler
            .complete_mutation(self.session, page, result);
    }

    /// Arms an eviction hand-off for `page`.
    ///
    /// Marks the page modified here, inside the locked region, so the
    /// generation bump is ordered before the eventual publish; the eviction
    /// coordinator will reclaim the page and complete the operation.
    pub fn request_eviction(&mut self, page: &Arc<Page>) {
        page.mark_modified();
        self.evict_page = Some(Arc::clone(page));
    }

    /// The session this operation runs under.
    pub fn session(&self) -> &Arc<Session> {
        self.session
    }
}

/// Serializes mutations of shared page state across all sessions.
///
/// At most one mutation closure runs inside the locked region per process at
/// a time. `Reenter` callers are responsible for already holding that
/// exclusion.
pub struct SerialScheduler {
    serial_lock: Mutex<()>,
    evictor: EvictorHandle,
}

impl SerialScheduler {
    /// Creates a scheduler that signals the given eviction coordinator.
    pub fn new(evictor: EvictorHandle) -> Self {
        Self {
            serial_lock: Mutex::new(()),
            evictor,
        }
    }

    pub(crate) fn evictor(&self) -> &EvictorHandle {
        &self.evictor
    }

    /// Runs `f` while holding the serial lock.
    ///
    /// For mutators outside the `serialize` path: the eviction coordinator
    /// reclaims pages under the same exclusion as every mutation closure.
    pub(crate) fn with_serial_lock<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.serial_lock.lock();
        f()
    }

    /// Runs `f` with serialized access to shared page state and returns the
    /// result code the completion step stored on the session.
    ///
    /// The closure does not return its outcome; it must publish it through
    /// the [`SerialContext`], which is the only path that unblocks an
    /// `Evict`-mode caller. A closure that neither completes nor arms an
    /// eviction hand-off is a fatal bug and panics rather than deadlocking
    /// the caller.
    pub fn serialize<F>(&self, session: &Arc<Session>, mode: SerialMode, f: F) -> MutationResult
    where
        F: FnOnce(&mut SerialContext<'_>),
    {
        session.arm(mode == SerialMode::Evict);

        let mut ctx = SerialContext {
            scheduler: self,
            session,
            evict_page: None,
        };

        if mode == SerialMode::Reenter {
            f(&mut ctx);
        } else {
            let _guard = self.serial_lock.lock();
            f(&mut ctx);
        }

        if mode == SerialMode::Evict {
            match ctx.evict_page.take() {
                Some(page) => {
                    self.evictor.submit(EvictRequest {
                        session: Arc::clone(session),
                        page,
                    });
                    self.evictor.wake();
                }
                None => panic!(
                    "session {}: evict-mode mutation armed no eviction hand-off",
                    session.id()
                ),
            }
        }

        session.finish()
    }

    /// Completion step for a serialized mutation.
    ///
    /// On success with a mutated page: marks it modified, bumps its write
    /// generation, and if it crossed its eviction threshold wakes the
    /// eviction coordinator. The wake is a condvar notify only, safe to call
    /// from inside the locked region.
    ///
    /// Stores the result code and publishes the idle state with release
    /// semantics, then wakes the owning session if it sleeps. This is the
    /// sole path by which a blocked `serialize` caller resumes.
    pub fn complete_mutation(
        &self,
        session: &Session,
        page: Option<&Page>,
        result: MutationResult,
    ) {
        if result.is_ok() {
            if let Some(page) = page {
                page.mark_modified();
                if page.over_threshold() {
                    tracing::trace!(
                        size = page.approx_size(),
                        "page over threshold, waking evictor"
                    );
                    self.evictor.wake();
                }
            }
        }

        session.publish(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::error::MutationError;
    use crate::serial::evict::{EvictionCoordinator, EvictionTarget};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::thread;

    /// Eviction target that just clears the page.
    struct NullTarget {
        evictions: AtomicU64,
    }

    impl NullTarget {
        fn new() -> Self {
            Self {
                evictions: AtomicU64::new(0),
            }
        }
    }

    impl EvictionTarget for NullTarget {
        fn evict_page(&self, page: &Page) -> MutationResult {
            self.evictions.fetch_add(1, Ordering::AcqRel);
            page.reset_size(0);
            Ok(())
        }
    }

    fn test_rig() -> (Arc<SerialScheduler>, EvictionCoordinator, Arc<NullTarget>) {
        let handle = EvictorHandle::new();
        let scheduler = Arc::new(SerialScheduler::new(handle.clone()));
        let target = Arc::new(NullTarget::new());
        let coordinator = EvictionCoordinator::spawn(
            handle,
            Arc::clone(&scheduler),
            Arc::clone(&target) as Arc<dyn EvictionTarget>,
        );
        (scheduler, coordinator, target)
    }

    #[test]
    fn test_exclusive_mutation_returns_result() {
        let (scheduler, _coord, _) = test_rig();
        let session = Arc::new(Session::new(1));
        let page = Page::new(1024);

        let result = scheduler.serialize(&session, SerialMode::Exclusive, |ctx| {
            page.grow(10);
            ctx.complete(Some(&page), Ok(()));
        });

        assert_eq!(result, Ok(()));
        assert!(page.is_dirty());
        assert_eq!(page.generation(), 1);
    }

    #[test]
    fn test_failed_mutation_surfaces() {
        let (scheduler, _coord, _) = test_rig();
        let session = Arc::new(Session::new(1));

        let result = scheduler.serialize(&session, SerialMode::Exclusive, |ctx| {
            ctx.complete(None, Err(MutationError::Conflict { expected: 3 }));
        });

        assert_eq!(result, Err(MutationError::Conflict { expected: 3 }));
    }

    #[test]
    fn test_failed_mutation_does_not_dirty_page() {
        let (scheduler, _coord, _) = test_rig();
        let session = Arc::new(Session::new(1));
        let page = Page::new(1024);

        let _ = scheduler.serialize(&session, SerialMode::Exclusive, |ctx| {
            ctx.complete(Some(&page), Err(MutationError::Failed("boom".into())));
        });

        assert!(!page.is_dirty());
        assert_eq!(page.generation(), 0);
    }

    #[test]
    fn test_reenter_runs_under_callers_lock() {
        let (scheduler, _coord, _) = test_rig();
        let session = Arc::new(Session::new(1));
        let inner_session = Arc::new(Session::new(2));

        let result = scheduler.serialize(&session, SerialMode::Exclusive, |ctx| {
            // Re-entrant call from inside the locked region must not try to
            // re-acquire the serial lock.
            let inner = ctx.scheduler.serialize(&inner_session, SerialMode::Reenter, |ictx| {
                ictx.complete(None, Ok(()));
            });
            ctx.complete(None, inner);
        });

        assert_eq!(result, Ok(()));
    }

    #[test]
    fn test_evict_mode_blocks_until_coordinator_completes() {
        let (scheduler, _coord, target) = test_rig();
        let session = Arc::new(Session::new(1));
        let page = Arc::new(Page::new(16));

        let result = scheduler.serialize(&session, SerialMode::Evict, |ctx| {
            page.grow(64);
            ctx.request_eviction(&page);
        });

        assert_eq!(result, Ok(()));
        assert_eq!(target.evictions.load(Ordering::Acquire), 1);
        assert_eq!(page.approx_size(), 0);
        assert_eq!(session.op_state(), crate::serial::OpState::Idle);
    }

    #[test]
    fn test_mutual_exclusion_counter() {
        const THREADS: usize = 8;
        const INCREMENTS: usize = 500;

        let (scheduler, _coord, _) = test_rig();
        let page = Arc::new(Page::new(u64::MAX));
        let counter = Arc::new(std::cell::UnsafeCell::new(0u64));

        // Wrap the raw cell so it can cross threads; all access happens
        // inside the serialized region.
        struct SharedCounter(Arc<std::cell::UnsafeCell<u64>>);
        unsafe impl Send for SharedCounter {}
        unsafe impl Sync for SharedCounter {}
        let shared = Arc::new(SharedCounter(Arc::clone(&counter)));

        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let scheduler = Arc::clone(&scheduler);
                let page = Arc::clone(&page);
                let shared = Arc::clone(&shared);
                thread::spawn(move || {
                    let session = Arc::new(Session::new(t as u64));
                    for _ in 0..INCREMENTS {
                        let result =
                            scheduler.serialize(&session, SerialMode::Exclusive, |ctx| {
                                // Unsynchronized read-modify-write: only the
                                // serial lock makes this safe.
                                unsafe {
                                    let slot = shared.0.get();
                                    *slot += 1;
                                }
                                ctx.complete(Some(&page), Ok(()));
                            });
                        assert_eq!(result, Ok(()));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(unsafe { *counter.get() }, (THREADS * INCREMENTS) as u64);
        assert_eq!(page.generation(), (THREADS * INCREMENTS) as u64);
    }

    #[test]
    fn test_no_lost_wake_under_contention() {
        const THREADS: usize = 8;
        const ROUNDS: usize = 50;

        let (scheduler, _coord, target) = test_rig();

        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let scheduler = Arc::clone(&scheduler);
                thread::spawn(move || {
                    let session = Arc::new(Session::new(t as u64));
                    let page = Arc::new(Page::new(8));
                    for _ in 0..ROUNDS {
                        // Every evict-mode call must return: a hang here is a
                        // lost wake-up.
                        let result = scheduler.serialize(&session, SerialMode::Evict, |ctx| {
                            page.grow(32);
                            ctx.request_eviction(&page);
                        });
                        assert_eq!(result, Ok(()));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(
            target.evictions.load(Ordering::Acquire),
            (THREADS * ROUNDS) as u64
        );
    }

    #[test]
    #[should_panic(expected = "armed no eviction hand-off")]
    fn test_evict_mode_without_request_panics() {
        let (scheduler, _coord, _) = test_rig();
        let session = Arc::new(Session::new(1));

        let _ = scheduler.serialize(&session, SerialMode::Evict, |_ctx| {
            // Forgot to call request_eviction: the caller would block
            // forever, so the scheduler must abort instead.
        });
    }
}
