// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Background eviction coordinator.
//!
//! One background thread per engine, woken on demand by the serialization
//! scheduler rather than polling. It drains explicit eviction hand-offs
//! (completing the sessions blocked on them), then sweeps registered pages
//! that crossed their eviction threshold.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

use super::error::{MutationError, MutationResult};
use super::page::Page;
use super::scheduler::SerialScheduler;
use super::session::Session;

/// An eviction hand-off armed by an `Evict`-mode mutation: the session is
/// blocked until the coordinator reclaims the page and completes it.
pub(crate) struct EvictRequest {
    pub(crate) session: Arc<Session>,
    pub(crate) page: Arc<Page>,
}

struct EvictorShared {
    queue: Mutex<VecDeque<EvictRequest>>,
    cond: Condvar,
    shutdown: AtomicBool,
    pages: Mutex<Vec<Weak<Page>>>,
}

/// Cheap cloneable handle for waking and feeding the coordinator.
#[derive(Clone)]
pub struct EvictorHandle {
    shared: Arc<EvictorShared>,
}

impl EvictorHandle {
    /// Creates the shared coordinator state. The thread itself is spawned
    /// separately by [`EvictionCoordinator::spawn`].
    pub fn new() -> Self {
        Self {
            shared: Arc::new(EvictorShared {
                queue: Mutex::new(VecDeque::new()),
                cond: Condvar::new(),
                shutdown: AtomicBool::new(false),
                pages: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Registers a page for threshold sweeps. Holds only a weak reference;
    /// dropped pages fall out of the registry on the next sweep.
    pub fn register_page(&self, page: &Arc<Page>) {
        self.shared.pages.lock().push(Arc::downgrade(page));
    }

    /// Wakes the coordinator. Condvar notify only, safe from inside the
    /// scheduler's locked region.
    pub(crate) fn wake(&self) {
        self.shared.cond.notify_one();
    }

    pub(crate) fn submit(&self, request: EvictRequest) {
        self.shared.queue.lock().push_back(request);
    }
}

impl Default for EvictorHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// What the coordinator does to an over-threshold or handed-off page.
///
/// Implemented by the versioned store: write back or reclaim the page's
/// in-memory state, retiring history per the engine's retention policy.
pub trait EvictionTarget: Send + Sync {
    /// Reclaims `page`. The coordinator invokes this with the process-wide
    /// serial lock held, so implementations mutate page and container state
    /// under the same exclusion as every other mutation closure.
    fn evict_page(&self, page: &Page) -> MutationResult;
}

/// Owns the background eviction thread and its shutdown lifecycle.
pub struct EvictionCoordinator {
    handle: EvictorHandle,
    thread: Option<JoinHandle<()>>,
}

impl EvictionCoordinator {
    /// Spawns the eviction thread.
    ///
    /// The thread sleeps on the coordinator condvar until woken, services
    /// every queued hand-off, then sweeps registered pages. On shutdown it
    /// fails any remaining hand-offs so no session is left sleeping.
    pub fn spawn(
        handle: EvictorHandle,
        scheduler: Arc<SerialScheduler>,
        target: Arc<dyn EvictionTarget>,
    ) -> Self {
        let shared = Arc::clone(&handle.shared);
        let thread = std::thread::Builder::new()
            .name("basalt-evict".to_string())
            .spawn(move || run(shared, scheduler, target))
            .expect("failed to spawn eviction thread");

        Self {
            handle,
            thread: Some(thread),
        }
    }

    /// Handle for registering pages and waking the thread.
    pub fn handle(&self) -> EvictorHandle {
        self.handle.clone()
    }

    /// Stops and joins the eviction thread. Idempotent.
    pub fn shutdown(&mut self) {
        self.handle.shared.shutdown.store(true, Ordering::Release);
        self.handle.wake();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("eviction thread panicked during shutdown");
            }
        }
    }
}

impl Drop for EvictionCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(shared: Arc<EvictorShared>, scheduler: Arc<SerialScheduler>, target: Arc<dyn EvictionTarget>) {
    loop {
        let requests: Vec<EvictRequest> = {
            let mut queue = shared.queue.lock();
            while queue.is_empty() && !shared.shutdown.load(Ordering::Acquire) {
                shared.cond.wait(&mut queue);
                // Woken with an empty queue means a threshold nudge: fall
                // through and sweep.
                if queue.is_empty() {
                    break;
                }
            }
            queue.drain(..).collect()
        };

        let shutting_down = shared.shutdown.load(Ordering::Acquire);

        for request in requests {
            let result = if shutting_down {
                Err(MutationError::Failed("engine shutting down".to_string()))
            } else {
                // Page reclamation is a page mutation; it runs under the
                // same serial lock as every mutation closure.
                scheduler.with_serial_lock(|| {
                    let result = target.evict_page(&request.page);
                    if result.is_ok() {
                        request.page.clear_dirty();
                    }
                    result
                })
            };
            if let Err(ref err) = result {
                tracing::warn!(session = request.session.id(), %err, "eviction failed");
            }
            // Completing with no page: the hand-off already credited the
            // mutation's write generation when it was armed.
            scheduler.complete_mutation(&request.session, None, result);
        }

        if shutting_down {
            tracing::debug!("eviction coordinator stopped");
            return;
        }

        sweep(&shared, &scheduler, target.as_ref());
    }
}

/// Reclaims registered pages that crossed their threshold and prunes dead
/// registry entries.
fn sweep(shared: &EvictorShared, scheduler: &SerialScheduler, target: &dyn EvictionTarget) {
    let pages: Vec<Arc<Page>> = {
        let mut registry = shared.pages.lock();
        registry.retain(|weak| weak.strong_count() > 0);
        registry.iter().filter_map(Weak::upgrade).collect()
    };

    for page in pages {
        if !page.over_threshold() {
            continue;
        }
        tracing::debug!(size = page.approx_size(), "sweeping over-threshold page");
        let result = scheduler.with_serial_lock(|| {
            // Re-check under the lock; a hand-off may have reclaimed the
            // page since the unlocked check.
            if !page.over_threshold() {
                return Ok(());
            }
            let result = target.evict_page(&page);
            if result.is_ok() {
                page.clear_dirty();
            }
            result
        });
        if let Err(err) = result {
            tracing::warn!(%err, "page sweep failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    struct CountingTarget {
        evictions: AtomicU64,
    }

    impl EvictionTarget for CountingTarget {
        fn evict_page(&self, page: &Page) -> MutationResult {
            self.evictions.fetch_add(1, Ordering::AcqRel);
            page.reset_size(0);
            Ok(())
        }
    }

    #[test]
    fn test_threshold_nudge_triggers_sweep() {
        let handle = EvictorHandle::new();
        let scheduler = Arc::new(SerialScheduler::new(handle.clone()));
        let target = Arc::new(CountingTarget {
            evictions: AtomicU64::new(0),
        });
        let mut coordinator = EvictionCoordinator::spawn(
            handle.clone(),
            scheduler,
            Arc::clone(&target) as Arc<dyn EvictionTarget>,
        );

        let page = Arc::new(Page::new(16));
        handle.register_page(&page);
        page.grow(64);
        handle.wake();

        // The sweep runs asynchronously; poll for its effect.
        for _ in 0..100 {
            if page.approx_size() == 0 {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert_eq!(page.approx_size(), 0);
        assert!(target.evictions.load(Ordering::Acquire) >= 1);

        coordinator.shutdown();
    }

    #[test]
    fn test_reclaim_excluded_from_serialized_mutations() {
        use crate::serial::SerialMode;
        use std::sync::atomic::AtomicBool;
        use std::thread;

        /// Records whether an eviction ever overlapped a mutation closure.
        struct ExclusionTarget {
            in_mutation: Arc<AtomicBool>,
            overlaps: AtomicU64,
            evictions: AtomicU64,
        }

        impl EvictionTarget for ExclusionTarget {
            fn evict_page(&self, page: &Page) -> MutationResult {
                if self.in_mutation.load(Ordering::Acquire) {
                    self.overlaps.fetch_add(1, Ordering::AcqRel);
                }
                self.evictions.fetch_add(1, Ordering::AcqRel);
                page.reset_size(0);
                Ok(())
            }
        }

        let handle = EvictorHandle::new();
        let scheduler = Arc::new(SerialScheduler::new(handle.clone()));
        let in_mutation = Arc::new(AtomicBool::new(false));
        let target = Arc::new(ExclusionTarget {
            in_mutation: Arc::clone(&in_mutation),
            overlaps: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        });
        let _coordinator = EvictionCoordinator::spawn(
            handle.clone(),
            Arc::clone(&scheduler),
            Arc::clone(&target) as Arc<dyn EvictionTarget>,
        );

        let page = Arc::new(Page::new(16));
        handle.register_page(&page);

        // Every growth crosses the threshold, so each completion wakes the
        // coordinator into a sweep racing the next round's closure.
        let mutator = {
            let scheduler = Arc::clone(&scheduler);
            let page = Arc::clone(&page);
            let in_mutation = Arc::clone(&in_mutation);
            thread::spawn(move || {
                let session = Arc::new(Session::new(1));
                for _ in 0..200 {
                    let result = scheduler.serialize(&session, SerialMode::Exclusive, |ctx| {
                        in_mutation.store(true, Ordering::Release);
                        page.grow(64);
                        thread::yield_now();
                        in_mutation.store(false, Ordering::Release);
                        ctx.complete(Some(&page), Ok(()));
                    });
                    assert_eq!(result, Ok(()));
                }
            })
        };
        mutator.join().unwrap();

        // A hand-off guarantees at least one reclamation was observed.
        let session = Arc::new(Session::new(2));
        let result = scheduler.serialize(&session, SerialMode::Evict, |ctx| {
            page.grow(64);
            ctx.request_eviction(&page);
        });
        assert_eq!(result, Ok(()));

        assert!(target.evictions.load(Ordering::Acquire) >= 1);
        assert_eq!(target.overlaps.load(Ordering::Acquire), 0);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let handle = EvictorHandle::new();
        let scheduler = Arc::new(SerialScheduler::new(handle.clone()));
        let target = Arc::new(CountingTarget {
            evictions: AtomicU64::new(0),
        });
        let mut coordinator =
            EvictionCoordinator::spawn(handle, scheduler, target as Arc<dyn EvictionTarget>);

        coordinator.shutdown();
        coordinator.shutdown();
    }
}
