// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Shared page state with generation-counter validation.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// A shared, mutable unit of container state.
///
/// Pages are mutated only inside the scheduler's locked region; concurrent
/// readers never block. A reader snapshots the write generation with
/// [`generation`](Page::generation), reads, and revalidates with
/// [`generation_matches`](Page::generation_matches). A mismatch means a
/// serialized mutation landed in between and the read must be retried.
pub struct Page {
    dirty: AtomicBool,
    write_gen: AtomicU64,
    approx_size: AtomicU64,
    evict_threshold: u64,
}

impl Page {
    /// Creates a clean, empty page that requests eviction once its
    /// approximate size exceeds `evict_threshold` bytes.
    pub fn new(evict_threshold: u64) -> Self {
        Self {
            dirty: AtomicBool::new(false),
            write_gen: AtomicU64::new(0),
            approx_size: AtomicU64::new(0),
            evict_threshold,
        }
    }

    /// Snapshot of the write generation for optimistic reads.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.write_gen.load(Ordering::Acquire)
    }

    /// Returns true if the generation is still `expected`.
    #[inline]
    pub fn generation_matches(&self, expected: u64) -> bool {
        self.generation() == expected
    }

    /// Returns true if the page carries unreclaimed modifications.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Approximate in-memory footprint in bytes.
    #[inline]
    pub fn approx_size(&self) -> u64 {
        self.approx_size.load(Ordering::Acquire)
    }

    /// Returns true if the page has grown past its eviction threshold.
    #[inline]
    pub fn over_threshold(&self) -> bool {
        self.approx_size() > self.evict_threshold
    }

    /// Accounts `bytes` of growth. Call only inside a serialized mutation.
    pub fn grow(&self, bytes: u64) {
        self.approx_size.fetch_add(bytes, Ordering::AcqRel);
    }

    /// Resets the size accounting to `bytes` after reclamation.
    pub fn reset_size(&self, bytes: u64) {
        self.approx_size.store(bytes, Ordering::Release);
    }

    /// Marks the page modified and bumps the write generation.
    ///
    /// The generation bump is what credits concurrent optimistic readers
    /// with having read a stale page.
    pub(crate) fn mark_modified(&self) {
        self.dirty.store(true, Ordering::Release);
        self.write_gen.fetch_add(1, Ordering::AcqRel);
    }

    /// Clears the dirty flag once the page has been reclaimed or written
    /// back. Called by the eviction coordinator.
    pub(crate) fn clear_dirty(&self) {
        self.dirty.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_page_is_clean() {
        let page = Page::new(1024);
        assert!(!page.is_dirty());
        assert_eq!(page.generation(), 0);
        assert_eq!(page.approx_size(), 0);
        assert!(!page.over_threshold());
    }

    #[test]
    fn test_mark_modified_bumps_generation() {
        let page = Page::new(1024);
        let gen = page.generation();

        page.mark_modified();
        assert!(page.is_dirty());
        assert!(!page.generation_matches(gen));
        assert_eq!(page.generation(), gen + 1);
    }

    #[test]
    fn test_threshold_crossing() {
        let page = Page::new(100);
        page.grow(100);
        assert!(!page.over_threshold());
        page.grow(1);
        assert!(page.over_threshold());

        page.reset_size(0);
        assert!(!page.over_threshold());
    }

    #[test]
    fn test_clear_dirty() {
        let page = Page::new(1024);
        page.mark_modified();
        page.clear_dirty();
        assert!(!page.is_dirty());
        // Reclamation does not rewind the generation.
        assert_eq!(page.generation(), 1);
    }
}
