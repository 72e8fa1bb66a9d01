// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Versioned record containers.
//!
//! A container holds multiversion record chains keyed by insertion order.
//! Mutations append versions stamped with their visibility timestamp; reads
//! qualify against a view timestamp and see exactly the versions stamped at
//! or before it. All mutating methods are crate-private: they run only
//! inside the serialization scheduler's locked region, driven by
//! [`VersionedStore`](super::VersionedStore).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::clock::Timestamp;
use crate::serial::Page;

use super::error::StoreError;

/// An operation payload. Records are schemaless documents keyed by `_id`.
pub type Document = serde_json::Value;

/// Monotonic per-container record identity, assigned in insertion order.
pub type RecordId = u64;

struct Version {
    ts: Timestamp,
    /// `None` is a tombstone.
    doc: Option<Document>,
}

struct VersionChain {
    versions: Vec<Version>,
}

impl VersionChain {
    /// The newest version stamped at or before `view`.
    fn visible_at(&self, view: Timestamp) -> Option<&Version> {
        self.versions.iter().rev().find(|v| v.ts <= view)
    }

    fn newest_ts(&self) -> Option<Timestamp> {
        self.versions.last().map(|v| v.ts)
    }
}

fn doc_id(doc: &Document) -> Result<String, StoreError> {
    doc.get("_id")
        .map(Document::to_string)
        .ok_or_else(|| StoreError::InvalidArgument("document has no _id field".to_string()))
}

fn doc_size(doc: &Document) -> u64 {
    doc.to_string().len() as u64
}

/// A named container of versioned records with an associated in-memory page.
pub struct Container {
    name: String,
    id: Uuid,
    page: Arc<Page>,
    records: RwLock<BTreeMap<RecordId, VersionChain>>,
    next_record_id: AtomicU64,
    indexes: RwLock<Vec<String>>,
}

impl Container {
    pub(crate) fn new(name: String, page_threshold: u64) -> Self {
        Self {
            name,
            id: Uuid::new_v4(),
            page: Arc::new(Page::new(page_threshold)),
            records: RwLock::new(BTreeMap::new()),
            next_record_id: AtomicU64::new(0),
            indexes: RwLock::new(Vec::new()),
        }
    }

    /// The container's namespace name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The container's stable identity.
    #[inline]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The page accounting this container's in-memory state.
    #[inline]
    pub fn page(&self) -> &Arc<Page> {
        &self.page
    }

    /// Number of records visible at `view`.
    pub fn count_at(&self, view: Timestamp) -> usize {
        let records = self.records.read();
        records
            .values()
            .filter(|chain| matches!(chain.visible_at(view), Some(v) if v.doc.is_some()))
            .count()
    }

    /// The document of record `id` visible at `view`.
    pub fn read_at(&self, id: RecordId, view: Timestamp) -> Option<Document> {
        let records = self.records.read();
        records
            .get(&id)?
            .visible_at(view)
            .and_then(|v| v.doc.clone())
    }

    /// The last (highest record id) document visible at `view`.
    pub fn last_visible(&self, view: Timestamp) -> Option<(RecordId, Document)> {
        let records = self.records.read();
        records.iter().rev().find_map(|(id, chain)| {
            chain
                .visible_at(view)
                .and_then(|v| v.doc.clone())
                .map(|doc| (*id, doc))
        })
    }

    /// The record visible at `view` whose `_id` field matches `id`.
    pub fn find_by_doc_id(&self, id: &str, view: Timestamp) -> Option<(RecordId, Document)> {
        let records = self.records.read();
        records.iter().find_map(|(rid, chain)| {
            let doc = chain.visible_at(view).and_then(|v| v.doc.clone())?;
            (doc_id(&doc).ok()? == id).then_some((*rid, doc))
        })
    }

    /// Registered index names.
    pub fn index_names(&self) -> Vec<String> {
        self.indexes.read().clone()
    }

    pub(crate) fn insert_at(&self, ts: Timestamp, doc: Document) -> Result<RecordId, StoreError> {
        let id = doc_id(&doc)?;
        if self.find_by_doc_id(&id, Timestamp::max()).is_some() {
            return Err(StoreError::Conflict(format!(
                "duplicate _id {id} in namespace {:?}",
                self.name
            )));
        }

        self.page.grow(doc_size(&doc));
        let record_id = self.next_record_id.fetch_add(1, Ordering::AcqRel);
        self.records.write().insert(
            record_id,
            VersionChain {
                versions: vec![Version { ts, doc: Some(doc) }],
            },
        );
        Ok(record_id)
    }

    pub(crate) fn update_at(&self, ts: Timestamp, doc: Document) -> Result<RecordId, StoreError> {
        let id = doc_id(&doc)?;
        let (record_id, _) = self.find_by_doc_id(&id, Timestamp::max()).ok_or_else(|| {
            StoreError::RecordNotFound {
                namespace: self.name.clone(),
                id: id.clone(),
            }
        })?;

        self.page.grow(doc_size(&doc));
        self.append_version(record_id, ts, Some(doc))?;
        Ok(record_id)
    }

    pub(crate) fn delete_at(&self, ts: Timestamp, id: &str) -> Result<RecordId, StoreError> {
        let (record_id, _) = self.find_by_doc_id(id, Timestamp::max()).ok_or_else(|| {
            StoreError::RecordNotFound {
                namespace: self.name.clone(),
                id: id.to_string(),
            }
        })?;

        self.append_version(record_id, ts, None)?;
        Ok(record_id)
    }

    fn append_version(
        &self,
        record_id: RecordId,
        ts: Timestamp,
        doc: Option<Document>,
    ) -> Result<(), StoreError> {
        let mut records = self.records.write();
        let chain = records
            .get_mut(&record_id)
            .unwrap_or_else(|| unreachable!("record {record_id} vanished under the serial lock"));

        // A version at or past our stamp means a concurrent writer won.
        if let Some(newest) = chain.newest_ts() {
            if newest >= ts {
                return Err(StoreError::Conflict(format!(
                    "record {record_id} already has a version at {newest}, cannot stamp {ts}"
                )));
            }
        }

        chain.versions.push(Version { ts, doc });
        Ok(())
    }

    /// Removes all records. Non-transactional, like the index bookkeeping:
    /// used by maintenance paths that already hold the serial lock.
    pub(crate) fn truncate(&self) {
        self.records.write().clear();
        self.page.reset_size(0);
    }

    pub(crate) fn create_index(&self, name: &str) -> Result<(), StoreError> {
        let mut indexes = self.indexes.write();
        if indexes.iter().any(|n| n == name) {
            return Err(StoreError::InvalidArgument(format!(
                "index {name:?} already exists on {:?}",
                self.name
            )));
        }
        indexes.push(name.to_string());
        Ok(())
    }

    pub(crate) fn drop_all_indexes(&self) {
        self.indexes.write().clear();
    }

    /// Drops versions no retained view can observe. Keeps, per record, the
    /// newest version at or before `cutoff` as the base the oldest retained
    /// view reads; removes records whose only remaining version is a
    /// tombstone. Returns the number of versions dropped.
    pub(crate) fn retire_before(&self, cutoff: Timestamp) -> u64 {
        let mut records = self.records.write();
        let mut dropped = 0u64;

        records.retain(|_, chain| {
            if let Some(base) = chain.versions.iter().rposition(|v| v.ts <= cutoff) {
                dropped += base as u64;
                chain.versions.drain(..base);
            }
            !(chain.versions.len() == 1
                && chain.versions[0].doc.is_none()
                && chain.versions[0].ts <= cutoff)
        });

        dropped
    }

    /// Recomputes page size accounting from the retained versions.
    pub(crate) fn recompute_size(&self) {
        let records = self.records.read();
        let bytes: u64 = records
            .values()
            .flat_map(|chain| chain.versions.iter())
            .filter_map(|v| v.doc.as_ref())
            .map(doc_size)
            .sum();
        self.page.reset_size(bytes);
    }
}

/// Forward cursor over records visible at a fixed view.
///
/// Lazy and finite; restartable from the start only.
pub struct Cursor {
    container: Arc<Container>,
    view: Timestamp,
    next_id: RecordId,
}

impl Cursor {
    pub(crate) fn new(container: Arc<Container>, view: Timestamp) -> Self {
        Self {
            container,
            view,
            next_id: 0,
        }
    }

    /// Rewinds to the first record.
    pub fn restart(&mut self) {
        self.next_id = 0;
    }

    /// The view this cursor reads under.
    #[inline]
    pub fn view(&self) -> Timestamp {
        self.view
    }
}

impl Iterator for Cursor {
    type Item = (RecordId, Document);

    fn next(&mut self) -> Option<Self::Item> {
        let records = self.container.records.read();
        for (id, chain) in records.range(self.next_id..) {
            if let Some(doc) = chain.visible_at(self.view).and_then(|v| v.doc.clone()) {
                self.next_id = id + 1;
                return Some((*id, doc));
            }
        }
        self.next_id = RecordId::MAX;
        None
    }
}
