// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Operation records consumed by the batch applier.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::Timestamp;
use crate::store::Document;

use super::error::ApplyError;

/// Kind of mutation an operation record carries.
///
/// The single-letter wire names are the operation log's encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpKind {
    #[serde(rename = "i")]
    Insert,
    #[serde(rename = "u")]
    Update,
    #[serde(rename = "d")]
    Delete,
    /// Commands affect no container; they are consumed but apply nothing.
    #[serde(rename = "c")]
    Command,
}

/// One timestamped operation from an external operation log.
///
/// Immutable once created; consumed exactly once by application to the
/// store. The `ts` field is the mutation's visibility point. Wire field
/// names follow the log's compact encoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRecord {
    pub ts: Timestamp,
    #[serde(rename = "t")]
    pub term: i64,
    #[serde(rename = "h")]
    pub op_hash: i64,
    #[serde(rename = "v")]
    pub schema_version: i32,
    #[serde(rename = "op")]
    pub kind: OpKind,
    #[serde(rename = "ns")]
    pub namespace: String,
    #[serde(rename = "ui", default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<Uuid>,
    #[serde(rename = "o")]
    pub payload: Document,
}

/// N logical operations of the same kind encoded compactly: `ts`, `term`,
/// and `payload` are parallel arrays of equal length.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupedRecord {
    pub ts: Vec<Timestamp>,
    #[serde(rename = "t")]
    pub term: Vec<i64>,
    #[serde(rename = "h")]
    pub op_hash: i64,
    #[serde(rename = "v")]
    pub schema_version: i32,
    #[serde(rename = "op")]
    pub kind: OpKind,
    #[serde(rename = "ns")]
    pub namespace: String,
    #[serde(rename = "ui", default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<Uuid>,
    #[serde(rename = "o")]
    pub payload: Vec<Document>,
}

impl GroupedRecord {
    /// Expands the compact form into its individual stamped records.
    pub fn expand(self) -> Result<Vec<OperationRecord>, ApplyError> {
        let n = self.ts.len();
        if n == 0 {
            return Err(ApplyError::MalformedGroup(
                "grouped record is empty".to_string(),
            ));
        }
        if self.term.len() != n || self.payload.len() != n {
            return Err(ApplyError::MalformedGroup(format!(
                "parallel arrays disagree: {} timestamps, {} terms, {} payloads",
                n,
                self.term.len(),
                self.payload.len()
            )));
        }

        Ok(self
            .ts
            .into_iter()
            .zip(self.term)
            .zip(self.payload)
            .map(|((ts, term), payload)| OperationRecord {
                ts,
                term,
                op_hash: self.op_hash,
                schema_version: self.schema_version,
                kind: self.kind,
                namespace: self.namespace.clone(),
                container_id: self.container_id,
                payload,
            })
            .collect())
    }
}

/// A batch entry: either a single record or a grouped encoding.
///
/// The applier treats both identically, expanding grouped entries before
/// application.
#[derive(Debug, Clone)]
pub enum BatchEntry {
    Single(OperationRecord),
    Grouped(GroupedRecord),
}

impl BatchEntry {
    pub(crate) fn expand(self) -> Result<Vec<OperationRecord>, ApplyError> {
        match self {
            BatchEntry::Single(record) => Ok(vec![record]),
            BatchEntry::Grouped(grouped) => grouped.expand(),
        }
    }
}

impl From<OperationRecord> for BatchEntry {
    fn from(record: OperationRecord) -> Self {
        BatchEntry::Single(record)
    }
}

impl From<GroupedRecord> for BatchEntry {
    fn from(grouped: GroupedRecord) -> Self {
        BatchEntry::Grouped(grouped)
    }
}
