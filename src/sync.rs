//! The optimistic mutation engine.
//!
//! Every entity save follows one flow: decide create-vs-update by id
//! presence, snapshot the collection, apply the edit locally, issue the
//! gateway call, then reconcile. Success leaves the optimistic state in
//! place (re-keyed to the server-issued id for creates); failure restores
//! the snapshot. A per-record sequence number guards reconciliation: if a
//! newer mutation was issued for the same record while this one was in
//! flight, the completion is stale and must not commit or roll back state
//! that now belongs to the newer edit.
//!
//! Deletes are deliberately not optimistic: the gateway call comes first
//! and the local record is only removed once it succeeds.

use std::cmp::Ordering;

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::gateway::{Envelope, GatewayError};
use crate::store::{Collection, Keyed};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationMode {
    Created,
    Updated,
}

/// What a completed save did. `stale: true` means the completion was
/// discarded because a newer mutation superseded it; the collection was
/// left for that newer edit to reconcile.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationOutcome {
    pub mode: MutationMode,
    /// Final record key, after any server re-keying.
    pub id: String,
    pub stale: bool,
}

/// An applied-but-unconfirmed edit, held across the gateway call.
pub struct PendingSave<T> {
    /// The record as inserted locally. For creates this carries the locally
    /// issued id and is what the gateway payload should be built from.
    pub record: T,
    key: String,
    seq: u64,
    mode: MutationMode,
    snapshot: Vec<T>,
    order: Option<fn(&T, &T) -> Ordering>,
}

impl<T> PendingSave<T> {
    pub fn mode(&self) -> MutationMode {
        self.mode
    }
}

/// Snapshot, then apply the edit in memory. A record arriving without an id
/// is a create and gets a locally issued one; the server's answer may
/// re-key it in [`complete_save`]. Collections with a display order re-sort
/// after insert rather than trusting arrival order.
pub fn begin_save<T: Keyed + Clone>(
    collection: &mut Collection<T>,
    mut record: T,
    order: Option<fn(&T, &T) -> Ordering>,
) -> PendingSave<T> {
    let mode = if record.key().is_empty() {
        record.set_key(&Uuid::new_v4().to_string());
        MutationMode::Created
    } else {
        MutationMode::Updated
    };
    let key = record.key();
    let seq = collection.next_seq(&key);
    let snapshot = collection.snapshot();

    collection.upsert(record.clone());
    if let Some(cmp) = order {
        collection.sort_by(cmp);
    }

    PendingSave {
        record,
        key,
        seq,
        mode,
        snapshot,
        order,
    }
}

/// Reconcile a gateway completion against the collection.
///
/// Stale completions (a newer mutation was issued for the record since the
/// snapshot) never touch collection contents: a stale success reports
/// `stale: true` instead of committing, and a stale failure returns the
/// error without rolling back.
pub fn complete_save<T: Keyed + Clone>(
    collection: &mut Collection<T>,
    pending: PendingSave<T>,
    result: Result<Envelope, GatewayError>,
) -> Result<MutationOutcome, GatewayError> {
    let current = collection.seq_is_current(&pending.key, pending.seq);
    match result {
        Ok(envelope) => {
            if !current {
                debug!(key = %pending.key, "discarding stale save completion");
                return Ok(MutationOutcome {
                    mode: pending.mode,
                    id: pending.key,
                    stale: true,
                });
            }
            let id = reconcile_id(collection, &pending, envelope.id.as_deref());
            Ok(MutationOutcome {
                mode: pending.mode,
                id,
                stale: false,
            })
        }
        Err(err) => {
            if current {
                collection.restore(pending.snapshot);
            } else {
                debug!(key = %pending.key, "stale save failed; leaving newer state in place");
            }
            Err(err)
        }
    }
}

/// Adopt the server-issued id for a created record. Replacing by key keeps
/// the uniqueness invariant even if the server hands back an id that is
/// already present.
fn reconcile_id<T: Keyed + Clone>(
    collection: &mut Collection<T>,
    pending: &PendingSave<T>,
    server_id: Option<&str>,
) -> String {
    let server_id = match server_id {
        Some(id) if pending.mode == MutationMode::Created && !id.is_empty() && id != pending.key => {
            id
        }
        _ => return pending.key.clone(),
    };
    if let Some(mut record) = collection.remove(&pending.key) {
        record.set_key(server_id);
        collection.upsert(record);
        if let Some(cmp) = pending.order {
            collection.sort_by(cmp);
        }
    }
    server_id.to_string()
}

/// Per-row result of a batch operation. Batches are sequential and not
/// atomic; the report says exactly which rows landed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowResult {
    pub index: usize,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<MutationMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub total: usize,
    pub created: usize,
    pub updated: usize,
    pub failed: usize,
    pub rows: Vec<RowResult>,
}

impl BatchReport {
    pub fn record_success(&mut self, index: usize, outcome: &MutationOutcome) {
        self.total += 1;
        match outcome.mode {
            MutationMode::Created => self.created += 1,
            MutationMode::Updated => self.updated += 1,
        }
        self.rows.push(RowResult {
            index,
            ok: true,
            mode: Some(outcome.mode),
            id: Some(outcome.id.clone()),
            code: None,
            message: None,
        });
    }

    pub fn record_failure(&mut self, index: usize, err: &GatewayError) {
        self.record_rejected(index, err.code(), err.to_string());
    }

    /// A row refused before any gateway call was issued (validation, lookup
    /// misses). Counts as failed like any other row.
    pub fn record_rejected(&mut self, index: usize, code: &'static str, message: impl Into<String>) {
        self.total += 1;
        self.failed += 1;
        self.rows.push(RowResult {
            index,
            ok: false,
            mode: None,
            id: None,
            code: Some(code),
            message: Some(message.into()),
        });
    }
}
