//! Client-side entity stores.
//!
//! A [`Collection`] holds the last known server state for one entity type
//! plus any unconfirmed optimistic edits. A full reload replaces the whole
//! collection; unsaved local edits are discarded by design (the server wins
//! on reload). A collection never holds two records with one key.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::model::{
    AgendaItem, AttendanceEntry, ClassConfig, GradeRecord, Guest, Holiday, InventoryItem,
    JournalEntry, LiaisonLog, PermissionRequest, Student,
};

/// Identity of a record inside a collection.
pub trait Keyed {
    fn key(&self) -> String;

    /// Re-key after the server issues the authoritative identifier for a
    /// created record. Records with composite identity ignore this.
    fn set_key(&mut self, _key: &str) {}
}

#[derive(Debug, Clone)]
pub struct Collection<T> {
    items: Vec<T>,
    seq: SeqRegistry,
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Collection {
            items: Vec::new(),
            seq: SeqRegistry::default(),
        }
    }
}

impl<T: Keyed + Clone> Collection<T> {
    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.items.iter().find(|i| i.key() == key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Full reload: the collection becomes exactly the server response.
    /// Duplicate keys in the response fold to the last occurrence so the
    /// uniqueness invariant holds even over dirty server data.
    pub fn replace_all(&mut self, items: Vec<T>) {
        self.items.clear();
        for item in items {
            self.upsert(item);
        }
    }

    /// Insert or replace-by-key, preserving position on replace.
    pub fn upsert(&mut self, item: T) {
        let key = item.key();
        match self.items.iter_mut().find(|i| i.key() == key) {
            Some(slot) => *slot = item,
            None => self.items.push(item),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<T> {
        let idx = self.items.iter().position(|i| i.key() == key)?;
        Some(self.items.remove(idx))
    }

    pub fn sort_by(&mut self, cmp: fn(&T, &T) -> Ordering) {
        self.items.sort_by(cmp);
    }

    /// Pre-mutation snapshot for rollback.
    pub fn snapshot(&self) -> Vec<T> {
        self.items.clone()
    }

    /// Restore a snapshot exactly. Sequence tracking is deliberately left
    /// untouched: a rollback does not un-issue mutation sequence numbers.
    pub fn restore(&mut self, snapshot: Vec<T>) {
        self.items = snapshot;
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.seq.clear();
    }

    /// Issue the next mutation sequence number for a record key.
    pub fn next_seq(&mut self, key: &str) -> u64 {
        self.seq.next(key)
    }

    /// A completion is current only while no newer mutation has been issued
    /// for the same record; stale completions must be discarded.
    pub fn seq_is_current(&self, key: &str, seq: u64) -> bool {
        self.seq.is_current(key, seq)
    }
}

/// Per-record monotonic mutation counter, used to discard out-of-order or
/// replayed completions.
#[derive(Debug, Clone, Default)]
pub struct SeqRegistry {
    latest: HashMap<String, u64>,
}

impl SeqRegistry {
    pub fn next(&mut self, key: &str) -> u64 {
        let slot = self.latest.entry(key.to_string()).or_insert(0);
        *slot += 1;
        *slot
    }

    pub fn is_current(&self, key: &str, seq: u64) -> bool {
        self.latest.get(key).copied() == Some(seq)
    }

    pub fn clear(&mut self) {
        self.latest.clear();
    }
}

/// Everything the sidecar holds for the active session.
#[derive(Debug, Default)]
pub struct Dataset {
    pub students: Collection<Student>,
    pub grades: Collection<GradeRecord>,
    pub attendance: Collection<AttendanceEntry>,
    pub inventory: Collection<InventoryItem>,
    pub guests: Collection<Guest>,
    pub journal: Collection<JournalEntry>,
    pub liaison: Collection<LiaisonLog>,
    pub permissions: Collection<PermissionRequest>,
    pub agendas: Collection<AgendaItem>,
    pub holidays: Collection<Holiday>,
    /// Singleton per-class document, not a collection.
    pub class_config: Option<ClassConfig>,
}

impl Dataset {
    pub fn clear(&mut self) {
        self.students.clear();
        self.grades.clear();
        self.attendance.clear();
        self.inventory.clear();
        self.guests.clear();
        self.journal.clear();
        self.liaison.clear();
        self.permissions.clear();
        self.agendas.clear();
        self.holidays.clear();
        self.class_config = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::InventoryItem;

    fn item(id: &str, name: &str) -> InventoryItem {
        InventoryItem {
            id: id.to_string(),
            class_id: "c1".to_string(),
            name: name.to_string(),
            condition: "Baik".to_string(),
            qty: 1,
        }
    }

    #[test]
    fn upsert_never_duplicates_keys() {
        let mut col: Collection<InventoryItem> = Collection::default();
        col.upsert(item("a", "Spidol"));
        col.upsert(item("b", "Penghapus"));
        col.upsert(item("a", "Spidol Baru"));
        assert_eq!(col.len(), 2);
        assert_eq!(col.get("a").map(|i| i.name.as_str()), Some("Spidol Baru"));
        // Position preserved on replace.
        assert_eq!(col.items()[0].id, "a");
    }

    #[test]
    fn replace_all_folds_duplicate_server_rows() {
        let mut col: Collection<InventoryItem> = Collection::default();
        col.replace_all(vec![item("a", "x"), item("a", "y"), item("b", "z")]);
        assert_eq!(col.len(), 2);
        assert_eq!(col.get("a").map(|i| i.name.as_str()), Some("y"));
    }

    #[test]
    fn snapshot_restore_round_trips_exactly() {
        let mut col: Collection<InventoryItem> = Collection::default();
        col.upsert(item("a", "Spidol"));
        col.upsert(item("b", "Penghapus"));
        let snap = col.snapshot();
        col.upsert(item("c", "Kursi"));
        col.remove("a");
        col.restore(snap);
        assert_eq!(col.len(), 2);
        assert_eq!(col.items()[0].name, "Spidol");
        assert_eq!(col.items()[1].name, "Penghapus");
    }

    #[test]
    fn seq_numbers_are_monotonic_per_key() {
        let mut col: Collection<InventoryItem> = Collection::default();
        let s1 = col.next_seq("a");
        let s2 = col.next_seq("a");
        let other = col.next_seq("b");
        assert_eq!((s1, s2, other), (1, 2, 1));
        assert!(!col.seq_is_current("a", s1));
        assert!(col.seq_is_current("a", s2));
        assert!(col.seq_is_current("b", other));
    }

    #[test]
    fn clear_resets_items_and_sequences() {
        let mut col: Collection<InventoryItem> = Collection::default();
        col.upsert(item("a", "Spidol"));
        col.next_seq("a");
        col.clear();
        assert!(col.is_empty());
        // Counter restarts after clear (new session, new lineage).
        assert_eq!(col.next_seq("a"), 1);
    }
}
