//! Knowledge store: owns the persisted table
//!
//! The whole table lives as one JSON array under a single namespace key in a
//! [`ByteStore`]. Every operation is a read-modify-write performed inside one
//! mutex, so local writes and remote merges never lose each other's records.
//!
//! Invariants kept on every read:
//! - every seed id is present (missing seeds are re-added and persisted)
//! - the returned table is sorted by `created_at` descending (stable)
//!
//! Corrupt or unreadable blobs are treated as absent and re-initialised to the
//! seed set. None of the public operations return errors; byte-store write
//! failures are logged and the in-memory result is still returned.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};

use crate::bytestore::ByteStore;
use crate::ids::IdGenerator;
use crate::matcher;
use crate::models::{KnowledgeKind, KnowledgeRecord};
use crate::seed;

/// Capacity of the change-notification channel. Slow subscribers see `Lagged`.
const CHANGE_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeCause {
    /// Table (re)initialised or seed records restored on read.
    Bootstrap,
    Insert,
    Update,
    Reset,
    Merge,
}

/// "Table changed" notification carrying the full table after the change.
#[derive(Debug, Clone)]
pub struct TableChange {
    pub cause: ChangeCause,
    pub table: Vec<KnowledgeRecord>,
}

/// Result of offering a remote record to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeOutcome {
    Merged,
    DuplicateId,
    DuplicateContent,
    Rejected,
}

pub struct KnowledgeStore {
    bytes: Mutex<Box<dyn ByteStore>>,
    key: String,
    ids: Arc<dyn IdGenerator>,
    seed: Vec<KnowledgeRecord>,
    outbox: Option<mpsc::UnboundedSender<KnowledgeRecord>>,
    changes: broadcast::Sender<TableChange>,
}

impl std::fmt::Debug for KnowledgeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeStore")
            .field("key", &self.key)
            .field("seed", &self.seed.len())
            .field("outbox", &self.outbox.is_some())
            .finish_non_exhaustive()
    }
}

impl KnowledgeStore {
    pub fn new(
        bytes: Box<dyn ByteStore>,
        key: impl Into<String>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            bytes: Mutex::new(bytes),
            key: key.into(),
            ids,
            seed: seed::seed_records(),
            outbox: None,
            changes,
        }
    }

    /// Hand every locally inserted record to `outbox` (the replicator's
    /// outbound queue). Sending never blocks and never fails the insert.
    pub fn with_outbox(mut self, outbox: mpsc::UnboundedSender<KnowledgeRecord>) -> Self {
        self.outbox = Some(outbox);
        self
    }

    pub fn seed(&self) -> &[KnowledgeRecord] {
        &self.seed
    }

    pub fn namespace_key(&self) -> &str {
        &self.key
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TableChange> {
        self.changes.subscribe()
    }

    /// The injected id generator, shared with remote payload parsing.
    pub fn ids(&self) -> &dyn IdGenerator {
        self.ids.as_ref()
    }

    // ========================================================================
    // PUBLIC API
    // ========================================================================

    /// Full table, newest first. Restores missing seed records first.
    pub fn get_all(&self) -> Vec<KnowledgeRecord> {
        let bytes = self.lock();
        let (table, repaired) = self.read_table(&bytes);
        drop(bytes);

        if repaired {
            self.notify(ChangeCause::Bootstrap, &table);
        }
        table
    }

    /// Records whose pattern or response contains `text`, ignoring case.
    pub fn filter(&self, text: &str) -> Vec<KnowledgeRecord> {
        let needle = text.trim().to_lowercase();
        let table = self.get_all();
        if needle.is_empty() {
            return table;
        }
        table
            .into_iter()
            .filter(|r| {
                r.pattern.to_lowercase().contains(&needle)
                    || r.response.to_lowercase().contains(&needle)
            })
            .collect()
    }

    /// Normalized two-tier lookup against the current table.
    pub fn resolve(&self, query: &str) -> Option<KnowledgeRecord> {
        let table = self.get_all();
        matcher::resolve(query, &table).cloned()
    }

    /// Teach a new fact. Returns `None` (and stores nothing) when either field
    /// trims to empty.
    pub fn insert(
        &self,
        pattern: &str,
        response: &str,
        kind: KnowledgeKind,
    ) -> Option<KnowledgeRecord> {
        let pattern = pattern.trim();
        let response = response.trim();
        if pattern.is_empty() || response.is_empty() {
            tracing::debug!("Insert declined: empty pattern or response");
            return None;
        }

        let bytes = self.lock();
        let (mut table, _) = self.read_table(&bytes);

        // A merged peer record may already own the next generated id.
        let mut id = self.ids.next_id();
        while table.iter().any(|r| r.id == id) {
            id = self.ids.next_id();
        }

        let record = KnowledgeRecord {
            id,
            pattern: pattern.to_string(),
            response: response.to_string(),
            kind,
            created_at: Utc::now(),
        };
        table.insert(0, record.clone());
        self.persist(&bytes, &table);
        drop(bytes);

        tracing::info!(id = record.id, kind = %record.kind, pattern = %record.pattern, "Knowledge inserted");

        if let Some(outbox) = &self.outbox {
            if outbox.send(record.clone()).is_err() {
                tracing::debug!(id = record.id, "Replication outbox closed, record kept local");
            }
        }

        self.notify(ChangeCause::Insert, &table);
        Some(record)
    }

    /// Rewrite pattern and response of an existing record, keeping its id,
    /// kind and timestamp. Returns `false` when nothing was changed.
    pub fn update(&self, id: i64, pattern: &str, response: &str) -> bool {
        let pattern = pattern.trim();
        let response = response.trim();
        if pattern.is_empty() || response.is_empty() {
            tracing::debug!(id = id, "Update declined: empty pattern or response");
            return false;
        }

        let bytes = self.lock();
        let (mut table, _) = self.read_table(&bytes);
        let Some(row) = table.iter_mut().find(|r| r.id == id) else {
            tracing::debug!(id = id, "Update ignored: no such record");
            return false;
        };
        row.pattern = pattern.to_string();
        row.response = response.to_string();
        self.persist(&bytes, &table);
        drop(bytes);

        tracing::info!(id = id, "Knowledge updated");
        self.notify(ChangeCause::Update, &table);
        true
    }

    /// Overwrite the table with exactly the seed set.
    pub fn reset(&self) -> Vec<KnowledgeRecord> {
        let table = sorted(self.seed.clone());

        let bytes = self.lock();
        self.persist(&bytes, &self.seed);
        drop(bytes);

        tracing::info!(records = table.len(), "Knowledge table reset to seed set");
        self.notify(ChangeCause::Reset, &table);
        table
    }

    /// Merge a record that arrived from a peer. Skipped when the id is already
    /// known, or when a record with the same pattern (ignoring case) and the
    /// same response exists under another id.
    pub fn merge_remote(&self, record: KnowledgeRecord) -> MergeOutcome {
        if record.pattern.trim().is_empty() || record.response.trim().is_empty() {
            return MergeOutcome::Rejected;
        }

        let bytes = self.lock();
        let (mut table, _) = self.read_table(&bytes);

        if table.iter().any(|r| r.id == record.id) {
            tracing::debug!(id = record.id, "Remote record already present by id");
            return MergeOutcome::DuplicateId;
        }
        if table
            .iter()
            .any(|r| r.same_content(&record.pattern, &record.response))
        {
            tracing::debug!(id = record.id, pattern = %record.pattern, "Remote record already present by content");
            return MergeOutcome::DuplicateContent;
        }

        let id = record.id;
        let pattern = record.pattern.clone();
        table.push(record);
        table = sorted(table);
        self.persist(&bytes, &table);
        drop(bytes);

        tracing::info!(id = id, pattern = %pattern, "Merged remote knowledge");
        self.notify(ChangeCause::Merge, &table);
        MergeOutcome::Merged
    }

    // ========================================================================
    // Internals (caller holds the lock)
    // ========================================================================

    fn lock(&self) -> MutexGuard<'_, Box<dyn ByteStore>> {
        self.bytes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load, self-heal and sort. The flag is `true` when the blob was rewritten.
    fn read_table(&self, bytes: &MutexGuard<'_, Box<dyn ByteStore>>) -> (Vec<KnowledgeRecord>, bool) {
        let raw = match bytes.get(&self.key) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "Knowledge blob unreadable, reinitialising");
                None
            }
        };

        let Some(raw) = raw else {
            tracing::info!(key = %self.key, backend = bytes.name(), "Initialising knowledge table with seed set");
            self.persist(bytes, &self.seed);
            return (sorted(self.seed.clone()), true);
        };

        let mut table: Vec<KnowledgeRecord> = match serde_json::from_slice(&raw) {
            Ok(table) => table,
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "Knowledge blob corrupt, reinitialising");
                self.persist(bytes, &self.seed);
                return (sorted(self.seed.clone()), true);
            }
        };

        let present: HashSet<i64> = table.iter().map(|r| r.id).collect();
        let missing: Vec<KnowledgeRecord> = self
            .seed
            .iter()
            .filter(|s| !present.contains(&s.id))
            .cloned()
            .collect();

        let repaired = !missing.is_empty();
        if repaired {
            tracing::info!(restored = missing.len(), "Restoring missing seed records");
            table.extend(missing);
            self.persist(bytes, &table);
        }

        (sorted(table), repaired)
    }

    fn persist(&self, bytes: &MutexGuard<'_, Box<dyn ByteStore>>, table: &[KnowledgeRecord]) {
        let encoded = match serde_json::to_vec(table) {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode knowledge table");
                return;
            }
        };
        if let Err(e) = bytes.put(&self.key, &encoded) {
            tracing::warn!(key = %self.key, error = %e, "Failed to persist knowledge table");
        }
    }

    fn notify(&self, cause: ChangeCause, table: &[KnowledgeRecord]) {
        // No subscribers is fine.
        let _ = self.changes.send(TableChange {
            cause,
            table: table.to_vec(),
        });
    }
}

/// Stable sort, newest first.
fn sorted(mut table: Vec<KnowledgeRecord>) -> Vec<KnowledgeRecord> {
    table.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytestore::{FileByteStore, MemoryByteStore};
    use crate::ids::SequenceIdGenerator;
    use chrono::Duration;

    const KEY: &str = "sql_ai_local_v2";

    fn make_store() -> (KnowledgeStore, MemoryByteStore) {
        let bytes = MemoryByteStore::new();
        let store = KnowledgeStore::new(
            Box::new(bytes.clone()),
            KEY,
            Arc::new(SequenceIdGenerator::starting_at(1_000)),
        );
        (store, bytes)
    }

    fn remote(id: i64, pattern: &str, response: &str) -> KnowledgeRecord {
        KnowledgeRecord {
            id,
            pattern: pattern.to_string(),
            response: response.to_string(),
            kind: KnowledgeKind::General,
            created_at: Utc::now(),
        }
    }

    fn persisted(bytes: &MemoryByteStore) -> Vec<KnowledgeRecord> {
        serde_json::from_slice(&bytes.get(KEY).unwrap().unwrap()).unwrap()
    }

    fn assert_has_all_seeds(store: &KnowledgeStore, table: &[KnowledgeRecord]) {
        for seed in store.seed() {
            assert!(
                table.iter().any(|r| r.id == seed.id),
                "seed {} missing",
                seed.id
            );
        }
    }

    // ========================================================================
    // Bootstrap / seed irrecoverability
    // ========================================================================

    #[test]
    fn test_first_read_initialises_seed_set() {
        let (store, bytes) = make_store();
        let table = store.get_all();

        assert_eq!(table.len(), store.seed().len());
        assert_eq!(persisted(&bytes).len(), store.seed().len());
    }

    #[test]
    fn test_table_survives_reopening_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let files = FileByteStore::open(dir.path().to_str().unwrap()).unwrap();
        let store = KnowledgeStore::new(
            Box::new(files.clone()),
            KEY,
            Arc::new(SequenceIdGenerator::starting_at(1_000)),
        );
        let taught = store
            .insert("kalıcı mı", "evet", KnowledgeKind::General)
            .unwrap();
        assert!(store.update(taught.id, "kalıcı mı", "evet, diskte"));
        drop(store);

        let reopened = FileByteStore::open(files.root().to_str().unwrap()).unwrap();
        let store = KnowledgeStore::new(
            Box::new(reopened),
            KEY,
            Arc::new(SequenceIdGenerator::starting_at(2_000)),
        );
        let table = store.get_all();
        assert_eq!(table.len(), store.seed().len() + 1);
        assert_eq!(table[0].id, taught.id);
        assert_eq!(table[0].response, "evet, diskte");
    }

    #[test]
    fn test_missing_seed_is_restored_and_persisted() {
        let (store, bytes) = make_store();
        let mut partial = store.seed().to_vec();
        partial.retain(|r| r.id != 22);
        partial.push(remote(5_000, "öğrenilmiş", "bilgi"));
        bytes.put(KEY, &serde_json::to_vec(&partial).unwrap()).unwrap();

        let table = store.get_all();
        assert_has_all_seeds(&store, &table);
        assert!(table.iter().any(|r| r.id == 5_000));
        assert!(persisted(&bytes).iter().any(|r| r.id == 22));
    }

    #[test]
    fn test_seed_survives_blob_deletion_and_reset() {
        let (store, bytes) = make_store();
        store.insert("zebra nedir", "bir hayvan", KnowledgeKind::General);

        bytes.remove(KEY).unwrap();
        assert_has_all_seeds(&store, &store.get_all());

        store.insert("kedi", "miyav", KnowledgeKind::General);
        let after_reset = store.reset();
        assert_eq!(after_reset.len(), store.seed().len());
        assert_has_all_seeds(&store, &store.get_all());
        assert!(store.get_all().iter().all(|r| r.pattern != "kedi"));
    }

    #[test]
    fn test_corrupt_blob_self_heals() {
        let (store, bytes) = make_store();
        bytes.put(KEY, b"{not json").unwrap();

        let table = store.get_all();
        assert_eq!(table.len(), store.seed().len());
        assert_eq!(persisted(&bytes).len(), store.seed().len());
    }

    #[test]
    fn test_insert_on_corrupt_blob_succeeds() {
        let (store, bytes) = make_store();
        bytes.put(KEY, b"\x00\x01garbage").unwrap();

        let record = store.insert("a", "b", KnowledgeKind::General).unwrap();
        let table = persisted(&bytes);
        assert!(table.iter().any(|r| r.id == record.id));
        assert_eq!(table.len(), store.seed().len() + 1);
    }

    // ========================================================================
    // Insert / update / filter
    // ========================================================================

    #[test]
    fn test_insert_trims_and_round_trips() {
        let (store, _) = make_store();
        store.insert("Foo ", " Bar ", KnowledgeKind::General).unwrap();

        let hits: Vec<_> = store
            .get_all()
            .into_iter()
            .filter(|r| r.pattern == "Foo")
            .collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].response, "Bar");
        assert_eq!(hits[0].kind, KnowledgeKind::General);
    }

    #[test]
    fn test_insert_rejects_blank_fields() {
        let (store, bytes) = make_store();
        assert!(store.insert("   ", "x", KnowledgeKind::General).is_none());
        assert!(store.insert("x", "\t\n", KnowledgeKind::General).is_none());
        assert!(bytes.get(KEY).unwrap().is_none(), "nothing should be written");
    }

    #[test]
    fn test_rapid_inserts_get_distinct_ids() {
        let (store, _) = make_store();
        let a = store.insert("a", "1", KnowledgeKind::General).unwrap();
        let b = store.insert("b", "2", KnowledgeKind::General).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_insert_skips_ids_taken_by_merged_records() {
        let (store, _) = make_store();
        store.merge_remote(remote(1_000, "uzak", "kayıt"));

        let local = store.insert("yerel", "kayıt", KnowledgeKind::General).unwrap();
        assert_eq!(local.id, 1_001);
    }

    #[test]
    fn test_newest_insert_comes_first() {
        let (store, _) = make_store();
        store.insert("eski", "1", KnowledgeKind::General);
        store.insert("yeni", "2", KnowledgeKind::General);

        let table = store.get_all();
        assert_eq!(table[0].pattern, "yeni");
        assert_eq!(table[1].pattern, "eski");
    }

    #[test]
    fn test_update_rewrites_text_only() {
        let (store, _) = make_store();
        let original = store.insert("soru", "cevap", KnowledgeKind::Chat).unwrap();

        assert!(store.update(original.id, " yeni soru ", " yeni cevap "));
        let updated = store
            .get_all()
            .into_iter()
            .find(|r| r.id == original.id)
            .unwrap();
        assert_eq!(updated.pattern, "yeni soru");
        assert_eq!(updated.response, "yeni cevap");
        assert_eq!(updated.kind, KnowledgeKind::Chat);
        assert_eq!(updated.created_at, original.created_at);
    }

    #[test]
    fn test_update_unknown_id_is_noop() {
        let (store, bytes) = make_store();
        store.get_all();
        let before = bytes.get(KEY).unwrap();

        assert!(!store.update(424_242, "p", "r"));
        assert_eq!(bytes.get(KEY).unwrap(), before);
    }

    #[test]
    fn test_filter_matches_pattern_or_response() {
        let (store, _) = make_store();
        store.insert("zebra nedir", "Çizgili bir HAYVAN", KnowledgeKind::General);

        assert_eq!(store.filter("ZEBRA").len(), 1);
        assert_eq!(store.filter("hayvan").len(), 1);
        assert_eq!(store.filter("").len(), store.seed().len() + 1);
        assert!(store.filter("yokböyleşey").is_empty());
    }

    // ========================================================================
    // Merge
    // ========================================================================

    #[test]
    fn test_merge_is_idempotent() {
        let (store, _) = make_store();
        let record = remote(9_001, "uzaktan", "gelen");

        assert_eq!(store.merge_remote(record.clone()), MergeOutcome::Merged);
        let once = store.get_all();
        assert_eq!(store.merge_remote(record), MergeOutcome::DuplicateId);
        assert_eq!(store.get_all(), once);
    }

    #[test]
    fn test_merge_dedups_by_content_under_other_id() {
        let (store, _) = make_store();
        store.insert("Zebra Nedir", "bir hayvan", KnowledgeKind::General);

        let outcome = store.merge_remote(remote(77, "zebra nedir", "bir hayvan"));
        assert_eq!(outcome, MergeOutcome::DuplicateContent);

        // Different response is a different fact.
        let outcome = store.merge_remote(remote(78, "zebra nedir", "Bir hayvan"));
        assert_eq!(outcome, MergeOutcome::Merged);
    }

    #[test]
    fn test_merge_of_own_insert_is_noop() {
        let (store, _) = make_store();
        let mine = store.insert("benim", "kaydım", KnowledgeKind::General).unwrap();
        let len = store.get_all().len();

        assert_eq!(store.merge_remote(mine), MergeOutcome::DuplicateId);
        assert_eq!(store.get_all().len(), len);
    }

    #[test]
    fn test_merge_rejects_blank_payload() {
        let (store, _) = make_store();
        assert_eq!(store.merge_remote(remote(5, " ", "x")), MergeOutcome::Rejected);
    }

    #[test]
    fn test_merged_record_sorted_by_timestamp() {
        let (store, _) = make_store();
        let mut old = remote(300, "eski haber", "x");
        old.created_at = seed::seed_epoch() - Duration::days(1);
        store.merge_remote(old);

        let table = store.get_all();
        assert_eq!(table.last().unwrap().id, 300);
    }

    #[test]
    fn test_concurrent_insert_and_merge_both_survive() {
        let (store, bytes) = make_store();
        let store = Arc::new(store);

        let local = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for i in 0..50 {
                    store.insert(&format!("yerel {i}"), "a", KnowledgeKind::General);
                }
            })
        };
        let peer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for i in 0..50 {
                    store.merge_remote(remote(100_000 + i, &format!("uzak {i}"), "b"));
                }
            })
        };
        local.join().unwrap();
        peer.join().unwrap();

        let table = persisted(&bytes);
        assert_eq!(table.len(), store.seed().len() + 100);
    }

    // ========================================================================
    // Notifications and outbox
    // ========================================================================

    #[test]
    fn test_changes_are_broadcast() {
        let (store, _) = make_store();
        store.get_all();
        let mut rx = store.subscribe();

        store.insert("p", "r", KnowledgeKind::General);
        store.merge_remote(remote(50_000, "q", "s"));
        store.reset();

        let causes: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|c| c.cause)
            .collect();
        assert_eq!(
            causes,
            vec![ChangeCause::Insert, ChangeCause::Merge, ChangeCause::Reset]
        );
    }

    #[test]
    fn test_insert_feeds_outbox_but_merge_does_not() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let store = KnowledgeStore::new(
            Box::new(MemoryByteStore::new()),
            KEY,
            Arc::new(SequenceIdGenerator::starting_at(1_000)),
        )
        .with_outbox(tx);

        let record = store.insert("yayınla", "bunu", KnowledgeKind::General).unwrap();
        store.merge_remote(remote(60_000, "yayınlama", "bunu"));

        assert_eq!(rx.try_recv().unwrap().id, record.id);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_insert_succeeds_with_dropped_outbox() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let store = KnowledgeStore::new(
            Box::new(MemoryByteStore::new()),
            KEY,
            Arc::new(SequenceIdGenerator::starting_at(1_000)),
        )
        .with_outbox(tx);

        assert!(store.insert("p", "r", KnowledgeKind::General).is_some());
    }
}
