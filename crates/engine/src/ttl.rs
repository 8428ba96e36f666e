//! The TTL index (§3 ExpiringKeyRef, §4.3): a time-ordered auxiliary
//! sequence the background sweeper scans from the front, stopping at the
//! first still-live entry.
//!
//! §9's design notes suggest a min-heap or ordered tree keyed on expiry
//! time in place of "sort the whole vec after every write"; we take that
//! option directly; a `BTreeMap` keyed by `(expire_at, sequence)` gives
//! O(log n) insert/update/remove and an already-sorted forward scan, with
//! a side `HashMap` from `(database, key)` to the current sort key so a
//! key's existing entry can be found and replaced in place when its TTL is
//! reset, matching "on updating the TTL of a key that already has one,
//! mutate in place".

use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone)]
pub struct ExpiringKeyRef {
    pub database: String,
    pub key: Vec<u8>,
    /// Arena index of the trie leaf holding the item, so the sweeper can
    /// drop straight to deletion without a fresh descent.
    pub node: usize,
    pub expire_at: u64,
}

#[derive(Default)]
pub struct TtlIndex {
    by_expiry: BTreeMap<(u64, u64), ExpiringKeyRef>,
    lookup: HashMap<(String, Vec<u8>), (u64, u64)>,
    next_seq: u64,
}

impl TtlIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_expiry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_expiry.is_empty()
    }

    /// Appends a fresh entry, or mutates the existing one for `(database,
    /// key)` in place if present (§4.3 TTL index maintenance).
    pub fn set(&mut self, database: &str, key: &[u8], node: usize, expire_at: u64) {
        self.remove(database, key);
        let seq = self.next_seq;
        self.next_seq += 1;
        let sort_key = (expire_at, seq);
        self.lookup
            .insert((database.to_string(), key.to_vec()), sort_key);
        self.by_expiry.insert(
            sort_key,
            ExpiringKeyRef {
                database: database.to_string(),
                key: key.to_vec(),
                node,
                expire_at,
            },
        );
    }

    /// Removes the entry for `(database, key)` if one exists. Called on
    /// delete, on reset-without-TTL, and after expiry (§3 invariants:
    /// "deletion of either must remove the ref").
    pub fn remove(&mut self, database: &str, key: &[u8]) -> bool {
        let map_key = (database.to_string(), key.to_vec());
        if let Some(sort_key) = self.lookup.remove(&map_key) {
            self.by_expiry.remove(&sort_key);
            true
        } else {
            false
        }
    }

    /// Removes every entry belonging to `database` (used by `FLUSH`).
    pub fn remove_database(&mut self, database: &str) {
        let stale: Vec<(String, Vec<u8>)> = self
            .lookup
            .keys()
            .filter(|(db, _)| db == database)
            .cloned()
            .collect();
        for (db, key) in stale {
            self.remove(&db, &key);
        }
    }

    /// Pops every entry with `expire_at <= now` from the front of the
    /// sorted sequence, stopping at the first live entry (§4.3).
    pub fn drain_expired(&mut self, now: u64) -> Vec<ExpiringKeyRef> {
        let mut expired = Vec::new();
        loop {
            let Some((&sort_key, entry)) = self.by_expiry.iter().next() else {
                break;
            };
            if entry.expire_at > now {
                break;
            }
            let entry = self.by_expiry.remove(&sort_key).expect("just peeked");
            self.lookup
                .remove(&(entry.database.clone(), entry.key.clone()));
            expired.push(entry);
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn sweep_stops_at_first_live_entry() {
        let mut idx = TtlIndex::new();
        idx.set("db0", b"a", 1, 10);
        idx.set("db0", b"b", 2, 20);
        idx.set("db0", b"c", 3, 30);
        let expired = idx.drain_expired(25);
        let mut keys: Vec<_> = expired.iter().map(|e| e.key.clone()).collect();
        keys.sort();
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec()]);
        assert_eq!(idx.len(), 1);
    }

    #[test]
    fn resetting_ttl_mutates_in_place() {
        let mut idx = TtlIndex::new();
        idx.set("db0", b"k", 1, 10);
        idx.set("db0", b"k", 1, 999);
        assert_eq!(idx.len(), 1);
        let expired = idx.drain_expired(500);
        assert!(expired.is_empty());
    }

    #[test]
    fn remove_database_clears_only_that_database() {
        let mut idx = TtlIndex::new();
        idx.set("db0", b"a", 1, 10);
        idx.set("db1", b"b", 1, 10);
        idx.remove_database("db0");
        assert_eq!(idx.len(), 1);
    }
}
