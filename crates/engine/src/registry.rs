//! The database registry (§4.2) plus the TTL-aware operations that sit on
//! top of the raw trie (§4.3): lazy expiry on read, and the background
//! sweep. Everything here is meant to run behind the single writer lock
//! (§5) -- nothing in this module does its own locking.

use std::collections::HashMap;

use tracing::trace;

use crate::database::Database;
use crate::item::{now_epoch_secs, NO_TTL};
use crate::ttl::TtlIndex;

pub const DEFAULT_DATABASE: &str = "db0";

/// A snapshot of an item's fields, detached from the trie so callers don't
/// have to hold a borrow across further mutation (e.g. lazy eviction).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemView {
    pub data: Vec<u8>,
    pub ttl_seconds: i32,
    pub ctime: u64,
    pub latime: u64,
}

pub struct Registry {
    databases: HashMap<String, Database>,
    ttl_index: TtlIndex,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        let mut databases = HashMap::new();
        databases.insert(DEFAULT_DATABASE.to_string(), Database::new(DEFAULT_DATABASE));
        Self {
            databases,
            ttl_index: TtlIndex::new(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.databases.contains_key(name)
    }

    /// `USE <name>` on an unknown name creates it (§4.2).
    pub fn get_or_create(&mut self, name: &str) -> &mut Database {
        self.databases
            .entry(name.to_string())
            .or_insert_with(|| Database::new(name))
    }

    pub fn get(&self, name: &str) -> Option<&Database> {
        self.databases.get(name)
    }

    pub fn database_names(&self) -> impl Iterator<Item = &str> {
        self.databases.keys().map(|s| s.as_str())
    }

    pub fn total_keys(&self) -> u64 {
        self.databases.values().map(|db| db.size()).sum()
    }

    /// Empties the trie in place, preserving the `Database` entry and
    /// dropping any TTL entries that pointed into it (§4.2, §4.5 FLUSH).
    pub fn flush(&mut self, name: &str) {
        if let Some(db) = self.databases.get_mut(name) {
            db.trie.clear();
        }
        self.ttl_index.remove_database(name);
    }

    fn item_view(item: &crate::item::Item) -> ItemView {
        ItemView {
            data: item.data.clone(),
            ttl_seconds: item.ttl_seconds,
            ctime: item.ctime,
            latime: item.latime,
        }
    }

    /// Lazily expires the item at `node` in `db` if it is due, removing it
    /// from both the trie and the TTL index (§4.3 "Lazy check").
    fn lazy_evict_if_expired(&mut self, db: &str, key: &[u8], node: usize, now: u64) -> bool {
        let Some(database) = self.databases.get_mut(db) else {
            return false;
        };
        let expired = match database.trie.item_at(node) {
            Some(item) => item.is_expired(now),
            None => false,
        };
        if expired {
            trace!(db, key = %String::from_utf8_lossy(key), "lazy ttl eviction");
            database.trie.evict_node(node);
            self.ttl_index.remove(db, key);
        }
        expired
    }

    /// Point `GET` with lazy expiry (§4.5).
    pub fn point_get(&mut self, db: &str, key: &[u8], now: u64) -> Option<ItemView> {
        let node = self.databases.get(db)?.trie.find_node(key)?;
        if self.lazy_evict_if_expired(db, key, node, now) {
            return None;
        }
        self.databases
            .get(db)
            .and_then(|d| d.trie.item_at(node))
            .map(Self::item_view)
    }

    /// Point `PUT`: always an `insert`, which unconditionally resets TTL to
    /// `NO_TTL` (§4.1 insert contract) -- so any existing TTL index entry
    /// for this key must be dropped too.
    pub fn point_put(&mut self, db: &str, key: &[u8], data: Vec<u8>, now: u64) {
        let database = self.get_or_create(db);
        database.trie.insert(key, data, now);
        self.ttl_index.remove(db, key);
    }

    /// Point `DEL`.
    pub fn point_delete(&mut self, db: &str, key: &[u8]) -> bool {
        let Some(database) = self.databases.get_mut(db) else {
            return false;
        };
        let deleted = database.trie.delete(key);
        if deleted {
            self.ttl_index.remove(db, key);
        }
        deleted
    }

    /// `TTL` opcode: set or clear a key's TTL. `NO_TTL` clears it. Returns
    /// `false` if the key is absent or already expired (§4.5).
    pub fn point_set_ttl(&mut self, db: &str, key: &[u8], ttl_seconds: i32, now: u64) -> bool {
        let Some(node) = self.databases.get(db).and_then(|d| d.trie.find_node(key)) else {
            return false;
        };
        if self.lazy_evict_if_expired(db, key, node, now) {
            return false;
        }
        let Some(database) = self.databases.get_mut(db) else {
            return false;
        };
        let Some(item) = database.trie.item_at_mut(node) else {
            return false;
        };
        item.ttl_seconds = ttl_seconds;
        item.ctime = now;
        item.latime = now;
        if ttl_seconds == NO_TTL {
            self.ttl_index.remove(db, key);
        } else {
            self.ttl_index.set(db, key, node, now.saturating_add(ttl_seconds.max(0) as u64));
        }
        true
    }

    /// Point `INC`/`DEC`. Returns `false` if the key is absent, expired, or
    /// non-integer (§4.5).
    pub fn point_int_mod(&mut self, db: &str, key: &[u8], delta: i64, now: u64) -> bool {
        let Some(node) = self.databases.get(db).and_then(|d| d.trie.find_node(key)) else {
            return false;
        };
        if self.lazy_evict_if_expired(db, key, node, now) {
            return false;
        }
        let Some(database) = self.databases.get_mut(db) else {
            return false;
        };
        let Some(item) = database.trie.item_at_mut(node) else {
            return false;
        };
        let Ok(text) = std::str::from_utf8(&item.data) else {
            return false;
        };
        let Ok(n) = text.trim().parse::<i64>() else {
            return false;
        };
        item.data = (n + delta).to_string().into_bytes();
        item.latime = now;
        true
    }

    pub fn prefix_count(&self, db: &str, prefix: &[u8]) -> u64 {
        self.databases
            .get(db)
            .map(|d| d.trie.prefix_count(prefix))
            .unwrap_or(0)
    }

    pub fn prefix_delete(&mut self, db: &str, prefix: &[u8]) -> u64 {
        let Some(database) = self.databases.get_mut(db) else {
            return 0;
        };
        let removed: Vec<(Vec<u8>, usize)> = database.trie.prefix_enumerate(prefix);
        let count = database.trie.prefix_delete(prefix);
        for (key, _) in removed {
            self.ttl_index.remove(db, &key);
        }
        count
    }

    pub fn prefix_set(&mut self, db: &str, prefix: &[u8], data: &[u8], ttl: i32, now: u64) {
        let Some(database) = self.databases.get_mut(db) else {
            return;
        };
        let touched = database.trie.prefix_enumerate(prefix);
        database.trie.prefix_set(prefix, data, ttl, now);
        for (key, node) in touched {
            if ttl == NO_TTL {
                self.ttl_index.remove(db, &key);
            } else {
                self.ttl_index
                    .set(db, &key, node, now.saturating_add(ttl.max(0) as u64));
            }
        }
    }

    pub fn prefix_int_mod(&mut self, db: &str, prefix: &[u8], delta: i64, now: u64) {
        if let Some(database) = self.databases.get_mut(db) {
            database.trie.prefix_int_mod(prefix, delta, now);
        }
    }

    /// Prefix `GET`/`KEYS`: enumerate, then apply lazy expiry per key,
    /// collecting removals rather than mutating mid-walk (§9: "a safe
    /// implementation collects removals and applies them after the scan").
    pub fn prefix_get(&mut self, db: &str, prefix: &[u8], now: u64) -> Vec<(Vec<u8>, ItemView)> {
        let Some(database) = self.databases.get(db) else {
            return Vec::new();
        };
        let candidates = database.trie.prefix_enumerate(prefix);
        let mut live = Vec::with_capacity(candidates.len());
        let mut expired = Vec::new();
        for (key, node) in candidates {
            match database.trie.item_at(node) {
                Some(item) if item.is_expired(now) => expired.push((key, node)),
                Some(item) => live.push((key, Self::item_view(item))),
                None => {}
            }
        }
        if let Some(database) = self.databases.get_mut(db) {
            for (key, node) in &expired {
                database.trie.evict_node(*node);
                self.ttl_index.remove(db, key);
            }
        }
        live
    }

    /// The background sweep (§4.3): drains every due entry from the TTL
    /// index and deletes the corresponding key from its database's trie.
    pub fn sweep(&mut self, now: u64) -> usize {
        let expired = self.ttl_index.drain_expired(now);
        let count = expired.len();
        for entry in expired {
            trace!(db = %entry.database, key = %String::from_utf8_lossy(&entry.key), "ttl sweep eviction");
            if let Some(database) = self.databases.get_mut(&entry.database) {
                database.trie.evict_node(entry.node);
            }
        }
        count
    }

    pub fn sweep_now(&mut self) -> usize {
        self.sweep(now_epoch_secs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn use_on_unknown_name_creates_database() {
        let mut reg = Registry::new();
        assert!(!reg.contains("mydb"));
        reg.get_or_create("mydb");
        assert!(reg.contains("mydb"));
    }

    #[test]
    fn ttl_monotone_expiry() {
        let mut reg = Registry::new();
        let now = 1_000;
        reg.point_put("db0", b"k", b"v".to_vec(), now);
        reg.point_set_ttl("db0", b"k", 1, now);
        assert!(reg.point_get("db0", b"k", now).is_some());
        assert!(reg.point_get("db0", b"k", now + 2).is_none());
        assert_eq!(reg.prefix_count("db0", b""), 0);
    }

    /// A key that has lived longer than a freshly prefix-set TTL must not
    /// read as already-expired: the lazy path and the TTL index must agree
    /// on the same `ctime` (§3 "ctime ... last (re)set").
    #[test]
    fn prefix_set_with_ttl_does_not_expire_immediately() {
        let mut reg = Registry::new();
        reg.point_put("db0", b"key", b"old".to_vec(), 0);
        reg.prefix_set("db0", b"key", b"new", 100, 1_000);
        assert!(reg.point_get("db0", b"key", 1_050).is_some());
        assert_eq!(reg.prefix_count("db0", b""), 1);
        let swept = reg.sweep(1_050);
        assert_eq!(swept, 0);
    }

    #[test]
    fn sweep_removes_expired_without_access() {
        let mut reg = Registry::new();
        let now = 1_000;
        reg.point_put("db0", b"k", b"v".to_vec(), now);
        reg.point_set_ttl("db0", b"k", 1, now);
        let swept = reg.sweep(now + 5);
        assert_eq!(swept, 1);
        assert_eq!(reg.prefix_count("db0", b""), 0);
    }

    #[test]
    fn put_clears_existing_ttl() {
        let mut reg = Registry::new();
        let now = 1_000;
        reg.point_put("db0", b"k", b"v".to_vec(), now);
        reg.point_set_ttl("db0", b"k", 1, now);
        reg.point_put("db0", b"k", b"v2".to_vec(), now);
        // No longer due to expire, because the TTL was cleared on re-insert.
        assert!(reg.point_get("db0", b"k", now + 5).is_some());
    }

    #[test]
    fn flush_preserves_database_entry() {
        let mut reg = Registry::new();
        reg.point_put("db0", b"k", b"v".to_vec(), 0);
        reg.flush("db0");
        assert!(reg.contains("db0"));
        assert_eq!(reg.prefix_count("db0", b""), 0);
    }
}
