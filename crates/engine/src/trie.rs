//! The character-indexed trie (§4.1): an arena of nodes addressed by stable
//! `slab` indices rather than raw pointers, so a TTL index entry can hold a
//! `(key, node index)` pair that never dangles even as sibling vectors grow
//! and shrink (§9 design notes: "use an arena ... have TTL entries carry
//! `(db_id, node_index)` rather than raw pointers").

use slab::Slab;

use crate::item::Item;

const ROOT: usize = 0;

/// One sorted sibling edge: `chr` is the byte consumed to reach `node`.
#[derive(Debug, Clone, Copy)]
struct ChildEdge {
    chr: u8,
    node: usize,
}

#[derive(Debug)]
struct TrieNode {
    /// `children` is always sorted ascending by `chr` with no duplicates
    /// (§3 invariants) -- this is what lets every search short-circuit as
    /// soon as it passes the needed byte.
    children: Vec<ChildEdge>,
    item: Option<Item>,
    parent: Option<usize>,
    /// The byte that led to this node from its parent; unused on the root.
    chr: u8,
}

impl TrieNode {
    fn new(chr: u8, parent: Option<usize>) -> Self {
        Self {
            children: Vec::new(),
            item: None,
            parent,
            chr,
        }
    }

    /// Position of `chr` in the sorted sibling list, or the `Err` insertion
    /// point. Linear but short-circuited: stops as soon as a sibling's
    /// `chr` exceeds the needle, matching §4.1's complexity target.
    fn find_child(&self, chr: u8) -> Result<usize, usize> {
        for (i, edge) in self.children.iter().enumerate() {
            if edge.chr == chr {
                return Ok(i);
            }
            if edge.chr > chr {
                return Err(i);
            }
        }
        Err(self.children.len())
    }
}

/// The trie for a single database (§3 Database.root). Owns every node in an
/// arena; `item_count` is `database_size(db)` (§3 invariants).
pub struct Trie {
    nodes: Slab<TrieNode>,
    item_count: usize,
}

impl Default for Trie {
    fn default() -> Self {
        Self::new()
    }
}

impl Trie {
    pub fn new() -> Self {
        let mut nodes = Slab::new();
        let root_key = nodes.insert(TrieNode::new(0, None));
        debug_assert_eq!(root_key, ROOT);
        Self {
            nodes,
            item_count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.item_count
    }

    pub fn is_empty(&self) -> bool {
        self.item_count == 0
    }

    /// Resets the trie to empty while keeping the owning `Database` alive,
    /// as `flush` requires (§4.2).
    pub fn clear(&mut self) {
        self.nodes.clear();
        let root_key = self.nodes.insert(TrieNode::new(0, None));
        debug_assert_eq!(root_key, ROOT);
        self.item_count = 0;
    }

    fn descend(&self, key: &[u8]) -> Option<usize> {
        let mut cursor = ROOT;
        for &b in key {
            let node = &self.nodes[cursor];
            let idx = node.find_child(b).ok()?;
            cursor = node.children[idx].node;
        }
        Some(cursor)
    }

    fn descend_or_create(&mut self, key: &[u8]) -> usize {
        let mut cursor = ROOT;
        for &b in key {
            let pos = self.nodes[cursor].find_child(b);
            cursor = match pos {
                Ok(i) => self.nodes[cursor].children[i].node,
                Err(i) => {
                    let child = self.nodes.insert(TrieNode::new(b, Some(cursor)));
                    self.nodes[cursor].children.insert(i, ChildEdge { chr: b, node: child });
                    child
                }
            };
        }
        cursor
    }

    /// `insert(db, key, value) -> Item&` (§4.1). Returns the arena index of
    /// the terminal node so callers (the TTL index) can address the item
    /// directly without re-descending.
    pub fn insert(&mut self, key: &[u8], data: Vec<u8>, now: u64) -> usize {
        let node = self.descend_or_create(key);
        match &mut self.nodes[node].item {
            Some(item) => {
                item.data = data;
                item.ctime = now;
                item.latime = now;
                item.ttl_seconds = crate::item::NO_TTL;
            }
            slot @ None => {
                *slot = Some(Item::new(data, now));
                self.item_count += 1;
            }
        }
        node
    }

    /// `find(db, key) -> Item?` (§4.1). No TTL awareness: lazy expiry is
    /// layered on top by the database/registry (§4.3).
    pub fn find(&self, key: &[u8]) -> Option<&Item> {
        let node = self.descend(key)?;
        self.nodes[node].item.as_ref()
    }

    pub fn find_node(&self, key: &[u8]) -> Option<usize> {
        let node = self.descend(key)?;
        self.nodes[node].item.as_ref().map(|_| node)
    }

    pub fn item_at(&self, node: usize) -> Option<&Item> {
        self.nodes.get(node).and_then(|n| n.item.as_ref())
    }

    pub fn item_at_mut(&mut self, node: usize) -> Option<&mut Item> {
        self.nodes.get_mut(node).and_then(|n| n.item.as_mut())
    }

    /// Prunes `node` and any ancestor left with no item and no children,
    /// stopping at the root. Shared by `delete` and `prefix_delete`.
    fn prune_upward(&mut self, mut node: usize) {
        while node != ROOT {
            let has_item = self.nodes[node].item.is_some();
            let has_children = !self.nodes[node].children.is_empty();
            if has_item || has_children {
                break;
            }
            let parent = self.nodes[node].parent.expect("non-root has a parent");
            let chr = self.nodes[node].chr;
            let idx = self.nodes[parent]
                .find_child(chr)
                .expect("parent must still list this child");
            self.nodes[parent].children.remove(idx);
            self.nodes.remove(node);
            node = parent;
        }
    }

    /// `delete(db, key) -> bool` (§4.1).
    pub fn delete(&mut self, key: &[u8]) -> bool {
        let Some(node) = self.descend(key) else {
            return false;
        };
        if self.nodes[node].item.take().is_none() {
            return false;
        }
        self.item_count -= 1;
        self.prune_upward(node);
        true
    }

    fn count_subtree(&self, node: usize) -> usize {
        let mut count = if self.nodes[node].item.is_some() { 1 } else { 0 };
        for edge in &self.nodes[node].children {
            count += self.count_subtree(edge.node);
        }
        count
    }

    /// `prefix_count(db, prefix) -> u64` (§4.1). A null/empty prefix returns
    /// `database_size(db)` directly.
    pub fn prefix_count(&self, prefix: &[u8]) -> u64 {
        if prefix.is_empty() {
            return self.item_count as u64;
        }
        match self.descend(prefix) {
            Some(node) => self.count_subtree(node) as u64,
            None => 0,
        }
    }

    fn destroy_subtree(&mut self, node: usize) -> usize {
        let mut removed = if self.nodes[node].item.take().is_some() { 1 } else { 0 };
        let children: Vec<usize> = self.nodes[node].children.drain(..).map(|e| e.node).collect();
        for child in children {
            removed += self.destroy_subtree(child);
        }
        self.nodes.remove(node);
        removed
    }

    /// `prefix_delete(db, prefix)` (§4.1): destroys the whole subtree below
    /// (and including) the prefix terminal, then prunes toward the root.
    pub fn prefix_delete(&mut self, prefix: &[u8]) -> u64 {
        if prefix.is_empty() {
            let removed = self.item_count;
            self.clear();
            return removed as u64;
        }
        let Some(node) = self.descend(prefix) else {
            return 0;
        };
        let parent = self.nodes[node].parent;
        let chr = self.nodes[node].chr;
        let removed = self.destroy_subtree(node);
        self.item_count -= removed;
        if let Some(parent) = parent {
            if let Ok(idx) = self.nodes[parent].find_child(chr) {
                self.nodes[parent].children.remove(idx);
            }
            self.prune_upward(parent);
        }
        removed as u64
    }

    /// `prefix_set(db, prefix, value, ttl)` (§4.1). Updates only items that
    /// already exist under `prefix`; never creates one. This is a
    /// deliberately preserved policy, not an oversight (§9 open question).
    pub fn prefix_set(&mut self, prefix: &[u8], data: &[u8], ttl: i32, now: u64) {
        let Some(node) = self.descend(prefix) else {
            return;
        };
        self.prefix_set_subtree(node, data, ttl, now);
    }

    fn prefix_set_subtree(&mut self, node: usize, data: &[u8], ttl: i32, now: u64) {
        let children: Vec<usize> = self.nodes[node].children.iter().map(|e| e.node).collect();
        for child in children {
            self.prefix_set_subtree(child, data, ttl, now);
        }
        if let Some(item) = self.nodes[node].item.as_mut() {
            item.data = data.to_vec();
            item.ttl_seconds = ttl;
            item.ctime = now;
            item.latime = now;
        }
    }

    /// `prefix_inc`/`prefix_dec` (§4.1): every descendant item whose data is
    /// a decimal signed integer gets replaced by its successor/predecessor;
    /// non-integer items are left untouched without error.
    pub fn prefix_int_mod(&mut self, prefix: &[u8], delta: i64, now: u64) {
        let Some(node) = self.descend(prefix) else {
            return;
        };
        self.prefix_int_mod_subtree(node, delta, now);
    }

    fn prefix_int_mod_subtree(&mut self, node: usize, delta: i64, now: u64) {
        let children: Vec<usize> = self.nodes[node].children.iter().map(|e| e.node).collect();
        for child in children {
            self.prefix_int_mod_subtree(child, delta, now);
        }
        if let Some(item) = self.nodes[node].item.as_mut() {
            if let Ok(text) = std::str::from_utf8(&item.data) {
                if let Ok(n) = text.trim().parse::<i64>() {
                    item.data = (n + delta).to_string().into_bytes();
                    item.latime = now;
                }
            }
        }
    }

    /// `prefix_enumerate(db, prefix) -> sequence<(key, item_ref)>` (§4.1):
    /// pre-order walk, siblings visited in ascending `chr` order so results
    /// come out in lexicographic order (§8 property 4).
    pub fn prefix_enumerate(&self, prefix: &[u8]) -> Vec<(Vec<u8>, usize)> {
        let Some(node) = self.descend(prefix) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        self.enumerate_subtree(node, prefix.to_vec(), &mut out);
        out
    }

    fn enumerate_subtree(&self, node: usize, path: Vec<u8>, out: &mut Vec<(Vec<u8>, usize)>) {
        if self.nodes[node].item.is_some() {
            out.push((path.clone(), node));
        }
        for edge in &self.nodes[node].children {
            let mut child_path = path.clone();
            child_path.push(edge.chr);
            self.enumerate_subtree(edge.node, child_path, out);
        }
    }

    /// Removes the item at `node` outright (used for lazy/background TTL
    /// expiry, where the caller already knows the node index). No-op if the
    /// node has already lost its item.
    pub fn evict_node(&mut self, node: usize) {
        if self.nodes.get(node).and_then(|n| n.item.as_ref()).is_none() {
            return;
        }
        self.nodes[node].item = None;
        self.item_count -= 1;
        self.prune_upward(node);
    }

    #[cfg(test)]
    fn assert_sibling_order_invariant(&self) {
        for (_, node) in self.nodes.iter() {
            let mut last: Option<u8> = None;
            for edge in &node.children {
                if let Some(l) = last {
                    assert!(edge.chr > l, "siblings must be strictly increasing by chr");
                }
                last = Some(edge.chr);
            }
        }
    }
}
