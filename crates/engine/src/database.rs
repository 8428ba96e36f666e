use crate::trie::Trie;

/// A named namespace owning exactly one trie (§3 Database).
pub struct Database {
    pub name: String,
    pub trie: Trie,
}

impl Database {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            trie: Trie::new(),
        }
    }

    pub fn size(&self) -> u64 {
        self.trie.len() as u64
    }
}
