//! Request bodies (§6): one variant per opcode, carrying only the fields
//! each opcode's body table lists. `prefix` mirrors the header's prefix
//! flag for opcodes where it changes behavior (§4.1, §4.5).

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Put {
        prefix: bool,
        ttl: i32,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Get {
        prefix: bool,
        key: Vec<u8>,
    },
    Del {
        prefix: bool,
        key: Vec<u8>,
    },
    Ttl {
        key: Vec<u8>,
        ttl: i32,
    },
    Inc {
        prefix: bool,
        key: Vec<u8>,
    },
    Dec {
        prefix: bool,
        key: Vec<u8>,
    },
    /// An empty `key` means "the whole selected database" (§4.5 CNT).
    Cnt {
        key: Vec<u8>,
    },
    Use {
        key: Vec<u8>,
    },
    Keys {
        key: Vec<u8>,
    },
    Ping,
    Quit,
    Db,
    Info,
    Flush,
    /// Cluster-join stub (§1 Non-goals): header only, no body.
    Join,
}
