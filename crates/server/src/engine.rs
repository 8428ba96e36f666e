//! The process-wide shared state behind the writer lock (§5): the
//! database registry (trie + TTL index) plus the counters the `INFO`
//! opcode reports and the merged configuration.

use parking_lot::Mutex;

use tritedb_common::config::Config;
use tritedb_engine::Registry;

use crate::stats::Stats;

/// Everything a dispatcher handler or the background sweeper needs.
/// `registry` is the single writer lock (§5): every mutating and
/// observing handler acquires it for the duration of its operation.
pub struct Engine {
    pub registry: Mutex<Registry>,
    pub stats: Stats,
    pub config: Config,
}

impl Engine {
    pub fn new(config: Config) -> Self {
        Self {
            registry: Mutex::new(Registry::new()),
            stats: Stats::new(),
            config,
        }
    }
}
