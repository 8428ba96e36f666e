//! `INFO` counters (§11 supplemented feature): plain atomics updated
//! outside the writer lock, since they're monotonic and independent of
//! trie state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tritedb_common::config::Config;
use tritedb_protocol::InfoSnapshot;

pub struct Stats {
    pub nclients: AtomicU64,
    pub nconnections: AtomicU64,
    pub nrequests: AtomicU64,
    pub bytes_recv: AtomicU64,
    pub bytes_sent: AtomicU64,
    started_at: Instant,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    pub fn new() -> Self {
        Self {
            nclients: AtomicU64::new(0),
            nconnections: AtomicU64::new(0),
            nrequests: AtomicU64::new(0),
            bytes_recv: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn on_connect(&self) {
        self.nclients.fetch_add(1, Ordering::Relaxed);
        self.nconnections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_disconnect(&self) {
        self.nclients.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn on_request(&self, recv: u64, sent: u64) {
        self.nrequests.fetch_add(1, Ordering::Relaxed);
        self.bytes_recv.fetch_add(recv, Ordering::Relaxed);
        self.bytes_sent.fetch_add(sent, Ordering::Relaxed);
    }

    pub fn snapshot(&self, nkeys: u64, config: &Config) -> InfoSnapshot {
        InfoSnapshot {
            nclients: self.nclients.load(Ordering::Relaxed),
            nconnections: self.nconnections.load(Ordering::Relaxed),
            nrequests: self.nrequests.load(Ordering::Relaxed),
            bytes_recv: self.bytes_recv.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            nkeys,
            uptime_seconds: self.started_at.elapsed().as_secs(),
            config_echo: config_echo(config),
        }
    }
}

fn config_echo(config: &Config) -> String {
    use tritedb_common::units::{format_duration, format_memory};
    format!(
        "mode={} max_memory={} mem_reclaim_time={} max_request_size={} tcp_backlog={} log_level={:?}",
        config.mode,
        format_memory(config.max_memory),
        format_duration(config.mem_reclaim_time),
        format_memory(config.max_request_size),
        config.tcp_backlog,
        config.log_level,
    )
}
