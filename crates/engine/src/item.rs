use std::time::{SystemTime, UNIX_EPOCH};

/// Sentinel `ttl_seconds` meaning "no TTL set" (§3 Item). Chosen as `-1` so
/// it round-trips directly through the wire's `ttl:i32` field (§6, §8
/// scenario: `GET hello` replies with `ttl=-1`).
pub const NO_TTL: i32 = -1;

/// The payload associated with a complete key (§3 Item).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub data: Vec<u8>,
    pub ttl_seconds: i32,
    pub ctime: u64,
    pub latime: u64,
}

impl Item {
    pub fn new(data: Vec<u8>, now: u64) -> Self {
        Self {
            data,
            ttl_seconds: NO_TTL,
            ctime: now,
            latime: now,
        }
    }

    /// `remaining = ctime + ttl_seconds - now` (§4.3). Only meaningful when
    /// `ttl_seconds != NO_TTL`.
    pub fn remaining(&self, now: u64) -> i64 {
        self.ctime as i64 + self.ttl_seconds as i64 - now as i64
    }

    pub fn is_expired(&self, now: u64) -> bool {
        self.ttl_seconds != NO_TTL && self.remaining(now) <= 0
    }
}

/// Current wall-clock time in epoch seconds, the engine's one clock source.
pub fn now_epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs()
}
