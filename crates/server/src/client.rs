//! Per-connection state (§3 Client): touched only by whichever pool thread
//! currently owns the connection's event, so none of this needs locking
//! (§5 "per-connection state ... needs no locking").

use uuid::Uuid;

use tritedb_engine::DEFAULT_DATABASE;

#[derive(Debug, Clone)]
pub struct Client {
    pub id: Uuid,
    pub selected_db: String,
    pub last_action_time: u64,
    pub bytes_recv: u64,
    pub bytes_sent: u64,
}

impl Client {
    pub fn new(now: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            selected_db: DEFAULT_DATABASE.to_string(),
            last_action_time: now,
            bytes_recv: 0,
            bytes_sent: 0,
        }
    }
}
