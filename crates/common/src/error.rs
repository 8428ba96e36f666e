use std::io;

/// Error kinds shared between the protocol codec and the engine (§7).
///
/// Decode failures and engine rejects are distinct from each other: a
/// decode failure means the connection gets dropped, while an engine
/// reject means the client gets an `ACK(NOK)` and stays connected.
#[derive(Debug, thiserror::Error)]
pub enum TriteError {
    #[error("unrecognised opcode {0:#06b}")]
    UnknownOpcode(u8),

    #[error("packet truncated before header completed")]
    Truncated,

    #[error("declared packet length {declared} exceeds max_request_size {max}")]
    Oversize { declared: u64, max: u64 },

    #[error("key not found or expired")]
    NotFound,

    #[error("value is not a signed integer")]
    NotInteger,

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, TriteError>;
