//! Response bodies (§6).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AckCode {
    Ok = 0,
    Nok = 1,
}

impl AckCode {
    pub fn from_u8(raw: u8) -> Self {
        if raw == 0 {
            AckCode::Ok
        } else {
            AckCode::Nok
        }
    }
}

/// `{ttl:i32, keylen:u16, key:bytes, val:bytes}` (§6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuple {
    pub ttl: i32,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// The `INFO` counter snapshot (§11 supplemented feature), echoed as a
/// packed struct plus a textual config dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoSnapshot {
    pub nclients: u64,
    pub nconnections: u64,
    pub nrequests: u64,
    pub bytes_recv: u64,
    pub bytes_sent: u64,
    pub nkeys: u64,
    pub uptime_seconds: u64,
    pub config_echo: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Ack(AckCode),
    /// Point `GET` hit.
    Tuple(Tuple),
    /// Prefix `GET`/`KEYS`.
    Tuples(Vec<Tuple>),
    Count(u64),
    DbName(String),
    Info(InfoSnapshot),
}

impl Response {
    pub fn ack(ok: bool) -> Self {
        Response::Ack(if ok { AckCode::Ok } else { AckCode::Nok })
    }
}
