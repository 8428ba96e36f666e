//! `decode_request`/`decode_response` and their encoding inverses (§4.4):
//! turn a framed packet (header byte + remaining-length + body) into a
//! `Request`/`Response` value, or back.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tritedb_common::TriteError;

use crate::opcode::{make_header_byte, split_header_byte, Flags, Opcode};
use crate::request::Request;
use crate::response::{AckCode, InfoSnapshot, Response, Tuple};
use crate::varint::{self, peek_length};

fn take(buf: &mut Bytes, n: usize) -> Result<Bytes, TriteError> {
    if buf.remaining() < n {
        return Err(TriteError::Truncated);
    }
    Ok(buf.copy_to_bytes(n))
}

fn rest(buf: &mut Bytes) -> Vec<u8> {
    let n = buf.remaining();
    buf.copy_to_bytes(n).to_vec()
}

fn request_opcode_and_flags(req: &Request) -> (Opcode, Flags) {
    let prefix = |p: bool| Flags {
        prefix: p,
        sync: false,
        request: true,
    };
    let plain = Flags {
        prefix: false,
        sync: false,
        request: true,
    };
    match req {
        Request::Put { prefix: p, .. } => (Opcode::Put, prefix(*p)),
        Request::Get { prefix: p, .. } => (Opcode::Get, prefix(*p)),
        Request::Del { prefix: p, .. } => (Opcode::Del, prefix(*p)),
        Request::Ttl { .. } => (Opcode::Ttl, plain),
        Request::Inc { prefix: p, .. } => (Opcode::Inc, prefix(*p)),
        Request::Dec { prefix: p, .. } => (Opcode::Dec, prefix(*p)),
        Request::Cnt { .. } => (Opcode::Cnt, plain),
        Request::Use { .. } => (Opcode::Use, plain),
        Request::Keys { .. } => (Opcode::Keys, plain),
        Request::Ping => (Opcode::Ping, plain),
        Request::Quit => (Opcode::Quit, plain),
        Request::Db => (Opcode::Db, plain),
        Request::Info => (Opcode::Info, plain),
        Request::Flush => (Opcode::Flush, plain),
        Request::Join => (Opcode::Join, plain),
    }
}

/// Encodes `req`'s body only (no header byte, no length field).
pub fn encode_request_body(req: &Request, out: &mut BytesMut) {
    match req {
        Request::Put { ttl, key, value, .. } => {
            out.put_i32(*ttl);
            out.put_u16(key.len() as u16);
            out.put_slice(key);
            out.put_slice(value);
        }
        Request::Get { key, .. }
        | Request::Del { key, .. }
        | Request::Inc { key, .. }
        | Request::Dec { key, .. }
        | Request::Cnt { key }
        | Request::Use { key }
        | Request::Keys { key } => out.put_slice(key),
        Request::Ttl { ttl, key } => {
            out.put_i32(*ttl);
            out.put_slice(key);
        }
        Request::Ping
        | Request::Quit
        | Request::Db
        | Request::Info
        | Request::Flush
        | Request::Join => {}
    }
}

/// Decodes a request body given the opcode and flags already read off the
/// header byte.
pub fn decode_request_body(opcode: Opcode, flags: Flags, body: Bytes) -> Result<Request, TriteError> {
    let mut body = body;
    Ok(match opcode {
        Opcode::Put => {
            let ttl = take(&mut body, 4)?.get_i32();
            let keylen = take(&mut body, 2)?.get_u16() as usize;
            let key = take(&mut body, keylen)?.to_vec();
            let value = rest(&mut body);
            Request::Put {
                prefix: flags.prefix,
                ttl,
                key,
                value,
            }
        }
        Opcode::Get => Request::Get {
            prefix: flags.prefix,
            key: rest(&mut body),
        },
        Opcode::Del => Request::Del {
            prefix: flags.prefix,
            key: rest(&mut body),
        },
        Opcode::Ttl => {
            let ttl = take(&mut body, 4)?.get_i32();
            Request::Ttl {
                ttl,
                key: rest(&mut body),
            }
        }
        Opcode::Inc => Request::Inc {
            prefix: flags.prefix,
            key: rest(&mut body),
        },
        Opcode::Dec => Request::Dec {
            prefix: flags.prefix,
            key: rest(&mut body),
        },
        Opcode::Cnt => Request::Cnt { key: rest(&mut body) },
        Opcode::Use => Request::Use { key: rest(&mut body) },
        Opcode::Keys => Request::Keys { key: rest(&mut body) },
        Opcode::Ping => Request::Ping,
        Opcode::Quit => Request::Quit,
        Opcode::Db => Request::Db,
        Opcode::Info => Request::Info,
        Opcode::Flush => Request::Flush,
        Opcode::Join => Request::Join,
        Opcode::Ack => return Err(TriteError::UnknownOpcode(Opcode::Ack.as_u8())),
    })
}

fn put_tuple(out: &mut BytesMut, tuple: &Tuple) {
    out.put_i32(tuple.ttl);
    out.put_u16(tuple.key.len() as u16);
    out.put_slice(&tuple.key);
    out.put_slice(&tuple.value);
}

fn take_tuple(body: &mut Bytes) -> Result<Tuple, TriteError> {
    let ttl = take(body, 4)?.get_i32();
    let keylen = take(body, 2)?.get_u16() as usize;
    let key = take(body, keylen)?.to_vec();
    let value = rest(body);
    Ok(Tuple { ttl, key, value })
}

pub fn response_opcode(response: &Response) -> Opcode {
    match response {
        Response::Ack(_) => Opcode::Ack,
        Response::Tuple(_) => Opcode::Get,
        Response::Tuples(_) => Opcode::Keys,
        Response::Count(_) => Opcode::Cnt,
        Response::DbName(_) => Opcode::Db,
        Response::Info(_) => Opcode::Info,
    }
}

pub fn encode_response_body(response: &Response, out: &mut BytesMut) {
    match response {
        Response::Ack(code) => out.put_u8(*code as u8),
        Response::Tuple(tuple) => put_tuple(out, tuple),
        Response::Tuples(tuples) => {
            out.put_u16(tuples.len() as u16);
            for tuple in tuples {
                put_tuple(out, tuple);
            }
        }
        Response::Count(value) => out.put_u64(*value),
        Response::DbName(name) => {
            let bytes = name.as_bytes();
            out.put_u16(bytes.len() as u16);
            out.put_slice(bytes);
        }
        Response::Info(snapshot) => {
            out.put_u64(snapshot.nclients);
            out.put_u64(snapshot.nconnections);
            out.put_u64(snapshot.nrequests);
            out.put_u64(snapshot.bytes_recv);
            out.put_u64(snapshot.bytes_sent);
            out.put_u64(snapshot.nkeys);
            out.put_u64(snapshot.uptime_seconds);
            let echo = snapshot.config_echo.as_bytes();
            out.put_u32(echo.len() as u32);
            out.put_slice(echo);
        }
    }
}

/// Decodes a response body given the opcode read off the header byte. Used
/// by test clients that speak the wire protocol directly.
pub fn decode_response_body(opcode: Opcode, body: Bytes) -> Result<Response, TriteError> {
    let mut body = body;
    Ok(match opcode {
        Opcode::Ack => Response::Ack(AckCode::from_u8(take(&mut body, 1)?.get_u8())),
        Opcode::Get => Response::Tuple(take_tuple(&mut body)?),
        Opcode::Keys => {
            let len = take(&mut body, 2)?.get_u16() as usize;
            let mut tuples = Vec::with_capacity(len);
            for _ in 0..len {
                tuples.push(take_tuple(&mut body)?);
            }
            Response::Tuples(tuples)
        }
        Opcode::Cnt => Response::Count(take(&mut body, 8)?.get_u64()),
        Opcode::Db => {
            let len = take(&mut body, 2)?.get_u16() as usize;
            let name = String::from_utf8_lossy(&take(&mut body, len)?).into_owned();
            Response::DbName(name)
        }
        Opcode::Info => {
            let nclients = take(&mut body, 8)?.get_u64();
            let nconnections = take(&mut body, 8)?.get_u64();
            let nrequests = take(&mut body, 8)?.get_u64();
            let bytes_recv = take(&mut body, 8)?.get_u64();
            let bytes_sent = take(&mut body, 8)?.get_u64();
            let nkeys = take(&mut body, 8)?.get_u64();
            let uptime_seconds = take(&mut body, 8)?.get_u64();
            let echo_len = take(&mut body, 4)?.get_u32() as usize;
            let config_echo = String::from_utf8_lossy(&take(&mut body, echo_len)?).into_owned();
            Response::Info(InfoSnapshot {
                nclients,
                nconnections,
                nrequests,
                bytes_recv,
                bytes_sent,
                nkeys,
                uptime_seconds,
                config_echo,
            })
        }
        other => return Err(TriteError::UnknownOpcode(other.as_u8())),
    })
}

/// Appends a full framed packet (header byte + remaining-length + body) for
/// `req` to `out`.
pub fn encode_request(out: &mut BytesMut, req: &Request) {
    let (opcode, flags) = request_opcode_and_flags(req);
    let mut body = BytesMut::new();
    encode_request_body(req, &mut body);
    out.put_u8(make_header_byte(opcode, flags));
    varint::encode_length(out, body.len() as u64);
    out.put_slice(&body);
}

/// Appends a full framed packet for `response` to `out`. `sync` mirrors the
/// request's sync flag back, as the original pack helpers do.
pub fn encode_response(out: &mut BytesMut, response: &Response, sync: bool) {
    let opcode = response_opcode(response);
    let flags = Flags {
        prefix: false,
        sync,
        request: false,
    };
    let mut body = BytesMut::new();
    encode_response_body(response, &mut body);
    out.put_u8(make_header_byte(opcode, flags));
    varint::encode_length(out, body.len() as u64);
    out.put_slice(&body);
}

/// Attempts to decode one complete framed request from the front of `buf`.
/// Returns `Ok(None)` when more bytes are needed, never consuming `buf`
/// itself -- the caller advances its own read cursor by the returned byte
/// count only on `Some`.
pub fn try_decode_request(buf: &[u8], max_request_size: u64) -> Result<Option<(usize, Request)>, TriteError> {
    let Some(&header_byte) = buf.first() else {
        return Ok(None);
    };
    let (opcode_raw, flags) = split_header_byte(header_byte);
    let opcode = Opcode::from_u8(opcode_raw)?;
    let Some((len, len_size)) = peek_length(&buf[1..], max_request_size)? else {
        return Ok(None);
    };
    let total = 1 + len_size + len as usize;
    if buf.len() < total {
        return Ok(None);
    }
    let body = Bytes::copy_from_slice(&buf[1 + len_size..total]);
    let request = decode_request_body(opcode, flags, body)?;
    Ok(Some((total, request)))
}

/// Same as [`try_decode_request`] but for responses (used by test clients).
pub fn try_decode_response(buf: &[u8], max_request_size: u64) -> Result<Option<(usize, Response)>, TriteError> {
    let Some(&header_byte) = buf.first() else {
        return Ok(None);
    };
    let (opcode_raw, _flags) = split_header_byte(header_byte);
    let opcode = Opcode::from_u8(opcode_raw)?;
    let Some((len, len_size)) = peek_length(&buf[1..], max_request_size)? else {
        return Ok(None);
    };
    let total = 1 + len_size + len as usize;
    if buf.len() < total {
        return Ok(None);
    }
    let body = Bytes::copy_from_slice(&buf[1 + len_size..total]);
    let response = decode_response_body(opcode, body)?;
    Ok(Some((total, response)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn round_trip_request(req: Request) {
        let mut buf = BytesMut::new();
        encode_request(&mut buf, &req);
        let (consumed, decoded) = try_decode_request(&buf, u64::MAX).unwrap().unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(decoded, req);
    }

    #[test]
    fn put_request_round_trips() {
        round_trip_request(Request::Put {
            prefix: false,
            ttl: -1,
            key: b"hello".to_vec(),
            value: b"world".to_vec(),
        });
        round_trip_request(Request::Put {
            prefix: true,
            ttl: 10,
            key: b"foo".to_vec(),
            value: b"10".to_vec(),
        });
    }

    #[test]
    fn get_ttl_and_control_requests_round_trip() {
        round_trip_request(Request::Get {
            prefix: false,
            key: b"hello".to_vec(),
        });
        round_trip_request(Request::Ttl {
            key: b"hello".to_vec(),
            ttl: 30,
        });
        round_trip_request(Request::Ping);
        round_trip_request(Request::Quit);
        round_trip_request(Request::Join);
    }

    #[test]
    fn incomplete_request_reports_none() {
        let mut buf = BytesMut::new();
        encode_request(
            &mut buf,
            &Request::Get {
                prefix: false,
                key: b"hello".to_vec(),
            },
        );
        let truncated = &buf[..buf.len() - 1];
        assert_eq!(try_decode_request(truncated, u64::MAX).unwrap(), None);
    }

    #[test]
    fn ack_response_round_trips() {
        let mut buf = BytesMut::new();
        encode_response(&mut buf, &Response::ack(true), false);
        let (consumed, decoded) = try_decode_response(&buf, u64::MAX).unwrap().unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(decoded, Response::Ack(AckCode::Ok));
    }

    #[test]
    fn tuple_list_response_round_trips() {
        let tuples = vec![
            Tuple {
                ttl: -1,
                key: b"hel".to_vec(),
                value: b"d".to_vec(),
            },
            Tuple {
                ttl: -1,
                key: b"hello".to_vec(),
                value: b"a".to_vec(),
            },
        ];
        let mut buf = BytesMut::new();
        encode_response(&mut buf, &Response::Tuples(tuples.clone()), false);
        let (_, decoded) = try_decode_response(&buf, u64::MAX).unwrap().unwrap();
        assert_eq!(decoded, Response::Tuples(tuples));
    }

    #[test]
    fn oversize_request_is_rejected_before_body_is_read() {
        let mut buf = BytesMut::new();
        encode_request(
            &mut buf,
            &Request::Put {
                prefix: false,
                ttl: -1,
                key: b"k".to_vec(),
                value: vec![0u8; 200],
            },
        );
        assert!(matches!(
            try_decode_request(&buf, 16),
            Err(TriteError::Oversize { .. })
        ));
    }
}
