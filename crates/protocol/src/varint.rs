//! The remaining-length field (§6): a 1-4 byte variable-width integer,
//! modeled "loosely on the MQTT fixed header format" per the original
//! project's own description -- 7 value bits per byte, high bit set on
//! every byte but the last.

use bytes::{Buf, BufMut};
use tritedb_common::TriteError;

const CONTINUATION: u8 = 0x80;
const MAX_ENCODED_BYTES: usize = 4;

/// Largest value representable in 4 encoded bytes (`0x0F_FF_FF_FF`).
pub const MAX_REMAINING_LENGTH: u64 = (1 << (7 * MAX_ENCODED_BYTES)) - 1;

pub fn encode_length(out: &mut impl BufMut, mut value: u64) {
    loop {
        let mut byte = (value % 128) as u8;
        value /= 128;
        if value > 0 {
            byte |= CONTINUATION;
        }
        out.put_u8(byte);
        if value == 0 {
            break;
        }
    }
}

pub fn encoded_length_size(value: u64) -> usize {
    let mut size = 1;
    let mut v = value;
    while v >= 128 {
        v /= 128;
        size += 1;
    }
    size
}

/// Reads the remaining-length field from the front of `buf`, advancing past
/// it on success. Returns `Truncated` if the continuation run isn't
/// complete yet (the caller should wait for more bytes), or `Oversize` if
/// the decoded value would exceed `max_request_size`.
pub fn decode_length(buf: &mut impl Buf, max_request_size: u64) -> Result<u64, TriteError> {
    let mut value: u64 = 0;
    let mut multiplier: u64 = 1;
    for _ in 0..MAX_ENCODED_BYTES {
        if !buf.has_remaining() {
            return Err(TriteError::Truncated);
        }
        let byte = buf.get_u8();
        value += (byte & !CONTINUATION) as u64 * multiplier;
        if byte & CONTINUATION == 0 {
            if value > max_request_size {
                return Err(TriteError::Oversize {
                    declared: value,
                    max: max_request_size,
                });
            }
            return Ok(value);
        }
        multiplier *= 128;
    }
    Err(TriteError::Truncated)
}

/// Peeks the remaining-length field without consuming `buf`, returning the
/// decoded value and the number of header bytes it occupied. Used by the
/// I/O reactor to know how many more bytes to buffer before it can hand a
/// complete packet to the codec.
pub fn peek_length(bytes: &[u8], max_request_size: u64) -> Result<Option<(u64, usize)>, TriteError> {
    let mut value: u64 = 0;
    let mut multiplier: u64 = 1;
    for (i, &byte) in bytes.iter().take(MAX_ENCODED_BYTES).enumerate() {
        value += (byte & !CONTINUATION) as u64 * multiplier;
        if byte & CONTINUATION == 0 {
            if value > max_request_size {
                return Err(TriteError::Oversize {
                    declared: value,
                    max: max_request_size,
                });
            }
            return Ok(Some((value, i + 1)));
        }
        multiplier *= 128;
    }
    if bytes.len() >= MAX_ENCODED_BYTES {
        return Err(TriteError::Truncated);
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use pretty_assertions::assert_eq;

    fn round_trip(value: u64) {
        let mut buf = BytesMut::new();
        encode_length(&mut buf, value);
        assert_eq!(buf.len(), encoded_length_size(value));
        let mut reader = &buf[..];
        let decoded = decode_length(&mut reader, u64::MAX).unwrap();
        assert_eq!(decoded, value);
        assert!(reader.is_empty());
    }

    #[test]
    fn round_trips_small_and_large_values() {
        for value in [0, 1, 127, 128, 16_383, 16_384, 2_097_151, MAX_REMAINING_LENGTH] {
            round_trip(value);
        }
    }

    #[test]
    fn truncated_continuation_run_is_an_error() {
        let mut buf = BytesMut::new();
        buf.put_u8(0x80);
        let mut reader = &buf[..];
        assert!(matches!(
            decode_length(&mut reader, u64::MAX),
            Err(TriteError::Truncated)
        ));
    }

    #[test]
    fn oversize_length_is_rejected() {
        let mut buf = BytesMut::new();
        encode_length(&mut buf, 1_000);
        let mut reader = &buf[..];
        assert!(matches!(
            decode_length(&mut reader, 100),
            Err(TriteError::Oversize { declared: 1_000, max: 100 })
        ));
    }

    #[test]
    fn peek_length_reports_none_until_complete() {
        let partial = [0x80u8];
        assert_eq!(peek_length(&partial, u64::MAX).unwrap(), None);
        let mut complete = BytesMut::new();
        encode_length(&mut complete, 300);
        let (value, size) = peek_length(&complete, u64::MAX).unwrap().unwrap();
        assert_eq!(value, 300);
        assert_eq!(size, encoded_length_size(300));
    }
}
