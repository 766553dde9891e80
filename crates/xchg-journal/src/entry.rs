//! On-disk entry layout (§3 Data Model):
//! `{length:u32, timestamp:i64, direction:u8, seq_num:u32, msg_type_len:u8,
//!   msg_type_bytes, payload_len:u32, payload_bytes, crc32:u32}`.
//!
//! `length` is the byte count of everything following the length field
//! itself (header through the trailing crc32), so a scanner can read the
//! 4-byte length, then read exactly that many more bytes to get a whole
//! record without re-parsing it.

use crate::error::{JournalError, JournalResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Direction {
    In = 0,
    Out = 1,
}

impl Direction {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Direction::In),
            1 => Some(Direction::Out),
            _ => None,
        }
    }
}

const LENGTH_FIELD: usize = 4;
const FIXED_HEADER: usize = 8 /* timestamp */ + 1 /* direction */ + 4 /* seq_num */ + 1 /* msg_type_len */;
const TRAILER: usize = 4; // crc32

/// A decoded journal entry. `msg_type` and `payload` borrow the segment's
/// mapped memory; no copy is made on replay.
pub struct Entry<'a> {
    pub timestamp_ns: i64,
    pub direction: Direction,
    pub seq_num: u32,
    pub msg_type: &'a [u8],
    pub payload: &'a [u8],
}

impl<'a> Entry<'a> {
    /// Encoded size of this entry, including the leading length field.
    pub fn encoded_len(msg_type: &[u8], payload: &[u8]) -> usize {
        LENGTH_FIELD + FIXED_HEADER + msg_type.len() + 4 + payload.len() + TRAILER
    }

    /// Writes the entry into `out` (which must be at least
    /// `encoded_len(msg_type, payload)` bytes) and returns the bytes written.
    pub fn encode(
        out: &mut [u8],
        timestamp_ns: i64,
        direction: Direction,
        seq_num: u32,
        msg_type: &[u8],
        payload: &[u8],
    ) -> usize {
        let total = Self::encoded_len(msg_type, payload);
        let body_len = (total - LENGTH_FIELD) as u32;
        out[0..4].copy_from_slice(&body_len.to_le_bytes());

        let mut pos = LENGTH_FIELD;
        out[pos..pos + 8].copy_from_slice(&timestamp_ns.to_le_bytes());
        pos += 8;
        out[pos] = direction as u8;
        pos += 1;
        out[pos..pos + 4].copy_from_slice(&seq_num.to_le_bytes());
        pos += 4;
        out[pos] = msg_type.len() as u8;
        pos += 1;
        out[pos..pos + msg_type.len()].copy_from_slice(msg_type);
        pos += msg_type.len();
        out[pos..pos + 4].copy_from_slice(&(payload.len() as u32).to_le_bytes());
        pos += 4;
        out[pos..pos + payload.len()].copy_from_slice(payload);
        pos += payload.len();

        let crc = crc32fast::hash(&out[0..pos]);
        out[pos..pos + 4].copy_from_slice(&crc.to_le_bytes());
        pos += 4;
        debug_assert_eq!(pos, total);
        total
    }

    /// Parses one entry starting at `buf[0]`. Returns `(entry, bytes consumed)`.
    /// Any structural or CRC failure is a corrupt-tail signal to the caller,
    /// which truncates the segment back to the last good record.
    pub fn decode(buf: &'a [u8], segment: u32, offset: u64) -> JournalResult<(Self, usize)> {
        let corrupt = |reason| JournalError::Corrupt { segment, offset, reason };

        if buf.len() < LENGTH_FIELD {
            return Err(corrupt("truncated length field"));
        }
        let body_len = u32::from_le_bytes(buf[0..4].try_into().unwrap()) as usize;
        let total = LENGTH_FIELD + body_len;
        if buf.len() < total || body_len < FIXED_HEADER + 4 + TRAILER {
            return Err(corrupt("truncated record body"));
        }

        let record = &buf[0..total];
        let (crc_covered, crc_bytes) = record.split_at(record.len() - TRAILER);
        let declared_crc = u32::from_le_bytes(crc_bytes.try_into().unwrap());
        if crc32fast::hash(crc_covered) != declared_crc {
            return Err(corrupt("crc mismatch"));
        }
        let header_and_payload = &buf[LENGTH_FIELD..total - TRAILER];

        let mut pos = 0usize;
        let timestamp_ns = i64::from_le_bytes(header_and_payload[pos..pos + 8].try_into().unwrap());
        pos += 8;
        let direction = Direction::from_u8(header_and_payload[pos]).ok_or_else(|| corrupt("invalid direction byte"))?;
        pos += 1;
        let seq_num = u32::from_le_bytes(header_and_payload[pos..pos + 4].try_into().unwrap());
        pos += 4;
        let msg_type_len = header_and_payload[pos] as usize;
        pos += 1;
        if pos + msg_type_len + 4 > header_and_payload.len() {
            return Err(corrupt("msg_type_len out of bounds"));
        }
        let msg_type = &header_and_payload[pos..pos + msg_type_len];
        pos += msg_type_len;
        let payload_len = u32::from_le_bytes(header_and_payload[pos..pos + 4].try_into().unwrap()) as usize;
        pos += 4;
        if pos + payload_len != header_and_payload.len() {
            return Err(corrupt("payload_len does not match record body"));
        }
        let payload = &header_and_payload[pos..pos + payload_len];

        Ok((Self { timestamp_ns, direction, seq_num, msg_type, payload }, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trips() {
        let mut buf = [0u8; 128];
        let len = Entry::encode(&mut buf, 42, Direction::Out, 7, b"A", b"hello world");
        let (entry, consumed) = Entry::decode(&buf[..len], 1, 0).unwrap();
        assert_eq!(consumed, len);
        assert_eq!(entry.timestamp_ns, 42);
        assert_eq!(entry.direction, Direction::Out);
        assert_eq!(entry.seq_num, 7);
        assert_eq!(entry.msg_type, b"A");
        assert_eq!(entry.payload, b"hello world");
    }

    #[test]
    fn corrupt_crc_is_rejected() {
        let mut buf = [0u8; 128];
        let len = Entry::encode(&mut buf, 42, Direction::In, 1, b"A", b"x");
        buf[len - 1] ^= 0xFF;
        assert!(Entry::decode(&buf[..len], 1, 0).is_err());
    }

    #[test]
    fn truncated_tail_is_rejected() {
        let mut buf = [0u8; 128];
        let len = Entry::encode(&mut buf, 42, Direction::In, 1, b"A", b"x");
        assert!(Entry::decode(&buf[..len - 1], 1, 0).is_err());
    }
}
