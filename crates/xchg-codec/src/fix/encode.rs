use crate::error::{CodecError, CodecResult};
use crate::fix::{SOH, TAG_CHECKSUM, checksum};

/// BodyLength is reserved as a fixed 6-digit zero-padded field so it can be
/// backfilled in place once the body is known, with no memmove of the
/// already-written tags that follow it.
const BODY_LENGTH_DIGITS: usize = 6;

/// Writes a FIX message directly into a caller-owned buffer. Tag 8
/// (BeginString) and tag 9 (BodyLength, reserved fixed-width) are written by
/// `start`; the checksum trailer is appended by `commit`.
pub struct FixEncoder<'a> {
    buf: &'a mut [u8],
    pos: usize,
    body_length_digits_at: usize,
    body_start: usize,
}

impl<'a> FixEncoder<'a> {
    /// Begins a new message: writes tag 8 and a reserved tag 9 field, then
    /// tag 35 (MsgType).
    pub fn start(buf: &'a mut [u8], begin_string: &str, msg_type: &str) -> CodecResult<Self> {
        let mut enc = Self { buf, pos: 0, body_length_digits_at: 0, body_start: 0 };
        enc.write_tag_str(8, begin_string)?;
        enc.body_length_digits_at = enc.pos + 2; // after "9="
        enc.write_raw(b"9=")?;
        for _ in 0..BODY_LENGTH_DIGITS {
            enc.write_raw(b"0")?;
        }
        enc.write_raw(&[SOH])?;
        enc.body_start = enc.pos;
        enc.write_tag_str(35, msg_type)?;
        Ok(enc)
    }

    fn write_raw(&mut self, bytes: &[u8]) -> CodecResult<()> {
        if self.pos + bytes.len() > self.buf.len() {
            return Err(CodecError::BufferFull);
        }
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
        Ok(())
    }

    /// Splices already-rendered `tag=value\x01` field bytes (as produced by
    /// a caller that pre-renders application-level fields, e.g. from a ring
    /// slot payload) directly into the body.
    pub fn write_body_fields(&mut self, bytes: &[u8]) -> CodecResult<()> {
        self.write_raw(bytes)
    }

    pub fn write_tag_str(&mut self, tag: u32, value: &str) -> CodecResult<()> {
        self.write_raw(format!("{tag}=").as_bytes())?;
        self.write_raw(value.as_bytes())?;
        self.write_raw(&[SOH])
    }

    pub fn write_tag_int(&mut self, tag: u32, value: i64) -> CodecResult<()> {
        self.write_raw(format!("{tag}={value}").as_bytes())?;
        self.write_raw(&[SOH])
    }

    pub fn write_tag_char(&mut self, tag: u32, value: u8) -> CodecResult<()> {
        self.write_raw(format!("{tag}=").as_bytes())?;
        self.write_raw(&[value])?;
        self.write_raw(&[SOH])
    }

    /// Writes a pre-rendered `YYYYMMDD-HH:MM:SS.sss` timestamp field, as
    /// produced by [`super::timestamp::FixTimestampCache`].
    pub fn write_tag_timestamp(&mut self, tag: u32, rendered: &[u8; 21]) -> CodecResult<()> {
        self.write_raw(format!("{tag}=").as_bytes())?;
        self.write_raw(rendered)?;
        self.write_raw(&[SOH])
    }

    /// Backfills BodyLength and appends the mod-256 checksum trailer.
    /// Returns the total frame length.
    pub fn commit(mut self) -> CodecResult<usize> {
        let body_len = self.pos - self.body_start;
        if body_len >= 10usize.pow(BODY_LENGTH_DIGITS as u32) {
            return Err(CodecError::BufferFull);
        }
        let digits = format!("{body_len:0width$}", width = BODY_LENGTH_DIGITS);
        self.buf[self.body_length_digits_at..self.body_length_digits_at + BODY_LENGTH_DIGITS]
            .copy_from_slice(digits.as_bytes());

        let cksum = checksum(&self.buf[..self.pos]);
        self.write_raw(format!("{TAG_CHECKSUM}={cksum:03}").as_bytes())?;
        self.write_raw(&[SOH])?;
        Ok(self.pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fix::{IncomingMessage, TAG_HEART_BT_INT};

    #[test]
    fn encodes_a_logon_that_round_trips() {
        let mut buf = [0u8; 256];
        let mut enc = FixEncoder::start(&mut buf, "FIX.4.4", "A").unwrap();
        enc.write_tag_str(49, "CLIENT").unwrap();
        enc.write_tag_str(56, "EXCH").unwrap();
        enc.write_tag_int(34, 1).unwrap();
        enc.write_tag_timestamp(52, b"20260101-00:00:00.000").unwrap();
        enc.write_tag_int(108, 30).unwrap();
        let len = enc.commit().unwrap();

        let msg = IncomingMessage::parse(&buf[..len]).unwrap();
        assert_eq!(msg.msg_type(), Some("A"));
        assert_eq!(msg.sender_comp_id(), Some("CLIENT"));
        assert_eq!(msg.msg_seq_num(), Some(1));
        assert_eq!(msg.int(TAG_HEART_BT_INT), Some(30));
    }

    #[test]
    fn rejects_when_buffer_too_small() {
        let mut buf = [0u8; 8];
        assert!(matches!(
            FixEncoder::start(&mut buf, "FIX.4.4", "A"),
            Err(CodecError::BufferFull)
        ));
    }
}
