//! OUCH 5.0 variable-length appendages: `{type:u8, length:u8, data[length]}`
//! blocks following a message's fixed layout. Parsing is lazy and
//! order-independent; an unknown type is skipped but not rejected.

pub mod appendage_type {
    pub const PEG: u8 = 1;
    pub const DISCRETIONARY_PEG: u8 = 2;
    pub const DISPLAY: u8 = 3;
    pub const ISO: u8 = 4;
}

/// One parsed appendage: the raw type byte and its data slice.
pub struct Appendage<'a> {
    pub appendage_type: u8,
    pub data: &'a [u8],
}

impl<'a> Appendage<'a> {
    /// `{peg_type:u8, offset_micros:i32}` per `appendage_type::PEG`.
    pub fn as_peg(&self) -> Option<(u8, i32)> {
        if self.appendage_type != appendage_type::PEG || self.data.len() != 5 {
            return None;
        }
        let peg_type = self.data[0];
        let offset_micros = i32::from_be_bytes(self.data[1..5].try_into().ok()?);
        Some((peg_type, offset_micros))
    }
}

/// Iterates `{type, length, data}` blocks starting at `buf`'s first byte.
/// Does not validate that the whole buffer is consumed; stops cleanly at a
/// truncated trailing block.
pub struct AppendageIter<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> AppendageIter<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }
}

impl<'a> Iterator for AppendageIter<'a> {
    type Item = Appendage<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos + 2 > self.buf.len() {
            return None;
        }
        let appendage_type = self.buf[self.pos];
        let len = self.buf[self.pos + 1] as usize;
        let data_start = self.pos + 2;
        if data_start + len > self.buf.len() {
            return None;
        }
        let data = &self.buf[data_start..data_start + len];
        self.pos = data_start + len;
        Some(Appendage { appendage_type, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iterates_known_and_unknown_appendages() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&[appendage_type::PEG, 5, 1, 0, 0, 0, 10]);
        buf.extend_from_slice(&[99, 3, b'a', b'b', b'c']); // unknown type, skipped but present

        let appendages: Vec<_> = AppendageIter::new(&buf).collect();
        assert_eq!(appendages.len(), 2);
        assert_eq!(appendages[0].as_peg(), Some((1, 10)));
        assert_eq!(appendages[1].appendage_type, 99);
        assert_eq!(appendages[1].data, b"abc");
    }

    #[test]
    fn stops_cleanly_on_truncated_trailing_block() {
        let buf = [appendage_type::DISPLAY, 10, 1, 2, 3]; // declares 10 bytes, has 3
        let appendages: Vec<_> = AppendageIter::new(&buf).collect();
        assert!(appendages.is_empty());
    }
}
