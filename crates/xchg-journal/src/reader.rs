use std::sync::Arc;
use std::thread;
use std::time::Duration as StdDuration;

use crate::entry::Direction;
use crate::stream::{OwnedEntry, Stream};

/// Sentinel start positions understood by [`Reader::set_position`].
pub const START: i64 = 0;
pub const END: i64 = -1;

/// A polling reader over one stream/direction. Readers are lock-free
/// observers of the writer's index: `poll` spins briefly, then sleeps, until
/// a sequence number it hasn't delivered yet appears.
pub struct Reader {
    stream: Arc<Stream>,
    direction: Direction,
    next_seq: u32,
}

impl Reader {
    pub(crate) fn new(stream: Arc<Stream>, direction: Direction, start_pos: i64) -> Self {
        let mut reader = Self { stream, direction, next_seq: 1 };
        reader.set_position(start_pos);
        reader
    }

    /// `START` (0) rewinds to the first entry; `END` (-1) seeks to the
    /// current tail (next write will be the first delivered entry);
    /// any positive value seeks to that sequence number.
    pub fn set_position(&mut self, pos: i64) {
        self.next_seq = match pos {
            START => 1,
            END => self.stream.latest_seq(self.direction) + 1,
            n if n > 0 => n as u32,
            _ => 1,
        };
    }

    pub fn has_next(&self) -> bool {
        self.stream.latest_seq(self.direction) >= self.next_seq
    }

    /// Number of entries currently available without blocking.
    pub fn available(&self) -> u32 {
        self.stream.latest_seq(self.direction).saturating_sub(self.next_seq - 1)
    }

    /// Returns the next entry without blocking, or `None` if none is
    /// available yet.
    pub fn try_poll(&mut self) -> Option<OwnedEntry> {
        let (segment, offset) = self.stream.locate(self.direction, self.next_seq)?;
        let (entry, _) = crate::entry::Entry::decode(&segment.data()[offset as usize..], segment.segment_id, offset).ok()?;
        let owned = OwnedEntry {
            timestamp_ns: entry.timestamp_ns,
            direction: entry.direction,
            seq_num: entry.seq_num,
            msg_type: entry.msg_type.to_vec(),
            payload: entry.payload.to_vec(),
        };
        self.next_seq += 1;
        Some(owned)
    }

    /// Blocks (spin then sleep) until an entry is available or `timeout`
    /// elapses. `timeout == 0` behaves like `try_poll`; a negative timeout
    /// blocks indefinitely (`END`-style tail follow).
    pub fn poll(&mut self, timeout: StdDuration) -> Option<OwnedEntry> {
        if let Some(entry) = self.try_poll() {
            return Some(entry);
        }
        let deadline = std::time::Instant::now() + timeout;
        let mut spins = 0u32;
        loop {
            if let Some(entry) = self.try_poll() {
                return Some(entry);
            }
            if std::time::Instant::now() >= deadline {
                return None;
            }
            if spins < 1000 {
                std::hint::spin_loop();
                spins += 1;
            } else {
                thread::sleep(StdDuration::from_micros(200));
            }
        }
    }

    /// Blocks indefinitely until an entry is available.
    pub fn poll_forever(&mut self) -> OwnedEntry {
        loop {
            if let Some(entry) = self.try_poll() {
                return entry;
            }
            thread::sleep(StdDuration::from_micros(200));
        }
    }

    /// Delivers every currently-available entry to `callback`, in order.
    pub fn drain(&mut self, mut callback: impl FnMut(OwnedEntry)) {
        while let Some(entry) = self.try_poll() {
            callback(entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn tail_reader_sees_only_writes_after_it_was_created() {
        let dir = tempdir().unwrap();
        let stream = Arc::new(Stream::open(dir.path(), 4096, false).unwrap());
        stream.write(Direction::Out, 1, 1, b"A", b"before").unwrap();

        let mut reader = Reader::new(stream.clone(), Direction::Out, END);
        assert!(!reader.has_next());

        stream.write(Direction::Out, 2, 2, b"A", b"after").unwrap();
        assert!(reader.has_next());
        let entry = reader.try_poll().unwrap();
        assert_eq!(entry.seq_num, 2);
        assert_eq!(entry.payload, b"after");
    }

    #[test]
    fn start_reader_drains_everything_in_order() {
        let dir = tempdir().unwrap();
        let stream = Arc::new(Stream::open(dir.path(), 4096, false).unwrap());
        for seq in 1..=4u32 {
            stream.write(Direction::In, seq as i64, seq, b"A", b"x").unwrap();
        }
        let mut reader = Reader::new(stream, Direction::In, START);
        let mut seqs = Vec::new();
        reader.drain(|e| seqs.push(e.seq_num));
        assert_eq!(seqs, vec![1, 2, 3, 4]);
    }
}
