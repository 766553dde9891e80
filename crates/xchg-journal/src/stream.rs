use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::entry::{Direction, Entry};
use crate::error::{JournalError, JournalResult};
use crate::index::StreamIndex;
use crate::segment::{Segment, segment_path};

/// Absolute position of a written entry: which segment file and the
/// byte offset within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub segment_id: u32,
    pub offset: u64,
}

/// An owned copy of a journal entry, returned from query APIs that cross a
/// lock boundary (`get_latest`, `replay_by_time`) where a borrowed flyweight
/// would have to outlive the index lock.
pub struct OwnedEntry {
    pub timestamp_ns: i64,
    pub direction: Direction,
    pub seq_num: u32,
    pub msg_type: Vec<u8>,
    pub payload: Vec<u8>,
}

impl OwnedEntry {
    fn from_entry(entry: &Entry<'_>) -> Self {
        Self {
            timestamp_ns: entry.timestamp_ns,
            direction: entry.direction,
            seq_num: entry.seq_num,
            msg_type: entry.msg_type.to_vec(),
            payload: entry.payload.to_vec(),
        }
    }
}

/// A single stream's segments and index. One writer thread owns `write`;
/// any number of readers call the `replay*`/`get_latest` family, which only
/// ever take the lock briefly to resolve (segment, offset).
pub struct Stream {
    dir: PathBuf,
    max_file_size: u64,
    sync_on_write: bool,
    segments: Mutex<Vec<Arc<Segment>>>,
    index: Mutex<StreamIndex>,
}

impl Stream {
    /// Opens (creating if necessary) the stream's directory, scanning any
    /// existing segments to rebuild the index and truncating a corrupt
    /// tail back to the last valid record.
    pub fn open(dir: &Path, max_file_size: u64, sync_on_write: bool) -> JournalResult<Self> {
        fs::create_dir_all(dir)?;
        let mut segment_ids = existing_segment_ids(dir)?;
        segment_ids.sort_unstable();

        let mut segments = Vec::new();
        let mut index = StreamIndex::new();

        for &id in &segment_ids {
            let mut seg = Segment::open(dir, id, fs::metadata(segment_path(dir, id))?.len())?;
            let valid_len = scan_segment(&seg, id, &mut index)?;
            if valid_len < seg.len() {
                tracing::warn!(segment = id, valid_len, "truncating corrupt journal tail");
                seg.truncate_to(valid_len)?;
            }
            segments.push(Arc::new(seg));
        }

        if segments.is_empty() {
            segments.push(Arc::new(Segment::create(dir, 1, max_file_size)?));
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            max_file_size,
            sync_on_write,
            segments: Mutex::new(segments),
            index: Mutex::new(index),
        })
    }

    /// Appends one entry, rotating to a fresh segment first if it wouldn't
    /// fit in the current one. Returns the absolute position written.
    pub fn write(
        &self,
        direction: Direction,
        timestamp_ns: i64,
        seq_num: u32,
        msg_type: &[u8],
        payload: &[u8],
    ) -> JournalResult<Position> {
        let needed = Entry::encoded_len(msg_type, payload) as u64;
        if needed > self.max_file_size {
            return Err(JournalError::WriteFailed("entry larger than max segment size".into()));
        }

        let segment = {
            let mut segments = self.segments.lock().unwrap();
            let last = segments.last().unwrap().clone();
            if last.remaining() < needed {
                let new_id = last.segment_id + 1;
                let fresh = Arc::new(Segment::create(&self.dir, new_id, self.max_file_size)?);
                segments.push(fresh.clone());
                fresh
            } else {
                last
            }
        };

        let mut buf = vec![0u8; needed as usize];
        Entry::encode(&mut buf, timestamp_ns, direction, seq_num, msg_type, payload);
        let offset = segment.append(&buf).map_err(|e| JournalError::WriteFailed(e.to_string()))?;

        if self.sync_on_write {
            segment.sync()?;
        }

        self.index.lock().unwrap().insert(direction, seq_num, segment.segment_id, offset);
        Ok(Position { segment_id: segment.segment_id, offset })
    }

    pub fn sync(&self) -> JournalResult<()> {
        for segment in self.segments.lock().unwrap().iter() {
            segment.sync()?;
        }
        Ok(())
    }

    fn segment_by_id(&self, id: u32) -> Option<Arc<Segment>> {
        self.segments.lock().unwrap().iter().find(|s| s.segment_id == id).cloned()
    }

    pub fn get_latest(&self, direction: Direction) -> Option<OwnedEntry> {
        let (_, (segment_id, offset)) = self.index.lock().unwrap().latest(direction)?;
        let segment = self.segment_by_id(segment_id)?;
        let (entry, _) = Entry::decode(&segment.data()[offset as usize..], segment_id, offset).ok()?;
        Some(OwnedEntry::from_entry(&entry))
    }

    /// Iterates entries with `seq_num` in `[from_seq, to_seq]`; `to_seq ==
    /// 0` means "through the current end".
    pub fn replay(
        &self,
        direction: Direction,
        from_seq: u32,
        to_seq: u32,
        mut callback: impl FnMut(&Entry<'_>),
    ) -> JournalResult<()> {
        let to = if to_seq == 0 { None } else { Some(to_seq) };
        let locations = self.index.lock().unwrap().range(direction, from_seq, to);
        for (seq, segment_id, offset) in locations {
            let segment = self.segment_by_id(segment_id).ok_or(JournalError::EmptyStream(format!("segment {segment_id}")))?;
            let (entry, _) = Entry::decode(&segment.data()[offset as usize..], segment_id, offset)?;
            debug_assert_eq!(entry.seq_num, seq);
            callback(&entry);
        }
        Ok(())
    }

    pub fn replay_by_time(
        &self,
        direction: Direction,
        from_ns: i64,
        to_ns: i64,
        mut callback: impl FnMut(&Entry<'_>),
    ) -> JournalResult<()> {
        let locations = self.index.lock().unwrap().range(direction, 0, None);
        for (_, segment_id, offset) in locations {
            let segment = self.segment_by_id(segment_id).ok_or(JournalError::EmptyStream(format!("segment {segment_id}")))?;
            let (entry, _) = Entry::decode(&segment.data()[offset as usize..], segment_id, offset)?;
            if entry.timestamp_ns >= from_ns && entry.timestamp_ns <= to_ns {
                callback(&entry);
            }
        }
        Ok(())
    }

    pub(crate) fn latest_seq(&self, direction: Direction) -> u32 {
        self.index.lock().unwrap().latest(direction).map(|(seq, _)| seq).unwrap_or(0)
    }

    pub(crate) fn locate(&self, direction: Direction, seq_num: u32) -> Option<(Arc<Segment>, u64)> {
        let (segment_id, offset) = self.index.lock().unwrap().get(direction, seq_num)?;
        Some((self.segment_by_id(segment_id)?, offset))
    }
}

fn existing_segment_ids(dir: &Path) -> JournalResult<Vec<u32>> {
    let mut ids = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if let Some(name) = entry.file_name().to_str() {
            if let Some(stem) = name.strip_suffix(".log") {
                if let Ok(id) = stem.parse::<u32>() {
                    ids.push(id);
                }
            }
        }
    }
    Ok(ids)
}

/// Scans `segment` from the start, rebuilding `index` entries for every
/// well-formed record, and returns the byte length of the valid prefix.
fn scan_segment(segment: &Segment, segment_id: u32, index: &mut StreamIndex) -> JournalResult<u64> {
    let data = segment.data();
    let mut pos = 0usize;
    while pos < data.len() {
        match Entry::decode(&data[pos..], segment_id, pos as u64) {
            Ok((entry, consumed)) => {
                index.insert(entry.direction, entry.seq_num, segment_id, pos as u64);
                pos += consumed;
            }
            Err(_) => break,
        }
    }
    Ok(pos as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_then_replay_round_trips_in_order() {
        let dir = tempdir().unwrap();
        let stream = Stream::open(dir.path(), 4096, false).unwrap();
        for seq in 1..=5u32 {
            stream.write(Direction::Out, seq as i64, seq, b"A", format!("msg{seq}").as_bytes()).unwrap();
        }

        let mut seen = Vec::new();
        stream.replay(Direction::Out, 1, 0, |e| seen.push(e.seq_num)).unwrap();
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);

        let latest = stream.get_latest(Direction::Out).unwrap();
        assert_eq!(latest.seq_num, 5);
    }

    #[test]
    fn reopen_rebuilds_index_from_segments() {
        let dir = tempdir().unwrap();
        {
            let stream = Stream::open(dir.path(), 4096, false).unwrap();
            for seq in 1..=3u32 {
                stream.write(Direction::In, seq as i64, seq, b"A", b"x").unwrap();
            }
        }
        let reopened = Stream::open(dir.path(), 4096, false).unwrap();
        assert_eq!(reopened.latest_seq(Direction::In), 3);
    }

    #[test]
    fn rotates_to_a_new_segment_when_full() {
        let dir = tempdir().unwrap();
        let stream = Stream::open(dir.path(), 64, false).unwrap();
        for seq in 1..=10u32 {
            stream.write(Direction::Out, seq as i64, seq, b"A", b"0123456789").unwrap();
        }
        let segments = stream.segments.lock().unwrap();
        assert!(segments.len() > 1);
    }

    #[test]
    fn corrupt_tail_is_truncated_on_reopen() {
        let dir = tempdir().unwrap();
        {
            let stream = Stream::open(dir.path(), 4096, false).unwrap();
            stream.write(Direction::Out, 1, 1, b"A", b"good").unwrap();
        }
        // Corrupt a trailing byte to simulate a crash mid-write.
        let path = segment_path(dir.path(), 1);
        let mut bytes = fs::read(&path).unwrap();
        let valid_len = bytes.len();
        bytes.extend_from_slice(&[0xFFu8; 10]);
        fs::write(&path, &bytes).unwrap();

        let stream = Stream::open(dir.path(), 4096, false).unwrap();
        assert_eq!(stream.latest_seq(Direction::Out), 1);
        let _ = valid_len;
    }
}
