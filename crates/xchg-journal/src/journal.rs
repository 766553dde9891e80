use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::entry::{Direction, Entry};
use crate::error::{JournalError, JournalResult};
use crate::reader::Reader;
use crate::stream::{OwnedEntry, Position, Stream};

pub const DEFAULT_MAX_FILE_SIZE: u64 = 256 * 1024 * 1024;

/// Configuration accepted by [`Journal::open`], matching the
/// `persistence.*` options the core recognizes.
#[derive(Debug, Clone)]
pub struct JournalConfig {
    pub base_path: PathBuf,
    pub max_file_size: u64,
    pub sync_on_write: bool,
    pub max_streams: usize,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("journal"),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            sync_on_write: false,
            max_streams: 256,
        }
    }
}

/// The memory-mapped, append-only journal (C3): one directory per stream
/// under `base_path`, created lazily on first write and persisting across
/// restarts.
pub struct Journal {
    config: JournalConfig,
    streams: Mutex<HashMap<String, Arc<Stream>>>,
}

impl Journal {
    pub fn open(config: JournalConfig) -> JournalResult<Self> {
        std::fs::create_dir_all(&config.base_path)?;
        Ok(Self { config, streams: Mutex::new(HashMap::new()) })
    }

    /// Returns the `Arc<Stream>` backing `stream_name`, opening it lazily if
    /// this is the first reference. Lets a caller (e.g. a session FSM) hold
    /// the stream directly instead of going through `Journal`'s per-call
    /// wrappers for every write.
    pub fn open_stream(&self, stream_name: &str) -> JournalResult<Arc<Stream>> {
        self.stream(stream_name)
    }

    fn stream(&self, stream_name: &str) -> JournalResult<Arc<Stream>> {
        let mut streams = self.streams.lock().unwrap();
        if let Some(stream) = streams.get(stream_name) {
            return Ok(stream.clone());
        }
        if streams.len() >= self.config.max_streams {
            return Err(JournalError::WriteFailed(format!(
                "max_streams ({}) exceeded opening {stream_name:?}",
                self.config.max_streams
            )));
        }
        let dir = stream_dir(&self.config.base_path, stream_name);
        let stream = Arc::new(Stream::open(&dir, self.config.max_file_size, self.config.sync_on_write)?);
        streams.insert(stream_name.to_string(), stream.clone());
        Ok(stream)
    }

    pub fn write(
        &self,
        stream_name: &str,
        direction: Direction,
        timestamp_ns: i64,
        seq_num: u32,
        msg_type: &[u8],
        payload: &[u8],
    ) -> JournalResult<Position> {
        self.stream(stream_name)?.write(direction, timestamp_ns, seq_num, msg_type, payload)
    }

    pub fn replay(
        &self,
        stream_name: &str,
        direction: Direction,
        from_seq: u32,
        to_seq: u32,
        callback: impl FnMut(&Entry<'_>),
    ) -> JournalResult<()> {
        self.stream(stream_name)?.replay(direction, from_seq, to_seq, callback)
    }

    pub fn replay_by_time(
        &self,
        stream_name: &str,
        direction: Direction,
        from_ns: i64,
        to_ns: i64,
        callback: impl FnMut(&Entry<'_>),
    ) -> JournalResult<()> {
        self.stream(stream_name)?.replay_by_time(direction, from_ns, to_ns, callback)
    }

    pub fn get_latest(&self, stream_name: &str, direction: Direction) -> JournalResult<Option<OwnedEntry>> {
        Ok(self.stream(stream_name)?.get_latest(direction))
    }

    pub fn create_reader(&self, stream_name: &str, direction: Direction, start_pos: i64) -> JournalResult<Reader> {
        Ok(Reader::new(self.stream(stream_name)?, direction, start_pos))
    }

    pub fn sync(&self) -> JournalResult<()> {
        for stream in self.streams.lock().unwrap().values() {
            stream.sync()?;
        }
        Ok(())
    }

    /// Unmaps and drops every open stream. Safe to call even with readers
    /// still holding a `Reader` onto a stream's `Arc`; they keep their own
    /// reference alive until dropped.
    pub fn close(&self) -> JournalResult<()> {
        self.sync()?;
        self.streams.lock().unwrap().clear();
        Ok(())
    }
}

fn stream_dir(base_path: &Path, stream_name: &str) -> PathBuf {
    base_path.join(stream_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writes_and_replays_across_streams_independently() {
        let dir = tempdir().unwrap();
        let journal = Journal::open(JournalConfig {
            base_path: dir.path().to_path_buf(),
            max_file_size: 4096,
            sync_on_write: false,
            max_streams: 8,
        })
        .unwrap();

        journal.write("CLIENT->EXCH", Direction::Out, 1, 1, b"A", b"logon").unwrap();
        journal.write("OTHER->EXCH", Direction::Out, 1, 1, b"A", b"logon2").unwrap();

        let latest = journal.get_latest("CLIENT->EXCH", Direction::Out).unwrap().unwrap();
        assert_eq!(latest.payload, b"logon");
        let latest2 = journal.get_latest("OTHER->EXCH", Direction::Out).unwrap().unwrap();
        assert_eq!(latest2.payload, b"logon2");
    }

    #[test]
    fn reader_tracks_tail_across_journal_writes() {
        let dir = tempdir().unwrap();
        let journal = Journal::open(JournalConfig {
            base_path: dir.path().to_path_buf(),
            ..JournalConfig::default()
        })
        .unwrap();
        journal.write("S", Direction::In, 1, 1, b"A", b"one").unwrap();
        let mut reader = journal.create_reader("S", Direction::In, crate::reader::START).unwrap();
        journal.write("S", Direction::In, 2, 2, b"A", b"two").unwrap();

        let mut seqs = Vec::new();
        reader.drain(|e| seqs.push(e.seq_num));
        assert_eq!(seqs, vec![1, 2]);
    }
}
