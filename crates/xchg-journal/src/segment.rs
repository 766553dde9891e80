use std::cell::UnsafeCell;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use memmap2::MmapMut;

use crate::error::JournalResult;

/// One memory-mapped, append-only segment file. A single writer appends via
/// `append`; any number of readers observe `data()`, which never exposes
/// bytes past the writer's last release-stored `len`.
pub struct Segment {
    path: PathBuf,
    pub segment_id: u32,
    file: File,
    mmap: UnsafeCell<MmapMut>,
    capacity: u64,
    len: AtomicU64,
}

// SAFETY: `mmap` is only mutated by the single writer thread that owns this
// segment (via `append`); readers only ever read `[0..len)` with an
// acquire-load of `len`, matching the writer's release-store on append.
unsafe impl Sync for Segment {}

impl Segment {
    /// Creates a new segment file of `capacity` bytes (pre-allocated via
    /// `set_len`) and maps it for writing.
    pub fn create(dir: &Path, segment_id: u32, capacity: u64) -> JournalResult<Self> {
        let path = segment_path(dir, segment_id);
        let file = OpenOptions::new().read(true).write(true).create(true).truncate(true).open(&path)?;
        file.set_len(capacity)?;
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self { path, segment_id, file, mmap: UnsafeCell::new(mmap), capacity, len: AtomicU64::new(0) })
    }

    /// Opens an existing segment, scanning is the caller's responsibility;
    /// `known_len` is the writer-visible length to seed the atomic cursor
    /// with (from a prior scan-on-open pass).
    pub fn open(dir: &Path, segment_id: u32, known_len: u64) -> JournalResult<Self> {
        let path = segment_path(dir, segment_id);
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let capacity = file.metadata()?.len();
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self { path, segment_id, file, mmap: UnsafeCell::new(mmap), capacity, len: AtomicU64::new(known_len) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn len(&self) -> u64 {
        self.len.load(Ordering::Acquire)
    }

    pub fn remaining(&self) -> u64 {
        self.capacity - self.len()
    }

    /// Bytes available to readers: always a prefix of what's been appended.
    pub fn data(&self) -> &[u8] {
        let len = self.len() as usize;
        // SAFETY: writer never shrinks `len`, and never rewrites bytes below
        // the previously published `len`; this read-only slice is a
        // snapshot taken after an acquire-load.
        unsafe { &(*self.mmap.get())[..len] }
    }

    /// Appends `bytes` at the current write position. Caller (the segment
    /// pool) is responsible for checking `remaining() >= bytes.len()`
    /// before calling.
    pub fn append(&self, bytes: &[u8]) -> JournalResult<u64> {
        let offset = self.len();
        debug_assert!(offset + bytes.len() as u64 <= self.capacity);
        // SAFETY: single-writer invariant; no reader ever observes bytes
        // past `len`, which we only publish after the copy completes.
        unsafe {
            let mmap = &mut *self.mmap.get();
            mmap[offset as usize..offset as usize + bytes.len()].copy_from_slice(bytes);
        }
        self.len.store(offset + bytes.len() as u64, Ordering::Release);
        Ok(offset)
    }

    /// Flushes mapped pages to disk (`msync`-equivalent).
    pub fn sync(&self) -> JournalResult<()> {
        // SAFETY: flush only reads the mapping.
        unsafe { (*self.mmap.get()).flush_async()? };
        Ok(())
    }

    /// Truncates the backing file to `len` bytes, used both to seal a
    /// rotated segment at its logical length and to recover from a
    /// corrupt tail on open.
    pub fn truncate_to(&mut self, len: u64) -> JournalResult<()> {
        self.file.set_len(len)?;
        self.len.store(len, Ordering::Release);
        Ok(())
    }
}

pub fn segment_path(dir: &Path, segment_id: u32) -> PathBuf {
    dir.join(format!("{segment_id:09}.log"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_and_read_back() {
        let dir = tempdir().unwrap();
        let seg = Segment::create(dir.path(), 1, 4096).unwrap();
        let off = seg.append(b"hello").unwrap();
        assert_eq!(off, 0);
        assert_eq!(seg.data(), b"hello");
        let off2 = seg.append(b"world").unwrap();
        assert_eq!(off2, 5);
        assert_eq!(seg.data(), b"helloworld");
    }

    #[test]
    fn truncate_recovers_partial_tail() {
        let dir = tempdir().unwrap();
        let mut seg = Segment::create(dir.path(), 1, 4096).unwrap();
        seg.append(b"goodgarbage").unwrap();
        seg.truncate_to(4).unwrap();
        assert_eq!(seg.data(), b"good");
    }
}
