use std::{
    cell::UnsafeCell,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering, compiler_fence},
    },
    thread::{self, Thread},
    time::Duration,
};

use crate::error::RingError;

/// Default slot payload capacity (bytes). Matches the spec's default of
/// 4 KiB per slot; large enough for a FIX or OUCH application message.
pub const DEFAULT_PAYLOAD_CAP: usize = 4096;

/// Default slot count. Must be a power of two.
pub const DEFAULT_CAPACITY: usize = 1024;

struct Slot<const CAP: usize> {
    msg_type: u8,
    seq_num: u32,
    payload_len: u32,
    payload: [u8; CAP],
}

impl<const CAP: usize> Slot<CAP> {
    const fn new() -> Self {
        Self { msg_type: 0, seq_num: 0, payload_len: 0, payload: [0; CAP] }
    }
}

struct RingInner<const CAP: usize> {
    mask: u64,
    write_cursor: AtomicU64,
    read_cursor: AtomicU64,
    slots: Box<[UnsafeCell<Slot<CAP>>]>,
    consumer_thread: std::sync::Mutex<Option<Thread>>,
}

unsafe impl<const CAP: usize> Sync for RingInner<CAP> {}

/// Single-producer half of the ring. Lives on the application thread.
pub struct Producer<const CAP: usize = DEFAULT_PAYLOAD_CAP> {
    inner: Arc<RingInner<CAP>>,
}

unsafe impl<const CAP: usize> Send for Producer<CAP> {}

/// Single-consumer half of the ring. Lives on the writer thread.
pub struct Consumer<const CAP: usize = DEFAULT_PAYLOAD_CAP> {
    inner: Arc<RingInner<CAP>>,
}

unsafe impl<const CAP: usize> Send for Consumer<CAP> {}

/// Create an SPSC ring with `capacity` slots (rounded up to a power of two)
/// each carrying up to `CAP` payload bytes.
pub fn ring<const CAP: usize>(capacity: usize) -> (Producer<CAP>, Consumer<CAP>) {
    let capacity = capacity.next_power_of_two();
    let mut slots = Vec::with_capacity(capacity);
    slots.resize_with(capacity, || UnsafeCell::new(Slot::new()));
    let inner = Arc::new(RingInner {
        mask: capacity as u64 - 1,
        write_cursor: AtomicU64::new(0),
        read_cursor: AtomicU64::new(0),
        slots: slots.into_boxed_slice(),
        consumer_thread: std::sync::Mutex::new(None),
    });
    (Producer { inner: inner.clone() }, Consumer { inner })
}

/// A claimed, not-yet-committed slot. Write directly into `payload_mut()`;
/// no data is copied until the caller chooses to write to the slot.
pub struct SlotHandle<'a, const CAP: usize> {
    ring: &'a Producer<CAP>,
    index: u64,
}

impl<'a, const CAP: usize> SlotHandle<'a, CAP> {
    #[inline]
    fn slot(&self) -> &mut Slot<CAP> {
        let idx = (self.index & self.ring.inner.mask) as usize;
        unsafe { &mut *self.ring.inner.slots[idx].get() }
    }

    #[inline]
    pub fn payload_mut(&mut self) -> &mut [u8; CAP] {
        &mut self.slot().payload
    }

    #[inline]
    pub fn set_msg_type(&mut self, msg_type: u8) {
        self.slot().msg_type = msg_type;
    }

    #[inline]
    pub fn set_payload_len(&mut self, len: u32) {
        self.slot().payload_len = len;
    }

    /// Publish the slot to the consumer. Sequence numbers are not assigned
    /// here: the writer thread assigns them at consume time so that wire
    /// order and journal order are identical even if producers stall.
    #[inline]
    pub fn commit(self) {
        // Release-store of the write cursor: everything written into the
        // slot above becomes visible to the consumer's acquire-load.
        compiler_fence(Ordering::Release);
        self.ring.inner.write_cursor.store(self.index + 1, Ordering::Release);
        if let Some(t) = self.ring.inner.consumer_thread.lock().unwrap().as_ref() {
            t.unpark();
        }
    }
}

impl<const CAP: usize> Producer<CAP> {
    /// Returns `None` (never blocks) when the ring is full. Caller policy
    /// per the spec: latency-sensitive callers propagate `RingError::Full`;
    /// throughput-oriented callers may spin up to a bounded budget.
    #[inline]
    pub fn try_claim(&self) -> Result<SlotHandle<'_, CAP>, RingError> {
        let write = self.inner.write_cursor.load(Ordering::Relaxed);
        let read = self.inner.read_cursor.load(Ordering::Acquire);
        if write.wrapping_sub(read) >= self.inner.mask + 1 {
            return Err(RingError::Full);
        }
        Ok(SlotHandle { ring: self, index: write })
    }

    #[inline]
    pub fn len(&self) -> u64 {
        let write = self.inner.write_cursor.load(Ordering::Relaxed);
        let read = self.inner.read_cursor.load(Ordering::Acquire);
        write.wrapping_sub(read)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> u64 {
        self.inner.mask + 1
    }
}

/// A committed slot observed by the consumer. Dropping without calling
/// `release()` leaks the slot (it will never be reused); callers must always
/// release after processing.
pub struct ConsumedSlot<'a, const CAP: usize> {
    ring: &'a Consumer<CAP>,
    index: u64,
}

impl<'a, const CAP: usize> ConsumedSlot<'a, CAP> {
    #[inline]
    fn slot(&self) -> &Slot<CAP> {
        let idx = (self.index & self.ring.inner.mask) as usize;
        unsafe { &*self.ring.inner.slots[idx].get() }
    }

    #[inline]
    pub fn msg_type(&self) -> u8 {
        self.slot().msg_type
    }

    #[inline]
    pub fn payload(&self) -> &[u8] {
        let slot = self.slot();
        &slot.payload[..slot.payload_len as usize]
    }

    /// Assign the outbound sequence number at consume time (see module docs).
    #[inline]
    pub fn set_seq_num(&self, seq_num: u32) {
        let idx = (self.index & self.ring.inner.mask) as usize;
        unsafe { (*self.ring.inner.slots[idx].get()).seq_num = seq_num };
    }

    #[inline]
    pub fn seq_num(&self) -> u32 {
        self.slot().seq_num
    }

    /// Advance the read cursor, returning the slot to the producer's pool.
    #[inline]
    pub fn release(self) {
        compiler_fence(Ordering::Release);
        self.ring.inner.read_cursor.store(self.index + 1, Ordering::Release);
    }
}

impl<const CAP: usize> Consumer<CAP> {
    /// Non-blocking poll; returns `None` immediately if nothing is ready.
    #[inline]
    pub fn try_consume(&self) -> Option<ConsumedSlot<'_, CAP>> {
        let read = self.inner.read_cursor.load(Ordering::Relaxed);
        let write = self.inner.write_cursor.load(Ordering::Acquire);
        if read == write {
            return None;
        }
        Some(ConsumedSlot { ring: self, index: read })
    }

    /// Spins briefly, then parks the calling thread for up to `timeout`
    /// waiting for a producer commit. Registers the calling thread so
    /// `commit()` can unpark it; intended to be called from a single,
    /// stable writer thread.
    pub fn blocking_consume(&self, timeout: Duration) -> Option<ConsumedSlot<'_, CAP>> {
        if let Some(slot) = self.try_consume() {
            return Some(slot);
        }
        *self.inner.consumer_thread.lock().unwrap() = Some(thread::current());
        for _ in 0..1000 {
            if let Some(slot) = self.try_consume() {
                return Some(slot);
            }
            std::hint::spin_loop();
        }
        thread::park_timeout(timeout);
        self.try_consume()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_commit_consume_fifo() {
        let (p, c) = ring::<64>(8);
        for i in 0u8..5 {
            let mut h = p.try_claim().unwrap();
            h.payload_mut()[0] = i;
            h.set_payload_len(1);
            h.set_msg_type(b'D');
            h.commit();
        }
        for i in 0u8..5 {
            let s = c.try_consume().unwrap();
            assert_eq!(s.payload()[0], i);
            assert_eq!(s.msg_type(), b'D');
            s.release();
        }
        assert!(c.try_consume().is_none());
    }

    #[test]
    fn full_ring_rejects() {
        let (p, _c) = ring::<8>(4);
        for _ in 0..4 {
            p.try_claim().unwrap().commit();
        }
        assert_eq!(p.try_claim().unwrap_err(), RingError::Full);
    }

    #[test]
    fn slot_reused_after_release() {
        let (p, c) = ring::<8>(2);
        p.try_claim().unwrap().commit();
        p.try_claim().unwrap().commit();
        assert!(p.try_claim().is_err());
        c.try_consume().unwrap().release();
        assert!(p.try_claim().is_ok());
    }

    #[test]
    fn seq_num_assigned_by_consumer() {
        let (p, c) = ring::<8>(4);
        p.try_claim().unwrap().commit();
        let s = c.try_consume().unwrap();
        assert_eq!(s.seq_num(), 0);
        s.set_seq_num(42);
        assert_eq!(s.seq_num(), 42);
        s.release();
    }

    #[test]
    fn spsc_threaded_fifo() {
        let (p, c) = ring::<64>(16);
        let n = 10_000usize;
        let producer = std::thread::spawn(move || {
            for i in 0..n {
                loop {
                    if let Ok(mut h) = p.try_claim() {
                        let bytes = (i as u32).to_le_bytes();
                        h.payload_mut()[..4].copy_from_slice(&bytes);
                        h.set_payload_len(4);
                        h.commit();
                        break;
                    }
                    std::hint::spin_loop();
                }
            }
        });
        for i in 0..n {
            let s = loop {
                if let Some(s) = c.blocking_consume(Duration::from_millis(50)) {
                    break s;
                }
            };
            let got = u32::from_le_bytes(s.payload()[..4].try_into().unwrap());
            assert_eq!(got as usize, i);
            s.release();
        }
        producer.join().unwrap();
    }
}
