use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use std::time::Duration as StdDuration;

use xchg::tile::{StopFlag, Tile, TileConfig, attach_tile};
use xchg_ring::{DEFAULT_CAPACITY, ring};
use xchg_timing::Duration;

/// End-to-end exercise of the tile + ring pipeline (C2, §5): a producer tile
/// claims and commits slots, a consumer tile drains them, and both run to
/// completion driven entirely by `StopFlag`.
struct ProducerTile<const CAP: usize> {
    producer: xchg_ring::Producer<CAP>,
    next: u64,
    want: u64,
}

impl<const CAP: usize> Tile for ProducerTile<CAP> {
    fn loop_body(&mut self) -> bool {
        if self.next > self.want {
            return false;
        }
        let Ok(mut slot) = self.producer.try_claim() else { return false };
        slot.payload_mut()[..8].copy_from_slice(&self.next.to_le_bytes());
        slot.set_payload_len(8);
        slot.commit();
        self.next += 1;
        true
    }
}

struct ConsumerTile<const CAP: usize> {
    consumer: xchg_ring::Consumer<CAP>,
    received: Arc<AtomicU64>,
    stop: StopFlag,
}

impl<const CAP: usize> Tile for ConsumerTile<CAP> {
    fn loop_body(&mut self) -> bool {
        let Some(slot) = self.consumer.try_consume() else { return false };
        let val = u64::from_le_bytes(slot.payload()[..8].try_into().unwrap());
        self.received.store(val, Ordering::Relaxed);
        slot.release();
        if val == 42 {
            self.stop.request_stop();
        }
        true
    }
}

#[test]
fn end_to_end_send_receive_and_exit() {
    let (producer, consumer) = ring::<4096>(DEFAULT_CAPACITY);

    let got = Arc::new(AtomicU64::new(0));
    let want = 42u64;
    let stop = StopFlag::new();

    let producer_tile = ProducerTile { producer, next: 0, want };
    let consumer_tile = ConsumerTile { consumer, received: got.clone(), stop: stop.clone() };

    let producer_handle =
        attach_tile(producer_tile, stop.clone(), TileConfig::background(None, Some(Duration::from_millis(1))));
    let consumer_handle =
        attach_tile(consumer_tile, stop.clone(), TileConfig::background(None, None));

    // The consumer requests the shared stop once it has seen `want`; give it
    // a generous bound so a flaky scheduler doesn't hang the test forever.
    let deadline = std::time::Instant::now() + StdDuration::from_secs(5);
    while !stop.is_stopped() && std::time::Instant::now() < deadline {
        std::thread::sleep(StdDuration::from_millis(1));
    }
    stop.request_stop();

    producer_handle.join().unwrap();
    consumer_handle.join().unwrap();

    assert_eq!(got.load(Ordering::Relaxed), want);
}
