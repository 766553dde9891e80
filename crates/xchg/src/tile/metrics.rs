use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use xchg_timing::Instant;

/// In-process loop instrumentation for one tile. Counters are cheap atomics
/// consulted by the engine's own status/logging path; there is no external
/// metrics scraper in this core.
#[derive(Default)]
pub struct TileMetrics {
    latest_begin: AtomicU64,
    busy_ticks: AtomicU64,
    busy_max: AtomicU64,
    loop_count: AtomicU64,
    did_work_count: AtomicU32,
}

impl TileMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[inline]
    pub fn begin(&self, now: Instant) {
        self.latest_begin.store(now.0, Ordering::Relaxed);
    }

    #[inline]
    pub fn end(&self, did_work: bool) {
        self.loop_count.fetch_add(1, Ordering::Relaxed);
        if did_work {
            let started = self.latest_begin.load(Ordering::Relaxed);
            let duration = Instant::now().0.saturating_sub(started);
            self.busy_ticks.fetch_add(duration, Ordering::Relaxed);
            self.busy_max.fetch_max(duration, Ordering::Relaxed);
            self.did_work_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> TileSample {
        TileSample {
            busy_ticks_ns: self.busy_ticks.load(Ordering::Relaxed),
            busy_max_ns: self.busy_max.load(Ordering::Relaxed),
            loop_count: self.loop_count.load(Ordering::Relaxed),
            did_work_count: self.did_work_count.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TileSample {
    pub busy_ticks_ns: u64,
    pub busy_max_ns: u64,
    pub loop_count: u64,
    pub did_work_count: u32,
}
