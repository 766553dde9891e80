pub mod metrics;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use tracing::{Level, info, span};
use xchg_timing::{Duration, Instant};
use xchg_utils::{ShortTypename, ThreadPriority, short_typename, thread_boot, vsync};

use crate::tile::metrics::TileMetrics;

pub type TileID = u16;
pub type TileName = ShortTypename;

/// A shared flag every tile's loop checks at the end of each iteration.
/// Cloning it (e.g. into a `ctrlc` handler) lets any part of the process
/// request an orderly shutdown.
#[derive(Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct TileConfig {
    core: Option<usize>,
    thread_prio: ThreadPriority,
    min_loop_duration: Option<Duration>,
    metrics: bool,
}

impl TileConfig {
    pub fn new(core: usize, thread_prio: ThreadPriority) -> Self {
        Self { core: Some(core), thread_prio, min_loop_duration: None, metrics: true }
    }

    /// Boot a tile with a background (non-hot-path) config. Supports
    /// optional vsync pacing and relaxed scheduling.
    pub fn background(core: Option<usize>, min_loop_duration: Option<Duration>) -> Self {
        Self { core, thread_prio: ThreadPriority::OSDefault, min_loop_duration, metrics: true }
    }

    pub fn without_metrics(mut self) -> Self {
        self.metrics = false;
        self
    }
}

/// A fixed execution unit, typically pinned to a CPU core: the event loop,
/// a session's writer, or the scheduler (§4.5/§5).
pub trait Tile: Send + Sized + 'static {
    /// Runs one iteration of the tile's work. Returns whether it did any
    /// useful work this iteration (drives metrics' busy/idle accounting).
    fn loop_body(&mut self) -> bool;

    /// Runs repeatedly before the main loop until it returns `true`, or
    /// until `stop_flag` is observed set.
    fn try_init(&mut self) -> bool {
        true
    }

    fn teardown(self) {}

    /// Tile name for logging. No heap allocation.
    fn name(&self) -> TileName {
        short_typename::<Self>()
    }
}

/// Boots and runs a tile on its own OS thread: pins affinity/priority, runs
/// `try_init` to completion, then loops `loop_body` until `stop_flag` is
/// set, then tears down. Returns the thread's `JoinHandle`.
pub fn attach_tile<T: Tile>(mut tile: T, stop_flag: StopFlag, config: TileConfig) -> JoinHandle<()> {
    let metrics = if config.metrics { Some(TileMetrics::new()) } else { None };

    std::thread::spawn(move || {
        let _span = span!(Level::INFO, "", tile = %tile.name()).entered();
        thread_boot(config.core, config.thread_prio);

        while !tile.try_init() {
            if stop_flag.is_stopped() {
                tile.teardown();
                info!("tile exited before initialisation; teardown complete");
                return;
            }
            std::hint::spin_loop();
        }
        info!("tile init complete");

        loop {
            let begin = Instant::now();
            if let Some(m) = &metrics {
                m.begin(begin);
            }

            let did_work = vsync(config.min_loop_duration, || tile.loop_body());

            if let Some(m) = &metrics {
                m.end(did_work);
            }

            if stop_flag.is_stopped() {
                break;
            }
        }

        tile.teardown();
        info!("tile teardown complete");
    })
}
