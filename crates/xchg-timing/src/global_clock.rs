use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use once_cell::sync::OnceCell;
use quanta::Mock;

use crate::Nanos;

pub type Clock = quanta::Clock;

/// Process-wide clock abstraction. `Clock` wraps a `quanta::Clock` (real or
/// mocked, used in tests); `System` is the fallback used before the global
/// clock has been installed.
#[derive(Clone, Debug)]
pub enum OurClockForNanos {
    Clock(Clock),
    System,
}

impl OurClockForNanos {
    #[inline]
    pub fn raw(&self) -> u64 {
        match self {
            OurClockForNanos::Clock(clock) => clock.delta_as_nanos(0, clock.raw()),
            OurClockForNanos::System => unsafe {
                SystemTime::now().duration_since(UNIX_EPOCH).unwrap_unchecked().as_nanos() as u64
            },
        }
    }

    #[inline]
    pub fn now(&self) -> Nanos {
        Nanos(self.raw())
    }
}

// Installed exactly once before any session starts; see the engine's startup sequence.
static GLOBAL_CLOCK: OnceCell<OurClockForNanos> = OnceCell::new();
static GLOBAL_CLOCK_NON_MOCKED: OnceCell<Clock> = OnceCell::new();

/// Installs a mocked clock as the process-wide clock. Intended for tests
/// only; panics if another thread raced to install a different mock first.
#[inline]
pub fn init_global_with_mock() -> Arc<Mock> {
    let (mock, controller) = Clock::mock();
    let clock = GLOBAL_CLOCK.get_or_init(|| OurClockForNanos::Clock(mock));
    assert_eq!(clock.raw(), 0, "do not initialize the global mock clock from 2 different threads");
    controller
}

#[inline]
pub fn global_clock() -> &'static OurClockForNanos {
    GLOBAL_CLOCK.get_or_init(|| OurClockForNanos::System)
}

/// Always a real, unmocked clock. Used by `Duration`/`Instant` conversions
/// that must stay meaningful even under a mocked global clock.
#[inline]
pub fn global_clock_not_mocked() -> &'static Clock {
    GLOBAL_CLOCK_NON_MOCKED.get_or_init(Clock::new)
}
