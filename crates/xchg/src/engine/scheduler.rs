//! The single scheduler tile (§4.5 "Scheduler (one) — sleeps on the nearest
//! timer"): fires a regular tick for every registered session plus a
//! once-per-day EOD signal, handing both to the event loop rather than
//! touching session state itself (only the event loop thread owns that,
//! alongside the `TcpConnector`).

use std::sync::mpsc::{Receiver, Sender};

use mio::Token;
use xchg_timing::{Duration, Nanos, Repeater};

use crate::session::EodTime;
use crate::tile::Tile;

const SECS_PER_DAY: i64 = 86_400;

pub enum SchedulerSignal {
    Tick(Token),
    Eod(Token),
}

/// Cross-thread request to add/remove a session from the scheduler's
/// registry. The engine thread owns session lifecycle; the scheduler only
/// reacts to these rather than being handed direct access to sessions.
pub enum SchedulerCommand {
    Register { token: Token, eod_time: Option<EodTime> },
    Deregister { token: Token },
}

struct EodWatch {
    token: Token,
    target_minute_utc: i64,
    last_fired_day: Option<i64>,
}

fn target_minute_utc(eod: &EodTime) -> i64 {
    let local_minute = eod.hour as i64 * 60 + eod.minute as i64;
    (local_minute - eod.tz_offset_minutes as i64).rem_euclid(24 * 60)
}

fn day_and_minute_utc(now_ns: i64) -> (i64, i64) {
    let secs = now_ns.div_euclid(1_000_000_000);
    (secs.div_euclid(SECS_PER_DAY), secs.rem_euclid(SECS_PER_DAY) / 60)
}

/// Drives every registered session's heartbeat/test-request/reconnect timer
/// (via a periodic `Tick`) and each session's configured end-of-day trigger.
pub struct SchedulerTile {
    tokens: Vec<Token>,
    eod_watches: Vec<EodWatch>,
    tick: Repeater,
    tx: Sender<SchedulerSignal>,
    commands: Receiver<SchedulerCommand>,
}

impl SchedulerTile {
    pub fn new(tick_interval: Duration, tx: Sender<SchedulerSignal>, commands: Receiver<SchedulerCommand>) -> Self {
        Self { tokens: Vec::new(), eod_watches: Vec::new(), tick: Repeater::every(tick_interval), tx, commands }
    }

    fn register(&mut self, token: Token, eod_time: Option<EodTime>) {
        self.tokens.push(token);
        if let Some(eod) = eod_time {
            self.eod_watches.push(EodWatch {
                token,
                target_minute_utc: target_minute_utc(&eod),
                last_fired_day: None,
            });
        }
    }

    fn deregister(&mut self, token: Token) {
        self.tokens.retain(|t| *t != token);
        self.eod_watches.retain(|w| w.token != token);
    }
}

impl Tile for SchedulerTile {
    fn loop_body(&mut self) -> bool {
        let mut did_work = false;

        while let Ok(cmd) = self.commands.try_recv() {
            match cmd {
                SchedulerCommand::Register { token, eod_time } => self.register(token, eod_time),
                SchedulerCommand::Deregister { token } => self.deregister(token),
            }
            did_work = true;
        }

        if self.tick.fired() {
            for &token in &self.tokens {
                if self.tx.send(SchedulerSignal::Tick(token)).is_err() {
                    return did_work;
                }
            }
            did_work = true;
        }

        let (day, minute) = day_and_minute_utc(i64::from(Nanos::now()));
        for watch in &mut self.eod_watches {
            if minute == watch.target_minute_utc && watch.last_fired_day != Some(day) {
                watch.last_fired_day = Some(day);
                if self.tx.send(SchedulerSignal::Eod(watch.token)).is_err() {
                    return did_work;
                }
                did_work = true;
            }
        }

        did_work
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_minute_accounts_for_offset() {
        let eod = EodTime { hour: 17, minute: 0, tz_offset_minutes: -300 }; // UTC-5
        assert_eq!(target_minute_utc(&eod), 17 * 60 + 300);
    }

    #[test]
    fn day_and_minute_decompose_ns() {
        let (day, minute) = day_and_minute_utc(SECS_PER_DAY * 1_000_000_000 + 90 * 60 * 1_000_000_000);
        assert_eq!(day, 1);
        assert_eq!(minute, 90);
    }
}
