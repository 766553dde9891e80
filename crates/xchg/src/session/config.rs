use std::net::SocketAddr;

use xchg_timing::Duration;

/// Wire protocol spoken by a session. The FSM picks which state machine
/// (`fix`/`ouch`) applies based on this.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProtocolVersion {
    Fix42,
    Fix44,
    Fix50,
    Ouch42,
    Ouch50,
}

impl ProtocolVersion {
    /// The FIX `BeginString` (tag 8) this version frames with. Panics if
    /// called on an OUCH version — callers branch on `is_fix()` first.
    pub fn fix_begin_string(self) -> &'static str {
        match self {
            ProtocolVersion::Fix42 => "FIX.4.2",
            ProtocolVersion::Fix44 => "FIX.4.4",
            ProtocolVersion::Fix50 => "FIXT.1.1",
            ProtocolVersion::Ouch42 | ProtocolVersion::Ouch50 => {
                unreachable!("fix_begin_string called on an OUCH protocol version")
            }
        }
    }

    pub fn is_fix(self) -> bool {
        matches!(self, ProtocolVersion::Fix42 | ProtocolVersion::Fix44 | ProtocolVersion::Fix50)
    }
}

/// Wall-clock end-of-day trigger. `tz_offset_minutes` is a fixed UTC offset
/// rather than a full tz-database zone — sessions that need DST-aware EOD
/// scheduling should express `hour`/`minute` already adjusted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EodTime {
    pub hour: u8,
    pub minute: u8,
    pub tz_offset_minutes: i16,
}

/// Per-session configuration (§3 Session Configuration, §6 config options).
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub addr: SocketAddr,
    pub heartbeat_interval: Duration,
    pub reset_on_logon: bool,
    pub eod_time: Option<EodTime>,
    pub reset_on_eod: bool,
    pub protocol_version: ProtocolVersion,
    /// `(username, password)` for SoupBinTCP login; unused by FIX sessions.
    pub auth: Option<(String, String)>,
    /// Ceiling on the initiator's exponential reconnect backoff.
    pub max_reconnect_backoff: Duration,
}
