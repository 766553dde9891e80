//! Protocol-erased session handle (§4.5): the event loop and scheduler are
//! written against this instead of matching on `FixSession`/`OuchSession`
//! everywhere a session needs to be driven.

use std::sync::Arc;
use std::sync::atomic::AtomicU32;

use xchg_codec::error::CodecError;
use xchg_codec::fix::{self, IncomingMessage};
use xchg_codec::soupbintcp::{self, Packet};

use crate::session::error::SessionError;
use crate::session::fix::{FixEvent, FixSession};
use crate::session::identity::SessionIdentity;
use crate::session::managed::{ManagedSession, ManagedState};
use crate::session::ouch::{OuchEvent, OuchSession};

/// Protocol-erased outcome of driving a session. The engine matches on this
/// to decide what to dispatch to the application listener (§4.5, §9).
#[derive(Debug)]
pub enum AnySessionEvent {
    None,
    StateChanged(ManagedState),
    Application { seq: u32 },
    GapDetected { from: u32, to: u32 },
    Rejected { ref_seq: u32, reason: i32 },
    LoginRejected { reason: u8 },
    DisconnectRequested,
}

impl From<FixEvent> for AnySessionEvent {
    fn from(ev: FixEvent) -> Self {
        match ev {
            FixEvent::None => AnySessionEvent::None,
            FixEvent::StateChanged(s) => AnySessionEvent::StateChanged(s.managed()),
            FixEvent::Application { seq } => AnySessionEvent::Application { seq },
            FixEvent::GapDetected { from, to } => AnySessionEvent::GapDetected { from, to },
            FixEvent::Rejected { ref_seq, reason } => AnySessionEvent::Rejected { ref_seq, reason },
            FixEvent::DisconnectRequested => AnySessionEvent::DisconnectRequested,
        }
    }
}

impl From<OuchEvent> for AnySessionEvent {
    fn from(ev: OuchEvent) -> Self {
        match ev {
            OuchEvent::None => AnySessionEvent::None,
            OuchEvent::StateChanged(s) => AnySessionEvent::StateChanged(s.managed()),
            OuchEvent::Application { seq } => AnySessionEvent::Application { seq },
            OuchEvent::LoginRejected { reason } => AnySessionEvent::LoginRejected { reason },
            OuchEvent::DisconnectRequested => AnySessionEvent::DisconnectRequested,
        }
    }
}

/// Either protocol's session, behind one type the engine can hold per
/// connection `Token` (§4.5 "Event loop (one)").
pub enum AnySession {
    Fix(FixSession),
    Ouch(OuchSession),
}

impl AnySession {
    pub fn identity(&self) -> &SessionIdentity {
        match self {
            AnySession::Fix(s) => s.identity(),
            AnySession::Ouch(s) => s.identity(),
        }
    }

    pub fn shared_outgoing_seq(&self) -> Arc<AtomicU32> {
        match self {
            AnySession::Fix(s) => s.shared_outgoing_seq(),
            AnySession::Ouch(s) => s.shared_outgoing_seq(),
        }
    }

    pub fn on_tcp_connected(&mut self, now_ns: i64, send: &mut dyn FnMut(&[u8])) -> Result<AnySessionEvent, SessionError> {
        match self {
            AnySession::Fix(s) => Ok(s.on_tcp_connected(now_ns, send)?.into()),
            AnySession::Ouch(s) => Ok(s.on_tcp_connected(now_ns, send)?.into()),
        }
    }

    pub fn on_tcp_failed(&mut self) -> AnySessionEvent {
        match self {
            AnySession::Fix(s) => s.on_tcp_failed().into(),
            AnySession::Ouch(s) => s.on_tcp_failed().into(),
        }
    }

    pub fn on_tick(&mut self, now_ns: i64, send: &mut dyn FnMut(&[u8])) -> Result<AnySessionEvent, SessionError> {
        match self {
            AnySession::Fix(s) => Ok(s.on_tick(now_ns, send)?.into()),
            AnySession::Ouch(s) => Ok(s.on_tick(now_ns, send)?.into()),
        }
    }

    /// EOD reset (§4.4). OUCH has no wire-level reset; resumption there is
    /// driven by `requested_sequence_number` at the next login, so this is a
    /// no-op for `AnySession::Ouch`.
    pub fn on_eod(&mut self, now_ns: i64, send: &mut dyn FnMut(&[u8])) -> Result<AnySessionEvent, SessionError> {
        match self {
            AnySession::Fix(s) => Ok(s.on_eod(now_ns, send)?.into()),
            AnySession::Ouch(_) => Ok(AnySessionEvent::None),
        }
    }

    pub fn send_logout(&mut self, now_ns: i64, send: &mut dyn FnMut(&[u8])) -> Result<(), SessionError> {
        match self {
            AnySession::Fix(s) => s.initiate_logout(now_ns, send),
            AnySession::Ouch(s) => s.send_logout(now_ns, send),
        }
    }

    /// Feeds newly-arrived bytes to the session's protocol framer, driving
    /// every complete frame through `on_inbound` in order. Returns the number
    /// of bytes consumed (pass to `TcpConnector::consume`) and the events
    /// each frame produced.
    pub fn feed_inbound(
        &mut self,
        now_ns: i64,
        buf: &[u8],
        send: &mut dyn FnMut(&[u8]),
    ) -> Result<(usize, Vec<AnySessionEvent>), SessionError> {
        let mut consumed = 0usize;
        let mut events = Vec::new();
        loop {
            let remaining = &buf[consumed..];
            match self {
                AnySession::Fix(session) => {
                    let len = match fix::frame_len(remaining) {
                        Ok(len) => len,
                        Err(CodecError::NeedMore) => break,
                        Err(err) => return Err(err.into()),
                    };
                    let frame = &remaining[..len];
                    let msg = IncomingMessage::parse(frame).map_err(SessionError::from)?;
                    events.push(session.on_inbound(now_ns, &msg, frame, send)?.into());
                    consumed += len;
                }
                AnySession::Ouch(session) => {
                    let len = match soupbintcp::frame_len(remaining) {
                        Ok(len) => len,
                        Err(CodecError::NeedMore) => break,
                        Err(err) => return Err(err.into()),
                    };
                    let frame = &remaining[..len];
                    let pkt = Packet::parse(frame).map_err(SessionError::from)?;
                    events.push(session.on_inbound(now_ns, &pkt, send)?.into());
                    consumed += len;
                }
            }
        }
        Ok((consumed, events))
    }
}

impl ManagedSession for AnySession {
    fn session_id(&self) -> &str {
        match self {
            AnySession::Fix(s) => s.session_id(),
            AnySession::Ouch(s) => s.session_id(),
        }
    }

    fn managed_state(&self) -> ManagedState {
        match self {
            AnySession::Fix(s) => s.managed_state(),
            AnySession::Ouch(s) => s.managed_state(),
        }
    }

    fn enable(&mut self) {
        match self {
            AnySession::Fix(s) => s.enable(),
            AnySession::Ouch(s) => s.enable(),
        }
    }

    fn disable(&mut self) {
        match self {
            AnySession::Fix(s) => s.disable(),
            AnySession::Ouch(s) => s.disable(),
        }
    }

    fn is_enabled(&self) -> bool {
        match self {
            AnySession::Fix(s) => s.is_enabled(),
            AnySession::Ouch(s) => s.is_enabled(),
        }
    }

    fn outgoing_seq(&self) -> u32 {
        match self {
            AnySession::Fix(s) => s.outgoing_seq(),
            AnySession::Ouch(s) => s.outgoing_seq(),
        }
    }

    fn expected_incoming_seq(&self) -> u32 {
        match self {
            AnySession::Fix(s) => s.expected_incoming_seq(),
            AnySession::Ouch(s) => s.expected_incoming_seq(),
        }
    }
}
