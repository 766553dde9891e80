//! FIX session state machine (C4): connection/logon, heartbeat/test-request
//! liveness, sequence gap detection, resend, and EOD reset (§4.4).

use std::sync::Arc;

use xchg_codec::error::CodecError;
use xchg_codec::fix::{
    self, FixEncoder, FixTimestampCache, IncomingMessage, msg_type as mt, session_reject_reason,
};
use xchg_journal::{Direction, Stream};

use crate::session::config::SessionConfig;
use crate::session::error::SessionError;
use crate::session::identity::{Role, SessionIdentity};
use crate::session::managed::{ManagedSession, ManagedState};
use crate::session::runtime::RuntimeState;

const ENCODE_BUF_SIZE: usize = 4096;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FixState {
    Created,
    Disconnected,
    Connecting,
    Connected,
    LogonSent,
    LoggedOn,
    Resending,
    LogoutSent,
    Stopped,
}

impl FixState {
    pub fn managed(self) -> ManagedState {
        match self {
            FixState::Created | FixState::Disconnected | FixState::LogoutSent => {
                ManagedState::Disconnected
            }
            FixState::Connecting => ManagedState::Connecting,
            FixState::Connected | FixState::LogonSent => ManagedState::Connected,
            FixState::LoggedOn | FixState::Resending => ManagedState::LoggedOn,
            FixState::Stopped => ManagedState::Stopped,
        }
    }
}

/// Outcome of feeding one inbound frame (or a scheduler tick) to the FSM.
/// The engine matches on this to decide what, if anything, to dispatch to
/// the application listener.
#[derive(Debug)]
pub enum FixEvent {
    None,
    StateChanged(FixState),
    /// An application message was accepted in sequence; payload already
    /// journaled under `direction=In`. `seq` is its `MsgSeqNum`.
    Application { seq: u32 },
    GapDetected { from: u32, to: u32 },
    Rejected { ref_seq: u32, reason: i32 },
    DisconnectRequested,
}

fn is_admin_msg_type(msg_type: &[u8]) -> bool {
    matches!(msg_type, b"0" | b"1" | b"2" | b"4" | b"5" | b"A")
}

/// A single FIX session. Owns its runtime counters, its journal stream, and
/// the encode-side timestamp cache; drives the wire bytes the engine hands
/// it (inbound) or asks it for (outbound admin messages).
pub struct FixSession {
    identity: SessionIdentity,
    session_id: String,
    config: SessionConfig,
    journal: Arc<Stream>,
    state: FixState,
    runtime: RuntimeState,
    ts_cache: FixTimestampCache,
    test_req_seq: u32,
    pending_test_req: Option<([u8; 16], i64)>,
}

impl FixSession {
    pub fn new(identity: SessionIdentity, config: SessionConfig, journal: Arc<Stream>) -> Self {
        let session_id = identity.session_id();
        Self {
            identity,
            session_id,
            config,
            journal,
            state: FixState::Created,
            runtime: RuntimeState::default(),
            ts_cache: FixTimestampCache::default(),
            test_req_seq: 0,
            pending_test_req: None,
        }
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    pub fn state(&self) -> FixState {
        self.state
    }

    /// A handle sharing this session's outbound sequence counter, for a
    /// writer thread that claims sequence numbers independently of the FSM
    /// (§4.2).
    pub fn shared_outgoing_seq(&self) -> Arc<std::sync::atomic::AtomicU32> {
        self.runtime.shared_outgoing_seq()
    }

    fn begin_string(&self) -> &'static str {
        self.config.protocol_version.fix_begin_string()
    }

    fn transition(&mut self, to: FixState) {
        tracing::info!(session = %self.identity.session_id(), from = ?self.state, to = ?to, "fix state transition");
        self.state = to;
    }

    fn next_outbound_seq(&mut self) -> u32 {
        let seq = self.runtime.claim_outgoing_seq();
        seq
    }

    /// Builds a complete admin message header (`8,9,35,49,56,34,52`),
    /// assigning the next outbound sequence number, and hands the still-open
    /// encoder to `body` to add message-specific fields before committing
    /// and journaling.
    fn send_admin<F>(
        &mut self,
        now_ns: i64,
        msg_type: &str,
        send: &mut dyn FnMut(&[u8]),
        body: F,
    ) -> Result<u32, SessionError>
    where
        F: FnOnce(&mut FixEncoder<'_>) -> Result<(), CodecError>,
    {
        let mut buf = [0u8; ENCODE_BUF_SIZE];
        let seq = self.next_outbound_seq();
        let mut rendered = [0u8; 21];
        self.ts_cache.format(now_ns / 1_000_000, &mut rendered);

        let mut enc = FixEncoder::start(&mut buf, self.begin_string(), msg_type)?;
        enc.write_tag_str(fix::TAG_SENDER_COMP_ID, &self.identity.sender_id)?;
        enc.write_tag_str(fix::TAG_TARGET_COMP_ID, &self.identity.target_id)?;
        enc.write_tag_int(fix::TAG_MSG_SEQ_NUM, i64::from(seq))?;
        enc.write_tag_timestamp(fix::TAG_SENDING_TIME, &rendered)?;
        body(&mut enc)?;
        let len = enc.commit()?;

        send(&buf[..len]);
        self.runtime.last_outbound_ns = now_ns;
        self.journal.write(Direction::Out, now_ns, seq, msg_type.as_bytes(), &buf[..len])?;
        Ok(seq)
    }

    /// Sends one application message whose body fields (everything after
    /// the standard header) arrive pre-rendered, e.g. from a ring slot
    /// payload the application thread wrote. Used by the writer thread's
    /// ring-consume path (§4.2); `msg_type` still comes from the caller
    /// since the ring slot carries only a single type byte.
    pub fn send_application(
        &mut self,
        now_ns: i64,
        msg_type: &str,
        body_fields: &[u8],
        send: &mut dyn FnMut(&[u8]),
    ) -> Result<u32, SessionError> {
        self.send_admin(now_ns, msg_type, send, |enc| enc.write_body_fields(body_fields))
    }

    fn send_logon(&mut self, now_ns: i64, send: &mut dyn FnMut(&[u8])) -> Result<(), SessionError> {
        let reset = self.config.reset_on_logon;
        let heartbeat_secs = self.config.heartbeat_interval.as_secs() as i64;
        self.send_admin(now_ns, mt::LOGON, send, |enc| {
            enc.write_tag_int(fix::TAG_ENCRYPT_METHOD, 0)?;
            enc.write_tag_int(fix::TAG_HEART_BT_INT, heartbeat_secs)?;
            if reset {
                enc.write_tag_char(fix::TAG_RESET_SEQ_NUM_FLAG, b'Y')?;
            }
            Ok(())
        })?;
        Ok(())
    }

    fn send_heartbeat(&mut self, now_ns: i64, test_req_id: Option<&str>, send: &mut dyn FnMut(&[u8])) -> Result<(), SessionError> {
        self.send_admin(now_ns, mt::HEARTBEAT, send, |enc| {
            if let Some(id) = test_req_id {
                enc.write_tag_str(fix::TAG_TEST_REQ_ID, id)?;
            }
            Ok(())
        })?;
        Ok(())
    }

    fn send_test_request(&mut self, now_ns: i64, send: &mut dyn FnMut(&[u8])) -> Result<(), SessionError> {
        self.test_req_seq += 1;
        let mut id_buf = [0u8; 16];
        let id = format!("TEST{}", self.test_req_seq);
        let id_bytes = id.as_bytes();
        id_buf[..id_bytes.len()].copy_from_slice(id_bytes);
        self.send_admin(now_ns, mt::TEST_REQUEST, send, |enc| {
            enc.write_tag_str(fix::TAG_TEST_REQ_ID, &id)
        })?;
        self.pending_test_req = Some((id_buf, now_ns));
        Ok(())
    }

    fn send_resend_request(&mut self, now_ns: i64, from: u32, to: u32, send: &mut dyn FnMut(&[u8])) -> Result<(), SessionError> {
        self.send_admin(now_ns, mt::RESEND_REQUEST, send, |enc| {
            enc.write_tag_int(fix::TAG_BEGIN_SEQ_NO, i64::from(from))?;
            enc.write_tag_int(fix::TAG_END_SEQ_NO, i64::from(to))
        })?;
        Ok(())
    }

    fn send_sequence_reset_gap_fill(&mut self, now_ns: i64, new_seq_no: u32, send: &mut dyn FnMut(&[u8])) -> Result<(), SessionError> {
        self.send_admin(now_ns, mt::SEQUENCE_RESET, send, |enc| {
            enc.write_tag_char(fix::TAG_GAP_FILL_FLAG, b'Y')?;
            enc.write_tag_int(fix::TAG_NEW_SEQ_NO, i64::from(new_seq_no))
        })?;
        Ok(())
    }

    fn send_logout(&mut self, now_ns: i64, text: &str, send: &mut dyn FnMut(&[u8])) -> Result<(), SessionError> {
        self.send_admin(now_ns, mt::LOGOUT, send, |enc| enc.write_tag_str(fix::TAG_TEXT, text))?;
        Ok(())
    }

    /// Initiates an orderly Logout, e.g. from the engine's lifecycle stop
    /// path (§4.5 "Engine stop"). Prefer `send_logout` internally when a more
    /// specific reason text applies.
    pub fn initiate_logout(&mut self, now_ns: i64, send: &mut dyn FnMut(&[u8])) -> Result<(), SessionError> {
        self.send_logout(now_ns, "session stopped", send)
    }

    fn send_reject(
        &mut self,
        now_ns: i64,
        ref_seq: u32,
        ref_msg_type: &str,
        reason: i32,
        send: &mut dyn FnMut(&[u8]),
    ) -> Result<(), SessionError> {
        self.send_admin(now_ns, mt::REJECT, send, |enc| {
            enc.write_tag_int(fix::TAG_REF_SEQ_NUM, i64::from(ref_seq))?;
            enc.write_tag_str(fix::TAG_REF_MSG_TYPE, ref_msg_type)?;
            enc.write_tag_int(fix::TAG_SESSION_REJECT_REASON, i64::from(reason))
        })?;
        Ok(())
    }

    /// Journals an accepted inbound frame and advances `expected_incoming_seq`.
    fn accept_inbound(&mut self, now_ns: i64, seq: u32, msg_type: &str, frame: &[u8]) -> Result<(), SessionError> {
        self.runtime.last_inbound_ns = now_ns;
        self.journal.write(Direction::In, now_ns, seq, msg_type.as_bytes(), frame)?;
        self.runtime.expected_incoming_seq = seq + 1;
        // A gap can also be filled by genuine resent messages (PossDupFlag=Y)
        // rather than a SequenceReset gap-fill; once the last one lands,
        // leave `Resending` the same way the gap-fill arm does.
        if self.runtime.resend_range.is_some_and(|(_, to)| self.runtime.expected_incoming_seq > to) {
            self.runtime.resend_range = None;
            if self.state == FixState::Resending {
                self.transition(FixState::LoggedOn);
            }
        }
        Ok(())
    }

    /// Called once the initiator's TCP connect succeeds: sends Logon and
    /// moves to `LogonSent` (§4.4 "Initiator connect").
    pub fn on_tcp_connected(&mut self, now_ns: i64, send: &mut dyn FnMut(&[u8])) -> Result<FixEvent, SessionError> {
        self.transition(FixState::Connected);
        if self.identity.role == Role::Initiator {
            self.send_logon(now_ns, send)?;
            self.transition(FixState::LogonSent);
        }
        Ok(FixEvent::StateChanged(self.state))
    }

    /// TCP failed or dropped before/while logged on. Reconnection (with
    /// backoff) is the engine's concern; the FSM only reflects state.
    pub fn on_tcp_failed(&mut self) -> FixEvent {
        self.transition(FixState::Disconnected);
        FixEvent::StateChanged(self.state)
    }

    /// Replays journaled outbound entries in `[from, to]` with
    /// `PossDupFlag=Y`, coalescing consecutive admin-message entries into a
    /// single `SequenceReset-GapFill` (§4.4 "ResendRequest received").
    fn replay_range(&mut self, now_ns: i64, from: u32, to: u32, send: &mut dyn FnMut(&[u8])) -> Result<(), SessionError> {
        let journal = self.journal.clone();
        let mut gap_start: Option<u32> = None;
        let mut first_err: Option<SessionError> = None;

        journal.replay(Direction::Out, from, to, |entry| {
            if first_err.is_some() {
                return;
            }
            if is_admin_msg_type(entry.msg_type) {
                gap_start.get_or_insert(entry.seq_num);
                return;
            }
            if gap_start.take().is_some() {
                if let Err(e) = self.send_sequence_reset_gap_fill(now_ns, entry.seq_num, send) {
                    first_err = Some(e);
                    return;
                }
            }
            match rewrite_with_poss_dup(entry.payload) {
                Some(resent) => send(&resent),
                None => send(entry.payload),
            }
        })?;

        if let Some(e) = first_err {
            return Err(e);
        }
        if gap_start.is_some() {
            self.send_sequence_reset_gap_fill(now_ns, to + 1, send)?;
        }
        Ok(())
    }

    fn begin_resend(&mut self, now_ns: i64, from: u32, to: u32, send: &mut dyn FnMut(&[u8])) -> Result<(), SessionError> {
        self.runtime.resend_range = Some((from, to));
        self.send_resend_request(now_ns, from, to, send)?;
        self.transition(FixState::Resending);
        Ok(())
    }

    /// Feeds one decoded inbound FIX frame to the FSM (§4.4).
    pub fn on_inbound(
        &mut self,
        now_ns: i64,
        msg: &IncomingMessage<'_>,
        raw_frame: &[u8],
        send: &mut dyn FnMut(&[u8]),
    ) -> Result<FixEvent, SessionError> {
        self.runtime.last_inbound_ns = now_ns;
        let Some(seq) = msg.msg_seq_num() else {
            self.send_reject(now_ns, 0, msg.msg_type().unwrap_or(""), session_reject_reason::REQUIRED_TAG_MISSING, send)?;
            return Ok(FixEvent::Rejected { ref_seq: 0, reason: session_reject_reason::REQUIRED_TAG_MISSING });
        };
        let Some(msg_type) = msg.msg_type() else {
            self.send_reject(now_ns, seq, "", session_reject_reason::REQUIRED_TAG_MISSING, send)?;
            return Ok(FixEvent::Rejected { ref_seq: seq, reason: session_reject_reason::REQUIRED_TAG_MISSING });
        };

        if msg_type == mt::LOGON && matches!(self.state, FixState::Connected | FixState::LogonSent) {
            if msg.sender_comp_id() != Some(self.identity.target_id.as_str())
                || msg.target_comp_id() != Some(self.identity.sender_id.as_str())
            {
                self.send_logout(now_ns, "SenderCompID/TargetCompID mismatch", send)?;
                self.transition(FixState::Disconnected);
                return Ok(FixEvent::DisconnectRequested);
            }
            if seq > self.runtime.expected_incoming_seq {
                let from = self.runtime.expected_incoming_seq;
                let to = seq - 1;
                self.accept_inbound(now_ns, seq, msg_type, raw_frame)?;
                self.begin_resend(now_ns, from, to, send)?;
                return Ok(FixEvent::GapDetected { from, to });
            }
            self.accept_inbound(now_ns, seq, msg_type, raw_frame)?;
            self.transition(FixState::LoggedOn);
            return Ok(FixEvent::StateChanged(FixState::LoggedOn));
        }

        if !matches!(self.state, FixState::LoggedOn | FixState::Resending) {
            return Ok(FixEvent::None);
        }

        let poss_dup = msg.poss_dup();
        if seq < self.runtime.expected_incoming_seq {
            if poss_dup {
                return Ok(FixEvent::None);
            }
            self.send_logout(now_ns, "MsgSeqNum too low", send)?;
            self.transition(FixState::Disconnected);
            return Ok(FixEvent::DisconnectRequested);
        }
        if seq > self.runtime.expected_incoming_seq {
            let from = self.runtime.expected_incoming_seq;
            let to = seq - 1;
            self.begin_resend(now_ns, from, to, send)?;
            return Ok(FixEvent::GapDetected { from, to });
        }

        match msg_type {
            mt::SEQUENCE_RESET => {
                let gap_fill = msg.char(fix::TAG_GAP_FILL_FLAG) == Some(b'Y');
                let Some(new_seq_no) = msg.int(fix::TAG_NEW_SEQ_NO) else {
                    return Ok(FixEvent::None);
                };
                if gap_fill && (new_seq_no as u32) <= seq {
                    return Ok(FixEvent::None);
                }
                self.journal.write(Direction::In, now_ns, seq, msg_type.as_bytes(), raw_frame)?;
                self.runtime.expected_incoming_seq = new_seq_no as u32;
                if self.runtime.resend_range.is_some_and(|(_, to)| new_seq_no as u32 > to) {
                    self.runtime.resend_range = None;
                    self.transition(FixState::LoggedOn);
                }
                Ok(FixEvent::StateChanged(self.state))
            }
            mt::HEARTBEAT => {
                self.accept_inbound(now_ns, seq, msg_type, raw_frame)?;
                if let Some(id) = msg.str(fix::TAG_TEST_REQ_ID) {
                    if self.pending_test_req.as_ref().is_some_and(|(pending, _)| str_eq_padded(pending, id)) {
                        self.pending_test_req = None;
                    }
                }
                Ok(FixEvent::Application { seq })
            }
            mt::TEST_REQUEST => {
                self.accept_inbound(now_ns, seq, msg_type, raw_frame)?;
                let id = msg.str(fix::TAG_TEST_REQ_ID).unwrap_or("");
                self.send_heartbeat(now_ns, Some(id), send)?;
                Ok(FixEvent::Application { seq })
            }
            mt::RESEND_REQUEST => {
                self.accept_inbound(now_ns, seq, msg_type, raw_frame)?;
                let from = msg.int(fix::TAG_BEGIN_SEQ_NO).unwrap_or(1) as u32;
                let to = match msg.int(fix::TAG_END_SEQ_NO) {
                    Some(0) | None => self.runtime.outgoing_seq().saturating_sub(1),
                    Some(v) => v as u32,
                };
                self.replay_range(now_ns, from, to, send)?;
                Ok(FixEvent::Application { seq })
            }
            mt::LOGOUT => {
                self.accept_inbound(now_ns, seq, msg_type, raw_frame)?;
                self.send_logout(now_ns, "responding to Logout", send)?;
                self.transition(FixState::Disconnected);
                Ok(FixEvent::DisconnectRequested)
            }
            _ => {
                self.accept_inbound(now_ns, seq, msg_type, raw_frame)?;
                Ok(FixEvent::Application { seq })
            }
        }
    }

    /// Scheduler tick (§4.4 Heartbeat): drives the heartbeat-send and
    /// inbound-silence timers. Called regularly (e.g. every 100 ms) by the
    /// engine's scheduler thread.
    pub fn on_tick(&mut self, now_ns: i64, send: &mut dyn FnMut(&[u8])) -> Result<FixEvent, SessionError> {
        if self.state != FixState::LoggedOn && self.state != FixState::Resending {
            return Ok(FixEvent::None);
        }
        let heartbeat_ns = self.config.heartbeat_interval.as_nanos() as i64;
        if now_ns - self.runtime.last_outbound_ns >= heartbeat_ns {
            self.send_heartbeat(now_ns, None, send)?;
        }
        let silence_ns = (heartbeat_ns as f64 * 1.2) as i64;
        if self.pending_test_req.is_none() && now_ns - self.runtime.last_inbound_ns >= silence_ns {
            self.send_test_request(now_ns, send)?;
        } else if let Some((_, sent_at)) = self.pending_test_req {
            if now_ns - sent_at >= heartbeat_ns {
                self.transition(FixState::Disconnected);
                return Ok(FixEvent::DisconnectRequested);
            }
        }
        Ok(FixEvent::None)
    }

    /// EOD trigger (§4.4): logs out, and — once disconnected — resets both
    /// sequence counters and emits the caller-visible end-of-day marker.
    /// Reconnection for initiators is the engine's job.
    pub fn on_eod(&mut self, now_ns: i64, send: &mut dyn FnMut(&[u8])) -> Result<FixEvent, SessionError> {
        if !self.config.reset_on_eod {
            return Ok(FixEvent::None);
        }
        if self.state == FixState::LoggedOn || self.state == FixState::Resending {
            self.send_logout(now_ns, "end of day", send)?;
        }
        self.transition(FixState::Disconnected);
        self.runtime.reset_sequences();
        Ok(FixEvent::StateChanged(FixState::Disconnected))
    }
}

impl ManagedSession for FixSession {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn managed_state(&self) -> ManagedState {
        self.state.managed()
    }

    fn enable(&mut self) {
        self.runtime.enabled = true;
    }

    fn disable(&mut self) {
        self.runtime.enabled = false;
    }

    fn is_enabled(&self) -> bool {
        self.runtime.enabled
    }

    fn outgoing_seq(&self) -> u32 {
        self.runtime.outgoing_seq()
    }

    fn expected_incoming_seq(&self) -> u32 {
        self.runtime.expected_incoming_seq
    }
}

fn str_eq_padded(padded: &[u8; 16], s: &str) -> bool {
    let trimmed = std::str::from_utf8(padded).unwrap_or("").trim_end_matches('\0');
    trimmed == s
}

/// Rewrites a journaled outbound FIX frame for resend: sets `PossDupFlag=Y`
/// and `OrigSendingTime` to the frame's own `SendingTime`, leaving
/// `MsgSeqNum` untouched. Returns `None` (caller falls back to the verbatim
/// frame) if the archived frame fails to parse — this should not happen for
/// anything this session wrote itself.
fn rewrite_with_poss_dup(frame: &[u8]) -> Option<Vec<u8>> {
    let msg = IncomingMessage::parse(frame).ok()?;
    let orig_sending_time = msg.char_sequence(fix::TAG_SENDING_TIME)?;
    let begin_string = msg.str(fix::TAG_BEGIN_STRING).unwrap_or("FIX.4.4");
    let msg_type = msg.msg_type()?;
    let seq = msg.msg_seq_num()?;

    let mut buf = vec![0u8; frame.len() + 64];
    let mut enc = FixEncoder::start(&mut buf, begin_string, msg_type).ok()?;
    enc.write_tag_str(fix::TAG_SENDER_COMP_ID, msg.sender_comp_id()?).ok()?;
    enc.write_tag_str(fix::TAG_TARGET_COMP_ID, msg.target_comp_id()?).ok()?;
    enc.write_tag_int(fix::TAG_MSG_SEQ_NUM, i64::from(seq)).ok()?;
    enc.write_tag_str(fix::TAG_SENDING_TIME, std::str::from_utf8(orig_sending_time).ok()?).ok()?;
    enc.write_tag_char(fix::TAG_POSS_DUP_FLAG, b'Y').ok()?;
    enc.write_tag_str(fix::TAG_ORIG_SENDING_TIME, std::str::from_utf8(orig_sending_time).ok()?).ok()?;
    let len = enc.commit().ok()?;
    buf.truncate(len);
    Some(buf)
}
