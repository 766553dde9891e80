//! OUCH-over-SoupBinTCP session state machine (C4): login handshake,
//! implicit-position sequencing, and the 1s/15s heartbeat contract (§4.4).

use std::sync::Arc;

use xchg_codec::soupbintcp::{self, LoginRequest, Packet, packet_type};
use xchg_journal::{Direction, Stream};

use crate::session::config::SessionConfig;
use crate::session::error::SessionError;
use crate::session::identity::{Role, SessionIdentity};
use crate::session::managed::{ManagedSession, ManagedState};
use crate::session::runtime::RuntimeState;

const ENCODE_BUF_SIZE: usize = 2048;
const HEARTBEAT_NS: i64 = 1_000_000_000;
const DISCONNECT_TIMEOUT_NS: i64 = 15_000_000_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OuchState {
    Created,
    Disconnected,
    Connecting,
    Connected,
    LoginSent,
    LoggedIn,
    LogoutSent,
    Stopped,
}

impl OuchState {
    pub fn managed(self) -> ManagedState {
        match self {
            OuchState::Created | OuchState::Disconnected | OuchState::LogoutSent => {
                ManagedState::Disconnected
            }
            OuchState::Connecting => ManagedState::Connecting,
            OuchState::Connected | OuchState::LoginSent => ManagedState::Connected,
            OuchState::LoggedIn => ManagedState::LoggedOn,
            OuchState::Stopped => ManagedState::Stopped,
        }
    }
}

#[derive(Debug)]
pub enum OuchEvent {
    None,
    StateChanged(OuchState),
    /// A sequenced application packet was accepted; payload already
    /// journaled under `direction=In`. `seq` is this session's running
    /// count of accepted sequenced packets, not a wire field.
    Application { seq: u32 },
    LoginRejected { reason: u8 },
    DisconnectRequested,
}

/// A single OUCH session carried over SoupBinTCP. Sequencing is positional:
/// SoupBinTCP assigns no sequence field to each `SequencedData` packet, so
/// `runtime.expected_incoming_seq`/`outgoing_seq` here count accepted
/// packets since login rather than a wire-visible counter. Resumption is
/// handled entirely by `requested_sequence_number` at the next login, not by
/// resend requests (§4.4 "OUCH states").
pub struct OuchSession {
    identity: SessionIdentity,
    session_id: String,
    config: SessionConfig,
    journal: Arc<Stream>,
    state: OuchState,
    runtime: RuntimeState,
}

impl OuchSession {
    pub fn new(identity: SessionIdentity, config: SessionConfig, journal: Arc<Stream>) -> Self {
        let session_id = identity.session_id();
        Self {
            identity,
            session_id,
            config,
            journal,
            state: OuchState::Created,
            runtime: RuntimeState::default(),
        }
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    pub fn state(&self) -> OuchState {
        self.state
    }

    /// A handle sharing this session's outbound sequence counter, for a
    /// writer thread that claims sequence numbers independently of the FSM
    /// (§4.2).
    pub fn shared_outgoing_seq(&self) -> Arc<std::sync::atomic::AtomicU32> {
        self.runtime.shared_outgoing_seq()
    }

    fn transition(&mut self, to: OuchState) {
        tracing::info!(session = %self.session_id, from = ?self.state, to = ?to, "ouch state transition");
        self.state = to;
    }

    fn send_packet(
        &mut self,
        now_ns: i64,
        packet_type: u8,
        payload: &[u8],
        send: &mut dyn FnMut(&[u8]),
    ) -> Result<(), SessionError> {
        let mut buf = [0u8; ENCODE_BUF_SIZE];
        let len = soupbintcp::encode(&mut buf, packet_type, payload)?;
        send(&buf[..len]);
        self.runtime.last_outbound_ns = now_ns;
        let seq = self.runtime.claim_outgoing_seq();
        self.journal.write(Direction::Out, now_ns, seq, &[packet_type], &buf[..len])?;
        Ok(())
    }

    /// Initiator side: sends the SoupBinTCP `LoginRequest` once connected.
    pub fn on_tcp_connected(&mut self, now_ns: i64, send: &mut dyn FnMut(&[u8])) -> Result<OuchEvent, SessionError> {
        self.transition(OuchState::Connected);
        if self.identity.role == Role::Initiator {
            let (username, password) = self.config.auth.clone().unwrap_or_default();
            let mut payload = [b' '; LoginRequest::LEN];
            write_padded(&mut payload[0..6], &username);
            write_padded(&mut payload[6..16], &password);
            write_padded(&mut payload[16..36], &self.identity.session_name);
            write_padded(&mut payload[36..56], &self.runtime.expected_incoming_seq.to_string());
            self.send_packet(now_ns, packet_type::LOGIN_REQUEST, &payload, send)?;
            self.transition(OuchState::LoginSent);
        }
        Ok(OuchEvent::StateChanged(self.state))
    }

    pub fn on_tcp_failed(&mut self) -> OuchEvent {
        self.transition(OuchState::Disconnected);
        OuchEvent::StateChanged(self.state)
    }

    /// Feeds one raw SoupBinTCP packet to the FSM (§4.4).
    pub fn on_inbound(&mut self, now_ns: i64, pkt: &Packet<'_>, send: &mut dyn FnMut(&[u8])) -> Result<OuchEvent, SessionError> {
        self.runtime.last_inbound_ns = now_ns;

        match pkt.packet_type {
            packet_type::LOGIN_REQUEST if self.identity.role == Role::Acceptor => {
                let login = LoginRequest::parse(pkt.payload)?;
                let (expect_user, expect_pass) = self.config.auth.clone().unwrap_or_default();
                if login.username() != expect_user || login.password() != expect_pass {
                    self.send_packet(now_ns, packet_type::LOGIN_REJECTED, b"A", send)?;
                    self.transition(OuchState::Disconnected);
                    return Ok(OuchEvent::LoginRejected { reason: b'A' });
                }
                self.runtime.expected_incoming_seq = login.requested_sequence_number() as u32;
                let seq_str = self.runtime.expected_incoming_seq.to_string();
                let mut accepted = [b' '; 20 + 20];
                write_padded(&mut accepted[0..20], &self.identity.session_name);
                write_padded(&mut accepted[20..40], &seq_str);
                self.send_packet(now_ns, packet_type::LOGIN_ACCEPTED, &accepted, send)?;
                self.transition(OuchState::LoggedIn);
                Ok(OuchEvent::StateChanged(OuchState::LoggedIn))
            }
            packet_type::LOGIN_ACCEPTED if self.state == OuchState::LoginSent => {
                self.transition(OuchState::LoggedIn);
                Ok(OuchEvent::StateChanged(OuchState::LoggedIn))
            }
            packet_type::LOGIN_REJECTED if self.state == OuchState::LoginSent => {
                let reason = pkt.payload.first().copied().unwrap_or(b'?');
                self.transition(OuchState::Disconnected);
                Ok(OuchEvent::LoginRejected { reason })
            }
            packet_type::SERVER_HEARTBEAT | packet_type::CLIENT_HEARTBEAT => Ok(OuchEvent::None),
            packet_type::LOGOUT_REQUEST | packet_type::END_OF_SESSION => {
                self.transition(OuchState::Disconnected);
                Ok(OuchEvent::DisconnectRequested)
            }
            // Acceptors receive the client's unsequenced `U` packets;
            // initiators receive the server's sequenced `S` packets (§4.4,
            // §6) — either is application data from the peer's perspective.
            packet_type::SEQUENCED_DATA | packet_type::UNSEQUENCED_DATA
                if matches!(self.state, OuchState::LoggedIn) =>
            {
                let seq = self.runtime.expected_incoming_seq;
                self.journal.write(Direction::In, now_ns, seq, &pkt.payload[..1.min(pkt.payload.len())], pkt.payload)?;
                self.runtime.expected_incoming_seq = seq + 1;
                Ok(OuchEvent::Application { seq })
            }
            _ => Ok(OuchEvent::None),
        }
    }

    /// Scheduler tick: sends an idle heartbeat after 1s of outbound silence
    /// and disconnects after 15s of inbound silence (§4.4).
    pub fn on_tick(&mut self, now_ns: i64, send: &mut dyn FnMut(&[u8])) -> Result<OuchEvent, SessionError> {
        if self.state != OuchState::LoggedIn {
            return Ok(OuchEvent::None);
        }
        if now_ns - self.runtime.last_inbound_ns >= DISCONNECT_TIMEOUT_NS {
            self.transition(OuchState::Disconnected);
            return Ok(OuchEvent::DisconnectRequested);
        }
        if now_ns - self.runtime.last_outbound_ns >= HEARTBEAT_NS {
            let pt = if self.identity.role == Role::Initiator {
                packet_type::CLIENT_HEARTBEAT
            } else {
                packet_type::SERVER_HEARTBEAT
            };
            self.send_packet(now_ns, pt, &[], send)?;
        }
        Ok(OuchEvent::None)
    }

    pub fn send_logout(&mut self, now_ns: i64, send: &mut dyn FnMut(&[u8])) -> Result<(), SessionError> {
        self.send_packet(now_ns, packet_type::LOGOUT_REQUEST, &[], send)?;
        self.transition(OuchState::LogoutSent);
        Ok(())
    }

    /// Sends one already-framed OUCH application payload (e.g. an
    /// `EnterOrder`). §4.4/§6: the initiator sends unsequenced `U` packets;
    /// only the acceptor's replies are sequenced `S` packets.
    pub fn send_application(&mut self, now_ns: i64, payload: &[u8], send: &mut dyn FnMut(&[u8])) -> Result<(), SessionError> {
        let pt = match self.identity.role {
            Role::Initiator => packet_type::UNSEQUENCED_DATA,
            Role::Acceptor => packet_type::SEQUENCED_DATA,
        };
        self.send_packet(now_ns, pt, payload, send)
    }
}

impl ManagedSession for OuchSession {
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

fn write_padded(dst: &mut [u8], src: &str) {
    let bytes = src.as_bytes();
    let n = bytes.len().min(dst.len());
    dst[..n].copy_from_slice(&bytes[..n]);
}
