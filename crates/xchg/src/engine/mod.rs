//! The engine (C5): owns the `TcpConnector`, the multi-stream `Journal`, and
//! every session's connection state, and drives them all from a single
//! network event-loop tile. The scheduler and each session's writer are the
//! only other tiles it attaches (§4.5, §5).
//!
//! Session registration (`add_initiator`/`add_acceptor_listener`) happens
//! before `start()` moves the engine onto its own thread — after that point
//! the only session lifecycle event the engine handles itself is a new
//! inbound connection landing on one of its registered listeners.

pub mod lifecycle;
pub mod scheduler;
pub mod writer;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::JoinHandle;

use mio::Token;
use thiserror::Error;
use xchg_codec::fix::FixTimestampCache;
use xchg_journal::{Journal, JournalConfig, JournalError};
use xchg_network::tcp::{PollEvent, SendBehavior, TcpConnector};
use xchg_ring::{DEFAULT_CAPACITY, Producer, ring};
use xchg_timing::{Duration, Nanos};

use crate::engine::lifecycle::{Lifecycle, LifecycleState};
use crate::engine::scheduler::{SchedulerCommand, SchedulerSignal, SchedulerTile};
use crate::engine::writer::{OutboundProtocol, WriterTile};
use crate::session::fix::FixSession;
use crate::session::ouch::OuchSession;
use crate::session::{AnySession, AnySessionEvent, ManagedSession, ManagedState, Role, SessionConfig, SessionIdentity};
use crate::tile::{StopFlag, Tile, TileConfig, attach_tile};

/// Per-session ring payload capacity; matches `xchg_ring::DEFAULT_PAYLOAD_CAP`.
pub const RING_PAYLOAD_CAP: usize = xchg_ring::DEFAULT_PAYLOAD_CAP;

pub type RingProducer = Producer<RING_PAYLOAD_CAP>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Journal(#[from] JournalError),
    #[error("{0:?} is not a registered acceptor listener")]
    UnknownListener(Token),
    #[error("couldn't bind acceptor listener at {0}")]
    ListenFailed(SocketAddr),
    #[error(transparent)]
    Lifecycle(#[from] lifecycle::IllegalTransition),
}

/// Protocol-erased outcome the caller's listener closure is notified of
/// (§4.5, §9 "replace listener interfaces with function-typed fields").
/// `session` is always the `sender_id->target_id` stream name.
pub enum EngineEvent {
    /// A session's connection was (re)established and its outbound ring is
    /// ready to accept application messages. Always the first event for an
    /// acceptor-side session; initiators instead get their `RingProducer`
    /// back directly from `add_initiator`.
    Ready { session: String, orders: RingProducer },
    StateChanged { session: String, state: ManagedState },
    Application { session: String, seq: u32 },
    GapDetected { session: String, from: u32, to: u32 },
    Rejected { session: String, ref_seq: u32, reason: i32 },
    LoginRejected { session: String, reason: u8 },
    Disconnected { session: String },
}

impl std::fmt::Debug for EngineEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineEvent::Ready { session, .. } => {
                f.debug_struct("Ready").field("session", session).finish_non_exhaustive()
            }
            EngineEvent::StateChanged { session, state } => {
                f.debug_struct("StateChanged").field("session", session).field("state", state).finish()
            }
            EngineEvent::Application { session, seq } => {
                f.debug_struct("Application").field("session", session).field("seq", seq).finish()
            }
            EngineEvent::GapDetected { session, from, to } => {
                f.debug_struct("GapDetected").field("session", session).field("from", from).field("to", to).finish()
            }
            EngineEvent::Rejected { session, ref_seq, reason } => f
                .debug_struct("Rejected")
                .field("session", session)
                .field("ref_seq", ref_seq)
                .field("reason", reason)
                .finish(),
            EngineEvent::LoginRejected { session, reason } => {
                f.debug_struct("LoginRejected").field("session", session).field("reason", reason).finish()
            }
            EngineEvent::Disconnected { session } => {
                f.debug_struct("Disconnected").field("session", session).finish()
            }
        }
    }
}

impl EngineEvent {
    fn from_any(session_id: &str, ev: AnySessionEvent) -> Option<Self> {
        Some(match ev {
            AnySessionEvent::None => return None,
            AnySessionEvent::StateChanged(state) => {
                EngineEvent::StateChanged { session: session_id.to_string(), state }
            }
            AnySessionEvent::Application { seq } => {
                EngineEvent::Application { session: session_id.to_string(), seq }
            }
            AnySessionEvent::GapDetected { from, to } => {
                EngineEvent::GapDetected { session: session_id.to_string(), from, to }
            }
            AnySessionEvent::Rejected { ref_seq, reason } => {
                EngineEvent::Rejected { session: session_id.to_string(), ref_seq, reason }
            }
            AnySessionEvent::LoginRejected { reason } => {
                EngineEvent::LoginRejected { session: session_id.to_string(), reason }
            }
            AnySessionEvent::DisconnectRequested => {
                EngineEvent::Disconnected { session: session_id.to_string() }
            }
        })
    }
}

/// Identity/config kept around so an acceptor listener can instantiate a
/// fresh session the moment a client connects (§4.5 "acceptor side").
struct AcceptorTemplate {
    identity: SessionIdentity,
    config: SessionConfig,
}

struct RunningSession {
    session: AnySession,
    writer_handle: Option<JoinHandle<()>>,
    writer_stop: StopFlag,
}

/// Ties the protocol FSMs (C4), the ring pipeline (C2), the journal (C3),
/// and the TCP transport together into the one running process described by
/// §4.5. Built up via `add_initiator`/`add_acceptor_listener`, then `start()`
/// consumes it onto its own tile thread.
pub struct Engine {
    connector: TcpConnector,
    journal: Arc<Journal>,
    lifecycle: Lifecycle,
    sessions: HashMap<Token, RunningSession>,
    listeners: HashMap<Token, AcceptorTemplate>,
    scheduler_handle: JoinHandle<()>,
    scheduler_stop: StopFlag,
    scheduler_tx: Sender<SchedulerCommand>,
    scheduler_signals: Receiver<SchedulerSignal>,
    writer_out_tx: Sender<(Token, Vec<u8>)>,
    writer_out_rx: Receiver<(Token, Vec<u8>)>,
    listener: Box<dyn FnMut(EngineEvent) + Send>,
}

impl Engine {
    /// Opens the journal and starts the scheduler tile. `listener` receives
    /// every `EngineEvent` once the engine is running.
    pub fn new(
        journal_config: JournalConfig,
        scheduler_tick: Duration,
        listener: impl FnMut(EngineEvent) + Send + 'static,
    ) -> Result<Self, EngineError> {
        let journal = Arc::new(Journal::open(journal_config)?);

        let (signal_tx, signal_rx) = mpsc::channel();
        let (command_tx, command_rx) = mpsc::channel();
        let scheduler_stop = StopFlag::new();
        let scheduler = SchedulerTile::new(scheduler_tick, signal_tx, command_rx);
        let scheduler_handle =
            attach_tile(scheduler, scheduler_stop.clone(), TileConfig::background(None, Some(scheduler_tick)));

        let (writer_out_tx, writer_out_rx) = mpsc::channel();

        Ok(Self {
            connector: TcpConnector::default(),
            journal,
            lifecycle: Lifecycle::default(),
            sessions: HashMap::new(),
            listeners: HashMap::new(),
            scheduler_handle,
            scheduler_stop,
            scheduler_tx: command_tx,
            scheduler_signals: signal_rx,
            writer_out_tx,
            writer_out_rx,
            listener: Box::new(listener),
        })
    }

    /// Registers an initiator session and dials its configured address. The
    /// caller gets the session's `RingProducer` back directly — it persists
    /// across reconnects, unlike the session's TCP connection state.
    pub fn add_initiator(
        &mut self,
        identity: SessionIdentity,
        config: SessionConfig,
    ) -> Result<(Token, RingProducer), EngineError> {
        self.lifecycle.transition(LifecycleState::Initialized)?;
        let addr = config.addr;
        let token = self.connector.connect(addr);
        let producer = self.spawn_session(identity, config, token)?;
        Ok((token, producer))
    }

    /// Registers a listener that instantiates a fresh session (from
    /// `identity`/`config` as a template) for each client that connects.
    pub fn add_acceptor_listener(
        &mut self,
        identity: SessionIdentity,
        config: SessionConfig,
    ) -> Result<Token, EngineError> {
        self.lifecycle.transition(LifecycleState::Initialized)?;
        let addr = config.addr;
        let token = self.connector.listen_at(addr).ok_or(EngineError::ListenFailed(addr))?;
        self.listeners.insert(token, AcceptorTemplate { identity, config });
        Ok(token)
    }

    /// Builds the session, its ring, and its writer tile, and registers it
    /// with the scheduler. Shared by `add_initiator` and the dynamic
    /// acceptor path in `handle_accept`.
    fn spawn_session(
        &mut self,
        identity: SessionIdentity,
        config: SessionConfig,
        token: Token,
    ) -> Result<RingProducer, EngineError> {
        let stream_name = identity.session_id();
        let journal_stream = self.journal.open_stream(&stream_name)?;
        let eod_time = config.eod_time;
        let is_fix = config.protocol_version.is_fix();

        let any_session = if is_fix {
            AnySession::Fix(FixSession::new(identity.clone(), config.clone(), journal_stream.clone()))
        } else {
            AnySession::Ouch(OuchSession::new(identity.clone(), config.clone(), journal_stream.clone()))
        };
        let outgoing_seq = any_session.shared_outgoing_seq();

        let protocol = if is_fix {
            OutboundProtocol::Fix {
                begin_string: config.protocol_version.fix_begin_string(),
                sender_id: identity.sender_id.clone(),
                target_id: identity.target_id.clone(),
                ts_cache: FixTimestampCache::default(),
            }
        } else {
            OutboundProtocol::Ouch { role: identity.role }
        };

        let (producer, consumer) = ring::<RING_PAYLOAD_CAP>(DEFAULT_CAPACITY);
        let writer = WriterTile::new(token, consumer, journal_stream, outgoing_seq, protocol, self.writer_out_tx.clone());
        let writer_stop = StopFlag::new();
        let writer_handle =
            attach_tile(writer, writer_stop.clone(), TileConfig::background(None, Some(Duration::from_millis(1))));

        let _ = self.scheduler_tx.send(SchedulerCommand::Register { token, eod_time });
        self.sessions.insert(token, RunningSession { session: any_session, writer_handle: Some(writer_handle), writer_stop });
        Ok(producer)
    }

    fn send_to(connector: &mut TcpConnector, token: Token) -> impl FnMut(&[u8]) + '_ {
        move |bytes: &[u8]| connector.write_or_enqueue(SendBehavior::Single(token), bytes)
    }

    fn drain_writer_output(&mut self) -> bool {
        let mut did_work = false;
        while let Ok((token, frame)) = self.writer_out_rx.try_recv() {
            self.connector.write_or_enqueue(SendBehavior::Single(token), &frame);
            did_work = true;
        }
        did_work
    }

    fn drain_scheduler_signals(&mut self, now_ns: i64) -> bool {
        let mut did_work = false;
        while let Ok(signal) = self.scheduler_signals.try_recv() {
            did_work = true;
            let (token, is_eod) = match signal {
                SchedulerSignal::Tick(token) => (token, false),
                SchedulerSignal::Eod(token) => (token, true),
            };
            let Some(running) = self.sessions.get_mut(&token) else { continue };
            let session_id = running.session.session_id().to_string();
            let result = {
                let mut send = Self::send_to(&mut self.connector, token);
                if is_eod { running.session.on_eod(now_ns, &mut send) } else { running.session.on_tick(now_ns, &mut send) }
            };
            match result {
                Ok(ev) => self.dispatch_session_event(token, &session_id, ev),
                Err(err) => tracing::error!(?token, %err, "session tick/eod handling failed"),
            }
        }
        did_work
    }

    /// Forwards a protocol-erased session outcome to the application
    /// listener and, for `DisconnectRequested`, actually closes the
    /// connection token — an FSM-initiated disconnect (heartbeat timeout,
    /// sequence-too-low, Logout, comp-id mismatch, EOD, §4.4) is otherwise
    /// never observed by the transport, which only auto-reconnects off its
    /// own `PollEvent::Disconnect`.
    fn dispatch_session_event(&mut self, token: Token, session_id: &str, ev: AnySessionEvent) {
        let wants_disconnect = matches!(ev, AnySessionEvent::DisconnectRequested);
        if wants_disconnect {
            self.connector.disconnect(token);
        }
        if let Some(engine_ev) = EngineEvent::from_any(session_id, ev) {
            (self.listener)(engine_ev);
        }
    }

    fn handle_accept(&mut self, now_ns: i64, listener: Token, stream: Token, peer_addr: SocketAddr) {
        if listener == stream {
            // Outbound connect establishing (possibly after a reconnect): the
            // session already exists from `add_initiator`.
            self.drive_connected(now_ns, stream);
            return;
        }

        let Some(template) = self.listeners.get(&listener) else {
            tracing::warn!(?listener, "accept on unknown listener token");
            self.connector.disconnect(stream);
            return;
        };
        let identity = template.identity.clone();
        let config = template.config.clone();
        let session_id = identity.session_id();
        tracing::info!(?listener, ?stream, %peer_addr, "accepted inbound connection");

        match self.spawn_session(identity, config, stream) {
            Ok(producer) => {
                (self.listener)(EngineEvent::Ready { session: session_id, orders: producer });
                self.drive_connected(now_ns, stream);
            }
            Err(err) => {
                tracing::error!(?stream, %err, "failed to instantiate acceptor session");
                self.connector.disconnect(stream);
            }
        }
    }

    fn drive_connected(&mut self, now_ns: i64, token: Token) {
        let Some(running) = self.sessions.get_mut(&token) else { return };
        let session_id = running.session.session_id().to_string();
        let result = {
            let mut send = Self::send_to(&mut self.connector, token);
            running.session.on_tcp_connected(now_ns, &mut send)
        };
        match result {
            Ok(ev) => self.dispatch_session_event(token, &session_id, ev),
            Err(err) => tracing::error!(?token, %err, "on_tcp_connected failed"),
        }
    }

    fn handle_readable(&mut self, now_ns: i64, token: Token) {
        let Some(bytes) = self.connector.inbound(token) else { return };
        if bytes.is_empty() {
            return;
        }
        let bytes = bytes.to_vec();

        let Some(running) = self.sessions.get_mut(&token) else { return };
        let session_id = running.session.session_id().to_string();
        let result = {
            let mut send = Self::send_to(&mut self.connector, token);
            running.session.feed_inbound(now_ns, &bytes, &mut send)
        };
        match result {
            Ok((consumed, events)) => {
                self.connector.consume(token, consumed);
                for ev in events {
                    self.dispatch_session_event(token, &session_id, ev);
                }
            }
            Err(err) => tracing::error!(?token, %err, "session failed to process inbound frame"),
        }
    }

    fn handle_disconnect(&mut self, token: Token) {
        let Some(running) = self.sessions.get_mut(&token) else { return };
        let ev = running.session.on_tcp_failed();
        let session_id = running.session.session_id().to_string();
        if let Some(engine_ev) = EngineEvent::from_any(&session_id, ev) {
            (self.listener)(engine_ev);
        }

        // Inbound (acceptor-side) connections aren't reconnected by the
        // transport, so their session and writer tile are fully torn down.
        // Outbound sessions stay registered; the transport will reconnect
        // and `handle_accept` drives `on_tcp_connected` again on the same
        // token.
        if matches!(running.session.identity().role, Role::Acceptor) {
            if let Some(mut running) = self.sessions.remove(&token) {
                running.writer_stop.request_stop();
                if let Some(handle) = running.writer_handle.take() {
                    let _ = handle.join();
                }
            }
            let _ = self.scheduler_tx.send(SchedulerCommand::Deregister { token });
        }
    }

    /// Transitions to `Active` and attaches the engine as the event-loop
    /// tile on its own thread.
    pub fn start(mut self, stop_flag: StopFlag, config: TileConfig) -> Result<JoinHandle<()>, EngineError> {
        self.lifecycle.transition(LifecycleState::Active)?;
        Ok(attach_tile(self, stop_flag, config))
    }
}

impl Tile for Engine {
    fn loop_body(&mut self) -> bool {
        let now_ns = i64::from(Nanos::now());
        let mut did_work = false;

        did_work |= self.drain_writer_output();
        did_work |= self.drain_scheduler_signals(now_ns);

        let mut accepts = Vec::new();
        let mut disconnects = Vec::new();
        let mut readables = Vec::new();
        did_work |= self.connector.poll_with(|event| match event {
            PollEvent::Accept { listener, stream, peer_addr } => accepts.push((listener, stream, peer_addr)),
            PollEvent::Disconnect { token } => disconnects.push(token),
            PollEvent::Readable { token } => readables.push(token),
        });

        for (listener, stream, peer_addr) in accepts {
            self.handle_accept(now_ns, listener, stream, peer_addr);
        }
        for token in readables {
            self.handle_readable(now_ns, token);
        }
        for token in disconnects {
            self.handle_disconnect(token);
        }

        did_work
    }

    fn teardown(mut self) {
        let now_ns = i64::from(Nanos::now());
        let tokens: Vec<Token> = self.sessions.keys().copied().collect();
        for token in tokens {
            if let Some(running) = self.sessions.get_mut(&token) {
                let mut send = Self::send_to(&mut self.connector, token);
                let _ = running.session.send_logout(now_ns, &mut send);
            }
        }

        for (_, mut running) in self.sessions.drain() {
            running.writer_stop.request_stop();
            if let Some(handle) = running.writer_handle.take() {
                let _ = handle.join();
            }
        }

        self.scheduler_stop.request_stop();
        let _ = self.scheduler_handle.join();

        if let Err(err) = self.journal.close() {
            tracing::error!(%err, "failed to close journal during engine teardown");
        }
    }
}
