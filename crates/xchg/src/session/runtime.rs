use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Mutable per-session counters shared by both protocol FSMs (§3 Session
/// Runtime State). `expected_incoming_seq` and the timestamps are owned
/// exclusively by the event-loop thread (§5); `outgoing_seq` is shared with
/// the session's writer thread (C2 assigns it at ring-consume time for
/// application messages, while the FSM assigns it directly for admin
/// messages it sends from the event loop), so it is the one counter backed
/// by an atomic rather than a plain field.
#[derive(Clone, Debug)]
pub struct RuntimeState {
    outgoing_seq: Arc<AtomicU32>,
    pub expected_incoming_seq: u32,
    pub last_inbound_ns: i64,
    pub last_outbound_ns: i64,
    pub resend_range: Option<(u32, u32)>,
    pub enabled: bool,
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self {
            outgoing_seq: Arc::new(AtomicU32::new(1)),
            expected_incoming_seq: 1,
            last_inbound_ns: 0,
            last_outbound_ns: 0,
            resend_range: None,
            enabled: true,
        }
    }
}

impl RuntimeState {
    /// Claims and advances the next outbound sequence number. Safe to call
    /// concurrently from the event loop (admin messages) and the writer
    /// thread (ring-sourced application messages).
    pub fn claim_outgoing_seq(&self) -> u32 {
        self.outgoing_seq.fetch_add(1, Ordering::AcqRel)
    }

    /// A snapshot of the next sequence number that will be claimed. For
    /// display/metrics only; never use to predict a specific claim's value.
    pub fn outgoing_seq(&self) -> u32 {
        self.outgoing_seq.load(Ordering::Acquire)
    }

    /// A cheap handle sharing the same underlying counter, for a writer
    /// thread that needs to claim sequence numbers independently of the
    /// `RuntimeState` the event loop holds.
    pub fn shared_outgoing_seq(&self) -> Arc<AtomicU32> {
        self.outgoing_seq.clone()
    }

    /// Resets both sequence counters to 1, as performed at EOD (§4.4) and on
    /// a `ResetSeqNumFlag` logon.
    pub fn reset_sequences(&mut self) {
        self.outgoing_seq.store(1, Ordering::Release);
        self.expected_incoming_seq = 1;
    }
}
