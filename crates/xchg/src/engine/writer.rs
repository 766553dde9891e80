//! Per-session writer tile (§4.2/§4.5): the only consumer of a session's
//! outbound ring. Claims the next wire sequence number, frames the ring
//! slot's payload for the session's protocol, journals the encoded frame,
//! and hands the bytes to the event loop over an mpsc channel — the event
//! loop alone owns the `TcpConnector` and may call `write_or_enqueue`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::Sender;
use std::time::Duration as StdDuration;

use mio::Token;
use xchg_codec::error::CodecError;
use xchg_codec::fix::{self, FixEncoder, FixTimestampCache};
use xchg_codec::soupbintcp::{self, packet_type};
use xchg_journal::{Direction, Stream};
use xchg_ring::Consumer;
use xchg_timing::Nanos;

use crate::session::Role;
use crate::tile::Tile;

const WIRE_BUF_SIZE: usize = 4096 + 256;
const CONSUME_PARK: StdDuration = StdDuration::from_millis(50);

/// Protocol-specific re-framing of a ring slot's bare application payload
/// into a full wire frame. A session's ring only ever carries one protocol's
/// slots, decided at session construction (§4.2).
pub enum OutboundProtocol {
    Fix { begin_string: &'static str, sender_id: String, target_id: String, ts_cache: FixTimestampCache },
    /// §4.4/§6: only the acceptor (server) side sends sequenced `S` packets;
    /// the initiator (client) side always sends unsequenced `U` packets.
    Ouch { role: Role },
}

impl OutboundProtocol {
    fn encode(
        &mut self,
        slot_msg_type: u8,
        payload: &[u8],
        seq: u32,
        now_ns: i64,
        buf: &mut [u8],
    ) -> Result<usize, CodecError> {
        match self {
            OutboundProtocol::Fix { begin_string, sender_id, target_id, ts_cache } => {
                let mt_buf = [slot_msg_type];
                let msg_type = std::str::from_utf8(&mt_buf).unwrap_or("0");
                let mut rendered = [0u8; 21];
                ts_cache.format(now_ns / 1_000_000, &mut rendered);

                let mut enc = FixEncoder::start(buf, *begin_string, msg_type)?;
                enc.write_tag_str(fix::TAG_SENDER_COMP_ID, sender_id.as_str())?;
                enc.write_tag_str(fix::TAG_TARGET_COMP_ID, target_id.as_str())?;
                enc.write_tag_int(fix::TAG_MSG_SEQ_NUM, i64::from(seq))?;
                enc.write_tag_timestamp(fix::TAG_SENDING_TIME, &rendered)?;
                enc.write_body_fields(payload)?;
                enc.commit()
            }
            OutboundProtocol::Ouch { role } => {
                soupbintcp::encode(buf, ouch_outbound_packet_type(*role), payload)
            }
        }
    }

    /// Tag recorded as the journal entry's `msg_type` for this frame.
    fn journal_msg_type(&self, slot_msg_type: u8) -> [u8; 1] {
        match self {
            OutboundProtocol::Fix { .. } => [slot_msg_type],
            OutboundProtocol::Ouch { role } => [ouch_outbound_packet_type(*role)],
        }
    }
}

/// §4.4/§6: the initiator always sends unsequenced `U` packets; only the
/// acceptor's replies are sequenced `S` packets.
fn ouch_outbound_packet_type(role: Role) -> u8 {
    match role {
        Role::Initiator => packet_type::UNSEQUENCED_DATA,
        Role::Acceptor => packet_type::SEQUENCED_DATA,
    }
}

/// Consumes one session's outbound ring and drives it to the wire. Runs on
/// its own pinned thread (§4.5 "Writer (one per session)").
pub struct WriterTile<const CAP: usize> {
    token: Token,
    consumer: Consumer<CAP>,
    journal: Arc<Stream>,
    outgoing_seq: Arc<AtomicU32>,
    protocol: OutboundProtocol,
    out_tx: Sender<(Token, Vec<u8>)>,
}

impl<const CAP: usize> WriterTile<CAP> {
    pub fn new(
        token: Token,
        consumer: Consumer<CAP>,
        journal: Arc<Stream>,
        outgoing_seq: Arc<AtomicU32>,
        protocol: OutboundProtocol,
        out_tx: Sender<(Token, Vec<u8>)>,
    ) -> Self {
        Self { token, consumer, journal, outgoing_seq, protocol, out_tx }
    }
}

impl<const CAP: usize> Tile for WriterTile<CAP> {
    fn loop_body(&mut self) -> bool {
        let Some(slot) = self.consumer.blocking_consume(CONSUME_PARK) else {
            return false;
        };

        let slot_msg_type = slot.msg_type();
        let seq = self.outgoing_seq.fetch_add(1, Ordering::AcqRel);
        let now_ns = i64::from(Nanos::now());
        let mut buf = [0u8; WIRE_BUF_SIZE];

        let encoded_len = match self.protocol.encode(slot_msg_type, slot.payload(), seq, now_ns, &mut buf) {
            Ok(len) => len,
            Err(err) => {
                tracing::error!(token = ?self.token, %seq, %err, "writer tile failed to encode outbound frame");
                slot.release();
                return true;
            }
        };
        slot.release();

        let frame = buf[..encoded_len].to_vec();
        let msg_type_tag = self.protocol.journal_msg_type(slot_msg_type);
        if let Err(err) = self.journal.write(Direction::Out, now_ns, seq, &msg_type_tag, &frame) {
            tracing::error!(token = ?self.token, %seq, %err, "writer tile failed to journal outbound frame");
        }

        if self.out_tx.send((self.token, frame)).is_err() {
            tracing::warn!(token = ?self.token, "writer tile's event-loop channel is gone; dropping frame");
        }
        true
    }
}
