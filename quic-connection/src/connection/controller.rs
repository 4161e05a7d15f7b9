// Copyright (c) the quic-connection-core authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! `QuicConnection`: owns a `Framer` alongside the rest of a connection's
//! state, wiring the eight alarms to the sent/received packet managers and
//! driving the scoped-flush write pipeline every public entry point funnels
//! through.

use super::{state::ConnectionState, trace, CloseBehavior};
use crate::{
    config::Config,
    contracts::{
        CongestionController, DecodeError, Framer, Generator, Random, SerializedPacket, Visitor,
        Writer, WriteError, WriteOutcome,
    },
    flusher::AckMode,
    pending_queue::QueuedPacket,
    sent_packet_manager::TransmissionType,
    undecryptable::{EncryptionLevel, UndecryptablePacket},
    version_negotiation,
};
use quic_core::{
    connection::{self, close},
    endpoint::Perspective,
    frame::{self, AckElicitation},
    time::{Clock, Timestamp},
    transport,
};
use core::time::Duration;
use std::net::SocketAddr;

/// The widest MTU probe this connection will attempt, chosen to stay under
/// common Ethernet-plus-tunnel-overhead paths without needing a live PMTU
/// discovery protocol of its own. `SPEC_FULL.md` §4 resolves the open
/// question of the probe step algorithm: binary search towards this
/// ceiling, mirroring the halving search `rfc8899` (DPLPMTUD) describes.
const MAX_MTU_PROBE_SIZE: u16 = 1452;

/// How long to wait between MTU probes. Not itself congestion-controlled;
/// chosen to be comfortably slower than a handshake round trip so probing
/// never competes with connection establishment.
const MTU_PROBE_INTERVAL: Duration = Duration::from_secs(30);

/// Returned by [`QuicConnection::send_stream_data`] for a write that
/// carries neither payload bytes nor a fin bit, per `spec.md` §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, displaydoc::Display)]
/// a stream write must carry at least one byte of payload or the fin bit
pub struct EmptyWrite;

/// The controller for a single QUIC connection. Generic over every external
/// collaborator named in `spec.md` §1/§6: the wire codec (`F`, `G`), socket
/// I/O (`W`), the session layer (`V`), the congestion-control algorithm
/// (`C`), time and randomness (`Clk`, `R`), and how close reasons are
/// rendered for the peer (`Fmt`).
///
/// `framer` and `state` are disjoint fields rather than one type
/// implementing both roles, so `self.framer.parse_datagram(bytes, &mut
/// self.state)` borrows each independently; `ConnectionState` is the
/// `FramerCallbacks` implementor.
pub struct QuicConnection<F, G, W, V, C: CongestionController, Clk, R, Fmt> {
    framer: F,
    state: ConnectionState<G, W, V, C, Clk, R, Fmt>,
}

impl<F, G, W, V, C, Clk, R, Fmt> QuicConnection<F, G, W, V, C, Clk, R, Fmt>
where
    F: Framer,
    G: Generator,
    W: Writer,
    V: Visitor,
    C: CongestionController,
    Clk: Clock,
    R: Random,
    Fmt: close::Formatter + Default,
{
    /// Builds a new connection and arms its handshake/idle timeout.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        perspective: Perspective,
        framer: F,
        generator: G,
        writer: W,
        visitor: V,
        congestion_controller: C,
        clock: Clk,
        random: R,
        config: Config,
        is_supported_version: fn(u32) -> bool,
        self_addr: SocketAddr,
        peer_addr: SocketAddr,
        long_term_mtu: u16,
    ) -> Self {
        let state = ConnectionState::new(
            perspective,
            generator,
            writer,
            visitor,
            congestion_controller,
            clock,
            random,
            config,
            is_supported_version,
            self_addr,
            peer_addr,
            long_term_mtu,
        );

        let mut connection = Self { framer, state };
        connection.rearm_timeout_alarm();
        connection.state.alarms.mtu_discovery.set(
            connection.state.created_at + MTU_PROBE_INTERVAL,
        );
        connection
    }

    /// `spec.md` §4.1 `process_udp`: dispatches one received datagram.
    pub fn process_udp(
        &mut self,
        self_addr: SocketAddr,
        peer_addr: SocketAddr,
        datagram: &[u8],
        now: Timestamp,
    ) {
        if !self.state.connected {
            return;
        }

        self.state.self_addr = self_addr;
        self.state.observed_peer_addr = peer_addr;
        self.state.current_recv_time = now;

        if self.handle_version_negotiation(datagram) {
            return;
        }

        if !self.state.generator.is_pending_packet_empty() {
            // `spec.md` §5: a packet must be fully flushed before the next
            // incoming header is dispatched, since a half-assembled packet
            // sharing a buffer with the next read would corrupt packet
            // number ordering on the wire.
            self.state
                .close_transport(transport::Error::INTERNAL_ERROR, CloseBehavior::SendClosePacket);
            return;
        }

        self.flush(now, AckMode::IfQueued, |conn| {
            match conn.framer.parse_datagram(datagram, &mut conn.state) {
                Ok(()) => {}
                Err(DecodeError { undecryptable: true }) => {
                    conn.state.undecryptable.try_buffer(UndecryptablePacket {
                        datagram: datagram.to_vec(),
                    });
                }
                Err(DecodeError { undecryptable: false }) => {
                    conn.state.packets_dropped += 1;
                }
            }
        });

        self.rearm_timeout_alarm();
    }

    /// Client-side version negotiation (`spec.md` §4.1). Returns `true` if
    /// `datagram` was fully handled here and `process_udp` should stop.
    fn handle_version_negotiation(&mut self, datagram: &[u8]) -> bool {
        if !self.state.perspective.is_client() || self.state.version_negotiation.is_negotiated() {
            return false;
        }

        if self.framer.is_version_negotiation_packet(datagram) {
            let chosen = self
                .framer
                .negotiate_version(datagram, &|v| self.state.is_version_supported(v));
            if let Some(version) = chosen {
                self.accept_negotiated_version(version);
            }
            return true;
        }

        let Some(version) = self.framer.packet_version(datagram) else {
            return false;
        };

        let is_supported = self.state.is_version_supported(version);
        match self
            .state
            .version_negotiation
            .on_incoming_version(version, is_supported)
        {
            version_negotiation::Action::Drop => true,
            // Building the wire bytes of a version-negotiation packet is
            // out of scope here (`spec.md` §1); the state transition still
            // runs so a later supported-version packet is handled
            // correctly, but nothing is sent back for this one.
            version_negotiation::Action::EmitVersionNegotiation => true,
            version_negotiation::Action::AcceptAndRetransmitAll { version } => {
                self.accept_negotiated_version(version);
                false
            }
        }
    }

    fn accept_negotiated_version(&mut self, version: u32) {
        let retransmitted = self.state.sent.retransmit_all_unacked();
        trace!(
            version,
            discarded = retransmitted.len(),
            "version negotiated, discarding unacked packets from the old version"
        );
        self.state.visitor.on_successful_version_negotiation(version);
    }

    /// `spec.md` §4.1 `send_stream_data`. Returns the number of bytes of
    /// `payload` actually queued and whether `fin` was queued with them.
    /// Fails with [`EmptyWrite`] if `payload` is empty and `fin` is false —
    /// such a call carries nothing worth framing and almost always signals
    /// a caller bug rather than legitimate zero-byte traffic.
    pub fn send_stream_data(
        &mut self,
        stream_id: u64,
        offset: u64,
        payload: &[u8],
        fin: bool,
    ) -> Result<(usize, bool), EmptyWrite> {
        if payload.is_empty() && !fin {
            return Err(EmptyWrite);
        }

        if !self.state.connected {
            return Ok((0, false));
        }

        let now = self.state.clock.get_time();
        Ok(self.flush(now, AckMode::IfQueued, |conn| {
            conn.state
                .generator
                .queue_stream_data(stream_id, offset, payload, fin)
        }))
    }

    /// `spec.md` §4.1 `send_control_frame`. Returns whether the frame was
    /// accepted (the generator may refuse it if the per-packet frame
    /// budget is already full; the caller retries once more room opens up).
    pub fn send_control_frame(&mut self, frame: frame::Frame) -> bool {
        if !self.state.connected {
            return false;
        }

        let now = self.state.clock.get_time();
        self.flush(now, AckMode::IfQueued, |conn| {
            conn.state.generator.queue_frame(&frame)
        })
    }

    /// `spec.md` §4.1 `close_with`. Delegates directly to
    /// [`ConnectionState::close_with`], which builds and writes its own
    /// close packet outside the ordinary pending-queue pipeline, so this
    /// is deliberately not run through [`Self::flush`].
    pub fn close_with(&mut self, error: connection::Error, behavior: CloseBehavior) {
        self.state.close_with(error, behavior);
    }

    /// The last CONNECTION_CLOSE packet this connection wrote, if any,
    /// for a surrounding time-wait manager to keep replaying to any further
    /// datagram that arrives for this connection ID after `close_with` has
    /// already torn everything else down (`spec.md` §4.1.4).
    pub fn retained_close_packet(&self) -> Option<&[u8]> {
        self.state.retained_close_packet.as_deref()
    }

    /// Seeds the sent-packet manager from a previous connection's
    /// `CachedNetworkParameters`, so a resumed connection starts from the
    /// peer's last known RTT/bandwidth instead of slow-start. `spec.md` §6:
    /// the core keeps no persisted state of its own, so the visitor both
    /// supplies this on a new connection and is the one expected to save
    /// the replacement it gets back from a future `close_with`.
    pub fn resume_connection_state(&mut self, params: &quic_core::recovery::CachedNetworkParameters) {
        self.state.sent.resume_connection_state(params);
    }

    /// `spec.md` §4.1 `on_writer_unblocked`: drains whatever is waiting
    /// once the writer reports it can accept more.
    pub fn on_writer_unblocked(&mut self) {
        let now = self.state.clock.get_time();
        while self.attempt_write_one(now) {}

        if self.state.pending.is_empty() && !self.state.generator.has_queued_frames() {
            self.state.visitor.on_can_write();
        }
    }

    /// `spec.md` §4.1.3 `can_write`: whether the caller should even attempt
    /// to produce more data right now, without actually producing any.
    pub fn can_write(&mut self, has_retransmittable_data: bool) -> bool {
        if !self.state.connected {
            return false;
        }

        // Pending timer-driven transmissions (TLP/RTO/handshake/probing)
        // must write unconditionally, even if the writer happens to be
        // transiently blocked right now (`spec.md` §4.1.3).
        if self.state.probes_owed > 0 {
            return true;
        }

        if self.state.writer.is_write_blocked() {
            self.state.visitor.on_write_blocked();
            return false;
        }

        if !has_retransmittable_data {
            return true;
        }

        if self.state.alarms.send.is_armed() {
            return false;
        }

        match self.state.sent.time_until_send(self.state.clock.get_time()) {
            None => false,
            Some(delay) if delay.is_zero() => true,
            Some(delay) => {
                self.state.config.supports_release_time
                    && delay <= self.state.config.release_time_into_future
            }
        }
    }

    /// Signals that the TLS handshake has been confirmed; disarms the
    /// handshake deadline folded into `timeout_alarm` in favor of the plain
    /// idle deadline.
    pub fn on_handshake_confirmed(&mut self) {
        self.state.handshake_confirmed = true;
        self.rearm_timeout_alarm();
    }

    /// Signals that a new encryption level's keys have been installed.
    /// Neuters unencrypted packets once forward-secure keys arrive
    /// (`spec.md` §4.2) and re-attempts every buffered undecryptable
    /// packet against the new key (`spec.md` §4.1.7).
    pub fn on_encryption_level_installed(&mut self, level: EncryptionLevel) {
        self.state.encryption_level = level;

        if level.is_forward_secure() {
            self.state.sent.neuter_unencrypted_packets();
        }

        for packet in self.state.undecryptable.take_all() {
            match self.framer.parse_datagram(&packet.datagram, &mut self.state) {
                Ok(()) => {}
                Err(DecodeError { undecryptable: true }) if !level.is_forward_secure() => {
                    self.state.undecryptable.try_buffer(packet);
                }
                Err(_) => {
                    self.state.packets_dropped += 1;
                }
            }
        }

        self.rearm_timeout_alarm();
    }

    /// Runs every alarm whose deadline has passed as of `now`. `spec.md`
    /// §4.1.5 names eight independent timers; each fires (and disarms)
    /// independently, so more than one may run in the same call.
    pub fn on_timer_expired(&mut self, now: Timestamp) {
        if self.state.alarms.ack.poll_expiration(now).is_ready() {
            self.fire_ack_alarm(now);
        }
        if self.state.alarms.retransmission.poll_expiration(now).is_ready() {
            self.fire_retransmission_alarm(now);
        }
        if self.state.alarms.send.poll_expiration(now).is_ready() {
            self.fire_send_alarm(now);
        }
        if self.state.alarms.timeout.poll_expiration(now).is_ready() {
            self.fire_timeout_alarm(now);
        }
        if self.state.alarms.ping.poll_expiration(now).is_ready() {
            self.fire_ping_alarm(now);
        }
        if self.state.alarms.mtu_discovery.poll_expiration(now).is_ready() {
            self.fire_mtu_discovery_alarm(now);
        }
        if self.state.alarms.path_degrading.poll_expiration(now).is_ready() {
            self.state.visitor.on_path_degrading();
        }
        if self
            .state
            .alarms
            .retransmittable_on_wire
            .poll_expiration(now)
            .is_ready()
        {
            self.fire_retransmittable_on_wire_alarm(now);
        }
    }

    fn fire_ack_alarm(&mut self, now: Timestamp) {
        self.flush(now, AckMode::Always, |_| {});
    }

    /// `spec.md` §4.1.5/§8: RFC 9002 PTO firing. Schedules the owed probes
    /// and, once five have fired back to back with `close_connection_
    /// after_five_rtos` set, closes with `too_many_rtos`.
    fn fire_retransmission_alarm(&mut self, now: Timestamp) {
        let outcome = self.state.sent.on_retransmission_timeout(&self.state.config, now);

        if outcome.close_with_too_many_rtos {
            self.state
                .close_transport(transport::Error::TOO_MANY_RTOS, CloseBehavior::SendClosePacket);
            return;
        }

        if outcome.probes_required == 0 {
            return;
        }

        self.state.probes_owed = self
            .state
            .probes_owed
            .saturating_add(outcome.probes_required);

        self.flush(now, AckMode::IfPending, |conn| conn.send_pto_probes(now));
    }

    /// Sends whatever probe packets are currently owed, consuming
    /// `probes_owed` one at a time so a writer that goes `Blocked` partway
    /// through leaves the remainder to be retried later.
    fn send_pto_probes(&mut self, now: Timestamp) {
        while self.state.probes_owed > 0 {
            self.state
                .generator
                .queue_frame(&frame::Frame::Ping(frame::Ping));
            self.state.sent.on_probe_sent();
            self.state.probes_owed -= 1;

            if !self.attempt_write_one(now) {
                break;
            }
        }
    }

    fn fire_send_alarm(&mut self, now: Timestamp) {
        self.flush(now, AckMode::IfPending, |conn| {
            if !conn.attempt_write_one(now) {
                conn.state.visitor.on_can_write();
            }
        });
    }

    /// `timeout_alarm` covers both the handshake deadline (before
    /// `handshake_confirmed`) and the idle deadline, folded into one timer
    /// since at most one is ever the binding constraint.
    fn timeout_deadline(&self) -> Timestamp {
        let idle_deadline = self.state.current_recv_time
            + self.state.config.effective_idle_timeout(self.state.perspective);

        if self.state.handshake_confirmed {
            idle_deadline
        } else {
            let handshake_deadline = self.state.created_at + self.state.config.handshake_timeout;
            idle_deadline.min(handshake_deadline)
        }
    }

    fn rearm_timeout_alarm(&mut self) {
        let deadline = self.timeout_deadline();
        self.state.alarms.timeout.set(deadline);
    }

    fn fire_timeout_alarm(&mut self, now: Timestamp) {
        if !self.state.handshake_confirmed {
            let handshake_deadline = self.state.created_at + self.state.config.handshake_timeout;
            if handshake_deadline.has_elapsed(now) {
                self.state
                    .close_with(connection::Error::HandshakeTimerExpired, CloseBehavior::SendClosePacket);
                return;
            }
        }

        let behavior = if self.state.config.silent_close_on_idle {
            CloseBehavior::Silent
        } else {
            CloseBehavior::SendClosePacketNoAck
        };
        self.state
            .close_with(connection::Error::IdleTimerExpired, behavior);
    }

    fn fire_ping_alarm(&mut self, now: Timestamp) {
        if self.state.visitor.has_pending_handshake() || self.state.sent.has_unacked_retransmittable() {
            self.state.visitor.send_ping();
        }
        self.state.alarms.ping.set(now + self.state.config.ping_timeout);
    }

    fn fire_mtu_discovery_alarm(&mut self, now: Timestamp) {
        if self.state.mtu_probe_in_flight.is_none() {
            let floor = self.state.mtu_target.max(self.state.long_term_mtu);
            if floor < MAX_MTU_PROBE_SIZE {
                let candidate = floor + (MAX_MTU_PROBE_SIZE - floor).div_ceil(2);
                if let Some(probe) = self.state.generator.build_mtu_probe(candidate) {
                    let number = probe.packet_number;
                    self.enqueue_serialized(probe, now);
                    self.state.mtu_target = candidate;
                    self.state.mtu_probe_in_flight = Some(number);
                    while self.attempt_write_one(now) {}

                    // `write_pending_head`'s `MsgTooBig` branch resets
                    // `mtu_target` to 0 and cancels this same alarm
                    // (`spec.md` §4.1.4); rearming unconditionally below
                    // would undo that and retry the identical size forever.
                    if self.state.mtu_target == 0 {
                        return;
                    }
                }
            }
        }

        self.state.alarms.mtu_discovery.set(now + MTU_PROBE_INTERVAL);
    }

    fn fire_retransmittable_on_wire_alarm(&mut self, now: Timestamp) {
        self.flush(now, AckMode::None, |conn| {
            conn.state
                .generator
                .queue_frame(&frame::Frame::Ping(frame::Ping));
        });
    }

    /// Runs `body` inside a flush scope: on entry, emits whatever ack
    /// `ack_mode` calls for; once the outermost scope in the current nest
    /// exits, re-checks for an ack queued by `body` itself, then drains
    /// every queued frame into packets and writes as many as the writer
    /// accepts (`spec.md` §4.1.2). Using
    /// [`crate::flusher::FlusherState::enter`]/`exit` directly (rather than
    /// `FlusherGuard`) is what lets `body` keep borrowing `&mut self`
    /// mid-scope, e.g. to hand `&mut self.state` to `self.framer`.
    fn flush<T>(&mut self, now: Timestamp, ack_mode: AckMode, body: impl FnOnce(&mut Self) -> T) -> T {
        let is_outermost = self.state.flusher.enter();
        if is_outermost {
            self.emit_ack(now, ack_mode);
        }

        let result = body(self);

        if self.state.flusher.exit() {
            self.release(now);
        }

        result
    }

    fn emit_ack(&mut self, now: Timestamp, ack_mode: AckMode) {
        let should_emit = match ack_mode {
            AckMode::Always => true,
            AckMode::IfQueued => self.state.received.is_ack_queued(),
            AckMode::IfPending => {
                self.state.received.is_ack_queued() || self.state.received.has_new_missing_packets()
            }
            AckMode::None => false,
        };

        if !should_emit {
            return;
        }

        if let Some(ack) = self.state.build_ack_frame(now) {
            self.state.generator.queue_frame(&frame::Frame::Ack(ack));
            self.state.alarms.ack.cancel();
        }
    }

    /// Runs once, at the outermost exit of a flush scope: writes out
    /// everything produced during the scope and, if any packet carrying
    /// new retransmittable data was sent, rearms the retransmission alarm
    /// exactly once for the whole batch.
    fn release(&mut self, now: Timestamp) {
        // `body` may have queued an ack mid-scope (e.g. a retransmittable
        // packet pushing the tcp_acking counter past its threshold); the
        // entry-time `emit_ack` call only saw state from *before* `body`
        // ran, so re-check here or the ack sits un-flushed until some
        // unrelated later event happens to flush it.
        self.emit_ack(now, AckMode::IfQueued);

        while self.attempt_write_one(now) {}

        if self.state.flusher.take_retransmission_alarm_deferred() {
            self.state.rearm_retransmission_alarm();
        }

        if self.state.sent.bytes_in_flight() == 0 {
            self.state.sent.report_application_limited();
        }
    }

    /// Serializes one more queued frame batch (if the pending queue is
    /// currently empty) and writes the pending queue's head, in that
    /// order, so packet-number order on the wire always matches queuing
    /// order. Returns whether a packet was actually handed to the writer.
    fn attempt_write_one(&mut self, now: Timestamp) -> bool {
        if self.state.writer.is_write_blocked() {
            return false;
        }

        if self.state.pending.is_empty() {
            if !self.state.generator.has_queued_frames() {
                return false;
            }

            let max_packet_size = self.state.writer.get_max_packet_size(self.state.peer_addr) as usize;
            match self.state.generator.flush_all_queued_frames(max_packet_size) {
                Some(packet) => self.enqueue_serialized(packet, now),
                None => return false,
            }
        }

        self.write_pending_head(now)
    }

    fn enqueue_serialized(&mut self, packet: SerializedPacket, now: Timestamp) {
        let ack_elicitation = if packet.is_retransmittable {
            AckElicitation::Eliciting
        } else {
            AckElicitation::NonEliciting
        };
        let transmission_type =
            core::mem::replace(&mut self.state.next_transmission_type, TransmissionType::Initial);
        let sent_bytes = packet.bytes.len() as u32;

        let should_rearm = self.state.sent.on_packet_sent(
            packet.packet_number,
            now,
            sent_bytes,
            transmission_type,
            ack_elicitation,
            self.state.encryption_level,
            None,
        );

        if should_rearm {
            if self.state.flusher.is_flushing() {
                self.state.flusher.defer_retransmission_alarm();
            } else {
                self.state.rearm_retransmission_alarm();
            }
        }

        self.state.last_send_time = Some(now);
        self.state.pending.push(QueuedPacket { bytes: packet.bytes });
    }

    fn write_pending_head(&mut self, now: Timestamp) -> bool {
        let Some(next) = self.state.pending.front().cloned() else {
            return false;
        };

        let release_time = self.release_time_hint(now);
        let outcome = self.state.writer.write_packet(
            &next.bytes,
            self.state.self_addr,
            self.state.peer_addr,
            release_time,
        );

        match outcome {
            WriteOutcome::Ok => {
                self.state.pending.pop_front();
                true
            }
            WriteOutcome::Blocked => {
                self.state.visitor.on_write_blocked();
                false
            }
            // `spec.md` §4.1.4: an oversized MTU probe failing with
            // `MsgTooBig` just disables further probing; any other packet
            // hitting this means the writer's `get_max_packet_size` lied,
            // which is a local bug, not a transient condition.
            WriteOutcome::Error(WriteError::MsgTooBig) => {
                self.state.pending.pop_front();
                self.state.mtu_target = 0;
                self.state.mtu_probe_in_flight = None;
                self.state.alarms.mtu_discovery.cancel();
                true
            }
            WriteOutcome::Error(WriteError::Other) => {
                self.state.pending.pop_front();
                self.state
                    .close_transport(transport::Error::PACKET_WRITE_ERROR, CloseBehavior::Silent);
                false
            }
        }
    }

    fn release_time_hint(&self, now: Timestamp) -> Option<Duration> {
        if !self.state.writer.supports_release_time() {
            return None;
        }
        self.state
            .sent
            .next_release_time()
            .map(|departure| departure.saturating_duration_since(now))
    }
}
