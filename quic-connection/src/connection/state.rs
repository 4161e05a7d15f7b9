// Copyright (c) the quic-connection-core authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! `ConnectionState`: everything about a connection except the framer
//! itself. Implements [`FramerCallbacks`] so [`super::QuicConnection`] can
//! hand `&mut self.state` to `self.framer.parse_datagram` as the callback
//! sink.

use super::{trace, CloseBehavior, FrameResult};
use crate::{
    alarms::AlarmSet,
    config::Config,
    contracts::{
        CongestionController, FramerCallbacks, Generator, PacketHeader, Random, Visitor, Writer,
    },
    flusher::FlusherState,
    migration::{AddressChangeType, EffectivePeerMigration},
    pending_queue::PendingQueue,
    received_packet_manager::ReceivedPacketManager,
    sent_packet_manager::{SentPacketManager, TransmissionType},
    undecryptable::{EncryptionLevel, UndecryptableBuffer},
    version_negotiation,
};
use quic_core::{
    ack::Settings,
    connection::{self, close},
    endpoint::{Location, Perspective},
    frame::{self, PacketContent},
    packet::number::{PacketNumber, PacketNumberSpace},
    time::Clock,
    transport,
    varint::VarInt,
};
use std::net::SocketAddr;

/// Per-packet scratch state, reset at the start of [`ConnectionState::on_packet_header`]
/// and consumed by [`ConnectionState::on_packet_complete`].
#[derive(Debug, Default)]
struct InFlightPacket {
    number: Option<PacketNumber>,
    retransmittable: bool,
    was_missing: bool,
    gap_since_previous: Option<core::time::Duration>,
    content: PacketContent,
    migration_candidate: Option<AddressChangeType>,
}

/// `spec.md` §3/§4.1: the data a single QUIC connection carries, generic
/// over every external collaborator it's built from.
pub struct ConnectionState<G, W, V, C: CongestionController, Clk, R, Fmt> {
    pub(super) perspective: Perspective,
    pub(super) config: Config,
    close_formatter: Fmt,

    pub(super) self_addr: SocketAddr,
    pub(super) peer_addr: SocketAddr,
    pub(super) observed_peer_addr: SocketAddr,

    pub(super) encryption_level: EncryptionLevel,
    pub(super) handshake_confirmed: bool,
    pub(super) connected: bool,
    closed_notified: bool,
    /// The last CONNECTION_CLOSE packet this connection wrote, kept around
    /// per `spec.md` §4.1.4's "termination packets... are copied and
    /// retained for retransmission by a time-wait manager": once
    /// `connected` is false this core stops reacting to anything, so an
    /// external listener that keeps routing datagrams for this connection
    /// ID needs a ready-made reply rather than re-running the state
    /// machine.
    pub(super) retained_close_packet: Option<Vec<u8>>,

    pub(super) version_negotiation: version_negotiation::State,
    is_supported_version: fn(u32) -> bool,

    pub(super) sent: SentPacketManager<C>,
    pub(super) received: ReceivedPacketManager,
    ack_settings: Settings,

    pub(super) alarms: AlarmSet,
    pub(super) flusher: FlusherState,
    pub(super) pending: PendingQueue,
    pub(super) undecryptable: UndecryptableBuffer,
    migration: EffectivePeerMigration,

    in_flight: InFlightPacket,
    pub(super) current_recv_time: quic_core::time::Timestamp,

    pub(super) generator: G,
    pub(super) writer: W,
    pub(super) visitor: V,
    pub(super) clock: Clk,
    #[allow(dead_code)]
    pub(super) random: R,

    pub(super) last_send_time: Option<quic_core::time::Timestamp>,
    pub(super) packets_dropped: u64,

    pub(super) probes_owed: u8,
    pub(super) next_transmission_type: TransmissionType,

    pub(super) long_term_mtu: u16,
    pub(super) mtu_target: u16,
    pub(super) mtu_probe_in_flight: Option<PacketNumber>,

    pub(super) created_at: quic_core::time::Timestamp,
}

#[allow(clippy::too_many_arguments)]
impl<G, W, V, C, Clk, R, Fmt> ConnectionState<G, W, V, C, Clk, R, Fmt>
where
    G: Generator,
    W: Writer,
    V: Visitor,
    C: CongestionController,
    Clk: Clock,
    R: Random,
    Fmt: close::Formatter + Default,
{
    pub(super) fn new(
        perspective: Perspective,
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
        let now = clock.get_time();
        Self {
            perspective,
            close_formatter: Fmt::default(),
            self_addr,
            peer_addr,
            observed_peer_addr: peer_addr,
            encryption_level: EncryptionLevel::None,
            handshake_confirmed: false,
            connected: true,
            closed_notified: false,
            retained_close_packet: None,
            version_negotiation: version_negotiation::State::default(),
            is_supported_version,
            sent: SentPacketManager::new(
                PacketNumberSpace::ApplicationData,
                congestion_controller,
                quic_core::recovery::DEFAULT_INITIAL_RTT,
            ),
            received: ReceivedPacketManager::new(),
            ack_settings: Settings::RECOMMENDED,
            alarms: AlarmSet::new(),
            flusher: FlusherState::new(),
            pending: PendingQueue::new(),
            undecryptable: UndecryptableBuffer::new(config.max_undecryptable_packets),
            migration: EffectivePeerMigration::default(),
            in_flight: InFlightPacket::default(),
            current_recv_time: now,
            generator,
            writer,
            visitor,
            clock,
            random,
            last_send_time: None,
            packets_dropped: 0,
            probes_owed: 0,
            next_transmission_type: TransmissionType::Initial,
            long_term_mtu,
            mtu_target: 0,
            mtu_probe_in_flight: None,
            created_at: now,
            config,
        }
    }

    pub(super) fn rearm_retransmission_alarm(&mut self) {
        match self.sent.get_retransmission_time() {
            Some(deadline) => self.alarms.retransmission.set(deadline),
            None => self.alarms.retransmission.cancel(),
        }
    }

    /// `spec.md` §4.1 `close_with`: idempotent, notifies the visitor exactly
    /// once, cancels every alarm, and (unless `Silent`) attempts to send one
    /// CONNECTION_CLOSE packet built by `close_formatter`.
    pub(super) fn close_with(&mut self, error: connection::Error, behavior: CloseBehavior) {
        if !self.connected {
            return;
        }

        trace!(?error, ?behavior, "connection closing");

        if !matches!(behavior, CloseBehavior::Silent) {
            self.pending.clear();
            if let Some(close_frame) = self.build_close_frame(&error) {
                let wire_frame = frame::Frame::ConnectionClose(close_frame);
                self.generator.queue_frame(&wire_frame);
                let max_packet_size = self.writer.get_max_packet_size(self.peer_addr) as usize;
                if let Some(packet) = self.generator.flush_all_queued_frames(max_packet_size) {
                    let _ = self
                        .writer
                        .write_packet(&packet.bytes, self.self_addr, self.peer_addr, None);
                    self.retained_close_packet = Some(packet.bytes);
                }
            }
        }

        self.connected = false;

        if !self.closed_notified {
            self.closed_notified = true;
            self.visitor.on_connection_closed(&error);
        }

        self.alarms.cancel_all();
    }

    fn build_close_frame(&self, error: &connection::Error) -> Option<frame::ConnectionClose> {
        if !error.should_send_close_frame() {
            return None;
        }

        let addr_str = std::format!("{}", self.peer_addr);
        let ctx = close::Context {
            remote_address_debug: &addr_str,
        };
        let early = !self.handshake_confirmed;

        Some(match error {
            connection::Error::Closed { .. } => transport::Error::NO_ERROR.into(),
            connection::Error::Transport { error, .. } => {
                if early {
                    self.close_formatter.format_early_transport_error(&ctx, *error)
                } else {
                    self.close_formatter.format_transport_error(&ctx, *error)
                }
            }
            connection::Error::Application { error, .. } => {
                if early {
                    self.close_formatter
                        .format_early_application_error(&ctx, *error)
                } else {
                    self.close_formatter.format_application_error(&ctx, *error)
                }
            }
            _ => return None,
        })
    }

    pub(super) fn close_transport(&mut self, code: transport::Error, behavior: CloseBehavior) {
        let error = connection::Error::from_transport_error(code, Location::Local);
        self.close_with(error, behavior);
    }

    /// `spec.md` §4.1.1 `maybe_queue_ack`, wired to the ack alarm.
    fn maybe_queue_ack(&mut self, now: quic_core::time::Timestamp) {
        use crate::received_packet_manager::AckDecision;

        let number = match self.in_flight.number {
            Some(number) => number,
            None => return,
        };
        let min_rtt = self.sent.rtt_estimator().min_rtt();
        let smoothed_rtt = self.sent.rtt_estimator().smoothed_rtt();

        let decision = self.received.on_packet_received(
            &self.config,
            &self.ack_settings,
            number,
            self.in_flight.was_missing,
            self.in_flight.retransmittable,
            now,
            min_rtt,
            smoothed_rtt,
            self.in_flight.gap_since_previous,
        );

        match decision {
            AckDecision::Unchanged => {}
            AckDecision::QueueImmediately => self.alarms.ack.cancel(),
            AckDecision::ArmAlarm { deadline } => self.alarms.update_ack(deadline),
        }
    }

    /// `spec.md` §4.2 generator responsibility "builds the outgoing ACK
    /// frame from whatever the received-packet manager currently owes the
    /// peer". Exposed to [`super::controller`] because `ack_settings` is
    /// otherwise private to this module.
    pub(super) fn build_ack_frame(
        &mut self,
        now: quic_core::time::Timestamp,
    ) -> Option<frame::Ack> {
        let data = self.received.get_updated_ack_frame(now)?;
        let ack_ranges = data
            .ranges
            .iter()
            .map(|range| frame::AckRange {
                start: range.start().as_varint(),
                end: range.end().as_varint(),
            })
            .collect();

        Some(frame::Ack {
            largest_acked: data.largest_acked.as_varint(),
            ack_delay: self.ack_settings.encode_ack_delay(data.ack_delay),
            ack_ranges,
            ecn_counts: None,
        })
    }

    /// Exposes the `is_supported_version` collaborator fn pointer to
    /// `super::controller`, which needs it to drive version negotiation
    /// before a packet has been assigned a `PacketNumberSpace`.
    pub(super) fn is_version_supported(&self, version: u32) -> bool {
        (self.is_supported_version)(version)
    }

    fn close_if_too_many_outstanding_sent_packets(&mut self) {
        if let (Some(largest_acked), Some(least_unacked)) =
            (self.sent.largest_acked(), self.sent.least_unacked())
        {
            if let Some(span) = largest_acked.checked_distance(least_unacked) {
                if span > self.config.max_tracked_packets {
                    self.close_transport(
                        transport::Error::TOO_MANY_OUTSTANDING_SENT_PACKETS,
                        CloseBehavior::SendClosePacket,
                    );
                }
            }
        }
    }
}

impl<G, W, V, C, Clk, R, Fmt> FramerCallbacks for ConnectionState<G, W, V, C, Clk, R, Fmt>
where
    G: Generator,
    W: Writer,
    V: Visitor,
    C: CongestionController,
    Clk: Clock,
    R: Random,
    Fmt: close::Formatter + Default,
{
    fn on_packet_header(&mut self, header: PacketHeader) -> Result<(), connection::ProcessingError> {
        let number = header.packet_number;

        if !self.received.is_awaiting(number) {
            self.packets_dropped += 1;
            return Err(connection::ProcessingError::DuplicatePacket);
        }

        if let Some(largest) = self.received.largest_observed() {
            let gap = number
                .checked_distance(largest)
                .or_else(|| largest.checked_distance(number))
                .unwrap_or(u64::MAX);
            if gap > self.config.max_packet_gap {
                let error = connection::Error::from_transport_error(
                    transport::Error::INVALID_PACKET_HEADER,
                    Location::Local,
                );
                self.close_with(error, CloseBehavior::SendClosePacket);
                return Err(error.into());
            }
        }

        if self.perspective.is_client() {
            self.peer_addr = self.observed_peer_addr;
        } else if self.observed_peer_addr != self.peer_addr {
            self.in_flight.migration_candidate = Some(AddressChangeType::classify(
                self.peer_addr,
                self.observed_peer_addr,
            ));
        }

        let previously_received = self.received.last_received_time();
        self.in_flight.gap_since_previous = previously_received
            .map(|previous| self.current_recv_time.saturating_duration_since(previous));
        self.in_flight.was_missing = self.received.record(number, self.current_recv_time);
        self.in_flight.number = Some(number);
        self.in_flight.retransmittable = false;
        self.in_flight.content = PacketContent::default();

        Ok(())
    }

    fn on_ack_frame(&mut self, ack: &frame::Ack) -> FrameResult {
        self.in_flight.content = self.in_flight.content.record_opaque();

        let space = PacketNumberSpace::ApplicationData;
        let largest_acked = space.new_packet_number(ack.largest_acked);
        let ack_delay = self.ack_settings.decode_ack_delay(ack.ack_delay);

        if self.sent.on_ack_frame_start(largest_acked, ack_delay).is_err() {
            let error = connection::Error::from_transport_error(
                transport::Error::INVALID_ACK_DATA,
                Location::Local,
            );
            self.close_with(error, CloseBehavior::SendClosePacket);
            return Err(error);
        }

        for range in &ack.ack_ranges {
            let start = space.new_packet_number(range.start);
            let end = space.new_packet_number(range.end);
            self.sent.on_ack_range(start, end);
        }

        let now = self.current_recv_time;
        let outcome = self.sent.on_ack_frame_end(now);

        if outcome.acked_new_packet {
            self.rearm_retransmission_alarm();
            self.alarms.path_degrading.cancel();

            if self.perspective.is_server() {
                if let Some(&highest) = outcome.newly_acked.last() {
                    self.migration.on_packet_acked(highest);
                }
            }

            if let Some(probe) = self.mtu_probe_in_flight {
                if outcome.newly_acked.contains(&probe) {
                    self.long_term_mtu = self.mtu_target;
                    self.mtu_probe_in_flight = None;
                }
            }

            self.visitor.on_forward_progress_confirmed(now);
        }

        Ok(())
    }

    fn on_stop_waiting_frame(&mut self, frame: &frame::StopWaiting) -> FrameResult {
        self.in_flight.retransmittable = true;
        self.in_flight.content = self.in_flight.content.record_opaque();

        let least_unacked = PacketNumberSpace::ApplicationData.new_packet_number(frame.least_unacked);
        self.received.dont_wait_for_packets_before(least_unacked);
        Ok(())
    }

    fn on_connection_close_frame(&mut self, frame: &frame::ConnectionClose) -> FrameResult {
        self.in_flight.content = self.in_flight.content.record_opaque();

        let transport_error = transport::Error::new(frame.error_code);
        let error = connection::Error::from_transport_error(transport_error, Location::Remote);
        self.close_with(error, CloseBehavior::Silent);
        Ok(())
    }

    fn on_ping_frame(&mut self) -> FrameResult {
        self.in_flight.retransmittable = true;
        self.in_flight.content = self.in_flight.content.record(&frame::Frame::Ping(frame::Ping));
        Ok(())
    }

    fn on_path_challenge_frame(&mut self, frame: &frame::PathChallenge) -> FrameResult {
        self.in_flight.retransmittable = true;
        self.in_flight.content = self.in_flight.content.record_opaque();

        let response = frame::Frame::PathResponse(frame::PathResponse { data: frame.data });
        self.generator.queue_frame(&response);
        self.visitor.on_connectivity_probe_received();
        Ok(())
    }

    fn on_path_response_frame(&mut self, _frame: &frame::PathResponse) -> FrameResult {
        self.in_flight.retransmittable = true;
        self.in_flight.content = self.in_flight.content.record_opaque();
        Ok(())
    }

    fn on_opaque_frame(&mut self, frame: &frame::Frame) -> FrameResult {
        self.in_flight.retransmittable = frame.is_retransmittable();
        self.in_flight.content = self.in_flight.content.record(frame);

        // No richer routing information survives past `frame::Frame::Opaque`
        // than "some non-core frame"; everything collapsed into it is
        // forwarded through the one `Visitor` hook that doesn't require a
        // more specific frame type.
        self.visitor.on_stream_frame(frame);
        Ok(())
    }

    fn on_packet_complete(&mut self) -> FrameResult {
        let now = self.current_recv_time;
        let number = self
            .in_flight
            .number
            .take()
            .expect("on_packet_header always precedes on_packet_complete");
        let is_probe = self.in_flight.content.is_probe();

        if self.perspective.is_server() {
            if let Some(candidate) = self.in_flight.migration_candidate.take() {
                let is_new_largest = self.received.largest_observed() == Some(number);
                if is_new_largest && !is_probe && candidate != AddressChangeType::NoChange {
                    if let Some(highest_sent) = self.sent.largest_sent() {
                        self.migration.start(highest_sent);
                    }
                    self.peer_addr = self.observed_peer_addr;
                }
            }
        }

        self.maybe_queue_ack(now);
        self.close_if_too_many_outstanding_sent_packets();
        Ok(())
    }
}
