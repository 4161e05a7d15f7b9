// Copyright (c) the quic-connection-core authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Fake collaborators for driving [`crate::connection::QuicConnection`] in
//! tests, mirroring the teacher's `connection::testing` fixtures: simple
//! recording stand-ins for every external trait, not full reimplementations
//! of a framer or congestion controller.

use crate::contracts::{
    DecodeError, Framer, FramerCallbacks, Generator, PacketHeader, SerializedPacket, Visitor,
    Writer, WriteError, WriteOutcome,
};
use quic_core::{
    application,
    connection::{
        self,
        close::{Context, Formatter},
    },
    frame,
    transport,
};
use core::time::Duration;
use std::net::SocketAddr;
use std::vec::Vec;

/// Queues frames and hands back whatever [`Self::next_serialized`] was
/// pre-loaded with, rather than actually encoding anything.
#[derive(Debug, Default)]
pub struct FakeGenerator {
    pub queued: Vec<frame::Frame>,
    pub next_serialized: Option<SerializedPacket>,
    pub queue_frame_result: bool,
    pub pending_packet_empty: bool,
}

impl Default for FakeGenerator {
    fn default() -> Self {
        Self {
            queued: Vec::new(),
            next_serialized: None,
            queue_frame_result: true,
            pending_packet_empty: true,
        }
    }
}

impl Generator for FakeGenerator {
    fn queue_frame(&mut self, frame: &frame::Frame) -> bool {
        if self.queue_frame_result {
            self.queued.push(frame.clone());
        }
        self.queue_frame_result
    }

    fn has_queued_frames(&self) -> bool {
        !self.queued.is_empty()
    }

    fn has_retransmittable_queued_frames(&self) -> bool {
        self.queued.iter().any(frame::Frame::is_retransmittable)
    }

    fn flush_all_queued_frames(&mut self, _max_packet_size: usize) -> Option<SerializedPacket> {
        if self.queued.is_empty() {
            return None;
        }
        self.queued.clear();
        self.next_serialized.take()
    }

    fn is_pending_packet_empty(&self) -> bool {
        self.pending_packet_empty
    }

    fn queue_stream_data(
        &mut self,
        _stream_id: u64,
        _offset: u64,
        payload: &[u8],
        fin: bool,
    ) -> (usize, bool) {
        (payload.len(), fin)
    }

    fn build_mtu_probe(&mut self, target_size: u16) -> Option<SerializedPacket> {
        self.next_serialized.take().map(|mut packet| {
            packet.bytes.resize(target_size as usize, 0);
            packet
        })
    }
}

/// Records every packet handed to [`Writer::write_packet`] in order.
#[derive(Debug)]
pub struct FakeWriter {
    pub written: Vec<Vec<u8>>,
    pub blocked: bool,
    pub max_packet_size: u16,
    pub release_time_supported: bool,
    pub error: Option<WriteError>,
}

impl Default for FakeWriter {
    fn default() -> Self {
        Self {
            written: Vec::new(),
            blocked: false,
            max_packet_size: 1200,
            release_time_supported: false,
            error: None,
        }
    }
}

impl Writer for FakeWriter {
    fn write_packet(
        &mut self,
        bytes: &[u8],
        _self_addr: SocketAddr,
        _peer_addr: SocketAddr,
        _release_time: Option<Duration>,
    ) -> WriteOutcome {
        if self.blocked {
            return WriteOutcome::Blocked;
        }
        if let Some(error) = self.error {
            return WriteOutcome::Error(error);
        }
        self.written.push(bytes.to_vec());
        WriteOutcome::Ok
    }

    fn is_write_blocked(&self) -> bool {
        self.blocked
    }

    fn is_batch_mode(&self) -> bool {
        false
    }

    fn flush(&mut self) {}

    fn get_max_packet_size(&self, _peer: SocketAddr) -> u16 {
        self.max_packet_size
    }

    fn supports_release_time(&self) -> bool {
        self.release_time_supported
    }
}

/// Records every callback invoked on it, for assertion in tests.
#[derive(Debug, Default)]
pub struct FakeVisitor {
    pub closed: Option<connection::Error>,
    pub write_blocked_calls: u32,
    pub can_write_calls: u32,
    pub pending_handshake: bool,
    pub negotiated_version: Option<u32>,
    pub path_degrading_calls: u32,
    pub connectivity_probes: u32,
    pub forward_progress_calls: u32,
    pub ping_calls: u32,
}

impl Visitor for FakeVisitor {
    fn on_stream_frame(&mut self, _frame: &frame::Frame) {}

    fn on_rst_stream(&mut self, _frame: &frame::RstStream) {}

    fn on_window_update(&mut self, _frame: &frame::Frame) {}

    fn on_blocked_frame(&mut self, _frame: &frame::Frame) {}

    fn on_goaway(&mut self, _frame: &frame::Frame) {}

    fn on_connection_closed(&mut self, error: &connection::Error) {
        self.closed = Some(*error);
    }

    fn on_write_blocked(&mut self) {
        self.write_blocked_calls += 1;
    }

    fn on_can_write(&mut self) {
        self.can_write_calls += 1;
    }

    fn has_pending_handshake(&self) -> bool {
        self.pending_handshake
    }

    fn on_successful_version_negotiation(&mut self, negotiated_version: u32) {
        self.negotiated_version = Some(negotiated_version);
    }

    fn on_path_degrading(&mut self) {
        self.path_degrading_calls += 1;
    }

    fn on_connectivity_probe_received(&mut self) {
        self.connectivity_probes += 1;
    }

    fn on_forward_progress_confirmed(&mut self, _now: quic_core::time::Timestamp) {
        self.forward_progress_calls += 1;
    }

    fn send_ping(&mut self) {
        self.ping_calls += 1;
    }
}

/// A `Framer` stand-in that never finds any frames and always decodes
/// successfully against an empty datagram; real wire decoding is out of
/// this crate's scope, so tests that need a specific dispatch sequence
/// drive [`crate::contracts::FramerCallbacks`] directly instead.
#[derive(Debug, Default)]
pub struct FakeFramer {
    pub version: Option<u32>,
    pub is_version_negotiation: bool,
}

impl Framer for FakeFramer {
    fn parse_datagram(
        &mut self,
        _datagram: &[u8],
        _callbacks: &mut dyn FramerCallbacks,
    ) -> Result<(), DecodeError> {
        Ok(())
    }

    fn is_version_negotiation_packet(&self, _datagram: &[u8]) -> bool {
        self.is_version_negotiation
    }

    fn packet_version(&self, _datagram: &[u8]) -> Option<u32> {
        self.version
    }

    fn negotiate_version(
        &self,
        _datagram: &[u8],
        is_supported: &dyn Fn(u32) -> bool,
    ) -> Option<u32> {
        self.version.filter(|&v| is_supported(v))
    }
}

/// Passes every close reason through unmodified, the way
/// [`quic_core::connection::close::Development`] does; kept local so test
/// code doesn't need to pull in the crate's own formatter choice.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullFormatter;

impl Formatter for NullFormatter {
    fn format_transport_error(&self, _context: &Context, error: transport::Error) -> frame::ConnectionClose {
        error.into()
    }

    fn format_application_error(
        &self,
        _context: &Context,
        error: application::Error,
    ) -> frame::ConnectionClose {
        frame::ConnectionClose {
            error_code: error.code,
            frame_type: None,
        }
    }

    fn format_early_transport_error(
        &self,
        context: &Context,
        error: transport::Error,
    ) -> frame::ConnectionClose {
        self.format_transport_error(context, error)
    }

    fn format_early_application_error(
        &self,
        _context: &Context,
        _error: application::Error,
    ) -> frame::ConnectionClose {
        transport::Error::APPLICATION_ERROR.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_generator_round_trips_a_queued_frame_into_its_preloaded_packet() {
        let mut generator = FakeGenerator::default();
        let packet_number =
            quic_core::packet::number::PacketNumberSpace::ApplicationData
                .new_packet_number(quic_core::varint::VarInt::new(1).unwrap());
        generator.next_serialized = Some(SerializedPacket {
            packet_number,
            bytes: vec![9, 9],
            is_retransmittable: true,
            includes_ack: false,
        });

        assert!(generator.queue_frame(&frame::Frame::Ping(frame::Ping)));
        assert!(generator.has_queued_frames());
        let packet = generator.flush_all_queued_frames(1200).unwrap();
        assert_eq!(packet.bytes, vec![9, 9]);
        assert!(!generator.has_queued_frames());
    }

    #[test]
    fn fake_writer_reports_blocked_without_recording() {
        let mut writer = FakeWriter {
            blocked: true,
            ..FakeWriter::default()
        };
        let outcome = writer.write_packet(&[1, 2, 3], addr(), addr(), None);
        assert_eq!(outcome, WriteOutcome::Blocked);
        assert!(writer.written.is_empty());
    }

    fn addr() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 4433))
    }

    #[test]
    fn null_formatter_passes_transport_errors_through() {
        let ctx = Context {
            remote_address_debug: "test",
        };
        let close = NullFormatter.format_transport_error(&ctx, transport::Error::INTERNAL_ERROR);
        assert_eq!(close.error_code, transport::Error::INTERNAL_ERROR.code);
    }
}
