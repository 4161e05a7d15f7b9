// Copyright (c) the quic-connection-core authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Trait boundaries to every external collaborator named in `spec.md` §6/§9:
//! `Visitor`, `Framer`/`FramerCallbacks`, `Generator`, `Writer`, `Clock`,
//! `Random`, `AlarmFactory`, `CongestionController`. `QuicConnection` is
//! generic over these so the concrete TLS stack, session layer, socket I/O,
//! congestion algorithm, and wire codec can all be swapped independently.

mod visitor;
#[cfg(feature = "std")]
mod writer;

pub use visitor::Visitor;
#[cfg(feature = "std")]
pub use writer::{WriteError, WriteOutcome, Writer};

pub use quic_core::random::Generator as Random;
pub use quic_core::recovery::CongestionController;
pub use quic_core::time::Clock;

use quic_core::{connection, connection::ProcessingError, frame, packet::number::PacketNumber};

#[cfg(feature = "std")]
use std::vec::Vec;

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

/// The header fields of a received packet, as decoded by the framer before
/// any frame is dispatched. `spec.md` §4.4.
#[derive(Debug, Clone, Copy)]
pub struct PacketHeader {
    pub packet_number: PacketNumber,
    pub version_present: bool,
}

/// Per-frame callbacks the framer invokes while iterating a received
/// packet's payload, terminating in the connection controller. `spec.md`
/// §4.4/§6 groups these together as the framer's callback surface; this
/// trait is the Rust rendering of that bundle.
pub trait FramerCallbacks {
    /// `spec.md` §4.1 step 1: validates and records the header, deferring
    /// ACK policy until `on_packet_complete`. A duplicate or already-acked
    /// packet number reports `ProcessingError::DuplicatePacket` rather than
    /// a connection error (`spec.md` §7 kind 6): the datagram is dropped,
    /// `packets_dropped` increments, and nothing else in this packet is
    /// dispatched.
    fn on_packet_header(&mut self, header: PacketHeader) -> Result<(), ProcessingError>;

    fn on_ack_frame(&mut self, ack: &frame::Ack) -> Result<(), connection::Error>;

    fn on_stop_waiting_frame(
        &mut self,
        frame: &frame::StopWaiting,
    ) -> Result<(), connection::Error>;

    fn on_connection_close_frame(
        &mut self,
        frame: &frame::ConnectionClose,
    ) -> Result<(), connection::Error>;

    fn on_ping_frame(&mut self) -> Result<(), connection::Error>;

    fn on_path_challenge_frame(
        &mut self,
        frame: &frame::PathChallenge,
    ) -> Result<(), connection::Error>;

    fn on_path_response_frame(
        &mut self,
        frame: &frame::PathResponse,
    ) -> Result<(), connection::Error>;

    /// Any frame this core doesn't inspect (STREAM, CRYPTO, WINDOW_UPDATE,
    /// ...); forwarded to the session layer via `Visitor` by the caller.
    fn on_opaque_frame(&mut self, frame: &frame::Frame) -> Result<(), connection::Error>;

    /// `spec.md` §4.1 step 3: runs ack scheduling and migration detection
    /// once every frame in the packet has been dispatched.
    fn on_packet_complete(&mut self) -> Result<(), connection::Error>;
}

/// The framer: parses a received datagram's header and frames, invoking
/// [`FramerCallbacks`] for each. Out of scope per `spec.md` §1 is the
/// wire-format bit layout itself; this trait only names the operations
/// the controller depends on.
pub trait Framer {
    /// Parses `datagram`, dispatching callbacks on `callbacks` for the
    /// header and every frame it contains. Returns an error if the
    /// datagram fails to decrypt or decode at all (distinct from an
    /// individual frame being semantically invalid, which the callback
    /// itself reports).
    fn parse_datagram(
        &mut self,
        datagram: &[u8],
        callbacks: &mut dyn FramerCallbacks,
    ) -> Result<(), DecodeError>;

    /// Whether this datagram would be an IETF-style version-negotiation
    /// packet (`spec.md` §4.1 version negotiation state machine).
    fn is_version_negotiation_packet(&self, datagram: &[u8]) -> bool;

    /// The version tag carried by `datagram`'s header, if the header
    /// format includes one. `spec.md` §4.1's version-negotiation state
    /// table is driven from this rather than from `PacketHeader`, since
    /// a not-yet-negotiated datagram may need to be inspected before its
    /// packet number is even meaningful.
    fn packet_version(&self, datagram: &[u8]) -> Option<u32>;

    /// Decodes a version-negotiation datagram's offered version list and
    /// returns the first one `is_supported` accepts, or `None` if none of
    /// the offered versions are usable.
    fn negotiate_version(
        &self,
        datagram: &[u8],
        is_supported: &dyn Fn(u32) -> bool,
    ) -> Option<u32>;
}

/// Returned by [`Framer::parse_datagram`] when a received datagram could
/// not be decrypted under any installed key. `spec.md` §4.1.7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeError {
    pub undecryptable: bool,
}

/// A packet the generator finished assembling and handed back to the
/// controller, with enough metadata for the sent-packet manager to track
/// it without re-parsing the bytes. `spec.md` §4.5 "pushes serialized
/// packets to the controller via `on_serialized_packet`".
#[derive(Debug, Clone)]
pub struct SerializedPacket {
    pub packet_number: PacketNumber,
    pub bytes: Vec<u8>,
    pub is_retransmittable: bool,
    pub includes_ack: bool,
}

/// The packet generator: bundles queued frames into encrypted packets and
/// hands serialized packets back to the controller. `spec.md` §4.5.
pub trait Generator {
    /// Enqueues a frame to be bundled into the next serialized packet(s).
    /// Returns `false` if the frame was refused (e.g. no room left under
    /// the per-packet frame budget); the caller retries later.
    fn queue_frame(&mut self, frame: &frame::Frame) -> bool;

    /// Whether any frame is currently queued and not yet serialized.
    fn has_queued_frames(&self) -> bool;

    /// Whether any currently queued frame is retransmittable. Used by the
    /// controller to decide whether a flush would produce an ack-eliciting
    /// packet without having to serialize it first.
    fn has_retransmittable_queued_frames(&self) -> bool;

    /// Serializes as many queued frames as fit under `max_packet_size`,
    /// returning the serialized packet, or `None` if there was nothing to
    /// send.
    fn flush_all_queued_frames(&mut self, max_packet_size: usize) -> Option<SerializedPacket>;

    /// Whether a previously accepted packet is still being assembled; the
    /// controller must not dispatch a new incoming header while this holds
    /// (`spec.md` §5 ordering invariant).
    fn is_pending_packet_empty(&self) -> bool;

    /// Queues as much of `payload` as currently fits into a STREAM frame
    /// for `stream_id` starting at byte `offset`, marking it final if `fin`
    /// and every byte of `payload` was consumed. Returns the number of
    /// bytes actually queued and whether the fin bit was queued with them.
    /// STREAM frames never appear as a core [`frame::Frame`] variant (the
    /// stream-offset/data wire layout is out of scope here), so queuing
    /// stream bytes needs its own entry point rather than going through
    /// [`Generator::queue_frame`].
    fn queue_stream_data(
        &mut self,
        stream_id: u64,
        offset: u64,
        payload: &[u8],
        fin: bool,
    ) -> (usize, bool);

    /// Builds a single oversized probe packet padded out to `target_size`
    /// bytes, independent of whatever is currently queued, for MTU discovery.
    /// Returns `None` if the generator has no key installed yet to protect
    /// a probe with.
    fn build_mtu_probe(&mut self, target_size: u16) -> Option<SerializedPacket>;
}
