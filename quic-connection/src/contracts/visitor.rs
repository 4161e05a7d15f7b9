// Copyright (c) the quic-connection-core authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use quic_core::{connection, frame, time::Timestamp};

/// The session/application-layer collaborator. `spec.md` §6 "Session/visitor
/// interface": everything the connection controller reports upward instead
/// of handling itself, since the stream-multiplexing and HTTP layers are
/// explicitly out of scope (`spec.md` §1 non-goals).
pub trait Visitor {
    fn on_stream_frame(&mut self, frame: &frame::Frame);

    fn on_rst_stream(&mut self, frame: &frame::RstStream);

    fn on_window_update(&mut self, frame: &frame::Frame);

    fn on_blocked_frame(&mut self, frame: &frame::Frame);

    fn on_goaway(&mut self, frame: &frame::Frame);

    /// Invoked exactly once, the first time `close_with` runs to
    /// completion (`spec.md` §7 propagation policy).
    fn on_connection_closed(&mut self, error: &connection::Error);

    fn on_write_blocked(&mut self);

    fn on_can_write(&mut self);

    /// Whether the TLS handshake still has data it wants to write; gates
    /// whether `ping_alarm` is relevant (`spec.md` §4.1.5).
    fn has_pending_handshake(&self) -> bool;

    fn on_successful_version_negotiation(&mut self, negotiated_version: u32);

    fn on_path_degrading(&mut self);

    fn on_connectivity_probe_received(&mut self);

    fn on_forward_progress_confirmed(&mut self, now: Timestamp);

    /// Asks the session layer to emit a PING frame right now; used by the
    /// `ping` and `retransmittable_on_wire` alarms (`spec.md` §4.1.5).
    fn send_ping(&mut self);
}
