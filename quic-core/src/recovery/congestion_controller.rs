// Copyright (c) the quic-connection-core authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{recovery::RttEstimator, time::Timestamp};
use core::{fmt::Debug, time::Duration};

/// Static information about a path, handed to the endpoint when it is asked
/// to build a congestion controller for it.
///
/// `spec.md` §6: the concrete algorithm is an external collaborator; this
/// only describes the context it's constructed with.
#[derive(Debug, Clone, Copy)]
#[non_exhaustive]
pub struct PathInfo {
    pub max_datagram_size: u16,
}

impl PathInfo {
    pub fn new(max_datagram_size: u16) -> Self {
        Self { max_datagram_size }
    }
}

/// A single packet the congestion controller is being told was declared
/// lost, as part of a batch congestion event.
#[derive(Debug, Clone, Copy)]
#[non_exhaustive]
pub struct LossEvent {
    pub lost_bytes: u32,
    pub is_persistent_congestion: bool,
}

/// An algorithm for controlling congestion: the external collaborator
/// `spec.md` §1 explicitly excludes from this crate's scope. Only the
/// contract the sent-packet manager calls into lives here; Cubic, BBR,
/// etc. are implemented by whatever crate plugs into a `QuicConnection`.
///
/// This mirrors the shape of the teacher's `recovery::congestion_controller`
/// trait, trimmed to the operations `spec.md` §6 names (it drops the
/// teacher's event-publisher and ECN plumbing, which are ambient
/// observability concerns outside this crate's boundary).
pub trait CongestionController: Debug {
    /// Opaque per-packet bookkeeping the controller wants carried from
    /// `on_packet_sent` through to the eventual ack or loss callback.
    type PacketInfo: Copy + Debug;

    /// The current congestion window, in bytes.
    fn congestion_window(&self) -> u32;

    /// The current bytes in flight.
    fn bytes_in_flight(&self) -> u32;

    /// Whether a packet of `size` bytes would currently be blocked by the
    /// congestion window.
    fn is_congestion_limited(&self, size: usize) -> bool;

    /// Whether loss recovery requires an immediate retransmission
    /// regardless of the congestion window.
    fn requires_fast_retransmission(&self) -> bool;

    /// Invoked when a packet is sent.
    fn on_packet_sent(
        &mut self,
        time_sent: Timestamp,
        sent_bytes: usize,
        app_limited: Option<bool>,
        rtt_estimator: &RttEstimator,
    ) -> Self::PacketInfo;

    /// Invoked whenever the round-trip time is updated from a newly
    /// acknowledged packet.
    fn on_rtt_update(&mut self, time_sent: Timestamp, now: Timestamp, rtt_estimator: &RttEstimator);

    /// Invoked when one or more previously unacknowledged packets are
    /// acknowledged. `rtt_updated` tells the controller whether this ack
    /// also produced a fresh RTT sample.
    fn on_congestion_event(
        &mut self,
        now: Timestamp,
        rtt_updated: bool,
        newest_acked_time_sent: Timestamp,
        newest_acked_packet_info: Self::PacketInfo,
        bytes_acknowledged: usize,
        lost: Option<LossEvent>,
    );

    /// Invoked when the path's maximum transmission unit is updated.
    fn on_mtu_update(&mut self, max_datagram_size: u16);

    /// Invoked for each packet discarded when a packet number space is
    /// discarded (e.g. Initial keys dropped after the handshake).
    fn on_packet_discarded(&mut self, sent_bytes: usize);

    /// Called by the sender to ask whether `bytes` more may be sent right
    /// now under the congestion window.
    fn can_send(&self, bytes: usize) -> bool {
        !self.is_congestion_limited(bytes)
    }

    /// Called when there's nothing left to send even though the
    /// congestion window had room, so the controller can avoid inflating
    /// its window estimate on idle.
    fn on_application_limited(&mut self, bytes_in_flight: u32);

    /// The earliest time a packet may be transmitted, per the pacer. `None`
    /// or a time in the past means "send immediately".
    fn earliest_departure_time(&self) -> Option<Timestamp> {
        None
    }

    /// An estimate of the path's available bandwidth, if the controller
    /// tracks one (e.g. BBR). `None` for window-based controllers like
    /// Cubic/Reno that have no direct rate estimate.
    fn bandwidth_estimate(&self) -> Option<u64> {
        None
    }

    /// The rate the pacer should release packets at, if paced sending is
    /// enabled.
    fn pacing_rate(&self) -> Option<Duration> {
        None
    }

    /// A bandwidth hint carried over from a previous connection to the same
    /// peer (`CachedNetworkParameters`, `spec.md` §6), so a resumed
    /// connection can seed its window instead of starting at slow-start's
    /// initial value. `max_bandwidth_resumption` marks whether the hint was
    /// sampled at the previous connection's peak bandwidth rather than at
    /// its close. No-op by default; window-based controllers with no
    /// resumption behavior are unaffected.
    fn on_cached_bandwidth_estimate(
        &mut self,
        bytes_per_second: u64,
        max_bandwidth_resumption: bool,
    ) {
        let _ = (bytes_per_second, max_bandwidth_resumption);
    }
}
