// Copyright (c) the quic-connection-core authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! `spec.md` §4.3: the `AckRangeSet` plus the ack-scheduling policy knobs
//! named in §4.1.1. The range tracking itself is delegated to
//! `quic_core::ack::RangeSet`; this module owns the per-connection counters
//! that decide *when* an accumulated ack frame should actually be sent.

use crate::config::Config;
use quic_core::{
    ack::{DecimationMode, RangeSet, Settings, MIN_RECEIVED_BEFORE_ACK_DECIMATION},
    packet::number::{PacketNumber, PacketNumberRange},
    time::Timestamp,
};
use core::time::Duration;

#[cfg(feature = "std")]
use std::vec::Vec;

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

/// An ack-eliciting packet arrives ack-frequency threshold, forcing an ack
/// regardless of decimation/tcp policy once this many packets have arrived
/// since the last ack was sent, on transport versions that require it.
/// `spec.md` §4.1.1 step 1.
const FORCE_ACK_EVERY_N_PACKETS: u64 = 20;

/// The snapshot of accumulated receive state used to build one outgoing
/// ACK frame. `spec.md` §4.3 `get_updated_ack_frame`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckFrameData {
    pub largest_acked: PacketNumber,
    pub ack_delay: Duration,
    /// Descending (largest-first), matching wire order.
    pub ranges: Vec<PacketNumberRange>,
}

/// What `on_packet_received` asks the caller to do with the ack alarm.
/// `spec.md` §4.1.1: either force a synchronous ack, (re)arm the timer at a
/// computed deadline, or leave the current schedule untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckDecision {
    /// Nothing changed; leave the ack alarm exactly as it was.
    Unchanged,
    /// An ack is queued and must be emitted at the next flush, synchronously.
    /// The caller cancels the ack alarm (`spec.md` §4.1.1 step 5).
    QueueImmediately,
    /// Arm (or tighten) the ack alarm to fire no later than `deadline`.
    ArmAlarm { deadline: Timestamp },
}

/// `spec.md` §3 `ReceivedPacketManager` / §4.3.
#[derive(Debug)]
pub struct ReceivedPacketManager {
    ranges: RangeSet,
    peer_least_unacked: Option<PacketNumber>,
    ack_queued: bool,
    retransmittable_since_last_ack: u32,
    packets_since_last_ack: u64,
    /// Total packets ever recorded on this connection, never reset; gates
    /// the decimation warm-up (`spec.md` §4.1.1
    /// `min_received_before_ack_decimation`), which is a lifetime count and
    /// distinct from `packets_since_last_ack`.
    total_packets_received: u64,
    largest_acked_in_last_sent_ack: Option<PacketNumber>,
    last_received_time: Option<Timestamp>,
}

impl Default for ReceivedPacketManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceivedPacketManager {
    pub fn new() -> Self {
        Self {
            ranges: RangeSet::new(),
            peer_least_unacked: None,
            ack_queued: false,
            retransmittable_since_last_ack: 0,
            packets_since_last_ack: 0,
            total_packets_received: 0,
            largest_acked_in_last_sent_ack: None,
            last_received_time: None,
        }
    }

    #[inline]
    pub fn is_awaiting(&self, packet_number: PacketNumber) -> bool {
        !self.ranges.contains(packet_number)
    }

    #[inline]
    pub fn is_missing(&self, packet_number: PacketNumber) -> bool {
        self.ranges.is_missing(packet_number)
    }

    #[inline]
    pub fn largest_observed(&self) -> Option<PacketNumber> {
        self.ranges.largest()
    }

    #[inline]
    pub fn smallest_observed(&self) -> Option<PacketNumber> {
        self.ranges.smallest()
    }

    #[inline]
    pub fn is_ack_queued(&self) -> bool {
        self.ack_queued
    }

    #[inline]
    pub fn last_received_time(&self) -> Option<Timestamp> {
        self.last_received_time
    }

    /// Whether new missing packets (or an evicted range) have appeared
    /// since the last call; consumes the flag. `spec.md` §4.3
    /// `has_new_missing_packets`.
    #[inline]
    pub fn has_new_missing_packets(&mut self) -> bool {
        self.ranges.take_dirty()
    }

    /// Records a newly received packet number. Returns whether it filled a
    /// previously-missing gap. Does not itself decide ack scheduling; call
    /// `on_packet_received` for that.
    pub fn record(&mut self, packet_number: PacketNumber, now: Timestamp) -> bool {
        self.packets_since_last_ack += 1;
        self.total_packets_received += 1;
        self.last_received_time = Some(now);
        self.ranges.insert(packet_number, now)
    }

    /// `spec.md` §4.3 `dont_wait_for_packets_before`, driven by an incoming
    /// STOP_WAITING frame.
    pub fn dont_wait_for_packets_before(&mut self, least_unacked: PacketNumber) {
        self.ranges.dont_wait_for_packets_before(least_unacked);
    }

    pub fn set_peer_least_unacked(&mut self, least_unacked: PacketNumber) {
        self.peer_least_unacked = Some(least_unacked);
    }

    /// Builds the ack frame content corresponding to the manager's current
    /// state and resets the counters that track "since last ack sent".
    /// `spec.md` §4.3 `get_updated_ack_frame`: `ack_delay = now -
    /// largest_observed_time`.
    ///
    /// `spec.md` §5 invariant: this must be called at serialization time,
    /// not at scheduling time, so the emitted frame reflects everything
    /// received up to that point.
    pub fn get_updated_ack_frame(&mut self, now: Timestamp) -> Option<AckFrameData> {
        let largest_acked = self.ranges.largest()?;
        let largest_observed_time = self.ranges.largest_observed_time().unwrap_or(now);
        let ack_delay = now.saturating_duration_since(largest_observed_time);

        self.ack_queued = false;
        self.retransmittable_since_last_ack = 0;
        self.packets_since_last_ack = 0;
        self.largest_acked_in_last_sent_ack = Some(largest_acked);

        Some(AckFrameData {
            largest_acked,
            ack_delay,
            ranges: self.ranges.ranges_descending().collect(),
        })
    }

    /// `spec.md` §4.1.1 `maybe_queue_ack`: the ack-scheduling policy,
    /// evaluated once per fully-dispatched incoming packet.
    ///
    /// `packet_number` is the packet just recorded; `was_missing` is
    /// whatever `record` returned for it; `retransmittable` is whether the
    /// packet carried any ack-eliciting frame; `gap_since_previous` is the
    /// time since the previously received packet, used by
    /// `fast_ack_after_quiescence`.
    #[allow(clippy::too_many_arguments)]
    pub fn on_packet_received(
        &mut self,
        config: &Config,
        settings: &Settings,
        packet_number: PacketNumber,
        was_missing: bool,
        retransmittable: bool,
        now: Timestamp,
        min_rtt: Duration,
        smoothed_rtt: Duration,
        gap_since_previous: Option<Duration>,
    ) -> AckDecision {
        let mut force_immediate = false;
        let mut alarm_deadline: Option<Timestamp> = None;

        // Step 1: a run of `FORCE_ACK_EVERY_N_PACKETS` packets without an
        // ack always forces one, on transport versions that require it.
        if config.no_stop_waiting_frames && self.packets_since_last_ack >= FORCE_ACK_EVERY_N_PACKETS
        {
            self.ack_queued = true;
        }

        // Step 2: a packet that fills a previously-missing gap.
        if was_missing {
            match settings.decimation_mode {
                DecimationMode::AckDecimationWithReordering => {
                    if self
                        .largest_acked_in_last_sent_ack
                        .is_some_and(|reported| packet_number < reported)
                    {
                        force_immediate = true;
                    }
                }
                _ => {
                    let prior_ack_had_missing = self
                        .largest_acked_in_last_sent_ack
                        .is_some_and(|reported| self.ranges.is_missing(reported));
                    if prior_ack_had_missing || settings.decimation_mode == DecimationMode::TcpAcking
                    {
                        force_immediate = true;
                    }
                }
            }
        }

        // Step 3: ack-eliciting-packet counting, only if not already forced.
        if retransmittable && !force_immediate && !self.ack_queued {
            self.retransmittable_since_last_ack += 1;

            let past_decimation_warmup =
                self.total_packets_received > MIN_RECEIVED_BEFORE_ACK_DECIMATION;

            match settings.decimation_mode {
                DecimationMode::TcpAcking => {
                    if self.retransmittable_since_last_ack >= 2 {
                        force_immediate = true;
                    } else {
                        alarm_deadline = Some(now + config.delayed_ack_time);
                    }
                }
                DecimationMode::AckDecimation | DecimationMode::AckDecimationWithReordering
                    if past_decimation_warmup =>
                {
                    if self.retransmittable_since_last_ack >= 10 && !settings.unlimited_ack_decimation
                    {
                        force_immediate = true;
                    } else {
                        let decimation = settings.decimation_delay.scale(min_rtt);
                        alarm_deadline = Some(now + config.delayed_ack_time.min(decimation));
                    }
                }
                DecimationMode::AckDecimation | DecimationMode::AckDecimationWithReordering => {
                    if self.retransmittable_since_last_ack >= 2 {
                        force_immediate = true;
                    } else {
                        alarm_deadline = Some(now + config.delayed_ack_time);
                    }
                }
            }

            if settings.fast_ack_after_quiescence && !force_immediate {
                if let Some(gap) = gap_since_previous {
                    if gap > smoothed_rtt {
                        alarm_deadline = Some(now + Duration::from_millis(1));
                    }
                }
            }
        }

        // Step 4: new missing packets surfaced by the range set itself
        // (distinct from `was_missing`, which is about this one packet).
        if self.has_new_missing_packets() {
            if settings.decimation_mode == DecimationMode::AckDecimationWithReordering {
                let shortened = now + (min_rtt / 8);
                alarm_deadline = Some(match alarm_deadline {
                    Some(existing) => existing.min(shortened),
                    None => shortened,
                });
            } else {
                force_immediate = true;
            }
        }

        if force_immediate {
            self.ack_queued = true;
        }

        // Step 5: an immediate ack always wins; the caller cancels the
        // alarm rather than arming it.
        if self.ack_queued {
            AckDecision::QueueImmediately
        } else if let Some(deadline) = alarm_deadline {
            AckDecision::ArmAlarm { deadline }
        } else {
            AckDecision::Unchanged
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quic_core::{packet::number::PacketNumberSpace, varint::VarInt};

    fn pn(value: u64) -> PacketNumber {
        PacketNumberSpace::ApplicationData.new_packet_number(VarInt::new(value).unwrap())
    }

    fn t(ms: u64) -> Timestamp {
        Timestamp::from_duration(Duration::from_millis(ms))
    }

    fn tcp_settings() -> Settings {
        Settings {
            decimation_mode: DecimationMode::TcpAcking,
            ..Settings::RECOMMENDED
        }
    }

    #[test]
    fn delayed_ack_coalescing_under_tcp_acking() {
        let mut manager = ReceivedPacketManager::new();
        let config = Config::new();
        let settings = tcp_settings();

        let missing = manager.record(pn(1), t(0));
        let decision = manager.on_packet_received(
            &config,
            &settings,
            pn(1),
            missing,
            true,
            t(0),
            Duration::from_millis(100),
            Duration::from_millis(100),
            None,
        );
        assert_eq!(
            decision,
            AckDecision::ArmAlarm {
                deadline: t(0) + config.delayed_ack_time
            }
        );

        let arrival = t(0) + Duration::from_micros(100);
        let missing = manager.record(pn(2), arrival);
        let decision = manager.on_packet_received(
            &config,
            &settings,
            pn(2),
            missing,
            true,
            arrival,
            Duration::from_millis(100),
            Duration::from_millis(100),
            None,
        );
        assert_eq!(decision, AckDecision::QueueImmediately);
    }

    #[test]
    fn immediate_ack_on_missing_packet_fill() {
        let mut manager = ReceivedPacketManager::new();
        let config = Config::new();
        let settings = Settings::RECOMMENDED; // AckDecimationWithReordering

        let missing = manager.record(pn(1), t(0));
        manager.on_packet_received(
            &config, &settings, pn(1), missing, true, t(0),
            Duration::from_millis(50), Duration::from_millis(50), None,
        );
        // simulate that ack got sent, resetting counters
        manager.get_updated_ack_frame(t(0));

        let missing = manager.record(pn(3), t(1));
        assert!(!missing);
        let decision = manager.on_packet_received(
            &config, &settings, pn(3), missing, true, t(1),
            Duration::from_millis(50), Duration::from_millis(50), None,
        );
        // not missing itself, but it created a gap: has_new_missing_packets
        // forces nothing under AckDecimationWithReordering (step 4 only
        // shortens the alarm); the gap is reported once packet 2 arrives.
        assert_ne!(decision, AckDecision::Unchanged);

        let ack = manager.get_updated_ack_frame(t(2)).unwrap();
        assert_eq!(ack.largest_acked, pn(3));

        let missing = manager.record(pn(2), t(3));
        assert!(missing);
        let decision = manager.on_packet_received(
            &config, &settings, pn(2), missing, true, t(3),
            Duration::from_millis(50), Duration::from_millis(50), None,
        );
        assert_eq!(decision, AckDecision::QueueImmediately);
        let ack = manager.get_updated_ack_frame(t(3)).unwrap();
        assert_eq!(ack.ranges, vec![PacketNumberRange::new(pn(1), pn(3))]);
    }

    #[test]
    fn ack_decimation_with_reordering_forces_ack_on_reordered_packet() {
        let mut manager = ReceivedPacketManager::new();
        let config = Config::new();
        let settings = Settings::RECOMMENDED;

        for i in 0..101u64 {
            let missing = manager.record(pn(i), t(i));
            manager.on_packet_received(
                &config, &settings, pn(i), missing, true, t(i),
                Duration::from_millis(50), Duration::from_millis(50), None,
            );
        }
        manager.get_updated_ack_frame(t(101));
        manager.largest_acked_in_last_sent_ack = Some(pn(100));

        // a packet with a number below what was already reported acked
        // forces an immediate ack regardless of the decimation counter.
        let pn_reordered = pn(95);
        let missing = manager.is_missing(pn_reordered);
        let decision = manager.on_packet_received(
            &config, &settings, pn_reordered, missing, true, t(102),
            Duration::from_millis(50), Duration::from_millis(50), None,
        );
        assert_eq!(decision, AckDecision::QueueImmediately);
    }

    #[test]
    fn stop_waiting_prunes_ranges() {
        let mut manager = ReceivedPacketManager::new();
        manager.record(pn(1), t(0));
        manager.record(pn(2), t(1));
        manager.record(pn(5), t(2));
        manager.dont_wait_for_packets_before(pn(2));
        assert!(!manager.is_awaiting(pn(2)));
        assert!(manager.is_awaiting(pn(1)));
    }
}
