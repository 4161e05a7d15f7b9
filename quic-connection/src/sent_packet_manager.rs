// Copyright (c) the quic-connection-core authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The ordered unacked-packets map plus the RTT/loss/congestion/pacing
//! algorithms that decide when to retransmit. Assembles the primitives in
//! `quic_core::recovery` (`RttEstimator`, `Detector`,
//! `PersistentCongestionCalculator`, `Pto`, `CongestionController`) into the
//! single state machine RFC 9002 Appendix A describes as one component,
//! mirroring how the teacher keeps each algorithm in its own module and
//! composes them at a higher layer.

use crate::{config::Config, undecryptable::EncryptionLevel};
use quic_core::{
    frame::AckElicitation,
    packet::number::{PacketNumber, PacketNumberSpace},
    recovery::{
        CachedNetworkParameters, CongestionController, Detector, LossEvent, LossOutcome,
        PersistentCongestionCalculator, Pto, RttEstimator, PERSISTENT_CONGESTION_THRESHOLD,
    },
    time::{Provider as TimerProvider, Timestamp, K_GRANULARITY},
};
use core::time::Duration;

#[cfg(feature = "std")]
use std::{collections::BTreeMap, vec::Vec};

#[cfg(not(feature = "std"))]
use alloc::{collections::BTreeMap, vec::Vec};

/// The six transmission kinds a sent packet can carry, per the connection's
/// data model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransmissionType {
    Initial,
    LossRetransmission,
    Tlp,
    Rto,
    Probing,
    MtuProbe,
}

impl TransmissionType {
    #[inline]
    pub fn is_mtu_probe(self) -> bool {
        matches!(self, Self::MtuProbe)
    }
}

/// A packet the manager is tracking as unacknowledged.
#[derive(Clone, Copy, Debug)]
pub struct SentPacket<P> {
    pub time_sent: Timestamp,
    pub sent_bytes: u32,
    pub transmission_type: TransmissionType,
    pub ack_elicitation: AckElicitation,
    pub encryption_level: EncryptionLevel,
    /// Nonzero iff this is a retransmission of a prior packet number.
    pub original_packet_number: Option<PacketNumber>,
    /// Whether this packet counts towards bytes in flight / the congestion
    /// window.
    pub congestion_controlled: bool,
    /// Opaque bookkeeping the congestion controller asked to be carried
    /// from `on_packet_sent` through to the ack/loss callback.
    pub congestion_info: P,
}

/// Rejected an incoming ACK frame before it reached the manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AckValidationError {
    /// `largest_acked` is greater than the largest packet number ever sent.
    LargestAckedAboveLargestSent,
    /// `largest_acked` is less than a previously reported largest acked.
    LargestAckedBelowPreviousObserved,
}

/// Accumulated while the framer streams `on_ack_range` calls for a single
/// ACK frame; consumed by `on_ack_frame_end`.
struct PendingAck {
    largest_acked: PacketNumber,
    ack_delay: Duration,
    newly_acked: Vec<PacketNumber>,
}

/// What processing a just-finished ACK frame produced.
#[derive(Clone, Debug, Default)]
pub struct AckOutcome {
    pub acked_new_packet: bool,
    /// Ascending by packet number.
    pub newly_acked: Vec<PacketNumber>,
    pub newly_acked_bytes: u64,
    pub lost_bytes: u64,
    pub is_persistent_congestion: bool,
}

/// What a retransmission-alarm firing asks the caller to do.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RetransmissionOutcome {
    /// Number of ack-eliciting probe packets the caller owes right now.
    pub probes_required: u8,
    /// The connection should close with `too_many_rtos`.
    pub close_with_too_many_rtos: bool,
}

/// `SentPacketManager`: the unacked-packets map, RTT estimator, loss
/// detection, congestion control orchestration, pacing, and PTO scheduling
/// for one packet number space.
#[derive(Debug)]
pub struct SentPacketManager<C: CongestionController> {
    space: PacketNumberSpace,
    unacked: BTreeMap<PacketNumber, SentPacket<C::PacketInfo>>,
    rtt_estimator: RttEstimator,
    congestion_controller: C,
    loss_detector: Detector,
    pto: Pto,
    largest_sent: Option<PacketNumber>,
    largest_acked: Option<PacketNumber>,
    last_ack_eliciting_sent_time: Option<Timestamp>,
    consecutive_pto_count: u32,
    pending_ack: Option<PendingAck>,
}

impl<C: CongestionController> SentPacketManager<C> {
    pub fn new(space: PacketNumberSpace, congestion_controller: C, initial_rtt: Duration) -> Self {
        Self {
            space,
            unacked: BTreeMap::new(),
            rtt_estimator: RttEstimator::new(initial_rtt),
            congestion_controller,
            loss_detector: Detector::default(),
            pto: Pto::default(),
            largest_sent: None,
            largest_acked: None,
            last_ack_eliciting_sent_time: None,
            consecutive_pto_count: 0,
            pending_ack: None,
        }
    }

    #[inline]
    pub fn congestion_controller(&self) -> &C {
        &self.congestion_controller
    }

    #[inline]
    pub fn rtt_estimator(&self) -> &RttEstimator {
        &self.rtt_estimator
    }

    /// Seeds this manager from a previous connection's
    /// [`CachedNetworkParameters`], per `spec.md` §6 ("the sent manager
    /// consumes them for resumption"). Only takes effect before the first
    /// real RTT sample arrives; once this connection has its own
    /// measurement, a stale cached one must not overwrite it.
    pub fn resume_connection_state(&mut self, params: &CachedNetworkParameters) {
        if self.rtt_estimator.first_rtt_sample().is_none() {
            self.rtt_estimator = self.rtt_estimator.for_new_path(params.min_rtt);
        }
        self.congestion_controller.on_cached_bandwidth_estimate(
            params.bandwidth_estimate_bytes_per_second,
            params.max_bandwidth_estimate,
        );
    }

    #[inline]
    pub fn bytes_in_flight(&self) -> u32 {
        self.congestion_controller.bytes_in_flight()
    }

    #[inline]
    pub fn largest_sent(&self) -> Option<PacketNumber> {
        self.largest_sent
    }

    #[inline]
    pub fn least_unacked(&self) -> Option<PacketNumber> {
        self.unacked.keys().next().copied()
    }

    #[inline]
    pub fn has_unacked_retransmittable(&self) -> bool {
        self.unacked
            .values()
            .any(|p| p.ack_elicitation.is_ack_eliciting())
    }

    /// The largest packet number acknowledged by the peer so far, if any.
    #[inline]
    pub fn largest_acked(&self) -> Option<PacketNumber> {
        self.largest_acked
    }

    /// The number of retransmission timeouts fired back-to-back since the
    /// last new acknowledgment, used by `spec.md` §4.1.5's kill switch.
    #[inline]
    pub fn consecutive_pto_count(&self) -> u32 {
        self.consecutive_pto_count
    }

    /// Tells the congestion controller nothing more is queued to send right
    /// now, so it doesn't mistake the resulting idle period for a loss of
    /// capacity (`spec.md` §4.1.2 "report app-limited if nothing
    /// outstanding").
    pub fn report_application_limited(&mut self) {
        self.congestion_controller
            .on_application_limited(self.bytes_in_flight());
    }

    /// `spec.md` §4.1 version-negotiation "accept and retransmit all":
    /// discards every currently unacked packet from tracking (its contents
    /// are gone, so it can never be acked under the old version) and
    /// returns the packet numbers that were outstanding, in ascending
    /// order, so the caller can regenerate equivalent retransmissions.
    pub fn retransmit_all_unacked(&mut self) -> Vec<PacketNumber> {
        let numbers: Vec<PacketNumber> = self.unacked.keys().copied().collect();
        for number in &numbers {
            if let Some(packet) = self.unacked.remove(number) {
                if packet.congestion_controlled {
                    self.congestion_controller
                        .on_packet_discarded(packet.sent_bytes as usize);
                }
            }
        }
        self.pto.cancel();
        numbers
    }

    fn pto_backoff(&self) -> u32 {
        1u32.checked_shl(self.consecutive_pto_count).unwrap_or(u32::MAX)
    }

    fn rearm_pto(&mut self, now: Timestamp) {
        if !self.has_unacked_retransmittable() {
            self.pto.cancel();
            return;
        }
        let base = self.last_ack_eliciting_sent_time.unwrap_or(now);
        let period = self.rtt_estimator.pto_period(self.pto_backoff(), self.space);
        self.pto.update(base, period);
    }

    /// Records a freshly transmitted packet. Returns whether the caller
    /// should (re)arm the retransmission alarm.
    #[allow(clippy::too_many_arguments)]
    pub fn on_packet_sent(
        &mut self,
        packet_number: PacketNumber,
        now: Timestamp,
        sent_bytes: u32,
        transmission_type: TransmissionType,
        ack_elicitation: AckElicitation,
        encryption_level: EncryptionLevel,
        original_packet_number: Option<PacketNumber>,
    ) -> bool {
        debug_assert!(self.largest_sent.map_or(true, |largest| packet_number > largest));

        let congestion_controlled = ack_elicitation.is_ack_eliciting() || sent_bytes > 0;
        let congestion_info = if congestion_controlled {
            self.congestion_controller.on_packet_sent(
                now,
                sent_bytes as usize,
                None,
                &self.rtt_estimator,
            )
        } else {
            self.congestion_controller
                .on_packet_sent(now, 0, Some(true), &self.rtt_estimator)
        };

        self.unacked.insert(
            packet_number,
            SentPacket {
                time_sent: now,
                sent_bytes,
                transmission_type,
                ack_elicitation,
                encryption_level,
                original_packet_number,
                congestion_controlled,
                congestion_info,
            },
        );

        self.largest_sent = Some(packet_number);

        if ack_elicitation.is_ack_eliciting() {
            self.last_ack_eliciting_sent_time = Some(now);
            self.rearm_pto(now);
            true
        } else {
            false
        }
    }

    /// Begins processing one ACK frame. Validates `largest_acked` against
    /// the manager's view of the world before any range is applied.
    pub fn on_ack_frame_start(
        &mut self,
        largest_acked: PacketNumber,
        ack_delay: Duration,
    ) -> Result<(), AckValidationError> {
        if self.largest_sent.map_or(true, |largest| largest_acked > largest) {
            return Err(AckValidationError::LargestAckedAboveLargestSent);
        }
        if self
            .largest_acked
            .is_some_and(|previous| largest_acked < previous)
        {
            return Err(AckValidationError::LargestAckedBelowPreviousObserved);
        }

        self.pending_ack = Some(PendingAck {
            largest_acked,
            ack_delay,
            newly_acked: Vec::new(),
        });
        Ok(())
    }

    /// Applies one ACK range, removing every packet number it covers from
    /// the unacked map and staging it for `on_ack_frame_end`.
    pub fn on_ack_range(&mut self, start: PacketNumber, end: PacketNumber) {
        let pending = self
            .pending_ack
            .as_mut()
            .expect("on_ack_range called without on_ack_frame_start");

        let mut number = start;
        loop {
            pending.newly_acked.push(number);
            if number == end {
                break;
            }
            number = number.next().expect("ack range exceeded packet number space");
        }
    }

    /// Finishes ACK processing: updates the RTT estimator, runs loss
    /// detection over everything still unacked below the newly-acked
    /// packet, and reports the result to the congestion controller.
    pub fn on_ack_frame_end(&mut self, now: Timestamp) -> AckOutcome {
        let pending = match self.pending_ack.take() {
            Some(pending) => pending,
            None => return AckOutcome::default(),
        };

        let mut newly_acked_packets = Vec::new();
        for number in &pending.newly_acked {
            if let Some(packet) = self.unacked.remove(number) {
                newly_acked_packets.push((*number, packet));
            }
        }
        newly_acked_packets.sort_by_key(|(number, _)| *number);

        self.largest_acked = Some(
            self.largest_acked
                .map_or(pending.largest_acked, |prev| prev.max(pending.largest_acked)),
        );

        if newly_acked_packets.is_empty() {
            self.rearm_pto(now);
            return AckOutcome {
                acked_new_packet: false,
                ..AckOutcome::default()
            };
        }

        self.consecutive_pto_count = 0;

        let (largest_newly_acked_number, largest_newly_acked) =
            newly_acked_packets.last().cloned().unwrap();

        let mut rtt_updated = false;
        if largest_newly_acked_number == pending.largest_acked
            && largest_newly_acked.ack_elicitation.is_ack_eliciting()
        {
            let sample = now.saturating_duration_since(largest_newly_acked.time_sent);
            self.rtt_estimator.update_rtt(
                pending.ack_delay,
                sample,
                now,
                self.space.is_application_data(),
                self.space,
            );
            rtt_updated = true;
            self.congestion_controller
                .on_rtt_update(largest_newly_acked.time_sent, now, &self.rtt_estimator);
        }

        let newly_acked_bytes: u64 = newly_acked_packets
            .iter()
            .filter(|(_, p)| p.congestion_controlled)
            .map(|(_, p)| p.sent_bytes as u64)
            .sum();

        let time_threshold = self.loss_time_threshold();
        let mut persistent_congestion_calculator =
            PersistentCongestionCalculator::new(self.rtt_estimator.first_rtt_sample());
        let mut lost_bytes = 0u64;
        let mut lost_numbers = Vec::new();

        for (&number, packet) in self.unacked.iter() {
            if number >= largest_newly_acked_number {
                continue;
            }
            let outcome = self.loss_detector.check(
                time_threshold,
                packet.time_sent,
                number,
                largest_newly_acked_number,
                now,
            );
            if let LossOutcome::Lost = outcome {
                lost_numbers.push(number);
                if packet.congestion_controlled {
                    lost_bytes += packet.sent_bytes as u64;
                }
                persistent_congestion_calculator.on_lost_packet(
                    number,
                    packet.time_sent,
                    packet.ack_elicitation,
                    packet.transmission_type.is_mtu_probe(),
                );
            }
        }

        for number in &lost_numbers {
            self.unacked.remove(number);
        }

        let persistent_congestion_threshold =
            self.rtt_estimator.pto_period(1, self.space) * PERSISTENT_CONGESTION_THRESHOLD;
        let is_persistent_congestion = persistent_congestion_calculator
            .persistent_congestion_duration()
            >= persistent_congestion_threshold;

        let loss = if lost_bytes > 0 {
            Some(LossEvent {
                lost_bytes: lost_bytes.min(u32::MAX as u64) as u32,
                is_persistent_congestion,
            })
        } else {
            None
        };

        self.congestion_controller.on_congestion_event(
            now,
            rtt_updated,
            largest_newly_acked.time_sent,
            largest_newly_acked.congestion_info,
            newly_acked_bytes as usize,
            loss,
        );

        self.rearm_pto(now);

        AckOutcome {
            acked_new_packet: true,
            newly_acked: newly_acked_packets.into_iter().map(|(n, _)| n).collect(),
            newly_acked_bytes,
            lost_bytes,
            is_persistent_congestion,
        }
    }

    //= https://www.rfc-editor.org/rfc/rfc9002#section-6.1.2
    //# kTimeThreshold * max(smoothed_rtt, latest_rtt), with a kGranularity floor
    fn loss_time_threshold(&self) -> Duration {
        let rtt = self
            .rtt_estimator
            .smoothed_rtt()
            .max(self.rtt_estimator.latest_rtt());
        let scaled = rtt + rtt / 8;
        scaled.max(K_GRANULARITY)
    }

    /// Runs on `retransmission_alarm` expiry.
    pub fn on_retransmission_timeout(&mut self, config: &Config, now: Timestamp) -> RetransmissionOutcome {
        let packets_in_flight = !self.unacked.is_empty();
        if self.pto.on_timeout(packets_in_flight, now).is_pending() {
            return RetransmissionOutcome::default();
        }

        self.consecutive_pto_count += 1;
        let close_with_too_many_rtos =
            config.close_connection_after_five_rtos && self.consecutive_pto_count >= 5;

        //= https://www.rfc-editor.org/rfc/rfc9002#section-6.2.1
        //# the PTO backoff factor is reset when the sender receives an
        //# acknowledgment, except in the case of persistent congestion
        // A fired PTO is rearmed here with the grown backoff so repeated
        // expirations (absent any ack) keep counting towards the
        // five-RTO kill switch instead of going permanently silent.
        self.last_ack_eliciting_sent_time = Some(now);
        self.rearm_pto(now);

        RetransmissionOutcome {
            probes_required: self.pto.transmissions(),
            close_with_too_many_rtos,
        }
    }

    /// Consumes one pending PTO probe transmission.
    pub fn on_probe_sent(&mut self) {
        self.pto.on_transmit_once();
    }

    /// The delay before the caller may send more data, or `None` if
    /// congestion-blocked (infinite delay).
    pub fn time_until_send(&self, now: Timestamp) -> Option<Duration> {
        if self.congestion_controller.bytes_in_flight() >= self.congestion_controller.congestion_window() {
            return None;
        }
        match self.congestion_controller.earliest_departure_time() {
            Some(departure) if !departure.has_elapsed(now) => Some(departure - now),
            _ => Some(Duration::ZERO),
        }
    }

    /// The retransmission alarm's next deadline, if any unacked
    /// retransmittable packet remains.
    pub fn get_retransmission_time(&self) -> Option<Timestamp> {
        self.pto.earliest()
    }

    /// The release time the writer's pacer should target, if the
    /// congestion controller paces.
    pub fn next_release_time(&self) -> Option<Timestamp> {
        self.congestion_controller.earliest_departure_time()
    }

    /// Previously-sent unencrypted packets stop being retransmittable once
    /// forward-secure keys install; their bytes are also removed from
    /// bytes-in-flight accounting, since they can never be acked and must
    /// not hold the congestion window open.
    pub fn neuter_unencrypted_packets(&mut self) {
        let neutered: Vec<PacketNumber> = self
            .unacked
            .iter()
            .filter(|(_, p)| p.encryption_level == EncryptionLevel::None)
            .map(|(&number, _)| number)
            .collect();

        for number in neutered {
            if let Some(packet) = self.unacked.remove(&number) {
                if packet.congestion_controlled {
                    self.congestion_controller
                        .on_packet_discarded(packet.sent_bytes as usize);
                }
            }
        }
    }
}
