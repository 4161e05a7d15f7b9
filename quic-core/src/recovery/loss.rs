// Copyright (c) the quic-connection-core authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{frame::AckElicitation, packet::number::PacketNumber, time::Timestamp};
use core::time::Duration;

//= https://www.rfc-editor.org/rfc/rfc9002#section-6.1.1
//# The RECOMMENDED initial value for the packet reordering threshold
//# (kPacketThreshold) is 3, based on best practices for TCP loss
//# detection [RFC5681] [RFC6675].  In order to remain similar to TCP,
//# implementations SHOULD NOT use a packet threshold less than 3
const K_PACKET_THRESHOLD: u64 = 3;

/// The result of testing a single in-flight packet against the
/// packet-and-time thresholds of RFC 9002 §6.1.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Not yet lost; re-check no later than `lost_time`.
    NotLost { lost_time: Timestamp },
    Lost,
}

/// Applies the packet/time loss-detection thresholds of RFC 9002 §6.1 to a
/// single sent packet. `spec.md` §3 `SentPacketManager` loss detection.
#[derive(Debug, Default)]
pub struct Detector {}

impl Detector {
    /// `time_threshold` is the path's current RFC 9002 §6.1.2 time
    /// threshold (`kTimeThreshold * max(smoothed_rtt, latest_rtt)`, with a
    /// `kGranularity` floor); the caller computes it, since it depends on
    /// RTT state the detector itself doesn't own.
    pub fn check(
        &self,
        time_threshold: Duration,
        time_sent: Timestamp,
        packet_number: PacketNumber,
        largest_acked_packet_number: PacketNumber,
        now: Timestamp,
    ) -> Outcome {
        let packet_lost_time = time_sent + time_threshold;
        let time_threshold_exceeded = packet_lost_time.has_elapsed(now);

        let packet_number_threshold_exceeded = largest_acked_packet_number
            .checked_distance(packet_number)
            .expect("largest_acked_packet_number >= packet_number")
            >= K_PACKET_THRESHOLD;

        //= https://www.rfc-editor.org/rfc/rfc9002#section-6.1
        //# A packet is declared lost if it meets all of the following
        //# conditions:
        //#
        //#     *  The packet is unacknowledged, in flight, and was sent prior
        //#        to an acknowledged packet.
        //#
        //#     *  The packet was sent kPacketThreshold packets before an
        //#        acknowledged packet, or it was sent long enough in the past.
        if time_threshold_exceeded || packet_number_threshold_exceeded {
            return Outcome::Lost;
        }

        Outcome::NotLost {
            lost_time: packet_lost_time,
        }
    }
}

/// Tracks the longest run of contiguous lost, ack-eliciting packet numbers
/// observed since the last acknowledged packet, to detect RFC 9002 §7.6
/// persistent congestion.
#[derive(Debug)]
pub struct PersistentCongestionCalculator {
    current_period: Option<Period>,
    max_duration: Duration,
    first_rtt_sample: Option<Timestamp>,
}

#[derive(Debug, Clone, Copy)]
struct Period {
    start: PacketNumber,
    start_time: Timestamp,
    end: PacketNumber,
    end_time: Timestamp,
}

impl Period {
    fn new(time_sent: Timestamp, packet_number: PacketNumber) -> Self {
        Self {
            start: packet_number,
            start_time: time_sent,
            end: packet_number,
            end_time: time_sent,
        }
    }

    fn is_contiguous(&self, packet_number: PacketNumber) -> bool {
        packet_number.checked_distance(self.end) == Some(1)
    }

    fn extend(&mut self, packet_number: PacketNumber, time_sent: Timestamp) {
        self.end = packet_number;
        self.end_time = time_sent;
    }

    fn duration(&self) -> Duration {
        self.end_time.saturating_duration_since(self.start_time)
    }
}

impl PersistentCongestionCalculator {
    pub fn new(first_rtt_sample: Option<Timestamp>) -> Self {
        Self {
            current_period: None,
            max_duration: Duration::ZERO,
            first_rtt_sample,
        }
    }

    pub fn persistent_congestion_duration(&self) -> Duration {
        self.max_duration
    }

    /// Called for every packet the `Detector` reported `Lost`, in ascending
    /// packet-number order.
    pub fn on_lost_packet(
        &mut self,
        packet_number: PacketNumber,
        time_sent: Timestamp,
        ack_elicitation: AckElicitation,
        is_mtu_probe: bool,
    ) {
        //= https://www.rfc-editor.org/rfc/rfc9002#section-7.6.2
        //# The persistent congestion period SHOULD NOT start until there is
        //# at least one RTT sample.
        let has_rtt_sample = self
            .first_rtt_sample
            .is_some_and(|sample| time_sent >= sample);
        if !has_rtt_sample {
            return;
        }

        //= https://www.rfc-editor.org/rfc/rfc9000#section-14.4
        //# Loss of a QUIC packet that is carried in a PMTU probe is
        //# therefore not a reliable indication of congestion and SHOULD NOT
        //# trigger a congestion control reaction
        if is_mtu_probe {
            return;
        }

        if let Some(current_period) = &mut self.current_period {
            if current_period.is_contiguous(packet_number) {
                current_period.extend(packet_number, time_sent);
                self.max_duration = self.max_duration.max(current_period.duration());
            } else {
                self.current_period = None;
            }
        }

        //= https://www.rfc-editor.org/rfc/rfc9002#section-7.6.2
        //# These two packets MUST be ack-eliciting, since a receiver is
        //# required to acknowledge only ack-eliciting packets within its
        //# maximum acknowledgment delay
        if self.current_period.is_none() && ack_elicitation.is_ack_eliciting() {
            self.current_period = Some(Period::new(time_sent, packet_number));
        }
    }
}
