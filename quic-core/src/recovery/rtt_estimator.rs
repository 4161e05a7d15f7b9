// Copyright (c) the quic-connection-core authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    packet::number::PacketNumberSpace,
    time::{Timestamp, K_GRANULARITY},
};
use core::{
    cmp::{max, min},
    time::Duration,
};

//= https://www.rfc-editor.org/rfc/rfc9002#section-6.2.2
//# When no previous RTT is available, the initial RTT SHOULD be set to
//# 333 milliseconds.
pub const DEFAULT_INITIAL_RTT: Duration = Duration::from_millis(333);

/// The lowest RTT value the estimator is capable of tracking.
pub const MIN_RTT: Duration = Duration::from_micros(1);

/// `spec.md` §3 `SentPacketManager`: min_rtt, smoothed_rtt, latest_rtt,
/// mean_deviation (here `rttvar`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RttEstimator {
    latest_rtt: Duration,
    min_rtt: Duration,
    smoothed_rtt: Duration,
    rttvar: Duration,
    max_ack_delay: Duration,
    first_rtt_sample: Option<Timestamp>,
}

impl Default for RttEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_RTT)
    }
}

impl RttEstimator {
    pub fn new(initial_rtt: Duration) -> Self {
        Self::new_with_max_ack_delay(Duration::ZERO, initial_rtt)
    }

    fn new_with_max_ack_delay(max_ack_delay: Duration, initial_rtt: Duration) -> Self {
        let initial_rtt = initial_rtt.max(MIN_RTT);

        //= https://www.rfc-editor.org/rfc/rfc9002#section-5.3
        //# smoothed_rtt and rttvar are initialized as follows, where
        //# kInitialRtt contains the initial RTT value
        //#
        //# smoothed_rtt = kInitialRtt
        //# rttvar = kInitialRtt / 2
        let smoothed_rtt = initial_rtt;
        let rttvar = initial_rtt / 2;

        Self {
            latest_rtt: initial_rtt,
            min_rtt: initial_rtt,
            smoothed_rtt,
            rttvar,
            max_ack_delay,
            first_rtt_sample: None,
        }
    }

    /// Resets the estimator for a new path, keeping the `max_ack_delay` the
    /// peer negotiated.
    pub fn for_new_path(&self, initial_rtt: Duration) -> Self {
        Self::new_with_max_ack_delay(self.max_ack_delay, initial_rtt)
    }

    pub fn on_max_ack_delay(&mut self, max_ack_delay: Duration) {
        self.max_ack_delay = max_ack_delay;
    }

    #[inline]
    pub fn latest_rtt(&self) -> Duration {
        self.latest_rtt
    }

    #[inline]
    pub fn smoothed_rtt(&self) -> Duration {
        self.smoothed_rtt
    }

    #[inline]
    pub fn min_rtt(&self) -> Duration {
        self.min_rtt
    }

    #[inline]
    pub fn rttvar(&self) -> Duration {
        self.rttvar
    }

    #[inline]
    pub fn first_rtt_sample(&self) -> Option<Timestamp> {
        self.first_rtt_sample
    }

    fn rttvar_4x(&self) -> Duration {
        self.rttvar * 4
    }

    //= https://www.rfc-editor.org/rfc/rfc9002#section-6.2.1
    //# PTO = smoothed_rtt + max(4*rttvar, kGranularity) + max_ack_delay
    pub fn pto_period(&self, pto_backoff: u32, space: PacketNumberSpace) -> Duration {
        let mut pto_period = self.smoothed_rtt;
        pto_period += max(self.rttvar_4x(), K_GRANULARITY);

        //= https://www.rfc-editor.org/rfc/rfc9002#section-6.2.1
        //# When the PTO is armed for Initial or Handshake packet number
        //# spaces, the max_ack_delay in the PTO period computation is set to
        //# 0
        if space.is_application_data() {
            pto_period += self.max_ack_delay;
        }

        pto_period * pto_backoff
    }

    /// Updates the estimator with a new RTT sample.
    ///
    //= https://www.rfc-editor.org/rfc/rfc9002#section-5.3
    pub fn update_rtt(
        &mut self,
        mut ack_delay: Duration,
        rtt_sample: Duration,
        now: Timestamp,
        is_handshake_confirmed: bool,
        space: PacketNumberSpace,
    ) {
        self.latest_rtt = rtt_sample.max(MIN_RTT);

        if self.first_rtt_sample.is_none() {
            self.first_rtt_sample = Some(now);
            self.min_rtt = self.latest_rtt;
            self.smoothed_rtt = self.latest_rtt;
            self.rttvar = self.latest_rtt / 2;
            return;
        }

        self.min_rtt = min(self.min_rtt, self.latest_rtt);

        //= https://www.rfc-editor.org/rfc/rfc9002#section-5.3
        //# Limit ack_delay by max_ack_delay after handshake confirmation.
        if is_handshake_confirmed || space.is_application_data() {
            ack_delay = ack_delay.min(self.max_ack_delay);
        } else {
            ack_delay = Duration::ZERO;
        }

        let adjusted_rtt = if self.latest_rtt >= self.min_rtt + ack_delay {
            self.latest_rtt - ack_delay
        } else {
            self.latest_rtt
        };

        //= https://www.rfc-editor.org/rfc/rfc9002#section-5.3
        //# rttvar = 3/4 * rttvar + 1/4 * abs(smoothed_rtt - adjusted_rtt)
        //# smoothed_rtt = 7/8 * smoothed_rtt + 1/8 * adjusted_rtt
        let rttvar_sample = abs_diff(self.smoothed_rtt, adjusted_rtt);
        self.rttvar = (self.rttvar * 3 + rttvar_sample) / 4;
        self.smoothed_rtt = (self.smoothed_rtt * 7 + adjusted_rtt) / 8;
    }
}

fn abs_diff(a: Duration, b: Duration) -> Duration {
    if a > b {
        a - b
    } else {
        b - a
    }
}
