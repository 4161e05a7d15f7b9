// Copyright (c) the quic-connection-core authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::time::{Provider as TimerProvider, Timer, Timestamp};
use core::{task::Poll, time::Duration};

/// Probe timeout scheduling: arms a timer at `base_timestamp + pto_period`
/// and, on expiration, demands one or two ack-eliciting probe packets.
/// `spec.md` §3 `SentPacketManager`, the `retransmission_alarm`.
#[derive(Debug, Default)]
pub struct Pto {
    timer: Timer,
    state: State,
}

impl Pto {
    /// Called when a timeout has occurred. Returns `Ready` if the PTO timer
    /// had expired, arming `transmissions()` probes.
    #[inline]
    pub fn on_timeout(&mut self, packets_in_flight: bool, timestamp: Timestamp) -> Poll<()> {
        if self.timer.poll_expiration(timestamp).is_pending() {
            return Poll::Pending;
        }

        //= https://www.rfc-editor.org/rfc/rfc9002#section-6.2.4
        //# When a PTO timer expires, a sender MUST send at least one ack-
        //# eliciting packet in the packet number space as a probe.
        //#
        //# An endpoint MAY send up to two full-sized datagrams containing
        //# ack-eliciting packets, to avoid an expensive consecutive PTO
        //# expiration due to a single lost datagram or to transmit data from
        //# multiple packet number spaces.
        let transmission_count = if packets_in_flight { 2 } else { 1 };
        self.state = State::RequiresTransmission(transmission_count);

        Poll::Ready(())
    }

    //= https://www.rfc-editor.org/rfc/rfc9002#section-6.2.1
    //# A sender SHOULD restart its PTO timer every time an ack-eliciting
    //# packet is sent or acknowledged, or when Initial or Handshake keys
    //# are discarded.
    #[inline]
    pub fn update(&mut self, base_timestamp: Timestamp, pto_period: Duration) {
        self.timer.set(base_timestamp + pto_period);
    }

    #[inline]
    pub fn cancel(&mut self) {
        self.timer.cancel();
    }

    /// Remaining probe packets the caller still owes.
    #[inline]
    pub fn transmissions(&self) -> u8 {
        self.state.transmissions()
    }

    /// Consumes one pending probe transmission.
    #[inline]
    pub fn on_transmit_once(&mut self) {
        self.state.on_transmit();
    }

    /// Forces a single probe transmission outside of a timer expiration,
    /// e.g. to validate a new path.
    #[inline]
    pub fn force_transmit(&mut self) {
        if matches!(self.state, State::Idle) {
            self.state = State::RequiresTransmission(1);
        }
    }
}

impl TimerProvider for Pto {
    #[inline]
    fn earliest(&self) -> Option<Timestamp> {
        self.timer.earliest()
    }
}

#[derive(Debug, PartialEq, Eq)]
enum State {
    Idle,
    RequiresTransmission(u8),
}

impl Default for State {
    #[inline]
    fn default() -> Self {
        Self::Idle
    }
}

impl State {
    #[inline]
    fn transmissions(&self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::RequiresTransmission(count) => *count,
        }
    }

    #[inline]
    fn on_transmit(&mut self) {
        match self {
            Self::Idle | Self::RequiresTransmission(0) => {
                debug_assert!(false, "transmitted a pto probe in idle state");
            }
            Self::RequiresTransmission(1) => {
                *self = Self::Idle;
            }
            Self::RequiresTransmission(remaining) => {
                *remaining -= 1;
            }
        }
    }
}
