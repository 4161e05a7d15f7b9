// Copyright (c) the quic-connection-core authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::varint::VarInt;
use core::time::Duration;

/// After this many packets have arrived in a decimation mode, the receiver
/// switches from "ack every other packet" to decimated acking.
/// `spec.md` §4.1.1 `min_received_before_ack_decimation`.
pub const MIN_RECEIVED_BEFORE_ACK_DECIMATION: u64 = 100;

/// The ack-eliciting-packet threshold under TCP-style acking.
pub const TCP_ACK_THRESHOLD: u32 = 2;

/// The ack-eliciting-packet threshold once in steady-state decimation.
pub const DECIMATION_ACK_THRESHOLD: u32 = 10;

/// The maximum number of ranges an `ack::RangeSet` will retain before
/// evicting the oldest. `spec.md` §3/§8.
pub const MAX_ACK_RANGES: usize = 255;

/// `spec.md` §4.1.1: the decimation delay is a fraction of `min_rtt`,
/// selected by the negotiated short-delay flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecimationDelay {
    /// `min_rtt * 1/4`
    Standard,
    /// `min_rtt * 1/8`
    Short,
}

impl DecimationDelay {
    pub fn scale(self, min_rtt: Duration) -> Duration {
        match self {
            Self::Standard => min_rtt / 4,
            Self::Short => min_rtt / 8,
        }
    }
}

/// The three ack-scheduling policies `spec.md` §4.1.1 names.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecimationMode {
    /// Ack every other ack-eliciting packet, or on the delayed-ack timer.
    TcpAcking,
    /// After warm-up, ack every 10th ack-eliciting packet, or on an
    /// RTT-scaled timer.
    AckDecimation,
    /// `AckDecimation`, plus an immediate ack whenever a received packet
    /// number is smaller than one already covered by a sent ack.
    AckDecimationWithReordering,
}

/// Settings for ACK frame scheduling and ack-delay encoding.
#[derive(Clone, Copy, Debug)]
pub struct Settings {
    pub max_ack_delay: Duration,
    pub ack_delay_exponent: u8,
    pub decimation_mode: DecimationMode,
    pub decimation_delay: DecimationDelay,
    /// `spec.md` §9 `fast_ack_after_quiescence`.
    pub fast_ack_after_quiescence: bool,
    /// `spec.md` §9 `unlimited_ack_decimation`: when set, the decimation
    /// threshold check (`counter >= 10`) never kicks in to force an
    /// immediate ack, relying solely on the timer.
    pub unlimited_ack_decimation: bool,
    /// `spec.md` §6 `no_stop_waiting` / transport-version gate.
    pub no_stop_waiting_frames: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self::RECOMMENDED
    }
}

impl Settings {
    pub const RECOMMENDED: Self = Self {
        max_ack_delay: Duration::from_millis(25),
        ack_delay_exponent: 3,
        decimation_mode: DecimationMode::AckDecimationWithReordering,
        decimation_delay: DecimationDelay::Standard,
        fast_ack_after_quiescence: false,
        unlimited_ack_decimation: false,
        no_stop_waiting_frames: true,
    };

    //= https://www.rfc-editor.org/rfc/rfc9000#section-13.2.1
    //# An endpoint MUST acknowledge all ack-eliciting Initial and Handshake
    //# packets immediately
    pub const EARLY: Self = Self {
        max_ack_delay: Duration::from_secs(0),
        ack_delay_exponent: 0,
        ..Self::RECOMMENDED
    };

    fn scale(&self) -> u32 {
        2u32.pow(self.ack_delay_exponent as u32)
    }

    /// Decodes a peer-supplied `Ack Delay` field into a `Duration`.
    pub fn decode_ack_delay(&self, delay: VarInt) -> Duration {
        Duration::from_micros(delay.as_u64()) * self.scale()
    }

    /// Encodes a local ack delay into the wire `Ack Delay` field.
    pub fn encode_ack_delay(&self, delay: Duration) -> VarInt {
        let micros = delay.as_micros();
        let scale = self.scale() as u128;
        let encoded = (micros / scale).min(crate::varint::MAX_VARINT_VALUE as u128) as u64;
        VarInt::new(encoded).unwrap_or(VarInt::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_delay_round_trips_within_scale_epsilon() {
        let settings = Settings {
            ack_delay_exponent: 3,
            ..Settings::default()
        };
        let epsilon = settings.scale() as u128;

        for delay_us in (0..1000).map(|v| v * 100) {
            let delay = Duration::from_micros(delay_us);
            let encoded = settings.encode_ack_delay(delay);
            let decoded = settings.decode_ack_delay(encoded);
            let diff = delay.as_micros().abs_diff(decoded.as_micros());
            assert!(diff < epsilon);
        }
    }

    #[test]
    fn decimation_delay_scales_min_rtt() {
        let rtt = Duration::from_millis(100);
        assert_eq!(DecimationDelay::Standard.scale(rtt), Duration::from_millis(25));
        assert_eq!(DecimationDelay::Short.scale(rtt), Duration::from_millis(12).checked_add(Duration::from_micros(500)).unwrap());
    }
}
