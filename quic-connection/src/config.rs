// Copyright (c) the quic-connection-core authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Reloadable configuration flags.
//!
//! The original implementation gates most of this behind
//! `GetQuicReloadableFlag(...)` experiment toggles (`spec.md` §9); here they
//! are named fields on [`Config`], built with the same `setter!`-macro
//! pattern the teacher's `connection::limits::Limits` uses: a validated
//! field gets a `Result`-returning setter, everything else a plain one.

use quic_core::ack::{DecimationDelay, DecimationMode};
use core::time::Duration;

/// A field was given a value outside its valid range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, displaydoc::Display)]
#[cfg_attr(feature = "thiserror", derive(thiserror::Error))]
pub enum ConfigError {
    /// max_tracked_packets must be at least max_undecryptable_packets
    TrackedPacketsBelowUndecryptableCapacity,
    /// max_undecryptable_packets must be greater than zero
    ZeroUndecryptableCapacity,
}

macro_rules! setter {
    ($(#[doc = $doc:literal])* $name:ident, $field:ident, $inner:ty) => {
        $(#[doc = $doc])*
        pub fn $name(mut self, value: $inner) -> Self {
            self.$field = value;
            self
        }
    };
    ($(#[doc = $doc:literal])* $name:ident, $field:ident, $inner:ty, |$validate_value:ident| $validation:block) => {
        $(#[doc = $doc])*
        pub fn $name(mut self, value: $inner) -> Result<Self, ConfigError> {
            let $validate_value = value;
            $validation
            self.$field = value;
            Ok(self)
        }
    };
}

/// The reloadable policy knobs `spec.md` §9 names, collected onto a single
/// builder-style struct.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// `spec.md` §4.1.1: selects between `tcp_acking`, `ack_decimation`,
    /// and `ack_decimation_with_reordering`.
    pub(crate) ack_decimation_mode: DecimationMode,

    /// The fraction of `min_rtt` the decimation-mode ack timer uses: 1/4
    /// (`Standard`) or 1/8 (`Short`).
    pub(crate) ack_decimation_delay: DecimationDelay,

    /// When set, the decimation ack-eliciting-packet counter never forces
    /// an immediate ack; scheduling relies solely on the timer.
    pub(crate) unlimited_ack_decimation: bool,

    /// Shortens the next ack delay to 1ms if the gap since the previously
    /// received packet exceeded the smoothed RTT.
    pub(crate) fast_ack_after_quiescence: bool,

    /// `spec.md` §4.1.5/§8: close the connection with `too_many_rtos`
    /// after five consecutive retransmission timeouts.
    pub(crate) close_connection_after_five_rtos: bool,

    /// Gated by transport version > 43 in the original; modeled here as a
    /// direct flag since version negotiation is this crate's own concern.
    pub(crate) no_stop_waiting_frames: bool,

    /// Whether the writer supports OS-level release-time pacing, letting
    /// `can_write` absorb small delays instead of arming `send_alarm`.
    pub(crate) supports_release_time: bool,

    pub(crate) delayed_ack_time: Duration,
    pub(crate) max_tracked_packets: u64,
    pub(crate) max_undecryptable_packets: usize,
    pub(crate) max_packet_gap: u64,
    pub(crate) release_time_into_future: Duration,
    pub(crate) ping_timeout: Duration,
    pub(crate) idle_timeout: Duration,
    pub(crate) handshake_timeout: Duration,

    /// `spec.md` §7 kind 3: whether an idle timeout closes the connection
    /// without sending a CONNECTION_CLOSE frame.
    pub(crate) silent_close_on_idle: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            ack_decimation_mode: DecimationMode::AckDecimationWithReordering,
            ack_decimation_delay: DecimationDelay::Standard,
            unlimited_ack_decimation: false,
            fast_ack_after_quiescence: false,
            close_connection_after_five_rtos: true,
            no_stop_waiting_frames: true,
            supports_release_time: false,
            delayed_ack_time: Duration::from_millis(25),
            max_tracked_packets: 10_000,
            max_undecryptable_packets: 10,
            max_packet_gap: quic_core::packet::number::MAX_PACKET_GAP,
            release_time_into_future: Duration::from_millis(5),
            ping_timeout: Duration::from_secs(15),
            idle_timeout: Duration::from_secs(30),
            handshake_timeout: Duration::from_secs(10),
            silent_close_on_idle: false,
        }
    }

    setter!(with_ack_decimation_mode, ack_decimation_mode, DecimationMode);
    setter!(with_ack_decimation_delay, ack_decimation_delay, DecimationDelay);
    setter!(with_unlimited_ack_decimation, unlimited_ack_decimation, bool);
    setter!(with_fast_ack_after_quiescence, fast_ack_after_quiescence, bool);
    setter!(
        with_close_connection_after_five_rtos,
        close_connection_after_five_rtos,
        bool
    );
    setter!(with_no_stop_waiting_frames, no_stop_waiting_frames, bool);
    setter!(with_supports_release_time, supports_release_time, bool);
    setter!(with_delayed_ack_time, delayed_ack_time, Duration);
    setter!(with_ping_timeout, ping_timeout, Duration);
    setter!(with_silent_close_on_idle, silent_close_on_idle, bool);

    setter!(
        #[doc = "The maximum number of packets the received-manager will track before closing the connection."]
        with_max_tracked_packets, max_tracked_packets, u64,
        |validate_value| {
            if validate_value < self.max_undecryptable_packets as u64 {
                return Err(ConfigError::TrackedPacketsBelowUndecryptableCapacity);
            }
        }
    );

    setter!(
        #[doc = "The maximum number of buffered undecryptable packets (`spec.md` §3 `UndecryptablePacket`)."]
        with_max_undecryptable_packets, max_undecryptable_packets, usize,
        |validate_value| {
            if validate_value == 0 {
                return Err(ConfigError::ZeroUndecryptableCapacity);
            }
            if validate_value as u64 > self.max_tracked_packets {
                return Err(ConfigError::TrackedPacketsBelowUndecryptableCapacity);
            }
        }
    );

    /// The idle timeout as applied for the given perspective, per `spec.md`
    /// §4.1.5: servers get 3 extra seconds, clients lose 1, so clients
    /// time out slightly earlier than servers.
    pub fn effective_idle_timeout(&self, perspective: quic_core::endpoint::Perspective) -> Duration {
        if perspective.is_server() {
            self.idle_timeout + Duration::from_secs(3)
        } else {
            self.idle_timeout.saturating_sub(Duration::from_secs(1))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quic_core::endpoint::Perspective;

    #[test]
    fn effective_idle_timeout_skews_client_earlier() {
        let config = Config::new().with_delayed_ack_time(Duration::from_millis(10));
        let client = config.effective_idle_timeout(Perspective::Client);
        let server = config.effective_idle_timeout(Perspective::Server);
        assert_eq!(client, config.idle_timeout - Duration::from_secs(1));
        assert_eq!(server, config.idle_timeout + Duration::from_secs(3));
        assert!(client < server);
    }

    #[test]
    fn rejects_zero_undecryptable_capacity() {
        let err = Config::new().with_max_undecryptable_packets(0).unwrap_err();
        assert_eq!(err, ConfigError::ZeroUndecryptableCapacity);
    }

    #[test]
    fn rejects_zero_tracked_packets() {
        let err = Config::new().with_max_tracked_packets(0).unwrap_err();
        assert_eq!(err, ConfigError::TrackedPacketsBelowUndecryptableCapacity);
    }

    #[test]
    fn rejects_tracked_packets_below_undecryptable_capacity() {
        let config = Config::new().with_max_undecryptable_packets(50).unwrap();
        let err = config.with_max_tracked_packets(10).unwrap_err();
        assert_eq!(err, ConfigError::TrackedPacketsBelowUndecryptableCapacity);
    }

    #[test]
    fn rejects_undecryptable_capacity_above_tracked_packets() {
        let config = Config::new().with_max_tracked_packets(5).unwrap();
        let err = config.with_max_undecryptable_packets(50).unwrap_err();
        assert_eq!(err, ConfigError::TrackedPacketsBelowUndecryptableCapacity);
    }
}
