// Copyright (c) the quic-connection-core authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The eight named alarms of `spec.md` §3/§4.1.5, each independently
//! settable/cancellable with at most one pending fire per alarm.
//!
//! Mirrors the teacher's `timer::Provider` composition: each field exposes
//! its own deadline rather than the aggregation point reaching into
//! private state, so the earliest-deadline query stays correct as alarms
//! are added or removed.

use quic_core::time::{Provider as TimerProvider, Timer, Timestamp, K_GRANULARITY};

/// `send_alarm` rearms only if the new deadline is more than this much
/// earlier than the currently armed one (`spec.md` §9 open question,
/// resolved in `SPEC_FULL.md` §4).
pub const SEND_ALARM_GRANULARITY: core::time::Duration = K_GRANULARITY;

/// `ack_alarm` rearms on any earlier deadline, however small.
pub const ACK_ALARM_GRANULARITY: core::time::Duration = core::time::Duration::ZERO;

/// The connection's eight timers.
#[derive(Debug, Default)]
pub struct AlarmSet {
    pub ack: Timer,
    pub retransmission: Timer,
    pub send: Timer,
    pub timeout: Timer,
    pub ping: Timer,
    pub mtu_discovery: Timer,
    pub path_degrading: Timer,
    pub retransmittable_on_wire: Timer,
}

impl AlarmSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels every alarm. `spec.md` §8: after `close_with` returns, every
    /// alarm's `is_set()` must be false.
    pub fn cancel_all(&mut self) {
        self.ack.cancel();
        self.retransmission.cancel();
        self.send.cancel();
        self.timeout.cancel();
        self.ping.cancel();
        self.mtu_discovery.cancel();
        self.path_degrading.cancel();
        self.retransmittable_on_wire.cancel();
    }

    /// Updates `send_alarm` honoring its 1ms granularity floor.
    pub fn update_send(&mut self, time: Timestamp) {
        self.send.update(time, SEND_ALARM_GRANULARITY);
    }

    /// Updates `ack_alarm`; any earlier deadline always rearms.
    pub fn update_ack(&mut self, time: Timestamp) {
        self.ack.update(time, ACK_ALARM_GRANULARITY);
    }

    /// The next deadline among all eight alarms, for the runtime to sleep
    /// until.
    pub fn earliest(&self) -> Option<Timestamp> {
        [
            self.ack.earliest(),
            self.retransmission.earliest(),
            self.send.earliest(),
            self.timeout.earliest(),
            self.ping.earliest(),
            self.mtu_discovery.earliest(),
            self.path_degrading.earliest(),
            self.retransmittable_on_wire.earliest(),
        ]
        .into_iter()
        .flatten()
        .min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;

    fn t(ms: u64) -> Timestamp {
        Timestamp::from_duration(Duration::from_millis(ms))
    }

    #[test]
    fn cancel_all_disarms_every_alarm() {
        let mut alarms = AlarmSet::new();
        alarms.ack.set(t(10));
        alarms.retransmission.set(t(20));
        alarms.send.set(t(30));
        alarms.cancel_all();
        assert!(alarms.earliest().is_none());
    }

    #[test]
    fn earliest_picks_minimum_across_alarms() {
        let mut alarms = AlarmSet::new();
        alarms.retransmission.set(t(50));
        alarms.ack.set(t(10));
        alarms.send.set(t(30));
        assert_eq!(alarms.earliest(), Some(t(10)));
    }

    #[test]
    fn send_alarm_respects_one_ms_granularity() {
        let mut alarms = AlarmSet::new();
        alarms.update_send(t(100));
        alarms.update_send(t(100) - Duration::from_micros(500));
        assert_eq!(alarms.send.deadline(), Some(t(100)));

        alarms.update_send(t(50));
        assert_eq!(alarms.send.deadline(), Some(t(50)));
    }

    #[test]
    fn ack_alarm_rearms_on_any_earlier_deadline() {
        let mut alarms = AlarmSet::new();
        alarms.update_ack(t(100));
        alarms.update_ack(t(99));
        assert_eq!(alarms.ack.deadline(), Some(t(99)));
    }
}
