// Copyright (c) the quic-connection-core authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use super::Timestamp;
use core::task::Poll;

/// A single deferred deadline.
///
/// Each `Alarm` in the connection's `AlarmSet` wraps exactly one `Timer`,
/// so at most one fire is ever pending per alarm.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Timer {
    deadline: Option<Timestamp>,
}

impl Timer {
    /// Arms the timer to fire at `time`, overwriting any previously armed
    /// deadline.
    #[inline]
    pub fn set(&mut self, time: Timestamp) {
        self.deadline = Some(time);
    }

    /// Arms the timer at `time` unless it is already armed at or before
    /// `time - granularity`; this avoids rearm churn for timers like
    /// `send_alarm` that get recomputed on every outgoing packet.
    #[inline]
    pub fn update(&mut self, time: Timestamp, granularity: core::time::Duration) {
        if let Some(current) = self.deadline {
            if let Some(floor) = time.checked_sub(granularity) {
                if current <= floor {
                    return;
                }
            }
        }
        self.deadline = Some(time);
    }

    /// Cancels the timer. After cancellation it no longer reports expired.
    #[inline]
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    #[inline]
    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    #[inline]
    pub fn deadline(&self) -> Option<Timestamp> {
        self.deadline
    }

    #[inline]
    pub fn is_expired(&self, now: Timestamp) -> bool {
        matches!(self.deadline, Some(deadline) if deadline.has_elapsed(now))
    }

    /// If expired, cancels the timer and returns `Ready`; otherwise `Pending`.
    #[inline]
    pub fn poll_expiration(&mut self, now: Timestamp) -> Poll<()> {
        if self.is_expired(now) {
            self.cancel();
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}

/// Something that can report the next time it would like to be polled.
///
/// Mirrors the teacher's `timer::Provider` composition: components expose
/// their own timers through this trait instead of the owner reaching into
/// their private fields, so adding a new timer-bearing component never
/// requires touching the aggregation point.
pub trait Provider {
    fn earliest(&self) -> Option<Timestamp>;
}

impl Provider for Timer {
    #[inline]
    fn earliest(&self) -> Option<Timestamp> {
        self.deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;

    fn t(millis: u64) -> Timestamp {
        Timestamp::from_duration(Duration::from_millis(millis))
    }

    #[test]
    fn set_and_cancel() {
        let mut timer = Timer::default();
        assert!(!timer.is_armed());
        timer.set(t(10));
        assert!(timer.is_armed());
        timer.cancel();
        assert!(!timer.is_armed());
    }

    #[test]
    fn update_respects_granularity_floor() {
        let mut timer = Timer::default();
        timer.set(t(100));
        // an earlier deadline within the granularity window doesn't rearm
        timer.update(t(100) - Duration::from_micros(500), Duration::from_millis(1));
        assert_eq!(timer.deadline(), Some(t(100)));

        // a deadline clearly earlier than the granularity floor does rearm
        timer.update(t(50), Duration::from_millis(1));
        assert_eq!(timer.deadline(), Some(t(50)));
    }

    #[test]
    fn update_with_zero_granularity_always_rearms_earlier() {
        let mut timer = Timer::default();
        timer.set(t(100));
        timer.update(t(99), Duration::ZERO);
        assert_eq!(timer.deadline(), Some(t(99)));
    }

    #[test]
    fn poll_expiration() {
        let mut timer = Timer::default();
        timer.set(t(100));
        assert!(timer.poll_expiration(t(50)).is_pending());
        assert!(timer.is_armed());
        assert!(timer.poll_expiration(t(100)).is_ready());
        assert!(!timer.is_armed());
    }
}
