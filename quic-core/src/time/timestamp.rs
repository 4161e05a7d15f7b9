// Copyright (c) the quic-connection-core authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use super::K_GRANULARITY;
use core::{fmt, time::Duration};

/// An absolute point in time.
///
/// The value is opaque and only meaningful relative to other `Timestamp`s
/// produced by the same `Clock`; it is not tied to any calendar time.
#[derive(PartialEq, Eq, PartialOrd, Ord, Copy, Clone, Hash, Default)]
pub struct Timestamp(Duration);

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Timestamp({:?})", self.0)
    }
}

impl Timestamp {
    /// Constructs a `Timestamp` from a duration since the clock's epoch.
    ///
    /// This should only be called by `Clock` implementations.
    #[inline]
    pub const fn from_duration(duration: Duration) -> Self {
        Self(duration)
    }

    /// Returns the duration since the clock's epoch.
    ///
    /// This should only be called by `Clock` implementations.
    #[inline]
    pub const fn as_duration(self) -> Duration {
        self.0
    }

    #[inline]
    pub fn checked_add(self, duration: Duration) -> Option<Self> {
        self.0.checked_add(duration).map(Self)
    }

    #[inline]
    pub fn checked_sub(self, duration: Duration) -> Option<Self> {
        self.0.checked_sub(duration).map(Self)
    }

    /// Returns the `Duration` elapsed since an earlier `Timestamp`, or zero
    /// if `earlier` is actually more recent.
    #[inline]
    pub fn saturating_duration_since(self, earlier: Self) -> Duration {
        self.0.saturating_sub(earlier.0)
    }

    /// Returns whether `self` is at or before `now`, within one timer
    /// granularity. A deadline less than one granularity in the future is
    /// already considered elapsed, matching the teacher's timer semantics.
    #[inline]
    pub fn has_elapsed(self, now: Self) -> bool {
        self.0 <= now.0 + K_GRANULARITY
    }
}

impl core::ops::Add<Duration> for Timestamp {
    type Output = Timestamp;

    #[inline]
    fn add(self, rhs: Duration) -> Self::Output {
        Timestamp(self.0 + rhs)
    }
}

impl core::ops::AddAssign<Duration> for Timestamp {
    #[inline]
    fn add_assign(&mut self, rhs: Duration) {
        self.0 += rhs;
    }
}

impl core::ops::Sub for Timestamp {
    type Output = Duration;

    #[inline]
    fn sub(self, rhs: Timestamp) -> Duration {
        self.0 - rhs.0
    }
}

impl core::ops::Sub<Duration> for Timestamp {
    type Output = Timestamp;

    #[inline]
    fn sub(self, rhs: Duration) -> Self::Output {
        Timestamp(self.0 - rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic() {
        let t0 = Timestamp::from_duration(Duration::from_millis(100));
        let t1 = t0 + Duration::from_millis(50);
        assert_eq!(t1 - t0, Duration::from_millis(50));
        assert_eq!(t1.saturating_duration_since(t0), Duration::from_millis(50));
        assert_eq!(t0.saturating_duration_since(t1), Duration::ZERO);
    }

    #[test]
    fn has_elapsed_honors_granularity() {
        let now = Timestamp::from_duration(Duration::from_secs(1));
        let deadline = now + Duration::from_micros(500);
        // less than one granularity away: already elapsed
        assert!(deadline.has_elapsed(now));

        let far = now + Duration::from_millis(5);
        assert!(!far.has_elapsed(now));
    }
}
