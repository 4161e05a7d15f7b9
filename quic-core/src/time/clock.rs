// Copyright (c) the quic-connection-core authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use super::Timestamp;

/// A source of the current time.
///
/// The connection core never calls `std::time::Instant::now()` directly;
/// every time-dependent operation takes a `&dyn Clock` (or generic `C: Clock`)
/// so tests can drive a virtual clock deterministically.
pub trait Clock {
    fn get_time(&self) -> Timestamp;
}

impl<T: Clock + ?Sized> Clock for &T {
    #[inline]
    fn get_time(&self) -> Timestamp {
        (**self).get_time()
    }
}

/// A `Clock` backed by `std::time::Instant`, for production use.
#[cfg(feature = "std")]
#[derive(Debug, Default)]
pub struct StdClock {
    epoch: std::time::Instant,
}

#[cfg(feature = "std")]
impl StdClock {
    pub fn new() -> Self {
        Self {
            epoch: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl Clock for StdClock {
    #[inline]
    fn get_time(&self) -> Timestamp {
        Timestamp::from_duration(self.epoch.elapsed())
    }
}

/// A `Clock` implementation for tests: time only advances when explicitly
/// told to.
#[derive(Debug, Default, Clone)]
pub struct VirtualClock {
    now: core::cell::Cell<core::time::Duration>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self {
            now: core::cell::Cell::new(core::time::Duration::ZERO),
        }
    }

    pub fn advance(&self, by: core::time::Duration) {
        self.now.set(self.now.get() + by);
    }

    pub fn set(&self, time: Timestamp) {
        self.now.set(time.as_duration());
    }
}

impl Clock for VirtualClock {
    #[inline]
    fn get_time(&self) -> Timestamp {
        Timestamp::from_duration(self.now.get())
    }
}
