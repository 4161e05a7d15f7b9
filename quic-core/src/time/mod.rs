// Copyright (c) the quic-connection-core authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Time related datatypes: an opaque monotonic `Timestamp`, the `Clock`
//! trait that produces them, and the `Timer` primitive alarms are built on.

mod clock;
mod timer;
mod timestamp;

pub use clock::*;
pub use timer::*;
pub use timestamp::*;

/// The recommended timer granularity; deadlines within this window of "now"
/// or of an already-armed deadline are treated as equal, to avoid timer
/// churn. See `rfc9002#section-6.1.2`.
pub const K_GRANULARITY: core::time::Duration = core::time::Duration::from_millis(1);
