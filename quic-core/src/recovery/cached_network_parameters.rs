// Copyright (c) the quic-connection-core authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use core::time::Duration;

/// Bandwidth/RTT hints from a previous connection to the same peer,
/// supplied by and returned to the visitor so a resumed connection can
/// skip slow-start. `spec.md` §6 "Persisted state": the core keeps none of
/// this itself, it only consumes what the visitor hands it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachedNetworkParameters {
    /// The previous connection's smoothed RTT estimate.
    pub min_rtt: Duration,
    /// The previous connection's measured bandwidth, in bytes per second.
    pub bandwidth_estimate_bytes_per_second: u64,
    /// Whether `bandwidth_estimate_bytes_per_second` was taken at maximum
    /// observed bandwidth rather than at connection close; callers that
    /// pass `max_bandwidth_resumption = true` to
    /// `SentPacketManager::resume_connection_state` are asserting this.
    pub max_bandwidth_estimate: bool,
}

impl CachedNetworkParameters {
    pub fn new(min_rtt: Duration, bandwidth_estimate_bytes_per_second: u64) -> Self {
        Self {
            min_rtt,
            bandwidth_estimate_bytes_per_second,
            max_bandwidth_estimate: false,
        }
    }
}
