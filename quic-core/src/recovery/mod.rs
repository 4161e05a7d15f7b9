// Copyright (c) the quic-connection-core authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! RTT estimation, loss detection, PTO scheduling and the congestion
//! controller contract the sent-packet manager is built on.
//!
//! The concrete congestion-control *algorithm* (Cubic, BBR, ...) is an
//! external collaborator per `spec.md` §1; this module only defines the
//! `CongestionController` trait the sent-packet manager calls into.

mod cached_network_parameters;
mod congestion_controller;
mod loss;
mod pto;
mod rtt_estimator;

pub use cached_network_parameters::CachedNetworkParameters;
pub use congestion_controller::{CongestionController, LossEvent, PathInfo};
pub use loss::{Detector, Outcome as LossOutcome, PersistentCongestionCalculator};
pub use pto::Pto;
pub use rtt_estimator::{RttEstimator, DEFAULT_INITIAL_RTT, MIN_RTT};

/// Limits the burst of packets a sender releases at once when the
/// congestion window suddenly opens up. `spec.md` doesn't name this
/// directly, but the sent-packet manager's pacing relies on it being a
/// known constant shared with the congestion controller.
pub const MAX_BURST_PACKETS: u32 = 10;

//= https://www.rfc-editor.org/rfc/rfc9002#section-7.6.1
//# The RECOMMENDED value for kPersistentCongestionThreshold is 3
pub const PERSISTENT_CONGESTION_THRESHOLD: u32 = 3;
