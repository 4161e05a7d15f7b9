// Copyright (c) the quic-connection-core authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use core::time::Duration;
use std::net::SocketAddr;

/// The UDP socket writer. `spec.md` §6 "Writer interface". Socket I/O
/// itself is out of scope (`spec.md` §1); this is the seam the controller
/// calls through.
pub trait Writer {
    fn write_packet(
        &mut self,
        bytes: &[u8],
        self_addr: SocketAddr,
        peer_addr: SocketAddr,
        release_time: Option<Duration>,
    ) -> WriteOutcome;

    fn is_write_blocked(&self) -> bool;

    fn is_batch_mode(&self) -> bool;

    fn flush(&mut self);

    fn get_max_packet_size(&self, peer: SocketAddr) -> u16;

    fn supports_release_time(&self) -> bool;
}

/// The result of a single `write_packet` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Ok,
    Blocked,
    Error(WriteError),
}

/// `spec.md` §4.1.4: an MTU-probe-sized write failing with `MsgTooBig` is
/// absorbed by disabling probing; any other write error tears the
/// connection down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteError {
    MsgTooBig,
    Other,
}
