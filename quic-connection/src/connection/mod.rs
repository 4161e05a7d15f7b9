// Copyright (c) the quic-connection-core authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! `spec.md` §4.1: `QuicConnection`, the controller that owns a single
//! connection's lifecycle, and the `ConnectionState` it delegates frame
//! dispatch to.
//!
//! Split in two for the same reason the teacher splits its connection
//! implementation from its packet-handling trait object: `QuicConnection`
//! owns both a `Framer` and the rest of the connection's state, and must
//! hand the state to the framer as `&mut dyn FramerCallbacks` while also
//! holding the framer itself mutably borrowed. Two disjoint fields make
//! that borrow legal; one field that implemented `FramerCallbacks` on
//! `Self` could not.

mod controller;
mod state;

pub use controller::{EmptyWrite, QuicConnection};

use quic_core::connection;

/// How [`QuicConnection::close_with`] should notify the peer. `spec.md`
/// §4.1 `close_with`'s three behaviors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseBehavior {
    /// Send a CONNECTION_CLOSE frame and wait for it to be acked like any
    /// other retransmittable frame would be (in practice a close frame is
    /// never itself tracked for retransmission; this variant exists to
    /// distinguish the ordinary case from the idle-timeout case below).
    SendClosePacket,
    /// Send a CONNECTION_CLOSE frame without expecting any acknowledgment
    /// of it. Used for idle-timeout closes: the peer may well be gone.
    SendClosePacketNoAck,
    /// Don't send anything; just tear down local state. Used when the
    /// error already came from a peer-sent CONNECTION_CLOSE, and for
    /// `silent_close_on_idle`.
    Silent,
}

/// Emitted via `tracing::debug!` when the `event-tracing` feature is
/// enabled, a no-op otherwise, so the controller's state transitions don't
/// force a hard dependency on the logging crate.
macro_rules! trace {
    ($($arg:tt)*) => {
        #[cfg(feature = "event-tracing")]
        tracing::debug!($($arg)*);
    };
}

pub(crate) use trace;

/// Shorthand used by both `state.rs` and `controller.rs` for the terminal
/// result of dispatching one incoming frame.
pub(crate) type FrameResult = Result<(), connection::Error>;
