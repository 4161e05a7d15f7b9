// Copyright (c) the quic-connection-core authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The per-connection QUIC state machine.
//!
//! [`connection::QuicConnection`] owns the lifecycle of a single QUIC
//! connection: it dispatches incoming frames (via the [`contracts::Framer`]
//! collaborator), drives the [`SentPacketManager`] and
//! [`ReceivedPacketManager`], and arms the eight timers in [`AlarmSet`].
//! Encryption, the application/session layer, UDP I/O, the concrete
//! congestion-control algorithm, and wire-format serialization all live
//! outside this crate and are reached only through the traits in
//! [`contracts`].

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

pub mod alarms;
pub mod config;
#[cfg(feature = "std")]
pub mod connection;
pub mod contracts;
pub mod flusher;
pub mod migration;
pub mod pending_queue;
pub mod received_packet_manager;
pub mod sent_packet_manager;
pub mod undecryptable;
pub mod version_negotiation;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

#[cfg(feature = "std")]
pub use connection::{EmptyWrite, QuicConnection};
pub use config::{Config, ConfigError};
