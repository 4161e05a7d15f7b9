// Copyright (c) the quic-connection-core authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Value types and algorithms shared by the QUIC connection core.
//!
//! This crate has no connection-lifecycle logic of its own; it provides the
//! building blocks that `quic-connection` assembles into a `QuicConnection`:
//! packet numbers, timestamps and timers, the ack-range set, the RTT
//! estimator, the congestion-controller contract, and the connection-level
//! error/close vocabulary.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

pub mod ack;
pub mod application;
pub mod connection;
pub mod endpoint;
pub mod frame;
pub mod packet;
pub mod random;
pub mod recovery;
pub mod time;
pub mod transport;
pub mod varint;
