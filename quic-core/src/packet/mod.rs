// Copyright (c) the quic-connection-core authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Packet numbers and the per-space packet-number map.

pub mod number;
