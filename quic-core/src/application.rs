// Copyright (c) the quic-connection-core authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Application-level (as opposed to transport-level) close codes.
//!
//! The application/session layer is an external collaborator (`spec.md`
//! §1); this type only carries the numeric code it supplies when closing.

use crate::varint::VarInt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Error {
    pub code: VarInt,
}

impl From<VarInt> for Error {
    #[inline]
    fn from(code: VarInt) -> Self {
        Self { code }
    }
}

/// Extracts the application error code from a connection error, for
/// endpoints that want to surface it to the session layer without
/// exposing the full `connection::Error` enum.
pub trait IntoApplicationError {
    fn application_error(&self) -> Option<Error>;
}
