// Copyright (c) the quic-connection-core authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Transport-level error codes, as carried by CONNECTION_CLOSE frames.
//!
//! The numeric values follow RFC 9000 §20.1 / §20.2 for the codes that map
//! directly onto the spec; the codes `spec.md` §6 names that have no RFC
//! assignment (e.g. `too_many_outstanding_sent_packets`) are given
//! implementation-private values in the experimental range.

use crate::varint::VarInt;
use core::fmt;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Error {
    pub code: VarInt,
    pub reason: &'static str,
}

macro_rules! known_codes {
    ($($(#[doc = $doc:literal])* $name:ident = $value:expr;)*) => {
        impl Error {
            $(
                $(#[doc = $doc])*
                pub const $name: Self = Self {
                    code: unsafe { VarInt::new_unchecked($value) },
                    reason: "",
                };
            )*
        }
    };
}

known_codes!(
    NO_ERROR = 0x0;
    INTERNAL_ERROR = 0x1;
    CONNECTION_REFUSED = 0x2;
    FLOW_CONTROL_ERROR = 0x3;
    STREAM_LIMIT_ERROR = 0x4;
    STREAM_STATE_ERROR = 0x5;
    FINAL_SIZE_ERROR = 0x6;
    FRAME_ENCODING_ERROR = 0x7;
    TRANSPORT_PARAMETER_ERROR = 0x8;
    CONNECTION_ID_LIMIT_ERROR = 0x9;
    PROTOCOL_VIOLATION = 0xa;
    INVALID_TOKEN = 0xb;
    APPLICATION_ERROR = 0xc;
    CRYPTO_BUFFER_EXCEEDED = 0xd;
    KEY_UPDATE_ERROR = 0xe;
    AEAD_LIMIT_REACHED = 0xf;
    NO_VIABLE_PATH = 0x10;

    // Codes named in spec.md section 6 with no RFC 9000 assignment; placed
    // in the private-use range above the CRYPTO_ERROR band (0x100-0x1ff).
    INVALID_VERSION = 0x200;
    INVALID_ACK_DATA = 0x201;
    INVALID_PACKET_HEADER = 0x202;
    INVALID_STOP_WAITING_DATA = 0x203;
    UNENCRYPTED_STREAM_DATA = 0x204;
    MAYBE_CORRUPTED_MEMORY = 0x205;
    TOO_MANY_OUTSTANDING_SENT_PACKETS = 0x206;
    TOO_MANY_RTOS = 0x207;
    NETWORK_IDLE_TIMEOUT = 0x208;
    HANDSHAKE_TIMEOUT = 0x209;
    PACKET_WRITE_ERROR = 0x20a;
    PUBLIC_RESET = 0x20b;
    ERROR_MIGRATING_ADDRESS = 0x20c;
    EMPTY_WRITE = 0x20d;
);

impl Error {
    #[inline]
    pub const fn new(code: VarInt) -> Self {
        Self { code, reason: "" }
    }

    #[inline]
    pub const fn with_reason(mut self, reason: &'static str) -> Self {
        self.reason = reason;
        self
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.reason.is_empty() {
            write!(f, "transport::Error {{ code: {} }}", self.code)
        } else {
            write!(
                f,
                "transport::Error {{ code: {}, reason: {:?} }}",
                self.code, self.reason
            )
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.reason.is_empty() {
            write!(f, "transport error 0x{:x}", self.code.as_u64())
        } else {
            write!(f, "transport error 0x{:x}: {}", self.code.as_u64(), self.reason)
        }
    }
}
