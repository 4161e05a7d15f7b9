// Copyright (c) the quic-connection-core authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Connection identifiers. The wire encoding (length-prefixed opaque bytes)
//! belongs to the framer; this type only carries the bytes and enforces the
//! 0-20 byte length QUIC requires.

use core::fmt;
use smallvec::SmallVec;

pub const MAX_CONNECTION_ID_LEN: usize = 20;

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(SmallVec<[u8; MAX_CONNECTION_ID_LEN]>);

#[derive(Clone, Copy, Debug, PartialEq, Eq, displaydoc::Display)]
/// connection id length {0} exceeds the maximum of {MAX_CONNECTION_ID_LEN}
pub struct LengthError(usize);

impl ConnectionId {
    pub fn try_from_bytes(bytes: &[u8]) -> Result<Self, LengthError> {
        if bytes.len() > MAX_CONNECTION_ID_LEN {
            return Err(LengthError(bytes.len()));
        }
        Ok(Self(SmallVec::from_slice(bytes)))
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ConnectionId(")?;
        for byte in self.as_bytes() {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_oversized_ids() {
        let bytes = [0u8; MAX_CONNECTION_ID_LEN + 1];
        assert!(ConnectionId::try_from_bytes(&bytes).is_err());
    }

    #[test]
    fn round_trips_bytes() {
        let id = ConnectionId::try_from_bytes(&[1, 2, 3]).unwrap();
        assert_eq!(id.as_bytes(), &[1, 2, 3]);
    }
}
