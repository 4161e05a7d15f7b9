// Copyright (c) the quic-connection-core authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The perspective an endpoint has of itself and of its peer.

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Location {
    Local,
    Remote,
}

impl Location {
    #[inline]
    pub fn is_local(self) -> bool {
        matches!(self, Self::Local)
    }

    #[inline]
    pub fn is_remote(self) -> bool {
        matches!(self, Self::Remote)
    }
}

/// Whether this endpoint is the client or the server in the connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Perspective {
    Client,
    Server,
}

impl Perspective {
    #[inline]
    pub fn is_client(self) -> bool {
        matches!(self, Self::Client)
    }

    #[inline]
    pub fn is_server(self) -> bool {
        matches!(self, Self::Server)
    }
}
