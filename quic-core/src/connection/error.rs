// Copyright (c) the quic-connection-core authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{application, endpoint, transport};

/// Errors that a connection can encounter.
///
/// These map onto the close behaviors and error-code taxonomy in `spec.md`
/// §6/§7: peer-protocol violations and resource exhaustion surface as
/// `Transport`, application-level closes as `Application`, and the
/// remaining variants cover the non-transport termination reasons
/// (stateless reset, idle/handshake timeout, stream ID exhaustion).
#[derive(Clone, Copy, Debug, PartialEq, Eq, displaydoc::Display)]
#[non_exhaustive]
#[cfg_attr(feature = "thiserror", derive(thiserror::Error))]
pub enum Error {
    /// the connection was closed without an error
    Closed { initiator: endpoint::Location },

    /// the connection was closed at the transport level
    Transport {
        error: transport::Error,
        initiator: endpoint::Location,
    },

    /// the connection was closed at the application level
    Application {
        error: application::Error,
        initiator: endpoint::Location,
    },

    /// the connection was reset by a stateless reset from the peer
    StatelessReset,

    /// the connection's idle timer expired
    IdleTimerExpired,

    /// the connection's handshake timer expired
    HandshakeTimerExpired,

    /// all packet numbers for this connection have been exhausted
    PacketNumbersExhausted,

    /// the connection was closed for an unspecified reason
    Unspecified,
}

impl Error {
    /// Constructs an `Error` from a `transport::Error`, collapsing
    /// `NO_ERROR` (and a remote `APPLICATION_ERROR`) down to `Closed`, the
    /// way the teacher's `from_transport_error` does.
    pub fn from_transport_error(error: transport::Error, initiator: endpoint::Location) -> Self {
        match error.code {
            code if code == transport::Error::NO_ERROR.code => Self::Closed { initiator },
            code if code == transport::Error::APPLICATION_ERROR.code && initiator.is_remote() => {
                Self::Closed { initiator }
            }
            _ => Self::Transport { error, initiator },
        }
    }

    /// The `initiator` of the close, if this variant carries one.
    pub fn initiator(&self) -> Option<endpoint::Location> {
        match self {
            Self::Closed { initiator }
            | Self::Transport { initiator, .. }
            | Self::Application { initiator, .. } => Some(*initiator),
            _ => None,
        }
    }

    /// Whether a CONNECTION_CLOSE frame should be sent for this error, per
    /// `spec.md` §7.1: locally-initiated protocol/application errors get a
    /// close frame; remote-initiated and non-transport errors do not.
    pub fn should_send_close_frame(&self) -> bool {
        matches!(self.initiator(), Some(endpoint::Location::Local))
    }
}

impl From<transport::Error> for Error {
    fn from(error: transport::Error) -> Self {
        Self::from_transport_error(error, endpoint::Location::Local)
    }
}

impl application::IntoApplicationError for Error {
    fn application_error(&self) -> Option<application::Error> {
        if let Self::Application { error, .. } = self {
            Some(*error)
        } else {
            None
        }
    }
}

/// Some connection methods need to distinguish a benign duplicate from an
/// actual connection-ending error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessingError {
    DuplicatePacket,
    ConnectionError(Error),
}

impl From<Error> for ProcessingError {
    fn from(error: Error) -> Self {
        ProcessingError::ConnectionError(error)
    }
}
