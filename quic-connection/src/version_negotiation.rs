// Copyright (c) the quic-connection-core authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! `spec.md` §4.1 client version-negotiation state machine:
//! `start → in_progress → negotiated`.

/// The client's version-negotiation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Start,
    InProgress,
    Negotiated { version: u32 },
}

impl Default for State {
    fn default() -> Self {
        Self::Start
    }
}

/// What the controller should do in response to an incoming packet's
/// version, as decided by [`State::on_incoming_version`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Emit a version-negotiation packet and silently drop the incoming
    /// one.
    EmitVersionNegotiation,
    /// Drop the packet without any response.
    Drop,
    /// Accept the version: store it, move to `Negotiated`, and retransmit
    /// every unacked in-flight packet at the new version.
    AcceptAndRetransmitAll { version: u32 },
}

impl State {
    pub fn is_negotiated(&self) -> bool {
        matches!(self, Self::Negotiated { .. })
    }

    /// `spec.md` §4.1: client-side transition table.
    ///
    /// `is_supported` tells the state machine whether `incoming_version`
    /// is one this endpoint can speak; the caller (connection controller)
    /// owns the supported-version table since that's a deployment
    /// concern, not a core algorithm.
    pub fn on_incoming_version(&mut self, incoming_version: u32, is_supported: bool) -> Action {
        match (*self, is_supported) {
            (_, true) if !self.is_negotiated() || self.negotiated_version() != Some(incoming_version) => {
                *self = Self::Negotiated {
                    version: incoming_version,
                };
                Action::AcceptAndRetransmitAll {
                    version: incoming_version,
                }
            }
            (Self::Negotiated { version }, true) if version == incoming_version => Action::Drop,
            (Self::Negotiated { .. }, false) => Action::Drop,
            (Self::Start, false) | (Self::InProgress, false) => {
                *self = Self::InProgress;
                Action::EmitVersionNegotiation
            }
            (_, true) => Action::Drop,
        }
    }

    fn negotiated_version(&self) -> Option<u32> {
        match self {
            Self::Negotiated { version } => Some(*version),
            _ => None,
        }
    }
}
