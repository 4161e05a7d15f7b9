// Copyright (c) the quic-connection-core authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! `spec.md` §3/§4.1.6: the server-side effective-peer-migration
//! sub-state-machine. Tracks a candidate address change until it's either
//! validated by a later ack or superseded by a new candidate.

use quic_core::packet::number::PacketNumber;

#[cfg(feature = "std")]
use std::net::SocketAddr;

#[cfg(not(feature = "std"))]
type SocketAddr = ();

/// Coarse classification of how a peer's observed address changed,
/// `spec.md` §4.1.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressChangeType {
    NoChange,
    PortOnly,
    Ipv4ToIpv4,
    Ipv4ToIpv6,
    Ipv6ToIpv4,
    Ipv6ToIpv6,
}

impl AddressChangeType {
    #[cfg(feature = "std")]
    pub fn classify(old: SocketAddr, new: SocketAddr) -> Self {
        if old == new {
            return Self::NoChange;
        }
        if old.ip() == new.ip() {
            return Self::PortOnly;
        }
        match (old, new) {
            (SocketAddr::V4(_), SocketAddr::V4(_)) => Self::Ipv4ToIpv4,
            (SocketAddr::V4(_), SocketAddr::V6(_)) => Self::Ipv4ToIpv6,
            (SocketAddr::V6(_), SocketAddr::V4(_)) => Self::Ipv6ToIpv4,
            (SocketAddr::V6(_), SocketAddr::V6(_)) => Self::Ipv6ToIpv6,
        }
    }
}

/// The migration sub-state-machine itself: inactive, or in-progress with
/// the snapshot of the highest packet number sent before the candidate
/// address was observed.
#[derive(Debug, Default)]
pub enum EffectivePeerMigration {
    #[default]
    Inactive,
    InProgress {
        highest_sent_before_migration: PacketNumber,
    },
}

impl EffectivePeerMigration {
    pub fn is_in_progress(&self) -> bool {
        matches!(self, Self::InProgress { .. })
    }

    /// Starts tracking a migration candidate, snapshotting the highest
    /// packet number sent so far. `spec.md` §4.1.6: called when a change is
    /// recorded for a packet that is the new largest observed and not a
    /// probe.
    pub fn start(&mut self, highest_sent_before_migration: PacketNumber) {
        *self = Self::InProgress {
            highest_sent_before_migration,
        };
    }

    /// Checks whether an acked packet number validates an in-progress
    /// migration. `SPEC_FULL.md` §4 resolves the open question: any acked
    /// packet above the snapshot validates, regardless of probe status.
    ///
    /// Returns `true` (and resets to `Inactive`) if this ack validates the
    /// migration.
    pub fn on_packet_acked(&mut self, acked_packet_number: PacketNumber) -> bool {
        let validated = match self {
            Self::InProgress {
                highest_sent_before_migration,
            } => acked_packet_number > *highest_sent_before_migration,
            Self::Inactive => false,
        };

        if validated {
            *self = Self::Inactive;
        }

        validated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quic_core::{packet::number::PacketNumberSpace, varint::VarInt};

    fn pn(value: u64) -> PacketNumber {
        PacketNumberSpace::ApplicationData.new_packet_number(VarInt::new(value).unwrap())
    }

    #[test]
    fn starts_inactive() {
        let migration = EffectivePeerMigration::default();
        assert!(!migration.is_in_progress());
    }

    #[test]
    fn validates_on_ack_above_snapshot_regardless_of_probe_status() {
        let mut migration = EffectivePeerMigration::default();
        migration.start(pn(10));
        assert!(migration.is_in_progress());

        assert!(!migration.on_packet_acked(pn(10)));
        assert!(migration.is_in_progress());

        assert!(migration.on_packet_acked(pn(11)));
        assert!(!migration.is_in_progress());
    }

    #[cfg(feature = "std")]
    #[test]
    fn classifies_port_only_change() {
        let a: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let b: SocketAddr = "127.0.0.1:2".parse().unwrap();
        assert_eq!(AddressChangeType::classify(a, b), AddressChangeType::PortOnly);
    }

    #[cfg(feature = "std")]
    #[test]
    fn classifies_no_change() {
        let a: SocketAddr = "127.0.0.1:1".parse().unwrap();
        assert_eq!(AddressChangeType::classify(a, a), AddressChangeType::NoChange);
    }
}
