// Copyright (c) the quic-connection-core authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Packet numbers are a monotonically increasing 62-bit integer per
//! (connection, encryption level); `spec.md` §3 `PacketNumber`.

use crate::varint::VarInt;
use core::{cmp::Ordering, fmt};

/// The maximum gap tolerated between a newly-received packet number and the
/// peer's previously observed largest, per `spec.md` §4.1.1 / §9.
pub const MAX_PACKET_GAP: u64 = 5000;

/// The three packet-number spaces a connection tracks independently.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PacketNumberSpace {
    Initial,
    Handshake,
    ApplicationData,
}

impl PacketNumberSpace {
    #[inline]
    pub fn new_packet_number(self, value: VarInt) -> PacketNumber {
        PacketNumber {
            space: self,
            value,
        }
    }

    #[inline]
    pub fn is_application_data(self) -> bool {
        matches!(self, Self::ApplicationData)
    }

    fn assert_eq(self, other: Self) {
        debug_assert_eq!(
            self, other,
            "packet numbers from different spaces are not comparable"
        );
    }
}

/// A fully-decoded packet number in a given space.
#[derive(Clone, Copy, Eq, Hash)]
pub struct PacketNumber {
    space: PacketNumberSpace,
    value: VarInt,
}

impl fmt::Debug for PacketNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("PacketNumber")
            .field(&self.space)
            .field(&self.value.as_u64())
            .finish()
    }
}

impl fmt::Display for PacketNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.value, f)
    }
}

impl PartialEq for PacketNumber {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl PartialOrd for PacketNumber {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PacketNumber {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        self.space.assert_eq(other.space);
        self.value.cmp(&other.value)
    }
}

impl PacketNumber {
    #[inline]
    pub fn space(self) -> PacketNumberSpace {
        self.space
    }

    #[inline]
    pub fn as_varint(self) -> VarInt {
        self.value
    }

    #[inline]
    pub fn as_u64(self) -> u64 {
        self.value.as_u64()
    }

    /// The next packet number in the same space, or `None` on overflow.
    #[inline]
    pub fn next(self) -> Option<Self> {
        self.value
            .checked_add(1)
            .map(|value| Self::new_from_value(self.space, value))
    }

    /// The previous packet number in the same space, or `None` if this is
    /// already the first packet number.
    #[inline]
    pub fn prev(self) -> Option<Self> {
        self.value
            .as_u64()
            .checked_sub(1)
            .map(|value| Self::new_from_value(self.space, value))
    }

    /// The distance `self - rhs`, or `None` if `rhs` is larger (underflow).
    #[inline]
    pub fn checked_distance(self, rhs: Self) -> Option<u64> {
        self.space.assert_eq(rhs.space);
        self.as_u64().checked_sub(rhs.as_u64())
    }

    /// Whether `self` is within `MAX_PACKET_GAP` of `reference`, in either
    /// direction. Used to reject packets with an implausible jump in packet
    /// number, per `spec.md` §4.1 `on_packet_header` and §9 `Near`.
    #[inline]
    pub fn is_near(self, reference: Self) -> bool {
        self.space.assert_eq(reference.space);
        let gap = if self.as_u64() >= reference.as_u64() {
            self.as_u64() - reference.as_u64()
        } else {
            reference.as_u64() - self.as_u64()
        };
        gap <= MAX_PACKET_GAP
    }

    #[inline]
    fn new_from_value(space: PacketNumberSpace, value: u64) -> Self {
        // `next`/`prev` only ever move by one within an already-valid VarInt,
        // so this can't exceed the varint ceiling except at u64::MAX, which
        // packet numbers never approach in practice.
        Self {
            space,
            value: VarInt::new(value).expect("packet number exceeded varint range"),
        }
    }
}

/// An inclusive range of packet numbers in the same space, as emitted by
/// the framer for a single ACK range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacketNumberRange {
    start: PacketNumber,
    end: PacketNumber,
}

impl PacketNumberRange {
    #[inline]
    pub fn new(start: PacketNumber, end: PacketNumber) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    #[inline]
    pub fn start(self) -> PacketNumber {
        self.start
    }

    #[inline]
    pub fn end(self) -> PacketNumber {
        self.end
    }

    #[inline]
    pub fn contains(self, packet_number: PacketNumber) -> bool {
        self.start <= packet_number && packet_number <= self.end
    }

    #[inline]
    pub fn len(self) -> u64 {
        self.end.checked_distance(self.start).unwrap_or(0) + 1
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        false
    }

    pub fn iter(self) -> impl Iterator<Item = PacketNumber> {
        let mut current = Some(self.start);
        let end = self.end;
        core::iter::from_fn(move || {
            let value = current?;
            current = if value == end { None } else { value.next() };
            Some(value)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pn(value: u64) -> PacketNumber {
        PacketNumberSpace::ApplicationData.new_packet_number(VarInt::new(value).unwrap())
    }

    #[test]
    fn ordering_and_distance() {
        assert!(pn(5) < pn(10));
        assert_eq!(pn(10).checked_distance(pn(5)), Some(5));
        assert_eq!(pn(5).checked_distance(pn(10)), None);
    }

    #[test]
    #[should_panic]
    fn comparing_across_spaces_panics_in_debug() {
        let a = PacketNumberSpace::Initial.new_packet_number(VarInt::ZERO);
        let b = PacketNumberSpace::Handshake.new_packet_number(VarInt::ZERO);
        let _ = a < b;
    }

    #[test]
    fn is_near_respects_max_gap() {
        assert!(pn(5000).is_near(pn(0)));
        assert!(!pn(5001).is_near(pn(0)));
        assert!(pn(0).is_near(pn(5000)));
    }

    #[test]
    fn range_iteration() {
        let range = PacketNumberRange::new(pn(3), pn(6));
        let values: Vec<_> = range.iter().map(PacketNumber::as_u64).collect();
        assert_eq!(values, vec![3, 4, 5, 6]);
        assert_eq!(range.len(), 4);
    }
}
