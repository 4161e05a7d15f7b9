// Copyright (c) the quic-connection-core authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! `AckRangeSet`: an ordered set of contiguous received-packet-number
//! intervals, capped to `MAX_ACK_RANGES`. `spec.md` §3 `AckRangeSet`.
//!
//! The merge-on-insert approach follows the scan-and-splice shape of the
//! teacher's `interval_set::insert`, simplified to the single-packet-number
//! insertion this module actually needs (no generic interval bounds, no
//! bulk-range insertion).

use super::settings::MAX_ACK_RANGES;
use crate::{
    packet::number::{PacketNumber, PacketNumberRange},
    time::Timestamp,
};

#[cfg(feature = "std")]
use std::collections::VecDeque;

#[cfg(not(feature = "std"))]
use alloc::collections::VecDeque;

#[derive(Clone, Debug, Default)]
pub struct RangeSet {
    /// Ascending, disjoint, non-adjacent ranges.
    ranges: VecDeque<PacketNumberRange>,
    /// The time the largest observed packet number was received.
    largest_observed_time: Option<Timestamp>,
    /// Set when a range has been evicted to make room, or an insertion
    /// created/extended a gap, signalling `get_updated_ack_frame` should be
    /// re-read before being trusted as authoritative.
    dirty: bool,
}

impl RangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn largest(&self) -> Option<PacketNumber> {
        self.ranges.back().map(|r| r.end())
    }

    pub fn smallest(&self) -> Option<PacketNumber> {
        self.ranges.front().map(|r| r.start())
    }

    pub fn largest_observed_time(&self) -> Option<Timestamp> {
        self.largest_observed_time
    }

    pub fn contains(&self, packet_number: PacketNumber) -> bool {
        self.ranges
            .binary_search_by(|range| {
                if range.end() < packet_number {
                    core::cmp::Ordering::Less
                } else if range.start() > packet_number {
                    core::cmp::Ordering::Greater
                } else {
                    core::cmp::Ordering::Equal
                }
            })
            .is_ok()
    }

    /// Whether `packet_number` is missing: below the largest observed, but
    /// not contained in any recorded range.
    pub fn is_missing(&self, packet_number: PacketNumber) -> bool {
        match self.largest() {
            Some(largest) if packet_number < largest => !self.contains(packet_number),
            _ => false,
        }
    }

    /// Records a newly received packet number, merging it into an existing
    /// range or inserting a new one. Returns `true` if this packet number
    /// fills a previously-missing gap (i.e. was `is_missing` before this
    /// call), which the caller uses to decide whether to force an ack.
    pub fn insert(&mut self, packet_number: PacketNumber, now: Timestamp) -> bool {
        let was_missing = self.is_missing(packet_number);

        if self
            .largest()
            .map(|largest| packet_number >= largest)
            .unwrap_or(true)
        {
            self.largest_observed_time = Some(now);
        }

        let index = self
            .ranges
            .partition_point(|range| range.end() < packet_number);

        // merge with the range at `index` if adjacent/overlapping
        let merges_left = index > 0
            && self.ranges[index - 1]
                .end()
                .next()
                .map(|next| next >= packet_number)
                .unwrap_or(false);
        let merges_right = index < self.ranges.len()
            && self.ranges[index].contains(packet_number)
            || (index < self.ranges.len()
                && packet_number
                    .next()
                    .map(|next| next == self.ranges[index].start())
                    .unwrap_or(false));

        match (merges_left, merges_right) {
            (true, true) => {
                let right = self.ranges.remove(index).unwrap();
                let left = &mut self.ranges[index - 1];
                *left = PacketNumberRange::new(left.start(), right.end());
            }
            (true, false) => {
                let left = &mut self.ranges[index - 1];
                if packet_number > left.end() {
                    *left = PacketNumberRange::new(left.start(), packet_number);
                }
            }
            (false, true) => {
                let right = &mut self.ranges[index];
                if packet_number < right.start() {
                    *right = PacketNumberRange::new(packet_number, right.end());
                }
            }
            (false, false) => {
                if index < self.ranges.len() && self.ranges[index].contains(packet_number) {
                    // already recorded; nothing to do
                } else {
                    self.ranges
                        .insert(index, PacketNumberRange::new(packet_number, packet_number));
                }
            }
        }

        self.enforce_cap();
        if was_missing {
            self.dirty = true;
        }
        was_missing
    }

    fn enforce_cap(&mut self) {
        while self.ranges.len() > MAX_ACK_RANGES {
            // the peer has moved on past the oldest range; drop it
            self.ranges.pop_front();
            self.dirty = true;
        }
    }

    /// Prunes all ranges (and partial ranges) below `least_unacked`, per a
    /// STOP_WAITING frame. `spec.md` §4.3 `dont_wait_for_packets_before`.
    pub fn dont_wait_for_packets_before(&mut self, least_unacked: PacketNumber) {
        while let Some(front) = self.ranges.front().copied() {
            if front.end() < least_unacked {
                self.ranges.pop_front();
            } else if front.start() < least_unacked {
                *self.ranges.front_mut().unwrap() =
                    PacketNumberRange::new(least_unacked, front.end());
                break;
            } else {
                break;
            }
        }
    }

    /// Returns `true` and clears the dirty flag if new missing packets (or
    /// an evicted range) have appeared since the last call.
    ///
    /// `spec.md` §4.3 `has_new_missing_packets`.
    pub fn take_dirty(&mut self) -> bool {
        core::mem::take(&mut self.dirty)
    }

    /// Iterates ranges from largest to smallest, the order ACK frames are
    /// serialized in on the wire.
    pub fn ranges_descending(&self) -> impl Iterator<Item = PacketNumberRange> + '_ {
        self.ranges.iter().rev().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{packet::number::PacketNumberSpace, time::Timestamp, varint::VarInt};
    use core::time::Duration;

    fn pn(value: u64) -> PacketNumber {
        PacketNumberSpace::ApplicationData.new_packet_number(VarInt::new(value).unwrap())
    }

    fn t(ms: u64) -> Timestamp {
        Timestamp::from_duration(Duration::from_millis(ms))
    }

    #[test]
    fn merges_contiguous_insertions() {
        let mut set = RangeSet::new();
        set.insert(pn(1), t(0));
        set.insert(pn(2), t(1));
        set.insert(pn(3), t(2));
        assert_eq!(set.len(), 1);
        assert_eq!(set.smallest(), Some(pn(1)));
        assert_eq!(set.largest(), Some(pn(3)));
    }

    #[test]
    fn gap_then_fill_reports_missing_then_merges() {
        let mut set = RangeSet::new();
        set.insert(pn(1), t(0));
        let was_missing = set.insert(pn(3), t(1));
        assert!(!was_missing);
        assert_eq!(set.len(), 2);
        assert!(set.is_missing(pn(2)));

        let was_missing = set.insert(pn(2), t(2));
        assert!(was_missing);
        assert_eq!(set.len(), 1);
        assert!(!set.is_missing(pn(2)));
    }

    #[test]
    fn caps_at_max_ranges_by_evicting_oldest() {
        let mut set = RangeSet::new();
        // insert MAX_ACK_RANGES + 1 disjoint (odd-numbered) packets
        for i in 0..(MAX_ACK_RANGES as u64 + 1) {
            set.insert(pn(i * 2), t(i));
        }
        assert_eq!(set.len(), MAX_ACK_RANGES);
        assert!(set.take_dirty());
    }

    #[test]
    fn dont_wait_for_packets_before_prunes_and_splits() {
        let mut set = RangeSet::new();
        set.insert(pn(1), t(0));
        set.insert(pn(2), t(1));
        set.insert(pn(5), t(2));
        set.dont_wait_for_packets_before(pn(2));
        assert_eq!(set.smallest(), Some(pn(2)));
    }

    #[test]
    fn ranges_descending_matches_wire_order() {
        let mut set = RangeSet::new();
        set.insert(pn(1), t(0));
        set.insert(pn(10), t(1));
        let ranges: Vec<_> = set.ranges_descending().map(|r| r.start().as_u64()).collect();
        assert_eq!(ranges, vec![10, 1]);
    }
}
