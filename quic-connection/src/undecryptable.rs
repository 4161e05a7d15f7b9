// Copyright (c) the quic-connection-core authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! `spec.md` §3 `UndecryptablePacket` / §4.1.7: a bounded buffer of
//! received ciphertexts that didn't decrypt under any currently installed
//! key. Re-attempted after every key installation until forward-secure is
//! reached, at which point anything still buffered is discarded.

#[cfg(feature = "std")]
use std::{collections::VecDeque, vec::Vec};

#[cfg(not(feature = "std"))]
use alloc::{collections::VecDeque, vec::Vec};

/// One buffered datagram that failed to decrypt.
#[derive(Debug, Clone)]
pub struct UndecryptablePacket {
    pub datagram: Vec<u8>,
}

/// The four encryption levels a connection passes through; buffering only
/// makes sense before `ForwardSecure` is reached (`spec.md` GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EncryptionLevel {
    None,
    Handshake,
    ZeroRtt,
    ForwardSecure,
}

impl EncryptionLevel {
    pub fn is_forward_secure(self) -> bool {
        matches!(self, Self::ForwardSecure)
    }
}

/// Bounded FIFO buffer, capacity fixed by `Config::max_undecryptable_packets`.
#[derive(Debug)]
pub struct UndecryptableBuffer {
    capacity: usize,
    packets: VecDeque<UndecryptablePacket>,
}

impl UndecryptableBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            packets: VecDeque::with_capacity(capacity.min(64)),
        }
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Buffers `packet` unless the buffer is already at capacity, in which
    /// case the packet is silently dropped (the invariant in `spec.md` §8
    /// is a ceiling, not a resizing buffer).
    ///
    /// Returns `true` if the packet was buffered.
    pub fn try_buffer(&mut self, packet: UndecryptablePacket) -> bool {
        if self.packets.len() >= self.capacity {
            return false;
        }
        self.packets.push_back(packet);
        true
    }

    /// Hands back ownership of every currently buffered packet, emptying
    /// the buffer. The caller re-attempts each one against the newly
    /// installed key and drops whatever still fails once forward-secure
    /// is reached (`spec.md` §4.1.7); that sequencing needs `&mut self`
    /// access to the rest of the controller's state, so it happens in the
    /// caller rather than behind a closure here.
    pub fn take_all(&mut self) -> VecDeque<UndecryptablePacket> {
        core::mem::take(&mut self.packets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkt(tag: u8) -> UndecryptablePacket {
        UndecryptablePacket {
            datagram: vec![tag],
        }
    }

    #[test]
    fn buffering_respects_capacity() {
        let mut buf = UndecryptableBuffer::new(2);
        assert!(buf.try_buffer(pkt(1)));
        assert!(buf.try_buffer(pkt(2)));
        assert!(!buf.try_buffer(pkt(3)));
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn take_all_empties_the_buffer_in_order() {
        let mut buf = UndecryptableBuffer::new(10);
        buf.try_buffer(pkt(1));
        buf.try_buffer(pkt(2));
        buf.try_buffer(pkt(3));

        let drained = buf.take_all();
        assert!(buf.is_empty());
        let tags: Vec<u8> = drained.iter().map(|p| p.datagram[0]).collect();
        assert_eq!(tags, vec![1, 2, 3]);
    }
}
