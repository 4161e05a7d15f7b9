// Copyright (c) the quic-connection-core authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! `spec.md` §3 `QueuedPacket`: serialized-and-encrypted packets awaiting
//! write because the writer was blocked, or emitted out of order. The
//! queue is strict FIFO; the head must be written before anything newer is
//! attempted, or packet-number ordering on the wire is violated
//! (`spec.md` §5).

#[cfg(feature = "std")]
use std::collections::VecDeque;

#[cfg(not(feature = "std"))]
use alloc::collections::VecDeque;

#[cfg(feature = "std")]
use std::vec::Vec;

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

/// One packet waiting to be handed to the writer.
#[derive(Debug, Clone)]
pub struct QueuedPacket {
    pub bytes: Vec<u8>,
}

/// The FIFO of packets serialized but not yet successfully written.
#[derive(Debug, Default)]
pub struct PendingQueue {
    queue: VecDeque<QueuedPacket>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Appends a newly-serialized packet to the back of the queue.
    pub fn push(&mut self, packet: QueuedPacket) {
        self.queue.push_back(packet);
    }

    /// Looks at (without removing) the next packet due to be written.
    pub fn front(&self) -> Option<&QueuedPacket> {
        self.queue.front()
    }

    /// Removes and returns the head of the queue, once the writer has
    /// accepted it.
    pub fn pop_front(&mut self) -> Option<QueuedPacket> {
        self.queue.pop_front()
    }

    /// Drops every currently-queued packet. `spec.md` §4.1 `close_with`:
    /// discards queued not-yet-sent packets when sending a close.
    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_fifo_order() {
        let mut queue = PendingQueue::new();
        queue.push(QueuedPacket { bytes: vec![1] });
        queue.push(QueuedPacket { bytes: vec![2] });
        assert_eq!(queue.pop_front().unwrap().bytes, vec![1]);
        assert_eq!(queue.pop_front().unwrap().bytes, vec![2]);
        assert!(queue.pop_front().is_none());
    }

    #[test]
    fn clear_discards_everything() {
        let mut queue = PendingQueue::new();
        queue.push(QueuedPacket { bytes: vec![1] });
        queue.push(QueuedPacket { bytes: vec![2] });
        queue.clear();
        assert!(queue.is_empty());
    }
}
