// Copyright (c) the quic-connection-core authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The scoped packet flusher of `spec.md` §4.1.2/§5: a stack-scoped,
//! guaranteed-release wrapper around anything that might produce outgoing
//! packets. Nested flushers coalesce — only the outermost performs the
//! release work — so multiple frame-producing calls bundle into the
//! minimum number of packets.

use core::cell::Cell;

/// When the flusher should emit an ACK on construction, if the received
/// manager currently has ack content pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckMode {
    /// Always send an ack immediately on entry, if one is pending.
    Always,
    /// Only if an ack was already queued (`ack_queued` is set).
    IfQueued,
    /// Only if the received manager reports any pending (unsent) ack
    /// state at all, queued or not.
    IfPending,
    /// Never send on entry; rely entirely on the release-time flush.
    None,
}

/// Re-entrancy bookkeeping shared by every `FlusherGuard` nested in the
/// same call stack, owned by the `QuicConnection`. Uses a `Cell` so guards
/// can nest without holding conflicting exclusive borrows of the
/// controller; this crate is single-threaded cooperative (`spec.md` §5),
/// so no synchronization beyond interior mutability is needed.
#[derive(Debug, Default)]
pub struct FlusherState {
    depth: Cell<u32>,
    /// Set by an inner flusher (or the controller) to request the
    /// retransmission alarm be armed once the outermost flusher releases.
    retransmission_alarm_deferred: Cell<bool>,
}

impl FlusherState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_flushing(&self) -> bool {
        self.depth.get() > 0
    }

    pub fn defer_retransmission_alarm(&self) {
        self.retransmission_alarm_deferred.set(true);
    }

    /// Clears and returns whether a retransmission-alarm rearm was
    /// deferred by any guard in the just-released nest.
    pub fn take_retransmission_alarm_deferred(&self) -> bool {
        self.retransmission_alarm_deferred.replace(false)
    }

    /// Plain `Cell`-bump equivalent of entering a `FlusherGuard` scope,
    /// for callers that need to keep mutating other fields of the owning
    /// struct for the duration of the scope (a live `&'a FlusherState`
    /// borrow would conflict with that). Returns whether this is the
    /// outermost entry in the current nest.
    pub fn enter(&self) -> bool {
        let is_outermost = !self.is_flushing();
        self.depth.set(self.depth.get() + 1);
        is_outermost
    }

    /// Counterpart to [`Self::enter`]. Returns whether this exit brought
    /// the nest back down to zero.
    pub fn exit(&self) -> bool {
        debug_assert!(self.depth.get() > 0);
        self.depth.set(self.depth.get() - 1);
        self.depth.get() == 0
    }
}

/// A guard marking one flusher scope active. Construct at the top of any
/// method that may produce outgoing packets. Only [`FlusherGuard::is_outermost`]
/// returns `true` for the guard whose `Drop` corresponds to the outermost
/// call in the current nest; the caller checks this at the point the guard
/// goes out of scope to decide whether to run the release-time flush/
/// rearm side effects (`spec.md` §4.1.2: "only the outermost performs
/// flush/arm").
pub struct FlusherGuard<'a> {
    state: &'a FlusherState,
    is_outermost: bool,
    ack_mode: AckMode,
}

impl<'a> FlusherGuard<'a> {
    pub fn new(state: &'a FlusherState, ack_mode: AckMode) -> Self {
        let is_outermost = state.enter();
        Self {
            state,
            is_outermost,
            ack_mode,
        }
    }

    pub fn is_outermost(&self) -> bool {
        self.is_outermost
    }

    pub fn ack_mode(&self) -> AckMode {
        self.ack_mode
    }

    pub fn defer_retransmission_alarm(&self) {
        self.state.defer_retransmission_alarm();
    }
}

impl Drop for FlusherGuard<'_> {
    fn drop(&mut self) {
        self.state.exit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_outermost_guard_is_outermost() {
        let state = FlusherState::new();
        let outer = FlusherGuard::new(&state, AckMode::Always);
        assert!(outer.is_outermost());

        let inner = FlusherGuard::new(&state, AckMode::None);
        assert!(!inner.is_outermost());
        drop(inner);
        drop(outer);
    }

    #[test]
    fn depth_returns_to_zero_after_nested_drops() {
        let state = FlusherState::new();
        {
            let _outer = FlusherGuard::new(&state, AckMode::Always);
            {
                let _inner = FlusherGuard::new(&state, AckMode::None);
                assert!(state.is_flushing());
            }
            assert!(state.is_flushing());
        }
        assert!(!state.is_flushing());
    }

    #[test]
    fn deferred_retransmission_alarm_is_visible_after_release() {
        let state = FlusherState::new();
        let outer = FlusherGuard::new(&state, AckMode::None);
        outer.defer_retransmission_alarm();
        drop(outer);
        assert!(state.take_retransmission_alarm_deferred());
        assert!(!state.take_retransmission_alarm_deferred());
    }
}
