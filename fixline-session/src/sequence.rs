/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Sequence number management.
//!
//! Counters are atomics: the inbound counter is only moved by the owning
//! connection's read loop and the outbound counter only under its write lock.

use fixline_core::types::SeqNum;
use std::sync::atomic::{AtomicU64, Ordering};

/// What to do with a message whose MsgSeqNum is below the expected value
/// and which is not flagged PossDup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TooLowAction {
    /// Log and drop the message.
    Ignore,
    /// Send a Logout naming the expected value and disconnect.
    #[default]
    Disconnect,
}

/// Thresholds for out-of-sequence handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequencePolicy {
    /// Handling of too-low sequence numbers.
    pub too_low: TooLowAction,
    /// Maximum number of messages held while waiting for a resend to fill
    /// a gap. Exceeding it ends the session.
    pub max_buffered_messages: usize,
}

impl Default for SequencePolicy {
    fn default() -> Self {
        Self {
            too_low: TooLowAction::Disconnect,
            max_buffered_messages: 10_000,
        }
    }
}

impl SequencePolicy {
    /// Sets the too-low action.
    #[must_use]
    pub const fn with_too_low(mut self, action: TooLowAction) -> Self {
        self.too_low = action;
        self
    }

    /// Sets the gap buffer limit.
    #[must_use]
    pub const fn with_max_buffered_messages(mut self, limit: usize) -> Self {
        self.max_buffered_messages = limit;
        self
    }
}

/// Manages sequence numbers for a FIX session.
#[derive(Debug)]
pub struct SequenceManager {
    next_sender_seq: AtomicU64,
    next_target_seq: AtomicU64,
}

impl SequenceManager {
    /// Creates a new sequence manager with sequence numbers starting at 1.
    #[must_use]
    pub fn new() -> Self {
        Self::with_initial(1, 1)
    }

    /// Creates a new sequence manager with specified starting values.
    #[must_use]
    pub fn with_initial(sender_seq: u64, target_seq: u64) -> Self {
        Self {
            next_sender_seq: AtomicU64::new(sender_seq),
            next_target_seq: AtomicU64::new(target_seq),
        }
    }

    /// Returns the next sender sequence number without incrementing.
    #[inline]
    #[must_use]
    pub fn next_sender_seq(&self) -> SeqNum {
        SeqNum::new(self.next_sender_seq.load(Ordering::SeqCst))
    }

    /// Returns the next expected inbound sequence number.
    #[inline]
    #[must_use]
    pub fn next_target_seq(&self) -> SeqNum {
        SeqNum::new(self.next_target_seq.load(Ordering::SeqCst))
    }

    /// Commits the sender sequence number returned by
    /// [`next_sender_seq`](Self::next_sender_seq).
    ///
    /// Only valid while holding the connection's write lock.
    #[inline]
    pub fn increment_sender_seq(&self) {
        self.next_sender_seq.fetch_add(1, Ordering::SeqCst);
    }

    /// Advances the expected inbound sequence number by one.
    #[inline]
    pub fn increment_target_seq(&self) {
        self.next_target_seq.fetch_add(1, Ordering::SeqCst);
    }

    /// Sets the next sender sequence number.
    #[inline]
    pub fn set_sender_seq(&self, seq: u64) {
        self.next_sender_seq.store(seq, Ordering::SeqCst);
    }

    /// Sets the next expected inbound sequence number.
    #[inline]
    pub fn set_target_seq(&self, seq: u64) {
        self.next_target_seq.store(seq, Ordering::SeqCst);
    }

    /// Resets both sequence numbers to 1.
    #[inline]
    pub fn reset(&self) {
        self.set_sender_seq(1);
        self.set_target_seq(1);
    }

    /// Compares an inbound sequence number with the expected one.
    #[must_use]
    pub fn validate_incoming(&self, received: u64) -> SequenceResult {
        let expected = self.next_target_seq.load(Ordering::SeqCst);

        if received == expected {
            SequenceResult::Ok
        } else if received < expected {
            SequenceResult::TooLow { expected, received }
        } else {
            SequenceResult::Gap { expected, received }
        }
    }
}

impl Default for SequenceManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of sequence number validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceResult {
    /// Sequence number is as expected.
    Ok,
    /// Sequence number is lower than expected (possible duplicate).
    TooLow {
        /// Expected sequence number.
        expected: u64,
        /// Received sequence number.
        received: u64,
    },
    /// Sequence number is higher than expected (gap detected).
    Gap {
        /// Expected sequence number.
        expected: u64,
        /// Received sequence number.
        received: u64,
    },
}

impl SequenceResult {
    /// Returns true if the sequence is valid.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Returns true if there's a gap.
    #[must_use]
    pub const fn is_gap(&self) -> bool {
        matches!(self, Self::Gap { .. })
    }

    /// Returns true if the sequence is too low.
    #[must_use]
    pub const fn is_too_low(&self) -> bool {
        matches!(self, Self::TooLow { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_manager_new() {
        let mgr = SequenceManager::new();
        assert_eq!(mgr.next_sender_seq().value(), 1);
        assert_eq!(mgr.next_target_seq().value(), 1);
    }

    #[test]
    fn test_sender_seq_peek_then_commit() {
        let mgr = SequenceManager::new();

        assert_eq!(mgr.next_sender_seq().value(), 1);
        assert_eq!(mgr.next_sender_seq().value(), 1);
        mgr.increment_sender_seq();
        assert_eq!(mgr.next_sender_seq().value(), 2);
    }

    #[test]
    fn test_validate_incoming() {
        let mgr = SequenceManager::new();
        assert!(mgr.validate_incoming(1).is_ok());

        mgr.set_target_seq(5);
        assert_eq!(
            mgr.validate_incoming(4),
            SequenceResult::TooLow {
                expected: 5,
                received: 4
            }
        );
        assert!(mgr.validate_incoming(5).is_ok());
        assert!(mgr.validate_incoming(10).is_gap());
    }

    #[test]
    fn test_reset() {
        let mgr = SequenceManager::with_initial(100, 200);
        mgr.increment_target_seq();
        assert_eq!(mgr.next_target_seq().value(), 201);

        mgr.reset();
        assert_eq!(mgr.next_sender_seq().value(), 1);
        assert_eq!(mgr.next_target_seq().value(), 1);
    }

    #[test]
    fn test_sequence_policy_builders() {
        let policy = SequencePolicy::default()
            .with_too_low(TooLowAction::Ignore)
            .with_max_buffered_messages(8);
        assert_eq!(policy.too_low, TooLowAction::Ignore);
        assert_eq!(policy.max_buffered_messages, 8);
    }
}
