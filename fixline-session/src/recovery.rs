/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Gap recovery buffer.
//!
//! Messages that arrive ahead of the expected sequence number are held
//! here, keyed by MsgSeqNum, until the resent messages fill the gap.

use fixline_core::error::SessionError;
use fixline_core::message::Message;
use std::collections::BTreeMap;

/// A buffered out-of-order entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pending {
    /// Waiting to be processed once the gap closes.
    Message(Message),
    /// Already acted upon when it arrived; only occupies its sequence number.
    Consumed,
}

/// Buffers out-of-order inbound messages and tracks the outstanding
/// ResendRequest.
#[derive(Debug)]
pub struct GapRecovery {
    buffer: BTreeMap<u64, Pending>,
    limit: usize,
    requested: Option<(u64, u64)>,
}

impl GapRecovery {
    /// Creates an empty buffer holding at most `limit` messages.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            buffer: BTreeMap::new(),
            limit,
            requested: None,
        }
    }

    /// Holds a message received ahead of sequence.
    ///
    /// A second copy of an already buffered sequence number is dropped.
    ///
    /// # Errors
    /// Returns `SessionError::RecoveryOverflow` if the buffer is full.
    pub fn buffer(&mut self, seq: u64, pending: Pending) -> Result<(), SessionError> {
        if self.buffer.contains_key(&seq) {
            return Ok(());
        }
        if self.buffer.len() >= self.limit {
            return Err(SessionError::RecoveryOverflow {
                buffered: self.buffer.len(),
                limit: self.limit,
            });
        }
        self.buffer.insert(seq, pending);
        Ok(())
    }

    /// Removes the entry for `expected`, if it is buffered.
    pub fn pop(&mut self, expected: u64) -> Option<Pending> {
        let pending = self.buffer.remove(&expected)?;
        if self.requested.is_some_and(|(_, end)| expected >= end) {
            self.requested = None;
        }
        Some(pending)
    }

    /// Drops entries made obsolete by a jump of the expected number.
    pub fn discard_below(&mut self, expected: u64) {
        self.buffer = self.buffer.split_off(&expected);
        if self.requested.is_some_and(|(_, end)| expected > end) {
            self.requested = None;
        }
    }

    /// Returns the range a new ResendRequest should cover, if one is needed.
    ///
    /// A request is needed when messages are buffered beyond `expected` and
    /// no outstanding request already covers `expected`. The returned range
    /// is recorded as outstanding.
    pub fn next_request(&mut self, expected: u64) -> Option<(u64, u64)> {
        let lowest = *self.buffer.keys().next()?;
        if lowest <= expected {
            return None;
        }
        if self
            .requested
            .is_some_and(|(begin, end)| begin <= expected && expected <= end)
        {
            return None;
        }
        let range = (expected, lowest - 1);
        self.requested = Some(range);
        Some(range)
    }

    /// Returns the outstanding ResendRequest range.
    #[must_use]
    pub const fn outstanding_request(&self) -> Option<(u64, u64)> {
        self.requested
    }

    /// Returns true while a gap is open.
    #[must_use]
    pub fn is_recovering(&self) -> bool {
        !self.buffer.is_empty() || self.requested.is_some()
    }

    /// Number of buffered entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Forgets all buffered messages and the outstanding request.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.requested = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixline_core::message::MsgType;

    fn msg(seq: u64) -> Pending {
        Pending::Message(Message::new(MsgType::NewOrderSingle).with_field(34, seq.to_string()))
    }

    #[test]
    fn test_single_request_per_gap() {
        let mut recovery = GapRecovery::new(16);
        recovery.buffer(5, msg(5)).unwrap();
        assert_eq!(recovery.next_request(2), Some((2, 4)));

        recovery.buffer(6, msg(6)).unwrap();
        assert_eq!(recovery.next_request(2), None);
        assert_eq!(recovery.outstanding_request(), Some((2, 4)));
    }

    #[test]
    fn test_pop_in_order_and_new_hole() {
        let mut recovery = GapRecovery::new(16);
        recovery.buffer(5, msg(5)).unwrap();
        recovery.buffer(8, Pending::Consumed).unwrap();
        assert_eq!(recovery.next_request(2), Some((2, 4)));

        assert!(recovery.pop(4).is_none());
        assert_eq!(recovery.pop(5), Some(msg(5)));
        assert!(recovery.pop(6).is_none());

        // 6 and 7 are still missing
        assert_eq!(recovery.next_request(6), Some((6, 7)));
        assert_eq!(recovery.pop(8), Some(Pending::Consumed));
        assert!(recovery.is_empty());
    }

    #[test]
    fn test_overflow_is_an_error() {
        let mut recovery = GapRecovery::new(2);
        recovery.buffer(3, msg(3)).unwrap();
        recovery.buffer(4, msg(4)).unwrap();
        recovery.buffer(4, msg(4)).unwrap();

        let err = recovery.buffer(5, msg(5)).unwrap_err();
        assert_eq!(
            err,
            SessionError::RecoveryOverflow {
                buffered: 2,
                limit: 2
            }
        );
    }

    #[test]
    fn test_discard_below() {
        let mut recovery = GapRecovery::new(16);
        recovery.buffer(3, msg(3)).unwrap();
        recovery.buffer(9, msg(9)).unwrap();
        recovery.next_request(2);

        recovery.discard_below(5);
        assert_eq!(recovery.len(), 1);
        assert_eq!(recovery.outstanding_request(), None);

        recovery.clear();
        assert!(!recovery.is_recovering());
    }
}
