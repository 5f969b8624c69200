/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Message store trait definition.

use async_trait::async_trait;
use bytes::Bytes;
use fixline_core::error::StoreError;
use fixline_core::types::{Direction, SessionId};

/// Next sequence numbers of a session, persisted between connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceSnapshot {
    /// Next sequence number we will send.
    pub next_sender_seq: u64,
    /// Next sequence number we expect to receive.
    pub next_target_seq: u64,
}

impl Default for SequenceSnapshot {
    fn default() -> Self {
        Self {
            next_sender_seq: 1,
            next_target_seq: 1,
        }
    }
}

/// Abstract interface for FIX message storage.
///
/// Outbound messages are appended before they are written to the socket so
/// that they can be retransmitted on a ResendRequest. Appends for one
/// session come only from that session's connection.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Records the wire bytes of a message.
    ///
    /// # Errors
    /// Returns `StoreError::Duplicate` if the sequence number is already
    /// recorded for the session and direction, or `StoreError::StoreFailed`
    /// if the message could not be written.
    async fn append(
        &self,
        session: &SessionId,
        direction: Direction,
        seq_num: u64,
        raw: Bytes,
    ) -> Result<(), StoreError>;

    /// Returns the recorded messages with `begin <= seq <= end`, ascending.
    ///
    /// An `end` of 0 means no upper bound. Sequence numbers with nothing
    /// recorded are simply absent from the result.
    ///
    /// # Errors
    /// Returns `StoreError` if the log cannot be read.
    async fn range_lookup(
        &self,
        session: &SessionId,
        direction: Direction,
        begin: u64,
        end: u64,
    ) -> Result<Vec<(u64, Bytes)>, StoreError>;

    /// Loads the persisted sequence numbers, if the session has any.
    ///
    /// # Errors
    /// Returns `StoreError` if the snapshot cannot be read.
    async fn load_sequences(
        &self,
        session: &SessionId,
    ) -> Result<Option<SequenceSnapshot>, StoreError>;

    /// Persists the sequence numbers of a session.
    ///
    /// # Errors
    /// Returns `StoreError` if the snapshot cannot be written.
    async fn save_sequences(
        &self,
        session: &SessionId,
        snapshot: SequenceSnapshot,
    ) -> Result<(), StoreError>;

    /// Drops every message and the sequence snapshot of a session.
    ///
    /// # Errors
    /// Returns `StoreError` if the reset fails.
    async fn reset(&self, session: &SessionId) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_snapshot_default_starts_at_one() {
        let snapshot = SequenceSnapshot::default();
        assert_eq!(snapshot.next_sender_seq, 1);
        assert_eq!(snapshot.next_target_seq, 1);
    }
}
