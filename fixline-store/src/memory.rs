/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! In-memory message store implementation.
//!
//! Not persistent: all data is lost when the process exits.

use crate::traits::{MessageStore, SequenceSnapshot};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use fixline_core::error::StoreError;
use fixline_core::types::{Direction, SessionId};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug)]
struct SessionLog {
    inbound: BTreeMap<u64, Bytes>,
    outbound: BTreeMap<u64, Bytes>,
    sequences: Option<SequenceSnapshot>,
    created_at: DateTime<Utc>,
}

impl SessionLog {
    fn new() -> Self {
        Self {
            inbound: BTreeMap::new(),
            outbound: BTreeMap::new(),
            sequences: None,
            created_at: Utc::now(),
        }
    }

    fn messages(&self, direction: Direction) -> &BTreeMap<u64, Bytes> {
        match direction {
            Direction::Inbound => &self.inbound,
            Direction::Outbound => &self.outbound,
        }
    }

    fn messages_mut(&mut self, direction: Direction) -> &mut BTreeMap<u64, Bytes> {
        match direction {
            Direction::Inbound => &mut self.inbound,
            Direction::Outbound => &mut self.outbound,
        }
    }
}

/// In-memory message store.
///
/// Messages are kept per session and direction in a `BTreeMap` so range
/// lookups come back in ascending order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<SessionId, SessionLog>>,
}

impl MemoryStore {
    /// Creates a new empty memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored messages for a session and direction.
    #[must_use]
    pub fn message_count(&self, session: &SessionId, direction: Direction) -> usize {
        self.sessions
            .read()
            .get(session)
            .map_or(0, |log| log.messages(direction).len())
    }

    /// Checks whether a message is recorded.
    #[must_use]
    pub fn contains(&self, session: &SessionId, direction: Direction, seq_num: u64) -> bool {
        self.sessions
            .read()
            .get(session)
            .is_some_and(|log| log.messages(direction).contains_key(&seq_num))
    }

    /// Returns when the session's log was created, if it exists.
    #[must_use]
    pub fn creation_time(&self, session: &SessionId) -> Option<DateTime<Utc>> {
        self.sessions.read().get(session).map(|log| log.created_at)
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn append(
        &self,
        session: &SessionId,
        direction: Direction,
        seq_num: u64,
        raw: Bytes,
    ) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write();
        let messages = sessions
            .entry(session.clone())
            .or_insert_with(SessionLog::new)
            .messages_mut(direction);
        if messages.contains_key(&seq_num) {
            return Err(StoreError::Duplicate { seq_num });
        }
        messages.insert(seq_num, raw);
        Ok(())
    }

    async fn range_lookup(
        &self,
        session: &SessionId,
        direction: Direction,
        begin: u64,
        end: u64,
    ) -> Result<Vec<(u64, Bytes)>, StoreError> {
        let end = if end == 0 { u64::MAX } else { end };
        if begin > end {
            return Ok(Vec::new());
        }
        let sessions = self.sessions.read();
        Ok(sessions.get(session).map_or_else(Vec::new, |log| {
            log.messages(direction)
                .range(begin..=end)
                .map(|(seq, bytes)| (*seq, bytes.clone()))
                .collect()
        }))
    }

    async fn load_sequences(
        &self,
        session: &SessionId,
    ) -> Result<Option<SequenceSnapshot>, StoreError> {
        Ok(self
            .sessions
            .read()
            .get(session)
            .and_then(|log| log.sequences))
    }

    async fn save_sequences(
        &self,
        session: &SessionId,
        snapshot: SequenceSnapshot,
    ) -> Result<(), StoreError> {
        self.sessions
            .write()
            .entry(session.clone())
            .or_insert_with(SessionLog::new)
            .sequences = Some(snapshot);
        Ok(())
    }

    async fn reset(&self, session: &SessionId) -> Result<(), StoreError> {
        self.sessions.write().insert(session.clone(), SessionLog::new());
        Ok(())
    }
}
