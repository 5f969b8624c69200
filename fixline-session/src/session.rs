/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Logical FIX session: identity, sequence numbers, gap recovery and
//! heartbeat timing.
//!
//! The session performs no I/O. Inbound messages go through
//! [`Session::on_message`], which returns the actions the connection has to
//! carry out, in order.

use crate::admin::{self, RejectReason, reject_code};
use crate::config::SessionConfig;
use crate::heartbeat::{HeartbeatAction, HeartbeatManager};
use crate::recovery::{GapRecovery, Pending};
use crate::sequence::{SequenceManager, SequenceResult, TooLowAction};
use fixline_core::error::{DecodeError, SessionError};
use fixline_core::message::{Message, MsgType};
use fixline_core::tags;
use fixline_core::types::{SeqNum, SessionId, Timestamp};
use parking_lot::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Work produced by inbound sequence processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Run session-level handling and the inbound handlers for this message.
    Process(Message),
    /// Send this session-level message to the counterparty.
    Send(Message),
}

/// Terms taken from a counterparty's Logon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogonTerms {
    /// HeartBtInt (108).
    pub heartbeat_interval: Duration,
    /// Whether both sequence numbers restart at 1.
    pub reset_seq_num: bool,
}

impl LogonTerms {
    /// Reads the terms from a Logon, folding in the local reset setting.
    ///
    /// # Errors
    /// Returns `DecodeError` if HeartBtInt is missing or not a positive
    /// number, or ResetSeqNumFlag is not Y/N.
    pub fn from_logon(logon: &Message, config: &SessionConfig) -> Result<Self, DecodeError> {
        let secs: u64 = logon.field_as(tags::HEART_BT_INT)?;
        if secs == 0 {
            return Err(DecodeError::InvalidFieldValue {
                tag: tags::HEART_BT_INT,
                reason: "HeartBtInt must be positive".to_string(),
            });
        }
        Ok(Self {
            heartbeat_interval: Duration::from_secs(secs),
            reset_seq_num: logon.flag(tags::RESET_SEQ_NUM_FLAG)? || config.reset_on_logon,
        })
    }
}

/// Checks that MsgSeqNum, SenderCompID and TargetCompID are present and
/// returns the sequence number.
///
/// # Errors
/// Returns `DecodeError::MissingRequiredField` for an absent tag or
/// `DecodeError::InvalidFieldValue` for a non-numeric MsgSeqNum.
pub fn required_header(msg: &Message) -> Result<u64, DecodeError> {
    let seq = msg.seq_num()?.value();
    if seq == 0 {
        return Err(DecodeError::InvalidFieldValue {
            tag: tags::MSG_SEQ_NUM,
            reason: "MsgSeqNum must be positive".to_string(),
        });
    }
    msg.require(tags::SENDER_COMP_ID)?;
    msg.require(tags::TARGET_COMP_ID)?;
    Ok(seq)
}

/// State of one logical FIX session.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    config: SessionConfig,
    sequences: SequenceManager,
    heartbeat: Mutex<HeartbeatManager>,
    recovery: Mutex<GapRecovery>,
}

impl Session {
    /// Creates a session with both sequence numbers at 1.
    #[must_use]
    pub fn new(id: SessionId, config: SessionConfig) -> Self {
        Self::with_sequences(id, config, 1, 1)
    }

    /// Creates a session resuming from persisted sequence numbers.
    #[must_use]
    pub fn with_sequences(
        id: SessionId,
        config: SessionConfig,
        next_sender_seq: u64,
        next_target_seq: u64,
    ) -> Self {
        let heartbeat = HeartbeatManager::new(config.heartbeat_interval, config.test_request_grace);
        let recovery = GapRecovery::new(config.sequence_policy.max_buffered_messages);
        Self {
            id,
            config,
            sequences: SequenceManager::with_initial(next_sender_seq, next_target_seq),
            heartbeat: Mutex::new(heartbeat),
            recovery: Mutex::new(recovery),
        }
    }

    /// Returns the session identity (our CompID first).
    #[must_use]
    pub const fn id(&self) -> &SessionId {
        &self.id
    }

    /// Returns the session configuration.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Returns the sequence counters.
    #[must_use]
    pub const fn sequences(&self) -> &SequenceManager {
        &self.sequences
    }

    /// Next outbound sequence number.
    #[must_use]
    pub fn next_sender_seq(&self) -> SeqNum {
        self.sequences.next_sender_seq()
    }

    /// Next expected inbound sequence number.
    #[must_use]
    pub fn next_target_seq(&self) -> SeqNum {
        self.sequences.next_target_seq()
    }

    /// Returns true while a sequence gap is open.
    #[must_use]
    pub fn is_recovering(&self) -> bool {
        self.recovery.lock().is_recovering()
    }

    /// Current heartbeat interval.
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat.lock().interval()
    }

    /// Applies the heartbeat interval agreed at logon.
    pub fn set_heartbeat_interval(&self, interval: Duration) {
        self.heartbeat.lock().set_interval(interval);
    }

    /// Restarts both sequence numbers at 1 and drops any gap state.
    pub fn reset_sequences(&self) {
        info!(session = %self.id, "resetting sequence numbers");
        self.sequences.reset();
        self.recovery.lock().clear();
    }

    /// Validates the standard header of an inbound message for this session.
    ///
    /// # Errors
    /// Returns `DecodeError` if a required tag is missing or the CompIDs do
    /// not match the session identity.
    pub fn check_header(&self, msg: &Message) -> Result<u64, DecodeError> {
        let seq = required_header(msg)?;
        for (tag, expected) in [
            (tags::SENDER_COMP_ID, &self.id.target_comp_id),
            (tags::TARGET_COMP_ID, &self.id.sender_comp_id),
        ] {
            let received = msg.require(tag)?;
            if received != expected.as_str() {
                return Err(DecodeError::InvalidFieldValue {
                    tag,
                    reason: format!("expected {expected} but received {received}"),
                });
            }
        }
        Ok(seq)
    }

    /// Writes SenderCompID, TargetCompID, MsgSeqNum and SendingTime.
    pub fn stamp_header(&self, msg: &mut Message, seq: SeqNum) {
        msg.set_field(tags::SENDER_COMP_ID, self.id.sender_comp_id.as_str())
            .set_field(tags::TARGET_COMP_ID, self.id.target_comp_id.as_str())
            .set_field(tags::MSG_SEQ_NUM, seq.to_string())
            .set_field(tags::SENDING_TIME, Timestamp::now().format_millis().as_str());
    }

    /// Records an outbound write for heartbeat timing.
    pub fn on_message_sent(&self) {
        self.heartbeat.lock().on_message_sent();
    }

    /// Evaluates heartbeat timers.
    ///
    /// # Errors
    /// Returns `SessionError::HeartbeatTimeout` when a TestRequest went
    /// unanswered for a full interval.
    pub fn on_tick(&self) -> Result<Option<Message>, SessionError> {
        match self.heartbeat.lock().tick() {
            HeartbeatAction::Idle => Ok(None),
            HeartbeatAction::SendHeartbeat => Ok(Some(admin::heartbeat(None))),
            HeartbeatAction::SendTestRequest(id) => {
                debug!(session = %self.id, test_req_id = %id, "counterparty quiet, sending TestRequest");
                Ok(Some(admin::test_request(&id)))
            }
            HeartbeatAction::TimedOut { elapsed } => Err(SessionError::HeartbeatTimeout {
                elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    /// Runs sequence processing for an inbound message whose header has
    /// been checked.
    ///
    /// # Errors
    /// Returns a fatal `SessionError` when the message must end the session:
    /// a too-low MsgSeqNum under [`TooLowAction::Disconnect`] or a gap buffer
    /// overflow.
    pub fn on_message(&self, seq: u64, msg: Message) -> Result<Vec<SessionAction>, SessionError> {
        self.heartbeat.lock().on_message_received();

        let mut actions = Vec::new();

        if msg.msg_type() == &MsgType::SequenceReset && !msg.flag(tags::GAP_FILL_FLAG).unwrap_or(false)
        {
            self.apply_reset(seq, msg, &mut actions);
            return Ok(actions);
        }

        match self.sequences.validate_incoming(seq) {
            SequenceResult::Ok => {
                self.accept(seq, msg, &mut actions);
                self.drain(&mut actions);
            }
            SequenceResult::TooLow { expected, received } => {
                if msg.is_poss_dup() {
                    debug!(session = %self.id, seq = received, expected, "ignoring possible duplicate");
                } else {
                    match self.config.sequence_policy.too_low {
                        TooLowAction::Ignore => {
                            warn!(session = %self.id, seq = received, expected, "MsgSeqNum too low, ignoring");
                        }
                        TooLowAction::Disconnect => {
                            return Err(SessionError::SequenceTooLow { expected, received });
                        }
                    }
                }
            }
            SequenceResult::Gap { expected, received } => {
                warn!(session = %self.id, seq = received, expected, "sequence gap detected");
                let act_now = matches!(
                    msg.msg_type(),
                    MsgType::ResendRequest | MsgType::Logout | MsgType::Logon
                );
                let mut recovery = self.recovery.lock();
                if act_now {
                    recovery.buffer(received, Pending::Consumed)?;
                    actions.push(SessionAction::Process(msg));
                } else {
                    recovery.buffer(received, Pending::Message(msg))?;
                }
                if let Some((begin, end)) = recovery.next_request(expected) {
                    info!(session = %self.id, begin, end, "requesting resend");
                    actions.push(SessionAction::Send(admin::resend_request(begin, end)));
                }
            }
        }
        Ok(actions)
    }

    /// Accepts the message at the expected sequence number.
    fn accept(&self, seq: u64, msg: Message, actions: &mut Vec<SessionAction>) {
        if msg.msg_type() == &MsgType::SequenceReset {
            match msg.field_as::<u64>(tags::NEW_SEQ_NO) {
                Ok(new_seq) if new_seq > seq => {
                    debug!(session = %self.id, from = seq, to = new_seq, "gap fill");
                    self.sequences.set_target_seq(new_seq);
                    self.recovery.lock().discard_below(new_seq);
                }
                Ok(new_seq) => {
                    self.sequences.increment_target_seq();
                    actions.push(SessionAction::Send(Self::new_seq_no_reject(seq, &format!(
                        "NewSeqNo {new_seq} is not greater than MsgSeqNum {seq}"
                    ))));
                    return;
                }
                Err(err) => {
                    self.sequences.increment_target_seq();
                    actions.push(SessionAction::Send(Self::new_seq_no_reject(seq, &err.to_string())));
                    return;
                }
            }
        } else {
            self.sequences.increment_target_seq();
        }
        actions.push(SessionAction::Process(msg));
    }

    /// SequenceReset without GapFill: MsgSeqNum is ignored.
    fn apply_reset(&self, seq: u64, msg: Message, actions: &mut Vec<SessionAction>) {
        let expected = self.sequences.next_target_seq().value();
        match msg.field_as::<u64>(tags::NEW_SEQ_NO) {
            Ok(new_seq) if new_seq >= expected => {
                info!(session = %self.id, from = expected, to = new_seq, "sequence reset");
                self.sequences.set_target_seq(new_seq);
                self.recovery.lock().discard_below(new_seq);
                actions.push(SessionAction::Process(msg));
                self.drain(actions);
            }
            Ok(new_seq) => {
                warn!(session = %self.id, new_seq, expected, "SequenceReset would move backwards");
                actions.push(SessionAction::Send(Self::new_seq_no_reject(seq, &format!(
                    "NewSeqNo {new_seq} is lower than expected {expected}"
                ))));
            }
            Err(err) => {
                actions.push(SessionAction::Send(Self::new_seq_no_reject(seq, &err.to_string())));
            }
        }
    }

    /// Processes buffered messages that have become contiguous.
    fn drain(&self, actions: &mut Vec<SessionAction>) {
        loop {
            let expected = self.sequences.next_target_seq().value();
            let next = self.recovery.lock().pop(expected);
            match next {
                Some(Pending::Message(msg)) => self.accept(expected, msg, actions),
                Some(Pending::Consumed) => self.sequences.increment_target_seq(),
                None => break,
            }
        }

        let expected = self.sequences.next_target_seq().value();
        let mut recovery = self.recovery.lock();
        recovery.discard_below(expected);
        if let Some((begin, end)) = recovery.next_request(expected) {
            info!(session = %self.id, begin, end, "requesting resend for remaining gap");
            actions.push(SessionAction::Send(admin::resend_request(begin, end)));
        } else if recovery.is_empty() && recovery.outstanding_request().is_none() {
            debug!(session = %self.id, expected, "in sequence");
        }
    }

    fn new_seq_no_reject(seq: u64, text: &str) -> Message {
        let reason = RejectReason::new(reject_code::VALUE_IS_INCORRECT, text)
            .with_ref_tag(tags::NEW_SEQ_NO)
            .with_ref_msg_type(MsgType::SequenceReset);
        admin::reject(seq, &reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::SequencePolicy;
    use fixline_core::types::CompId;

    fn session_with(config: SessionConfig) -> Session {
        let id = SessionId::new(CompId::new("SERVER").unwrap(), CompId::new("CLIENT").unwrap());
        Session::new(id, config)
    }

    fn session() -> Session {
        session_with(SessionConfig::new(CompId::new("SERVER").unwrap(), "FIX.4.4"))
    }

    fn order(seq: u64) -> Message {
        Message::new(MsgType::NewOrderSingle)
            .with_field(tags::SENDER_COMP_ID, "CLIENT")
            .with_field(tags::TARGET_COMP_ID, "SERVER")
            .with_field(tags::MSG_SEQ_NUM, seq.to_string())
            .with_field(tags::CL_ORD_ID, format!("ORD{seq}"))
    }

    fn processed(actions: &[SessionAction]) -> Vec<u64> {
        actions
            .iter()
            .filter_map(|a| match a {
                SessionAction::Process(m) => Some(m.seq_num().unwrap().value()),
                SessionAction::Send(_) => None,
            })
            .collect()
    }

    fn sent(actions: &[SessionAction]) -> Vec<&Message> {
        actions
            .iter()
            .filter_map(|a| match a {
                SessionAction::Send(m) => Some(m),
                SessionAction::Process(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_consecutive_messages_advance_expected() {
        let session = session();
        for seq in 1..=5 {
            let actions = session.on_message(seq, order(seq)).unwrap();
            assert_eq!(processed(&actions), vec![seq]);
        }
        assert_eq!(session.next_target_seq().value(), 6);
        assert!(!session.is_recovering());
    }

    #[test]
    fn test_too_low_possdup_is_ignored() {
        let session = session();
        session.on_message(1, order(1)).unwrap();
        session.on_message(2, order(2)).unwrap();

        let dup = order(1).with_field(tags::POSS_DUP_FLAG, "Y");
        assert!(session.on_message(1, dup).unwrap().is_empty());
        assert_eq!(session.next_target_seq().value(), 3);
    }

    #[test]
    fn test_too_low_without_possdup_disconnects_by_default() {
        let session = session();
        session.on_message(1, order(1)).unwrap();
        session.on_message(2, order(2)).unwrap();

        let err = session.on_message(1, order(1)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "MsgSeqNum too low, expecting 3 but received 1"
        );
    }

    #[test]
    fn test_too_low_ignore_policy() {
        let config = SessionConfig::new(CompId::new("SERVER").unwrap(), "FIX.4.4")
            .with_sequence_policy(SequencePolicy::default().with_too_low(TooLowAction::Ignore));
        let session = session_with(config);
        session.on_message(1, order(1)).unwrap();

        assert!(session.on_message(1, order(1)).unwrap().is_empty());
        assert_eq!(session.next_target_seq().value(), 2);
    }

    #[test]
    fn test_gap_sends_one_resend_request_and_buffers() {
        let session = session();
        session.on_message(1, order(1)).unwrap();

        let actions = session.on_message(5, order(5)).unwrap();
        assert!(processed(&actions).is_empty());
        let requests = sent(&actions);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].msg_type(), &MsgType::ResendRequest);
        assert_eq!(requests[0].field(tags::BEGIN_SEQ_NO), Some("2"));
        assert_eq!(requests[0].field(tags::END_SEQ_NO), Some("4"));

        let actions = session.on_message(6, order(6)).unwrap();
        assert!(actions.is_empty());

        assert_eq!(processed(&session.on_message(2, order(2)).unwrap()), vec![2]);
        assert_eq!(processed(&session.on_message(3, order(3)).unwrap()), vec![3]);
        let actions = session.on_message(4, order(4)).unwrap();
        assert_eq!(processed(&actions), vec![4, 5, 6]);
        assert!(sent(&actions).is_empty());
        assert_eq!(session.next_target_seq().value(), 7);
        assert!(!session.is_recovering());
    }

    #[test]
    fn test_second_hole_gets_its_own_request() {
        let session = session();
        session.on_message(1, order(1)).unwrap();
        session.on_message(4, order(4)).unwrap();
        session.on_message(7, order(7)).unwrap();

        session.on_message(2, order(2)).unwrap();
        let actions = session.on_message(3, order(3)).unwrap();
        assert_eq!(processed(&actions), vec![3, 4]);
        let requests = sent(&actions);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].field(tags::BEGIN_SEQ_NO), Some("5"));
        assert_eq!(requests[0].field(tags::END_SEQ_NO), Some("6"));
    }

    #[test]
    fn test_gap_fill_closes_gap() {
        let session = session();
        session.on_message(1, order(1)).unwrap();
        session.on_message(5, order(5)).unwrap();

        let gap_fill = admin::sequence_reset(5, true)
            .with_field(tags::MSG_SEQ_NUM, "2")
            .with_field(tags::POSS_DUP_FLAG, "Y");
        let actions = session.on_message(2, gap_fill).unwrap();
        assert_eq!(processed(&actions), vec![2, 5]);
        assert_eq!(session.next_target_seq().value(), 6);
    }

    #[test]
    fn test_sequence_reset_mode_ignores_seq_num() {
        let session = session();
        session.on_message(1, order(1)).unwrap();

        let reset = admin::sequence_reset(10, false).with_field(tags::MSG_SEQ_NUM, "99");
        let actions = session.on_message(99, reset).unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(session.next_target_seq().value(), 10);

        let backwards = admin::sequence_reset(4, false).with_field(tags::MSG_SEQ_NUM, "10");
        let actions = session.on_message(10, backwards).unwrap();
        let rejects = sent(&actions);
        assert_eq!(rejects[0].msg_type(), &MsgType::Reject);
        assert_eq!(rejects[0].field(tags::REF_TAG_ID), Some("36"));
        assert_eq!(session.next_target_seq().value(), 10);
    }

    #[test]
    fn test_early_resend_request_acted_on_immediately() {
        let session = session();
        session.on_message(1, order(1)).unwrap();

        let resend = admin::resend_request(1, 0).with_field(tags::MSG_SEQ_NUM, "3");
        let actions = session.on_message(3, resend).unwrap();
        assert!(matches!(&actions[0], SessionAction::Process(m) if m.msg_type() == &MsgType::ResendRequest));
        assert_eq!(sent(&actions).len(), 1);

        let actions = session.on_message(2, order(2)).unwrap();
        assert_eq!(processed(&actions), vec![2]);
        assert_eq!(session.next_target_seq().value(), 4);
    }

    #[test]
    fn test_buffer_overflow_is_fatal() {
        let config = SessionConfig::new(CompId::new("SERVER").unwrap(), "FIX.4.4")
            .with_sequence_policy(SequencePolicy::default().with_max_buffered_messages(2));
        let session = session_with(config);

        session.on_message(3, order(3)).unwrap();
        session.on_message(4, order(4)).unwrap();
        assert!(matches!(
            session.on_message(5, order(5)),
            Err(SessionError::RecoveryOverflow { .. })
        ));
    }

    #[test]
    fn test_check_header() {
        let session = session();
        assert_eq!(session.check_header(&order(3)).unwrap(), 3);

        let wrong = order(3).with_field(tags::SENDER_COMP_ID, "OTHER");
        assert!(matches!(
            session.check_header(&wrong),
            Err(DecodeError::InvalidFieldValue { tag: 49, .. })
        ));

        let mut missing = order(3);
        missing.remove_field(tags::MSG_SEQ_NUM);
        assert_eq!(
            required_header(&missing).unwrap_err(),
            DecodeError::MissingRequiredField { tag: 34 }
        );
    }

    #[test]
    fn test_stamp_header() {
        let session = session();
        let mut msg = Message::new(MsgType::ExecutionReport);
        session.stamp_header(&mut msg, SeqNum::new(7));

        assert_eq!(msg.field(tags::SENDER_COMP_ID), Some("SERVER"));
        assert_eq!(msg.field(tags::TARGET_COMP_ID), Some("CLIENT"));
        assert_eq!(msg.field(tags::MSG_SEQ_NUM), Some("7"));
        assert!(msg.has_field(tags::SENDING_TIME));
    }

    #[test]
    fn test_logon_terms() {
        let config = SessionConfig::new(CompId::new("SERVER").unwrap(), "FIX.4.4");
        let terms = LogonTerms::from_logon(&admin::logon(20, true), &config).unwrap();
        assert_eq!(terms.heartbeat_interval, Duration::from_secs(20));
        assert!(terms.reset_seq_num);

        let terms = LogonTerms::from_logon(&admin::logon(20, false), &config.clone().with_reset_on_logon(true))
            .unwrap();
        assert!(terms.reset_seq_num);

        assert!(LogonTerms::from_logon(&admin::logon(0, false), &config).is_err());
    }

    #[test]
    fn test_reset_sequences() {
        let session = session();
        session.on_message(1, order(1)).unwrap();
        session.on_message(4, order(4)).unwrap();
        session.sequences().increment_sender_seq();

        session.reset_sequences();
        assert_eq!(session.next_sender_seq().value(), 1);
        assert_eq!(session.next_target_seq().value(), 1);
        assert!(!session.is_recovering());
    }
}
