/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Builders for session-level (administrative) messages.
//!
//! The standard header (49, 56, 34, 52) is stamped when the message is sent.

use fixline_core::error::DecodeError;
use fixline_core::message::{Message, MsgType};
use fixline_core::tags;

/// SessionRejectReason (373) codes used by the engine.
pub mod reject_code {
    /// Invalid tag number.
    pub const INVALID_TAG_NUMBER: u32 = 0;
    /// Required tag missing.
    pub const REQUIRED_TAG_MISSING: u32 = 1;
    /// Value is incorrect (out of range) for this tag.
    pub const VALUE_IS_INCORRECT: u32 = 5;
    /// Incorrect data format for value.
    pub const INCORRECT_DATA_FORMAT: u32 = 6;
    /// CompID problem.
    pub const COMP_ID_PROBLEM: u32 = 9;
    /// Invalid MsgType.
    pub const INVALID_MSG_TYPE: u32 = 11;
    /// Other.
    pub const OTHER: u32 = 99;
}

/// Reason for a session-level Reject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectReason {
    /// SessionRejectReason code.
    pub code: u32,
    /// Human-readable rejection text.
    pub text: String,
    /// Tag that caused the rejection.
    pub ref_tag: Option<u32>,
    /// Type of the rejected message.
    pub ref_msg_type: Option<MsgType>,
}

impl RejectReason {
    /// Creates a new rejection reason.
    #[must_use]
    pub fn new(code: u32, text: impl Into<String>) -> Self {
        Self {
            code,
            text: text.into(),
            ref_tag: None,
            ref_msg_type: None,
        }
    }

    /// Sets the reference tag.
    #[must_use]
    pub const fn with_ref_tag(mut self, tag: u32) -> Self {
        self.ref_tag = Some(tag);
        self
    }

    /// Sets the type of the rejected message.
    #[must_use]
    pub fn with_ref_msg_type(mut self, msg_type: MsgType) -> Self {
        self.ref_msg_type = Some(msg_type);
        self
    }
}

impl From<&DecodeError> for RejectReason {
    fn from(err: &DecodeError) -> Self {
        let code = match err {
            DecodeError::MissingRequiredField { .. } | DecodeError::MissingMsgType => {
                reject_code::REQUIRED_TAG_MISSING
            }
            DecodeError::InvalidTag(_) => reject_code::INVALID_TAG_NUMBER,
            DecodeError::InvalidFieldValue { tag, .. }
                if *tag == tags::SENDER_COMP_ID || *tag == tags::TARGET_COMP_ID =>
            {
                reject_code::COMP_ID_PROBLEM
            }
            DecodeError::InvalidFieldValue { .. } => reject_code::VALUE_IS_INCORRECT,
            DecodeError::InvalidUtf8(_) => reject_code::INCORRECT_DATA_FORMAT,
            _ => reject_code::OTHER,
        };
        let reason = Self::new(code, err.to_string());
        match err.ref_tag() {
            Some(tag) => reason.with_ref_tag(tag),
            None => reason,
        }
    }
}

/// Builds a Logon.
#[must_use]
pub fn logon(heartbeat_secs: u64, reset_seq_num: bool) -> Message {
    let mut msg = Message::new(MsgType::Logon);
    msg.set_field(tags::ENCRYPT_METHOD, "0")
        .set_field(tags::HEART_BT_INT, heartbeat_secs.to_string());
    if reset_seq_num {
        msg.set_field(tags::RESET_SEQ_NUM_FLAG, "Y");
    }
    msg
}

/// Builds a Heartbeat, echoing a TestReqID when answering a TestRequest.
#[must_use]
pub fn heartbeat(test_req_id: Option<&str>) -> Message {
    let mut msg = Message::new(MsgType::Heartbeat);
    if let Some(id) = test_req_id {
        msg.set_field(tags::TEST_REQ_ID, id);
    }
    msg
}

/// Builds a TestRequest.
#[must_use]
pub fn test_request(test_req_id: &str) -> Message {
    Message::new(MsgType::TestRequest).with_field(tags::TEST_REQ_ID, test_req_id)
}

/// Builds a ResendRequest for `[begin, end]`; an `end` of 0 means "to the latest".
#[must_use]
pub fn resend_request(begin: u64, end: u64) -> Message {
    Message::new(MsgType::ResendRequest)
        .with_field(tags::BEGIN_SEQ_NO, begin.to_string())
        .with_field(tags::END_SEQ_NO, end.to_string())
}

/// Builds a SequenceReset, in GapFill mode when `gap_fill` is set.
#[must_use]
pub fn sequence_reset(new_seq_no: u64, gap_fill: bool) -> Message {
    let mut msg = Message::new(MsgType::SequenceReset);
    if gap_fill {
        msg.set_field(tags::GAP_FILL_FLAG, "Y");
    }
    msg.set_field(tags::NEW_SEQ_NO, new_seq_no.to_string());
    msg
}

/// Builds a Logout with optional text.
#[must_use]
pub fn logout(text: Option<&str>) -> Message {
    let mut msg = Message::new(MsgType::Logout);
    if let Some(text) = text {
        msg.set_field(tags::TEXT, text);
    }
    msg
}

/// Builds a session-level Reject for the message with `ref_seq_num`.
#[must_use]
pub fn reject(ref_seq_num: u64, reason: &RejectReason) -> Message {
    let mut msg = Message::new(MsgType::Reject);
    msg.set_field(tags::REF_SEQ_NUM, ref_seq_num.to_string());
    if let Some(tag) = reason.ref_tag {
        msg.set_field(tags::REF_TAG_ID, tag.to_string());
    }
    if let Some(msg_type) = &reason.ref_msg_type {
        msg.set_field(tags::REF_MSG_TYPE, msg_type.as_str());
    }
    msg.set_field(tags::SESSION_REJECT_REASON, reason.code.to_string());
    if !reason.text.is_empty() {
        msg.set_field(tags::TEXT, reason.text.as_str());
    }
    msg
}

/// Prepares a stored message for retransmission.
///
/// Sets PossDupFlag, moves the original SendingTime into OrigSendingTime and
/// stamps a fresh SendingTime. MsgSeqNum is left untouched.
#[must_use]
pub fn as_retransmission(mut msg: Message) -> Message {
    if let Some(original) = msg.remove_field(tags::SENDING_TIME) {
        msg.set_field(tags::ORIG_SENDING_TIME, original);
    }
    msg.set_field(tags::POSS_DUP_FLAG, "Y");
    msg.stamp_sending_time();
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logon_builder() {
        let msg = logon(30, false);
        assert_eq!(msg.msg_type(), &MsgType::Logon);
        assert_eq!(msg.field(tags::HEART_BT_INT), Some("30"));
        assert_eq!(msg.field(tags::ENCRYPT_METHOD), Some("0"));
        assert!(!msg.has_field(tags::RESET_SEQ_NUM_FLAG));

        assert!(logon(30, true).flag(tags::RESET_SEQ_NUM_FLAG).unwrap());
    }

    #[test]
    fn test_heartbeat_echoes_test_req_id() {
        assert!(!heartbeat(None).has_field(tags::TEST_REQ_ID));
        assert_eq!(heartbeat(Some("T1")).field(tags::TEST_REQ_ID), Some("T1"));
        assert_eq!(test_request("T2").field(tags::TEST_REQ_ID), Some("T2"));
    }

    #[test]
    fn test_resend_and_sequence_reset() {
        let msg = resend_request(2, 4);
        assert_eq!(msg.field_as::<u64>(tags::BEGIN_SEQ_NO).unwrap(), 2);
        assert_eq!(msg.field_as::<u64>(tags::END_SEQ_NO).unwrap(), 4);

        let gap_fill = sequence_reset(10, true);
        assert!(gap_fill.flag(tags::GAP_FILL_FLAG).unwrap());
        assert_eq!(gap_fill.field(tags::NEW_SEQ_NO), Some("10"));
        assert!(!sequence_reset(10, false).flag(tags::GAP_FILL_FLAG).unwrap());
    }

    #[test]
    fn test_reject_from_decode_error() {
        let reason = RejectReason::from(&DecodeError::MissingRequiredField { tag: 49 })
            .with_ref_msg_type(MsgType::NewOrderSingle);
        let msg = reject(7, &reason);

        assert_eq!(msg.field(tags::REF_SEQ_NUM), Some("7"));
        assert_eq!(msg.field(tags::REF_TAG_ID), Some("49"));
        assert_eq!(msg.field(tags::REF_MSG_TYPE), Some("D"));
        assert_eq!(msg.field(tags::SESSION_REJECT_REASON), Some("1"));
        assert!(msg.has_field(tags::TEXT));
    }

    #[test]
    fn test_comp_id_problem_code() {
        let reason = RejectReason::from(&DecodeError::InvalidFieldValue {
            tag: tags::TARGET_COMP_ID,
            reason: "unexpected".to_string(),
        });
        assert_eq!(reason.code, reject_code::COMP_ID_PROBLEM);
        assert_eq!(reason.ref_tag, Some(56));
    }

    #[test]
    fn test_as_retransmission() {
        let stored = Message::new(MsgType::ExecutionReport)
            .with_field(tags::MSG_SEQ_NUM, "3")
            .with_field(tags::SENDING_TIME, "20240101-10:00:00.000");
        let resent = as_retransmission(stored);

        assert!(resent.is_poss_dup());
        assert_eq!(resent.field(tags::MSG_SEQ_NUM), Some("3"));
        assert_eq!(
            resent.field(tags::ORIG_SENDING_TIME),
            Some("20240101-10:00:00.000")
        );
        assert_ne!(resent.field(tags::SENDING_TIME), Some("20240101-10:00:00.000"));
    }

    #[test]
    fn test_logout_text() {
        assert_eq!(logout(Some("bye")).field(tags::TEXT), Some("bye"));
        assert!(!logout(None).has_field(tags::TEXT));
    }
}
