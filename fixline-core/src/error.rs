/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Error types for the FixLine session engine.
//!
//! The taxonomy mirrors how failures are handled at runtime:
//! - [`DecodeError`]: malformed wire bytes, fatal to the session
//! - [`SessionError`]: sequence, validation and state errors
//! - [`HandlerError`]: application callback failures, isolated per handler
//! - [`StoreError`]: message store failures
//! - [`FixError::Io`]: transport failures, fatal to the connection

use std::ops::Range;
use thiserror::Error;

/// Result type alias using [`FixError`] as the error type.
pub type Result<T> = std::result::Result<T, FixError>;

/// Top-level error type for all FixLine operations.
#[derive(Debug, Error)]
pub enum FixError {
    /// Error during message decoding.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Error during message encoding.
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    /// Error in session layer operations.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Error in message store operations.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Error raised by an application handler.
    #[error("handler error: {0}")]
    Handler(#[from] HandlerError),

    /// I/O error from underlying transport.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl FixError {
    /// Returns true if the error ends the connection it occurred on.
    #[must_use]
    pub fn is_connection_fatal(&self) -> bool {
        match self {
            Self::Io(_) | Self::Decode(_) | Self::Store(_) => true,
            Self::Session(err) => err.is_fatal(),
            Self::Encode(_) | Self::Handler(_) => false,
        }
    }
}

/// Errors that occur during FIX message decoding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Message buffer is incomplete, need more data.
    #[error("incomplete message, need more data")]
    Incomplete,

    /// Invalid BeginString field (tag 8).
    #[error("invalid begin string: expected 8=FIX.x.y")]
    InvalidBeginString,

    /// Missing BodyLength field (tag 9).
    #[error("missing body length field (tag 9)")]
    MissingBodyLength,

    /// Invalid BodyLength value.
    #[error("invalid body length value")]
    InvalidBodyLength,

    /// Missing MsgType field (tag 35).
    #[error("missing msg type field (tag 35)")]
    MissingMsgType,

    /// Checksum mismatch between calculated and declared values.
    #[error("checksum mismatch: calculated {calculated}, declared {declared}")]
    ChecksumMismatch {
        /// Calculated checksum value.
        calculated: u8,
        /// Declared checksum value in message.
        declared: u8,
    },

    /// Invalid tag format (not a valid integer).
    #[error("invalid tag format: {0}")]
    InvalidTag(String),

    /// Missing required field.
    #[error("missing required field: tag {tag}")]
    MissingRequiredField {
        /// The tag number of the missing field.
        tag: u32,
    },

    /// Invalid field value for the expected type.
    #[error("invalid field value for tag {tag}: {reason}")]
    InvalidFieldValue {
        /// The tag number of the field.
        tag: u32,
        /// Description of why the value is invalid.
        reason: String,
    },

    /// Invalid UTF-8 in string field.
    #[error("invalid utf-8 in field: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}

impl DecodeError {
    /// Returns the tag the error refers to, if any.
    #[must_use]
    pub const fn ref_tag(&self) -> Option<u32> {
        match self {
            Self::MissingRequiredField { tag } | Self::InvalidFieldValue { tag, .. } => Some(*tag),
            Self::MissingMsgType => Some(35),
            Self::MissingBodyLength | Self::InvalidBodyLength => Some(9),
            Self::InvalidBeginString => Some(8),
            Self::ChecksumMismatch { .. } => Some(10),
            _ => None,
        }
    }
}

/// Errors that occur during FIX message encoding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// Missing required field during encoding.
    #[error("missing required field: tag {tag}")]
    MissingRequiredField {
        /// The tag number of the missing field.
        tag: u32,
    },

    /// Invalid field value for encoding.
    #[error("invalid field value for tag {tag}: {reason}")]
    InvalidFieldValue {
        /// The tag number of the field.
        tag: u32,
        /// Description of why the value is invalid.
        reason: String,
    },
}

/// Errors in FIX session layer operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Session is not in the correct state for the operation.
    #[error("invalid session state: expected {expected}, current {current}")]
    InvalidState {
        /// Expected state for the operation.
        expected: String,
        /// Current session state.
        current: String,
    },

    /// A state transition outside the connection lifecycle was requested.
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition {
        /// State the connection was in.
        from: String,
        /// Requested target state.
        to: String,
    },

    /// Logon was rejected during validation.
    #[error("logon rejected: {reason}")]
    LogonRejected {
        /// Reason for rejection.
        reason: String,
    },

    /// Heartbeat timeout - no response to TestRequest.
    #[error("heartbeat timeout after {elapsed_ms} milliseconds")]
    HeartbeatTimeout {
        /// Elapsed time in milliseconds since last message.
        elapsed_ms: u64,
    },

    /// Sequence number gap detected.
    #[error("sequence gap detected: expected {expected}, received {received}")]
    SequenceGap {
        /// Expected sequence number.
        expected: u64,
        /// Received sequence number.
        received: u64,
    },

    /// Sequence number too low without PossDup.
    #[error("MsgSeqNum too low, expecting {expected} but received {received}")]
    SequenceTooLow {
        /// Minimum expected sequence number.
        expected: u64,
        /// Received sequence number.
        received: u64,
    },

    /// Too many out-of-order messages buffered while waiting for a resend.
    #[error("recovery buffer overflow: {buffered} messages buffered, limit {limit}")]
    RecoveryOverflow {
        /// Number of buffered messages.
        buffered: usize,
        /// Configured limit.
        limit: usize,
    },

    /// Another connection is already bound to the session.
    #[error("session {session} is already bound to an active connection")]
    AlreadyBound {
        /// Session identifier.
        session: String,
    },

    /// Session configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Connection error.
    #[error("connection error: {0}")]
    Connection(String),
}

impl SessionError {
    /// Returns true if the error terminates the session.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::SequenceGap { .. } | Self::InvalidState { .. } | Self::Configuration(_)
        )
    }
}

/// Error raised by an application message handler or connection listener.
///
/// Handler errors are logged at the dispatch boundary and never terminate
/// the connection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// The handler failed with a description.
    #[error("{0}")]
    Failed(String),

    /// The handler could not interpret a field of the message.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// A send issued by the handler failed.
    #[error("send failed: {0}")]
    Send(String),
}

impl HandlerError {
    /// Creates a handler error from any displayable reason.
    #[must_use]
    pub fn failed(reason: impl std::fmt::Display) -> Self {
        Self::Failed(reason.to_string())
    }
}

impl From<FixError> for HandlerError {
    fn from(err: FixError) -> Self {
        Self::Send(err.to_string())
    }
}

/// Errors in message store operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Failed to store message.
    #[error("failed to store message seq={seq_num}: {reason}")]
    StoreFailed {
        /// Sequence number of the message.
        seq_num: u64,
        /// Reason for failure.
        reason: String,
    },

    /// Message already recorded for the sequence number.
    #[error("duplicate append for seq={seq_num}")]
    Duplicate {
        /// Sequence number of the message.
        seq_num: u64,
    },

    /// Range of messages not available.
    #[error("messages not available for range: {range:?}")]
    RangeNotAvailable {
        /// The requested range of sequence numbers.
        range: Range<u64>,
    },

    /// I/O error in persistent store.
    #[error("store i/o error: {0}")]
    Io(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_display() {
        let err = DecodeError::ChecksumMismatch {
            calculated: 100,
            declared: 200,
        };
        assert_eq!(
            err.to_string(),
            "checksum mismatch: calculated 100, declared 200"
        );
        assert_eq!(err.ref_tag(), Some(10));
    }

    #[test]
    fn test_fix_error_from_decode() {
        let decode_err = DecodeError::Incomplete;
        let fix_err: FixError = decode_err.into();
        assert!(matches!(fix_err, FixError::Decode(DecodeError::Incomplete)));
        assert!(fix_err.is_connection_fatal());
    }

    #[test]
    fn test_session_error_display() {
        let err = SessionError::SequenceTooLow {
            expected: 5,
            received: 3,
        };
        assert_eq!(
            err.to_string(),
            "MsgSeqNum too low, expecting 5 but received 3"
        );
        assert!(err.is_fatal());
        assert!(!SessionError::SequenceGap { expected: 5, received: 10 }.is_fatal());
    }

    #[test]
    fn test_handler_error_is_not_fatal() {
        let err: FixError = HandlerError::failed("bad price").into();
        assert_eq!(err.to_string(), "handler error: bad price");
        assert!(!err.is_connection_fatal());
    }

    #[test]
    fn test_store_error_display() {
        let err = StoreError::Duplicate { seq_num: 42 };
        assert_eq!(err.to_string(), "duplicate append for seq=42");
    }
}
