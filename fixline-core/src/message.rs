/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Message types for the FIX protocol.
//!
//! This module provides:
//! - [`MsgType`]: Enumeration of FIX message types with wire code and name lookup
//! - [`RawMessage`]: Zero-copy view into a decoded wire buffer
//! - [`Message`]: Owned, mutable tag=value mapping handed to and from the session layer

use crate::error::DecodeError;
use crate::field::{FieldRef, parse_bool, parse_value};
use crate::tags;
use crate::types::{SeqNum, Timestamp};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

macro_rules! msg_types {
    ($( $(#[$doc:meta])* $variant:ident => $code:literal ),+ $(,)?) => {
        /// Standard FIX message types.
        ///
        /// Unknown or user-defined types are carried as `Custom(String)`.
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
        pub enum MsgType {
            $( $(#[$doc])* $variant, )+
            /// Custom or unknown message type.
            Custom(String),
        }

        impl MsgType {
            /// Returns the wire code of this message type (tag 35 value).
            #[must_use]
            pub fn as_str(&self) -> &str {
                match self {
                    $( Self::$variant => $code, )+
                    Self::Custom(s) => s.as_str(),
                }
            }

            /// Returns the human-readable message type name.
            #[must_use]
            pub fn name(&self) -> &str {
                match self {
                    $( Self::$variant => stringify!($variant), )+
                    Self::Custom(s) => s.as_str(),
                }
            }

            /// Resolves a message type from its name (e.g. `"NewOrderSingle"`).
            #[must_use]
            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $( stringify!($variant) => Some(Self::$variant), )+
                    _ => None,
                }
            }
        }

        impl FromStr for MsgType {
            type Err = std::convert::Infallible;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(match s {
                    $( $code => Self::$variant, )+
                    other => Self::Custom(other.to_string()),
                })
            }
        }
    };
}

msg_types! {
    /// Heartbeat (0) - Session level.
    #[default]
    Heartbeat => "0",
    /// Test Request (1) - Session level.
    TestRequest => "1",
    /// Resend Request (2) - Session level.
    ResendRequest => "2",
    /// Reject (3) - Session level.
    Reject => "3",
    /// Sequence Reset (4) - Session level.
    SequenceReset => "4",
    /// Logout (5) - Session level.
    Logout => "5",
    /// Indication of Interest (6).
    IndicationOfInterest => "6",
    /// Advertisement (7).
    Advertisement => "7",
    /// Execution Report (8).
    ExecutionReport => "8",
    /// Order Cancel Reject (9).
    OrderCancelReject => "9",
    /// Logon (A) - Session level.
    Logon => "A",
    /// News (B).
    News => "B",
    /// Email (C).
    Email => "C",
    /// New Order Single (D).
    NewOrderSingle => "D",
    /// New Order List (E).
    NewOrderList => "E",
    /// Order Cancel Request (F).
    OrderCancelRequest => "F",
    /// Order Cancel/Replace Request (G).
    OrderCancelReplaceRequest => "G",
    /// Order Status Request (H).
    OrderStatusRequest => "H",
    /// Allocation Instruction (J).
    AllocationInstruction => "J",
    /// Don't Know Trade (Q).
    DontKnowTrade => "Q",
    /// Quote Request (R).
    QuoteRequest => "R",
    /// Quote (S).
    Quote => "S",
    /// Market Data Request (V).
    MarketDataRequest => "V",
    /// Market Data Snapshot/Full Refresh (W).
    MarketDataSnapshotFullRefresh => "W",
    /// Market Data Incremental Refresh (X).
    MarketDataIncrementalRefresh => "X",
    /// Market Data Request Reject (Y).
    MarketDataRequestReject => "Y",
    /// Quote Cancel (Z).
    QuoteCancel => "Z",
    /// Security Definition Request (c).
    SecurityDefinitionRequest => "c",
    /// Security Definition (d).
    SecurityDefinition => "d",
    /// Security Status Request (e).
    SecurityStatusRequest => "e",
    /// Security Status (f).
    SecurityStatus => "f",
    /// Trading Session Status Request (g).
    TradingSessionStatusRequest => "g",
    /// Trading Session Status (h).
    TradingSessionStatus => "h",
    /// Mass Quote (i).
    MassQuote => "i",
    /// Business Message Reject (j).
    BusinessMessageReject => "j",
    /// Order Mass Cancel Request (q).
    OrderMassCancelRequest => "q",
    /// Order Mass Cancel Report (r).
    OrderMassCancelReport => "r",
    /// Security List Request (x).
    SecurityListRequest => "x",
    /// Security List (y).
    SecurityList => "y",
}

impl MsgType {
    /// Returns true if this is a session-level (administrative) message.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        matches!(
            self,
            Self::Heartbeat
                | Self::TestRequest
                | Self::ResendRequest
                | Self::Reject
                | Self::SequenceReset
                | Self::Logout
                | Self::Logon
        )
    }

    /// Returns true if this is an application message.
    #[must_use]
    pub fn is_app(&self) -> bool {
        !self.is_admin()
    }
}

impl fmt::Display for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Zero-copy view into a FIX message buffer.
///
/// Produced by the tag=value decoder. Field values borrow from the original
/// buffer; call [`RawMessage::to_message`] to obtain an owned [`Message`].
#[derive(Debug, Clone)]
pub struct RawMessage<'a> {
    buffer: &'a [u8],
    begin_string: Range<usize>,
    msg_type: MsgType,
    fields: SmallVec<[FieldRef<'a>; 32]>,
}

impl<'a> RawMessage<'a> {
    /// Creates a new RawMessage from parsed components.
    ///
    /// # Arguments
    /// * `buffer` - The complete message buffer
    /// * `begin_string` - Range of the BeginString value within `buffer`
    /// * `msg_type` - The parsed message type
    /// * `fields` - Parsed field references, in wire order
    #[must_use]
    pub fn new(
        buffer: &'a [u8],
        begin_string: Range<usize>,
        msg_type: MsgType,
        fields: SmallVec<[FieldRef<'a>; 32]>,
    ) -> Self {
        Self {
            buffer,
            begin_string,
            msg_type,
            fields,
        }
    }

    /// Returns the complete message buffer.
    #[inline]
    #[must_use]
    pub const fn buffer(&self) -> &'a [u8] {
        self.buffer
    }

    /// Returns the BeginString value (e.g., "FIX.4.4").
    #[must_use]
    pub fn begin_string(&self) -> &'a str {
        std::str::from_utf8(&self.buffer[self.begin_string.clone()]).unwrap_or("")
    }

    /// Returns the message type.
    #[inline]
    #[must_use]
    pub fn msg_type(&self) -> &MsgType {
        &self.msg_type
    }

    /// Returns an iterator over all fields.
    #[inline]
    pub fn fields(&self) -> impl Iterator<Item = &FieldRef<'a>> {
        self.fields.iter()
    }

    /// Gets the first field with the given tag.
    #[must_use]
    pub fn get_field(&self, tag: u32) -> Option<&FieldRef<'a>> {
        self.fields.iter().find(|f| f.tag == tag)
    }

    /// Gets a field value as a string.
    #[must_use]
    pub fn get_field_str(&self, tag: u32) -> Option<&'a str> {
        self.get_field(tag).and_then(|f| f.as_str().ok())
    }

    /// Converts the borrowed view into an owned [`Message`].
    ///
    /// BeginString, BodyLength, MsgType and CheckSum are framing data and are
    /// not copied into the field list.
    ///
    /// # Errors
    /// Returns `DecodeError::InvalidUtf8` if a field value is not valid UTF-8.
    pub fn to_message(&self) -> Result<Message, DecodeError> {
        let mut message = Message::new(self.msg_type.clone());
        for field in self
            .fields
            .iter()
            .filter(|f| !tags::FRAMING_TAGS.contains(&f.tag))
        {
            message.fields.push((field.tag, field.as_str()?.to_string()));
        }
        Ok(message)
    }
}

/// An owned FIX message: an ordered tag=value mapping plus its message type.
///
/// The message is mutable until it is handed to the session for sending,
/// which takes it by value. Setting a tag that is already present replaces
/// the value in place, preserving field order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Message {
    msg_type: MsgType,
    fields: Vec<(u32, String)>,
}

impl Message {
    /// Creates an empty message of the given type.
    #[must_use]
    pub fn new(msg_type: MsgType) -> Self {
        Self {
            msg_type,
            fields: Vec::new(),
        }
    }

    /// Returns the message type.
    #[inline]
    #[must_use]
    pub fn msg_type(&self) -> &MsgType {
        &self.msg_type
    }

    /// Sets a field, replacing any existing value for the tag.
    ///
    /// Framing tags (8, 9, 35, 10) are generated by the encoder and are ignored.
    pub fn set_field(&mut self, tag: u32, value: impl Into<String>) -> &mut Self {
        if tags::FRAMING_TAGS.contains(&tag) {
            return self;
        }
        let value = value.into();
        match self.fields.iter_mut().find(|(t, _)| *t == tag) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((tag, value)),
        }
        self
    }

    /// Builder-style variant of [`Message::set_field`].
    #[must_use]
    pub fn with_field(mut self, tag: u32, value: impl Into<String>) -> Self {
        self.set_field(tag, value);
        self
    }

    /// Returns the value of a field.
    ///
    /// Tag 35 resolves to the message type code.
    #[must_use]
    pub fn field(&self, tag: u32) -> Option<&str> {
        if tag == tags::MSG_TYPE {
            return Some(self.msg_type.as_str());
        }
        self.fields
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, v)| v.as_str())
    }

    /// Returns the value of a required field.
    ///
    /// # Errors
    /// Returns `DecodeError::MissingRequiredField` if the tag is absent.
    pub fn require(&self, tag: u32) -> Result<&str, DecodeError> {
        self.field(tag)
            .ok_or(DecodeError::MissingRequiredField { tag })
    }

    /// Parses a required field as `T`.
    ///
    /// # Errors
    /// Returns `DecodeError` if the field is missing or cannot be parsed.
    pub fn field_as<T: FromStr>(&self, tag: u32) -> Result<T, DecodeError> {
        parse_value(tag, self.require(tag)?)
    }

    /// Returns a Y/N flag, treating an absent field as `false`.
    ///
    /// # Errors
    /// Returns `DecodeError::InvalidFieldValue` if the value is not 'Y' or 'N'.
    pub fn flag(&self, tag: u32) -> Result<bool, DecodeError> {
        match self.field(tag) {
            Some(v) => parse_bool(tag, v.as_bytes()),
            None => Ok(false),
        }
    }

    /// Returns true if the message carries the field.
    #[must_use]
    pub fn has_field(&self, tag: u32) -> bool {
        self.field(tag).is_some()
    }

    /// Removes a field and returns its value.
    pub fn remove_field(&mut self, tag: u32) -> Option<String> {
        let pos = self.fields.iter().position(|(t, _)| *t == tag)?;
        Some(self.fields.remove(pos).1)
    }

    /// Returns the message sequence number (tag 34).
    ///
    /// # Errors
    /// Returns `DecodeError` if the field is missing or not a number.
    pub fn seq_num(&self) -> Result<SeqNum, DecodeError> {
        self.field_as::<u64>(tags::MSG_SEQ_NUM).map(SeqNum::new)
    }

    /// Returns true if PossDupFlag (43) is set to 'Y'.
    #[must_use]
    pub fn is_poss_dup(&self) -> bool {
        self.field(tags::POSS_DUP_FLAG) == Some("Y")
    }

    /// Stamps SendingTime (52) with the current time.
    pub fn stamp_sending_time(&mut self) {
        let now = Timestamp::now().format_millis();
        self.set_field(tags::SENDING_TIME, now.as_str());
    }

    /// Iterates over the stored fields in order (MsgType excluded).
    pub fn fields(&self) -> impl Iterator<Item = (u32, &str)> {
        self.fields.iter().map(|(t, v)| (*t, v.as_str()))
    }

    /// Returns the number of stored fields.
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "35={}", self.msg_type)?;
        for (tag, value) in &self.fields {
            write!(f, "|{}={}", tag, value)?;
        }
        Ok(())
    }
}
