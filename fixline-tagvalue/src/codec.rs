/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! The codec seam between the session engine and the wire format.

use crate::decoder::Decoder;
use crate::encoder::Encoder;
use bytes::BytesMut;
use fixline_core::error::{DecodeError, EncodeError};
use fixline_core::message::{Message, MsgType};
use fixline_core::tags;

/// Converts between wire bytes and owned [`Message`] values.
///
/// Implementations must be shareable across connection tasks.
pub trait Codec: Send + Sync {
    /// Decodes one complete frame.
    ///
    /// # Errors
    /// Returns `DecodeError` if the frame is malformed.
    fn decode(&self, frame: &[u8]) -> Result<Message, DecodeError>;

    /// Encodes a message into a complete frame.
    ///
    /// # Errors
    /// Returns `EncodeError` if a field cannot be represented on the wire.
    fn encode(&self, message: &Message) -> Result<BytesMut, EncodeError>;

    /// The BeginString written on encoded frames.
    fn begin_string(&self) -> &str;

    /// Human-readable name for a tag, if known.
    fn tag_name(&self, tag: u32) -> Option<&'static str> {
        tags::tag_name(tag)
    }

    /// Human-readable name for a message type.
    fn msg_type_name<'a>(&self, msg_type: &'a MsgType) -> &'a str {
        msg_type.name()
    }
}

/// Standard tag=value codec.
#[derive(Debug, Clone)]
pub struct TagValueCodec {
    begin_string: String,
    validate_checksum: bool,
}

impl TagValueCodec {
    /// Creates a codec for the given BeginString with checksum validation on.
    #[must_use]
    pub fn new(begin_string: impl Into<String>) -> Self {
        Self {
            begin_string: begin_string.into(),
            validate_checksum: true,
        }
    }

    /// Enables or disables checksum validation on decode.
    #[must_use]
    pub fn with_checksum_validation(mut self, validate: bool) -> Self {
        self.validate_checksum = validate;
        self
    }
}

impl Default for TagValueCodec {
    fn default() -> Self {
        Self::new("FIX.4.4")
    }
}

impl Codec for TagValueCodec {
    fn decode(&self, frame: &[u8]) -> Result<Message, DecodeError> {
        let raw = Decoder::new(frame)
            .with_checksum_validation(self.validate_checksum)
            .decode()?;
        if raw.begin_string() != self.begin_string {
            return Err(DecodeError::InvalidBeginString);
        }
        raw.to_message()
    }

    fn encode(&self, message: &Message) -> Result<BytesMut, EncodeError> {
        Encoder::encode_message(&self.begin_string, message)
    }

    fn begin_string(&self) -> &str {
        &self.begin_string
    }
}
