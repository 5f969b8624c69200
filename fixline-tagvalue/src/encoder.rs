/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! FIX message encoder.
//!
//! Builds tag=value frames. BeginString, BodyLength and CheckSum are
//! written by [`Encoder::finish`]; everything else is appended in call order.

use crate::checksum::{calculate_checksum, format_checksum};
use bytes::{BufMut, BytesMut};
use fixline_core::error::EncodeError;
use fixline_core::message::Message;
use fixline_core::tags;

/// SOH (Start of Header) delimiter used in FIX messages.
pub const SOH: u8 = 0x01;

/// FIX message encoder.
#[derive(Debug, Clone)]
pub struct Encoder {
    /// Buffer for the message body (between BodyLength and Checksum).
    body: BytesMut,
    begin_string: String,
}

impl Encoder {
    /// Creates a new encoder with the specified BeginString.
    #[must_use]
    pub fn new(begin_string: impl Into<String>) -> Self {
        Self::with_capacity(begin_string, 256)
    }

    /// Creates a new encoder with pre-allocated body capacity.
    #[must_use]
    pub fn with_capacity(begin_string: impl Into<String>, capacity: usize) -> Self {
        Self {
            body: BytesMut::with_capacity(capacity),
            begin_string: begin_string.into(),
        }
    }

    /// Encodes an owned [`Message`] into a complete frame.
    ///
    /// MsgType is written first, then the standard header tags in their
    /// conventional order, then the remaining fields as stored.
    ///
    /// # Errors
    /// Returns `EncodeError::InvalidFieldValue` if a value is empty or
    /// contains the SOH delimiter.
    pub fn encode_message(begin_string: &str, message: &Message) -> Result<BytesMut, EncodeError> {
        let mut encoder = Self::with_capacity(begin_string, 64 + message.field_count() * 16);
        encoder.put_str(tags::MSG_TYPE, message.msg_type().as_str());

        for tag in tags::HEADER_TAGS {
            if let Some(value) = message.field(tag) {
                encoder.put_checked(tag, value)?;
            }
        }
        for (tag, value) in message.fields().filter(|(t, _)| !tags::is_header_tag(*t)) {
            encoder.put_checked(tag, value)?;
        }
        Ok(encoder.finish())
    }

    fn put_checked(&mut self, tag: u32, value: &str) -> Result<(), EncodeError> {
        if value.is_empty() {
            return Err(EncodeError::InvalidFieldValue {
                tag,
                reason: "empty value".to_string(),
            });
        }
        if value.as_bytes().contains(&SOH) {
            return Err(EncodeError::InvalidFieldValue {
                tag,
                reason: "value contains SOH".to_string(),
            });
        }
        self.put_str(tag, value);
        Ok(())
    }

    /// Appends a field with a string value.
    #[inline]
    pub fn put_str(&mut self, tag: u32, value: &str) {
        self.put_raw(tag, value.as_bytes());
    }

    /// Appends a field with an unsigned integer value.
    #[inline]
    pub fn put_uint(&mut self, tag: u32, value: u64) {
        let mut buf = itoa::Buffer::new();
        let s = buf.format(value);
        self.put_raw(tag, s.as_bytes());
    }

    /// Appends a Y/N field.
    #[inline]
    pub fn put_bool(&mut self, tag: u32, value: bool) {
        self.put_raw(tag, if value { b"Y" } else { b"N" });
    }

    /// Appends a field with raw bytes.
    #[inline]
    pub fn put_raw(&mut self, tag: u32, value: &[u8]) {
        let mut tag_buf = itoa::Buffer::new();
        self.body.put_slice(tag_buf.format(tag).as_bytes());
        self.body.put_u8(b'=');
        self.body.put_slice(value);
        self.body.put_u8(SOH);
    }

    /// Finalizes the frame: prepends `8=` and `9=`, appends `10=`.
    #[must_use]
    pub fn finish(self) -> BytesMut {
        let body_len = self.body.len();
        let mut len_buf = itoa::Buffer::new();
        let len_str = len_buf.format(body_len);

        let mut message =
            BytesMut::with_capacity(self.begin_string.len() + len_str.len() + body_len + 16);
        message.put_slice(b"8=");
        message.put_slice(self.begin_string.as_bytes());
        message.put_u8(SOH);
        message.put_slice(b"9=");
        message.put_slice(len_str.as_bytes());
        message.put_u8(SOH);
        message.put_slice(&self.body);

        let checksum = calculate_checksum(&message);
        message.put_slice(b"10=");
        message.put_slice(&format_checksum(checksum));
        message.put_u8(SOH);

        message
    }

    /// Returns the current body length.
    #[inline]
    #[must_use]
    pub fn body_len(&self) -> usize {
        self.body.len()
    }

    /// Clears the encoder for reuse.
    #[inline]
    pub fn clear(&mut self) {
        self.body.clear();
    }
}
