/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Zero-copy FIX message decoder.
//!
//! Parses a single framed message without allocating for field values;
//! fields are returned as references into the input buffer.

use crate::checksum::{calculate_checksum, parse_checksum};
use fixline_core::error::DecodeError;
use fixline_core::field::FieldRef;
use fixline_core::message::{MsgType, RawMessage};
use fixline_core::tags;
use memchr::memchr;
use smallvec::SmallVec;

/// SOH (Start of Header) delimiter used in FIX messages.
pub const SOH: u8 = 0x01;

/// Equals sign delimiter between tag and value.
pub const EQUALS: u8 = b'=';

/// Zero-copy FIX message decoder.
#[derive(Debug)]
pub struct Decoder<'a> {
    input: &'a [u8],
    offset: usize,
    validate_checksum: bool,
    validate_length: bool,
}

impl<'a> Decoder<'a> {
    /// Creates a new decoder for the given input buffer.
    #[inline]
    #[must_use]
    pub const fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            offset: 0,
            validate_checksum: true,
            validate_length: true,
        }
    }

    /// Sets whether to validate checksums during decoding.
    #[inline]
    #[must_use]
    pub const fn with_checksum_validation(mut self, validate: bool) -> Self {
        self.validate_checksum = validate;
        self
    }

    /// Sets whether to check the declared BodyLength against the actual body.
    #[inline]
    #[must_use]
    pub const fn with_length_validation(mut self, validate: bool) -> Self {
        self.validate_length = validate;
        self
    }

    /// Decodes a complete FIX message from the buffer.
    ///
    /// # Errors
    /// Returns `DecodeError` if the message is malformed or incomplete.
    pub fn decode(&mut self) -> Result<RawMessage<'a>, DecodeError> {
        let start_offset = self.offset;

        let begin_string_field = self.next_field()?.ok_or(DecodeError::Incomplete)?;
        if begin_string_field.tag != tags::BEGIN_STRING {
            return Err(DecodeError::InvalidBeginString);
        }
        let begin_string = self.range_of(&begin_string_field);

        let body_length_field = self.next_field()?.ok_or(DecodeError::MissingBodyLength)?;
        if body_length_field.tag != tags::BODY_LENGTH {
            return Err(DecodeError::MissingBodyLength);
        }
        let body_length: usize = body_length_field
            .as_str()?
            .parse()
            .map_err(|_| DecodeError::InvalidBodyLength)?;
        let body_start = self.offset;

        let msg_type_field = self.next_field()?.ok_or(DecodeError::MissingMsgType)?;
        if msg_type_field.tag != tags::MSG_TYPE {
            return Err(DecodeError::MissingMsgType);
        }
        let msg_type: MsgType = match msg_type_field.as_str()?.parse() {
            Ok(msg_type) => msg_type,
            Err(never) => match never {},
        };

        let mut fields: SmallVec<[FieldRef<'a>; 32]> = SmallVec::new();
        fields.push(begin_string_field);
        fields.push(body_length_field);
        fields.push(msg_type_field);

        let mut checksum_field: Option<FieldRef<'a>> = None;
        while let Some(field) = self.next_field()? {
            if field.tag == tags::CHECK_SUM {
                checksum_field = Some(field);
                break;
            }
            fields.push(field);
        }

        let checksum_ref = checksum_field.ok_or(DecodeError::Incomplete)?;
        // "10=" precedes the checksum value
        let trailer_start = self.range_of(&checksum_ref).start - 3;

        if self.validate_length && trailer_start - body_start != body_length {
            return Err(DecodeError::InvalidBodyLength);
        }

        if self.validate_checksum {
            let declared = parse_checksum(checksum_ref.value).ok_or_else(|| {
                DecodeError::InvalidFieldValue {
                    tag: tags::CHECK_SUM,
                    reason: "invalid checksum format".to_string(),
                }
            })?;
            let calculated = calculate_checksum(&self.input[start_offset..trailer_start]);
            if calculated != declared {
                return Err(DecodeError::ChecksumMismatch {
                    calculated,
                    declared,
                });
            }
        }

        fields.push(checksum_ref);

        Ok(RawMessage::new(
            &self.input[start_offset..self.offset],
            begin_string.start - start_offset..begin_string.end - start_offset,
            msg_type,
            fields,
        ))
    }

    /// Parses the next field from the buffer.
    ///
    /// # Returns
    /// `Ok(None)` if the buffer is exhausted or ends mid-field.
    ///
    /// # Errors
    /// Returns `DecodeError::InvalidTag` if the tag is not a positive integer.
    #[inline]
    pub fn next_field(&mut self) -> Result<Option<FieldRef<'a>>, DecodeError> {
        let remaining = &self.input[self.offset.min(self.input.len())..];
        let Some(eq_pos) = memchr(EQUALS, remaining) else {
            return Ok(None);
        };
        let tag_bytes = &remaining[..eq_pos];
        let tag = parse_tag(tag_bytes).ok_or_else(|| {
            DecodeError::InvalidTag(String::from_utf8_lossy(tag_bytes).into_owned())
        })?;

        let value_start = eq_pos + 1;
        let Some(soh_pos) = memchr(SOH, &remaining[value_start..]) else {
            return Ok(None);
        };
        let value = &remaining[value_start..value_start + soh_pos];

        self.offset += value_start + soh_pos + 1;
        Ok(Some(FieldRef::new(tag, value)))
    }

    /// Returns the current offset in the buffer.
    #[inline]
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Returns true if the buffer has been fully consumed.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offset >= self.input.len()
    }

    fn range_of(&self, field: &FieldRef<'a>) -> std::ops::Range<usize> {
        let start = field.value.as_ptr() as usize - self.input.as_ptr() as usize;
        start..start + field.value.len()
    }
}

/// Parses a tag number from ASCII digits.
#[inline]
fn parse_tag(bytes: &[u8]) -> Option<u32> {
    if bytes.is_empty() || bytes.len() > 10 {
        return None;
    }
    let tag = bytes.iter().try_fold(0u32, |acc, &b| {
        if b.is_ascii_digit() {
            acc.checked_mul(10)?.checked_add(u32::from(b - b'0'))
        } else {
            None
        }
    })?;
    (tag > 0).then_some(tag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::Encoder;

    #[test]
    fn test_parse_tag() {
        assert_eq!(parse_tag(b"8"), Some(8));
        assert_eq!(parse_tag(b"12345"), Some(12345));
        assert_eq!(parse_tag(b""), None);
        assert_eq!(parse_tag(b"0"), None);
        assert_eq!(parse_tag(b"12a"), None);
    }

    #[test]
    fn test_next_field() {
        let mut decoder = Decoder::new(b"8=FIX.4.4\x019=5\x0135=0\x01");

        let field = decoder.next_field().unwrap().unwrap();
        assert_eq!(field.tag, 8);
        assert_eq!(field.as_str().unwrap(), "FIX.4.4");
        assert_eq!(decoder.next_field().unwrap().unwrap().tag, 9);
        assert_eq!(decoder.next_field().unwrap().unwrap().tag, 35);
        assert!(decoder.next_field().unwrap().is_none());
        assert!(decoder.is_empty());
    }

    #[test]
    fn test_next_field_invalid_tag() {
        let mut decoder = Decoder::new(b"x=1\x01");
        assert!(matches!(
            decoder.next_field(),
            Err(DecodeError::InvalidTag(_))
        ));
    }

    #[test]
    fn test_decode_encoded_message() {
        let mut encoder = Encoder::new("FIX.4.4");
        encoder.put_str(35, "D");
        encoder.put_str(49, "CLIENT");
        encoder.put_uint(34, 2);
        let bytes = encoder.finish();

        let raw = Decoder::new(&bytes).decode().unwrap();
        assert_eq!(raw.begin_string(), "FIX.4.4");
        assert_eq!(raw.msg_type(), &MsgType::NewOrderSingle);
        assert_eq!(raw.get_field_str(49), Some("CLIENT"));
        assert_eq!(raw.buffer().len(), bytes.len());
    }

    #[test]
    fn test_decode_checksum_mismatch() {
        let input = b"8=FIX.4.4\x019=5\x0135=0\x0110=000\x01";
        let result = Decoder::new(input).decode();
        assert!(matches!(result, Err(DecodeError::ChecksumMismatch { .. })));

        let relaxed = Decoder::new(input).with_checksum_validation(false).decode();
        assert!(relaxed.is_ok());
    }

    #[test]
    fn test_decode_body_length_mismatch() {
        let input = b"8=FIX.4.4\x019=9\x0135=0\x0110=000\x01";
        let result = Decoder::new(input).with_checksum_validation(false).decode();
        assert_eq!(result.unwrap_err(), DecodeError::InvalidBodyLength);
    }

    #[test]
    fn test_decode_missing_msg_type() {
        let input = b"8=FIX.4.4\x019=6\x0149=AB\x0110=000\x01";
        let result = Decoder::new(input).with_checksum_validation(false).decode();
        assert_eq!(result.unwrap_err(), DecodeError::MissingMsgType);
    }

    #[test]
    fn test_decoder_incomplete() {
        let mut decoder = Decoder::new(b"8=FIX.4.4");
        assert_eq!(decoder.decode().unwrap_err(), DecodeError::Incomplete);
    }
}
