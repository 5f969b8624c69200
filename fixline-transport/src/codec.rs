/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Tokio codec for FIX message framing.
//!
//! Splits a byte stream into complete frames using BeginString and
//! BodyLength. Field-level decoding is left to the session codec.

use bytes::{BufMut, Bytes, BytesMut};
use fixline_core::error::{DecodeError, FixError};
use fixline_tagvalue::checksum::{calculate_checksum, parse_checksum};
use memchr::memchr;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// Framing errors. Every variant except `Io` means the stream is corrupt.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Frame does not start with `8=`.
    #[error("invalid begin string: frame must start with 8=")]
    InvalidBeginString,

    /// Second field is not BodyLength.
    #[error("missing body length field (tag 9)")]
    MissingBodyLength,

    /// BodyLength is not a number.
    #[error("invalid body length value")]
    InvalidBodyLength,

    /// The bytes where `10=nnn<SOH>` should be are something else.
    #[error("malformed trailer: expected 10=nnn after body")]
    InvalidTrailer,

    /// Checksum mismatch.
    #[error("checksum mismatch: calculated {calculated}, declared {declared}")]
    ChecksumMismatch {
        /// Calculated checksum.
        calculated: u8,
        /// Declared checksum in frame.
        declared: u8,
    },

    /// Frame exceeds the configured maximum size.
    #[error("frame too large: {size} bytes exceeds maximum {max_size}")]
    MessageTooLarge {
        /// Declared frame size.
        size: usize,
        /// Maximum allowed size.
        max_size: usize,
    },

    /// I/O error.
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for CodecError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<CodecError> for FixError {
    fn from(err: CodecError) -> Self {
        let decode = match err {
            CodecError::InvalidBeginString => DecodeError::InvalidBeginString,
            CodecError::MissingBodyLength => DecodeError::MissingBodyLength,
            CodecError::InvalidBodyLength | CodecError::MessageTooLarge { .. } => {
                DecodeError::InvalidBodyLength
            }
            CodecError::InvalidTrailer => DecodeError::InvalidFieldValue {
                tag: 10,
                reason: "malformed trailer".to_string(),
            },
            CodecError::ChecksumMismatch {
                calculated,
                declared,
            } => DecodeError::ChecksumMismatch {
                calculated,
                declared,
            },
            CodecError::Io(reason) => return Self::Io(std::io::Error::other(reason)),
        };
        Self::Decode(decode)
    }
}

const SOH: u8 = 0x01;

/// Length of `10=nnn<SOH>`.
const TRAILER_LEN: usize = 7;

/// Tokio codec for FIX message framing.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_message_size: usize,
    validate_checksum: bool,
}

impl FrameCodec {
    /// Creates a codec with a 1 MiB frame limit and checksum validation on.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_message_size: 1024 * 1024,
            validate_checksum: true,
        }
    }

    /// Sets the maximum frame size.
    #[must_use]
    pub const fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Sets whether to validate checksums.
    #[must_use]
    pub const fn with_checksum_validation(mut self, validate: bool) -> Self {
        self.validate_checksum = validate;
        self
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = BytesMut;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < 2 {
            return Ok(None);
        }
        if &src[0..2] != b"8=" {
            return Err(CodecError::InvalidBeginString);
        }

        let Some(first_soh) = memchr(SOH, src) else {
            return Ok(None);
        };

        let body_len_start = first_soh + 1;
        if src.len() < body_len_start + 2 {
            return Ok(None);
        }
        if &src[body_len_start..body_len_start + 2] != b"9=" {
            return Err(CodecError::MissingBodyLength);
        }

        let Some(pos) = memchr(SOH, &src[body_len_start..]) else {
            return Ok(None);
        };
        let body_len_soh = body_len_start + pos;

        let body_length: usize = std::str::from_utf8(&src[body_len_start + 2..body_len_soh])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(CodecError::InvalidBodyLength)?;

        let trailer_start = body_len_soh + 1 + body_length;
        let total_length = trailer_start + TRAILER_LEN;

        if total_length > self.max_message_size {
            return Err(CodecError::MessageTooLarge {
                size: total_length,
                max_size: self.max_message_size,
            });
        }

        if src.len() < total_length {
            src.reserve(total_length - src.len());
            return Ok(None);
        }

        let trailer = &src[trailer_start..total_length];
        if &trailer[..3] != b"10=" || trailer[6] != SOH {
            return Err(CodecError::InvalidTrailer);
        }

        if self.validate_checksum {
            let declared = parse_checksum(&trailer[3..6]).ok_or(CodecError::InvalidTrailer)?;
            let calculated = calculate_checksum(&src[..trailer_start]);
            if calculated != declared {
                return Err(CodecError::ChecksumMismatch {
                    calculated,
                    declared,
                });
            }
        }

        Ok(Some(src.split_to(total_length)))
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.len());
        dst.put_slice(&item);
        Ok(())
    }
}
