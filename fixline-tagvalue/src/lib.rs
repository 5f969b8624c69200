/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # FixLine Tag-Value
//!
//! FIX tag=value encoding and decoding for the FixLine engine.
//!
//! - **Decoder**: zero-copy parsing into a [`RawMessage`], using `memchr`
//!   for delimiter search
//! - **Encoder**: builds framed messages with BodyLength and CheckSum
//! - **Codec**: the [`Codec`] interface the session engine consumes, with
//!   the standard [`TagValueCodec`] implementation

pub mod checksum;
pub mod codec;
pub mod decoder;
pub mod encoder;

pub use checksum::calculate_checksum;
pub use codec::{Codec, TagValueCodec};
pub use decoder::Decoder;
pub use encoder::Encoder;
pub use fixline_core::message::RawMessage;
