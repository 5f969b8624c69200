/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # FixLine Transport
//!
//! Network transport layer for the FixLine engine.
//!
//! - **Framing**: [`FrameCodec`], a tokio-util codec that cuts complete FIX
//!   frames out of a byte stream
//! - **TCP**: [`tcp::listen`], [`tcp::accept`] and [`tcp::connect`]

pub mod codec;
pub mod tcp;

pub use codec::{CodecError, FrameCodec};
