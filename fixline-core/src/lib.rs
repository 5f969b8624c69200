/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # FixLine Core
//!
//! Core types and error definitions shared by every FixLine crate.
//!
//! This crate provides:
//! - **Error types**: The engine error taxonomy built with `thiserror`
//! - **Field types**: `FieldTag` and the zero-copy `FieldRef`
//! - **Message types**: `RawMessage` (borrowed wire view), `Message` (mutable,
//!   owned tag=value mapping) and `MsgType`
//! - **Session types**: `SessionId`, `Direction`, `SeqNum`, `Timestamp`, `CompId`
//! - **Tags**: Constants and name lookup for the tags the session layer uses

pub mod error;
pub mod field;
pub mod message;
pub mod tags;
pub mod types;

pub use error::{
    DecodeError, EncodeError, FixError, HandlerError, Result, SessionError, StoreError,
};
pub use field::{FieldRef, FieldTag};
pub use message::{Message, MsgType, RawMessage};
pub use types::{CompId, Direction, SeqNum, SessionId, Side, Timestamp};
