/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # FixLine Store
//!
//! Message persistence for FixLine sessions.
//!
//! - **MessageStore trait**: append-only message log per session and
//!   direction, plus the sequence number snapshot used across reconnects
//! - **MemoryStore**: in-memory reference implementation

pub mod memory;
pub mod traits;

pub use memory::MemoryStore;
pub use traits::{MessageStore, SequenceSnapshot};
