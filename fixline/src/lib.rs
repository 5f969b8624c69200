/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # FixLine
//!
//! A FIX session engine for Rust.
//!
//! FixLine runs the session layer of the FIX protocol over any async byte
//! stream: logon negotiation, sequence numbering, gap recovery, heartbeats
//! and logout. Application messages are delivered to handlers registered
//! per connection, per direction and per message type.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fixline::prelude::*;
//!
//! let config = SessionConfig::new(CompId::new("SERVER").unwrap(), "FIX.4.4");
//! let engine = Engine::builder(config).build()?;
//!
//! engine.add_message_handler(
//!     handler_fn(|connection, order| async move {
//!         // answer the order
//!         Ok(())
//!     }),
//!     Direction::Inbound,
//!     MsgType::NewOrderSingle,
//! );
//!
//! Acceptor::bind(engine, "0.0.0.0:9876").await?.run().await?;
//! ```
//!
//! ## Crate Organization
//!
//! - [`core`]: messages, identifiers and error types
//! - [`tagvalue`]: tag=value encoding and decoding
//! - [`session`]: the transport-free session state machine
//! - [`store`]: message and sequence persistence
//! - [`transport`]: stream framing and TCP helpers
//! - [`engine`]: connections, dispatch, acceptor and initiator

pub mod core {
    //! Messages, identifiers and error types.
    pub use fixline_core::*;
}

pub mod tagvalue {
    //! Tag=value encoding and decoding.
    pub use fixline_tagvalue::*;
}

pub mod session {
    //! The transport-free session state machine.
    pub use fixline_session::*;
}

pub mod store {
    //! Message and sequence persistence.
    pub use fixline_store::*;
}

pub mod transport {
    //! Stream framing and TCP helpers.
    pub use fixline_transport::*;
}

pub mod engine {
    //! Connections, dispatch, acceptor and initiator.
    pub use fixline_engine::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    // Core types
    pub use fixline_core::{
        CompId, DecodeError, Direction, FixError, HandlerError, Message, MsgType, Result, SeqNum,
        SessionError, SessionId, Side, StoreError, Timestamp, tags,
    };

    // Encoding
    pub use fixline_tagvalue::{Codec, TagValueCodec};

    // Session
    pub use fixline_session::{
        ConnectionState, MessageFilter, SequencePolicy, SessionConfig, TooLowAction, admin,
    };

    // Store
    pub use fixline_store::{MemoryStore, MessageStore};

    // Engine
    pub use fixline_engine::{
        Acceptor, ConnectionHandle, ConnectionListener, Engine, EngineBuilder, Initiator,
        MessageHandler, Role, SessionValidator, handler_fn, listener_fn,
    };
}
