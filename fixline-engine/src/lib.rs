/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # FixLine Engine
//!
//! Connection engine for the FixLine session layer.
//!
//! This crate provides:
//! - **Acceptor**: accepts inbound TCP connections and runs each on its own task
//! - **Initiator**: connects to a counterparty and sends the Logon
//! - **Connection**: read loop, serialized write path, resend serving, timers
//! - **Handlers**: message handlers by direction and type, connection listeners
//!   by state, and the logon validator
//! - **Builder API**: fluent configuration for engine setup

pub mod acceptor;
pub mod builder;
pub mod connection;
pub mod dispatcher;
pub mod engine;
pub mod handler;
pub mod initiator;
pub mod registry;

pub use acceptor::Acceptor;
pub use builder::EngineBuilder;
pub use connection::{Connection, ConnectionHandle, Role};
pub use dispatcher::Dispatcher;
pub use engine::Engine;
pub use handler::{
    AcceptAll, AllowList, ConnectionListener, MessageHandler, SessionValidator, handler_fn,
    listener_fn,
};
pub use initiator::Initiator;
pub use registry::SessionRegistry;
