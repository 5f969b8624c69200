/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # FixLine Session
//!
//! FIX session layer for the FixLine engine. Nothing in this crate performs
//! I/O; the engine drives it from each connection's task.
//!
//! - **State machine**: [`ConnectionState`] and the transition rules
//! - **Sequence management**: atomic counters and the [`SequencePolicy`]
//! - **Recovery**: gap buffering and ResendRequest bookkeeping
//! - **Heartbeat handling**: Heartbeat/TestRequest timing
//! - **Registry**: handler lists keyed by direction and message type
//! - **Admin messages**: builders for Logon, Logout, Reject and friends
//! - **Configuration**: [`SessionConfig`] and its builder

pub mod admin;
pub mod config;
pub mod heartbeat;
pub mod recovery;
pub mod registry;
pub mod sequence;
pub mod session;
pub mod state;

pub use admin::RejectReason;
pub use config::{SessionConfig, SessionConfigBuilder};
pub use heartbeat::{HeartbeatAction, HeartbeatManager};
pub use recovery::{GapRecovery, Pending};
pub use registry::{HandlerId, HandlerRegistry, MessageFilter};
pub use sequence::{SequenceManager, SequencePolicy, SequenceResult, TooLowAction};
pub use session::{LogonTerms, Session, SessionAction, required_header};
pub use state::{ConnectionState, StateMachine};
