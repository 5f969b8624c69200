/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Application callback interfaces.
//!
//! - [`MessageHandler`]: receives messages by direction and type
//! - [`ConnectionListener`]: observes connection state changes
//! - [`SessionValidator`]: accepts or refuses a counterparty at logon

use crate::connection::ConnectionHandle;
use async_trait::async_trait;
use fixline_core::error::HandlerError;
use fixline_core::message::Message;
use fixline_session::state::ConnectionState;
use std::any::Any;
use std::future::Future;
use std::sync::Arc;

/// Receives messages registered for a `(Direction, MessageFilter)` pair.
///
/// Handlers run sequentially on the connection's task. They may call
/// [`ConnectionHandle::send`]. An error or a panic is logged and does not
/// stop the remaining handlers or the connection.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handles one message.
    async fn handle(
        &self,
        connection: &ConnectionHandle,
        message: &Message,
    ) -> Result<(), HandlerError>;
}

/// Observes transitions into the state it was registered for.
#[async_trait]
pub trait ConnectionListener: Send + Sync {
    /// Called after the connection moved from `from` to `to`.
    async fn on_state_change(
        &self,
        connection: &ConnectionHandle,
        from: ConnectionState,
        to: ConnectionState,
    ) -> Result<(), HandlerError>;
}

/// Decides whether a counterparty may log on.
#[async_trait]
pub trait SessionValidator: Send + Sync {
    /// `sender_comp_id` and `target_comp_id` are tags 49 and 56 as they
    /// appear on the counterparty's Logon.
    async fn validate(&self, sender_comp_id: &str, target_comp_id: &str) -> bool;
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

/// Validator that lets every counterparty in.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

#[async_trait]
impl SessionValidator for AcceptAll {
    async fn validate(&self, _sender_comp_id: &str, _target_comp_id: &str) -> bool {
        true
    }
}

/// Validator backed by a fixed list of counterparty SenderCompIDs.
#[derive(Debug, Default, Clone)]
pub struct AllowList {
    allowed: Vec<String>,
}

impl AllowList {
    /// Creates a validator allowing the given counterparty CompIDs.
    #[must_use]
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl SessionValidator for AllowList {
    async fn validate(&self, sender_comp_id: &str, _target_comp_id: &str) -> bool {
        self.allowed.iter().any(|id| id == sender_comp_id)
    }
}

/// Adapter turning an async closure into a [`MessageHandler`].
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(ConnectionHandle, Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(
        &self,
        connection: &ConnectionHandle,
        message: &Message,
    ) -> Result<(), HandlerError> {
        (self.0)(connection.clone(), message.clone()).await
    }
}

/// Wraps an async closure as a shareable message handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn MessageHandler>
where
    F: Fn(ConnectionHandle, Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Adapter turning an async closure into a [`ConnectionListener`].
pub struct FnListener<F>(F);

#[async_trait]
impl<F, Fut> ConnectionListener for FnListener<F>
where
    F: Fn(ConnectionHandle, ConnectionState, ConnectionState) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn on_state_change(
        &self,
        connection: &ConnectionHandle,
        from: ConnectionState,
        to: ConnectionState,
    ) -> Result<(), HandlerError> {
        (self.0)(connection.clone(), from, to).await
    }
}

/// Wraps an async closure as a shareable connection listener.
pub fn listener_fn<F, Fut>(f: F) -> Arc<dyn ConnectionListener>
where
    F: Fn(ConnectionHandle, ConnectionState, ConnectionState) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Arc::new(FnListener(f))
}
