/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Routes messages to the handlers registered for their direction and type.

use crate::connection::ConnectionHandle;
use crate::handler::{MessageHandler, panic_message};
use fixline_core::message::Message;
use fixline_core::types::Direction;
use fixline_session::registry::{HandlerId, HandlerRegistry, MessageFilter};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{trace, warn};

/// Per-connection handler table.
#[derive(Debug, Default)]
pub struct Dispatcher {
    handlers: HandlerRegistry<dyn MessageHandler>,
}

impl Dispatcher {
    /// Creates a dispatcher with no handlers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler. The same handler may be added more than once.
    pub fn add(
        &self,
        handler: Arc<dyn MessageHandler>,
        direction: Direction,
        filter: MessageFilter,
    ) -> HandlerId {
        self.handlers.add(handler, direction, filter)
    }

    /// Removes one registration of `handler` under the key.
    pub fn remove(
        &self,
        handler: &Arc<dyn MessageHandler>,
        direction: Direction,
        filter: &MessageFilter,
    ) -> bool {
        self.handlers.remove(handler, direction, filter)
    }

    /// Removes a registration by id.
    pub fn remove_id(&self, id: HandlerId) -> bool {
        self.handlers.remove_id(id)
    }

    /// Drops every handler.
    pub fn clear(&self) {
        self.handlers.clear();
    }

    /// Number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Invokes every matching handler in registration order and returns how
    /// many ran. A handler that fails or panics is logged and the rest still
    /// run.
    pub async fn dispatch(
        &self,
        connection: &ConnectionHandle,
        direction: Direction,
        message: &Message,
    ) -> usize {
        let handlers = self.handlers.snapshot(direction, message.msg_type());
        for handler in &handlers {
            let outcome = AssertUnwindSafe(handler.handle(connection, message))
                .catch_unwind()
                .await;
            let err = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err.to_string(),
                Err(panic) => format!("panicked: {}", panic_message(&*panic)),
            };
            warn!(
                connection = connection.id(),
                %direction,
                msg_type = %message.msg_type(),
                error = %err,
                "message handler failed"
            );
        }
        trace!(
            connection = connection.id(),
            %direction,
            msg_type = %message.msg_type(),
            handlers = handlers.len(),
            "dispatched"
        );
        handlers.len()
    }
}
