/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Shared engine context handed to every connection.

use crate::builder::EngineBuilder;
use crate::connection::{Connection, ConnectionHandle, Role};
use crate::handler::{ConnectionListener, MessageHandler, SessionValidator};
use crate::registry::SessionRegistry;
use fixline_core::types::Direction;
use fixline_session::config::SessionConfig;
use fixline_session::registry::MessageFilter;
use fixline_session::state::ConnectionState;
use fixline_store::MessageStore;
use fixline_tagvalue::Codec;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

type DefaultHandler = (Arc<dyn MessageHandler>, Direction, MessageFilter);

pub(crate) struct EngineParts {
    pub config: SessionConfig,
    pub store: Arc<dyn MessageStore>,
    pub validator: Arc<dyn SessionValidator>,
    pub codec: Arc<dyn Codec>,
    pub connect_timeout: Duration,
    pub listeners: Vec<(ConnectionState, Arc<dyn ConnectionListener>)>,
}

struct EngineInner {
    config: SessionConfig,
    store: Arc<dyn MessageStore>,
    validator: Arc<dyn SessionValidator>,
    codec: Arc<dyn Codec>,
    connect_timeout: Duration,
    listeners: RwLock<HashMap<ConnectionState, Vec<Arc<dyn ConnectionListener>>>>,
    handlers: RwLock<Vec<DefaultHandler>>,
    sessions: SessionRegistry,
    next_connection_id: AtomicU64,
}

/// Engine context: store, validator, codec, session template and the
/// listeners shared by all connections. Cheap to clone.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Starts building an engine around a session template.
    #[must_use]
    pub fn builder(config: SessionConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    pub(crate) fn from_parts(parts: EngineParts) -> Self {
        let mut listeners: HashMap<ConnectionState, Vec<Arc<dyn ConnectionListener>>> =
            HashMap::new();
        for (state, listener) in parts.listeners {
            listeners.entry(state).or_default().push(listener);
        }
        Self {
            inner: Arc::new(EngineInner {
                config: parts.config,
                store: parts.store,
                validator: parts.validator,
                codec: parts.codec,
                connect_timeout: parts.connect_timeout,
                listeners: RwLock::new(listeners),
                handlers: RwLock::new(Vec::new()),
                sessions: SessionRegistry::new(),
                next_connection_id: AtomicU64::new(1),
            }),
        }
    }

    /// Session template applied to every connection.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Message store shared by all sessions.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn MessageStore> {
        &self.inner.store
    }

    /// Logon validator.
    #[must_use]
    pub fn validator(&self) -> &Arc<dyn SessionValidator> {
        &self.inner.validator
    }

    /// Wire codec.
    #[must_use]
    pub fn codec(&self) -> &Arc<dyn Codec> {
        &self.inner.codec
    }

    /// Timeout used by initiators when connecting.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.inner.connect_timeout
    }

    /// Sessions currently bound to a connection.
    #[must_use]
    pub fn sessions(&self) -> &SessionRegistry {
        &self.inner.sessions
    }

    /// Registers a listener for transitions into `state`.
    pub fn add_connection_listener(
        &self,
        listener: Arc<dyn ConnectionListener>,
        state: ConnectionState,
    ) {
        self.inner
            .listeners
            .write()
            .entry(state)
            .or_default()
            .push(listener);
    }

    /// Removes one registration of `listener` for `state`.
    pub fn remove_connection_listener(
        &self,
        listener: &Arc<dyn ConnectionListener>,
        state: ConnectionState,
    ) -> bool {
        let mut listeners = self.inner.listeners.write();
        let Some(list) = listeners.get_mut(&state) else {
            return false;
        };
        let Some(pos) = list
            .iter()
            .position(|l| std::ptr::addr_eq(Arc::as_ptr(l), Arc::as_ptr(listener)))
        else {
            return false;
        };
        list.remove(pos);
        true
    }

    pub(crate) fn listeners(&self, state: ConnectionState) -> Vec<Arc<dyn ConnectionListener>> {
        self.inner
            .listeners
            .read()
            .get(&state)
            .cloned()
            .unwrap_or_default()
    }

    /// Registers a handler installed on every connection created afterwards,
    /// ahead of handlers added on the connection itself.
    pub fn add_message_handler(
        &self,
        handler: Arc<dyn MessageHandler>,
        direction: Direction,
        filter: impl Into<MessageFilter>,
    ) {
        self.inner
            .handlers
            .write()
            .push((handler, direction, filter.into()));
    }

    pub(crate) fn default_handlers(&self) -> Vec<DefaultHandler> {
        self.inner.handlers.read().clone()
    }

    pub(crate) fn next_connection_id(&self) -> u64 {
        self.inner.next_connection_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Wraps a stream in a connection without starting it.
    ///
    /// Handlers can be registered on [`Connection::handle`] before
    /// [`Connection::run`] is polled, so none of the logon traffic is missed.
    pub fn connection<S>(&self, stream: S, role: Role, peer_addr: Option<SocketAddr>) -> Connection
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        Connection::new(self.clone(), stream, role, peer_addr)
    }

    /// Wraps a stream in a connection and runs it on its own task.
    pub fn spawn<S>(&self, stream: S, role: Role, peer_addr: Option<SocketAddr>) -> ConnectionHandle
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let connection = self.connection(stream, role, peer_addr);
        let handle = connection.handle();
        tokio::spawn(async move {
            if let Err(err) = connection.run().await {
                debug!(error = %err, "connection task ended with error");
            }
        });
        handle
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("sender_comp_id", &self.inner.config.sender_comp_id)
            .field("begin_string", &self.inner.config.begin_string)
            .field("sessions", &self.inner.sessions.len())
            .finish_non_exhaustive()
    }
}
