/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Engine builder for fluent configuration.
//!
//! This module provides a builder API for configuring FIX engines.

use crate::engine::{Engine, EngineParts};
use crate::handler::{AcceptAll, ConnectionListener, SessionValidator};
use fixline_core::error::SessionError;
use fixline_session::config::SessionConfig;
use fixline_session::state::ConnectionState;
use fixline_store::{MemoryStore, MessageStore};
use fixline_tagvalue::{Codec, TagValueCodec};
use std::sync::Arc;
use std::time::Duration;

/// Builder for configuring a FIX engine.
pub struct EngineBuilder {
    /// Template applied to every session.
    config: SessionConfig,
    /// Message store; in-memory unless set.
    store: Option<Arc<dyn MessageStore>>,
    /// Logon validator; accepts everyone unless set.
    validator: Arc<dyn SessionValidator>,
    /// Wire codec; tag=value for the configured BeginString unless set.
    codec: Option<Arc<dyn Codec>>,
    /// Connection timeout.
    connect_timeout: Duration,
    listeners: Vec<(ConnectionState, Arc<dyn ConnectionListener>)>,
}

impl EngineBuilder {
    /// Creates a new engine builder with default settings.
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            store: None,
            validator: Arc::new(AcceptAll),
            codec: None,
            connect_timeout: Duration::from_secs(30),
            listeners: Vec::new(),
        }
    }

    /// Sets the message store.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn MessageStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the logon validator.
    #[must_use]
    pub fn with_validator(mut self, validator: Arc<dyn SessionValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Replaces the wire codec.
    #[must_use]
    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Adds a listener for transitions into `state`.
    #[must_use]
    pub fn with_listener(
        mut self,
        state: ConnectionState,
        listener: Arc<dyn ConnectionListener>,
    ) -> Self {
        self.listeners.push((state, listener));
        self
    }

    /// Returns the session template.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Returns the connection timeout.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Validates the configuration and builds the engine.
    ///
    /// # Errors
    /// Returns `SessionError::Configuration` if the session template is
    /// invalid or a custom codec disagrees with its BeginString.
    pub fn build(self) -> Result<Engine, SessionError> {
        self.config.validate()?;
        if self.connect_timeout.is_zero() {
            return Err(SessionError::Configuration(
                "connect timeout must be positive".to_string(),
            ));
        }
        let codec: Arc<dyn Codec> = match self.codec {
            Some(codec) if codec.begin_string() != self.config.begin_string => {
                return Err(SessionError::Configuration(format!(
                    "codec writes {} but the session uses {}",
                    codec.begin_string(),
                    self.config.begin_string
                )));
            }
            Some(codec) => codec,
            None => Arc::new(
                TagValueCodec::new(self.config.begin_string.clone())
                    .with_checksum_validation(self.config.validate_checksum),
            ),
        };
        Ok(Engine::from_parts(EngineParts {
            store: self
                .store
                .unwrap_or_else(|| Arc::new(MemoryStore::new())),
            validator: self.validator,
            codec,
            connect_timeout: self.connect_timeout,
            listeners: self.listeners,
            config: self.config,
        }))
    }
}

impl std::fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("config", &self.config)
            .field("connect_timeout", &self.connect_timeout)
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}
