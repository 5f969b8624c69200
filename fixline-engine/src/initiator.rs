/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Client side: connects to a counterparty and logs on.

use crate::connection::{Connection, ConnectionHandle, Role};
use crate::engine::Engine;
use fixline_core::error::FixError;
use fixline_transport::tcp;
use tokio::net::ToSocketAddrs;
use tracing::{debug, info};

/// Opens connections that send the Logon.
///
/// Connections are one-shot: when one ends, call [`Initiator::connect`]
/// again to start over.
#[derive(Debug, Clone)]
pub struct Initiator {
    engine: Engine,
}

impl Initiator {
    /// Creates an initiator for the engine.
    #[must_use]
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }

    /// The engine connections run on.
    #[must_use]
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Connects without starting the connection, so handlers can be added
    /// before the Logon goes out.
    ///
    /// # Errors
    /// Returns the connect error, including a timeout.
    pub async fn open<A: ToSocketAddrs>(&self, addr: A) -> Result<Connection, FixError> {
        let stream = tcp::connect(addr, self.engine.connect_timeout()).await?;
        let peer = stream.peer_addr().ok();
        info!(peer = ?peer, "connected to counterparty");
        Ok(self.engine.connection(stream, Role::Initiator, peer))
    }

    /// Connects and runs the connection on its own task.
    ///
    /// # Errors
    /// Returns the connect error, including a timeout.
    pub async fn connect<A: ToSocketAddrs>(&self, addr: A) -> Result<ConnectionHandle, FixError> {
        let connection = self.open(addr).await?;
        let handle = connection.handle();
        tokio::spawn(async move {
            if let Err(err) = connection.run().await {
                debug!(error = %err, "connection task ended with error");
            }
        });
        Ok(handle)
    }
}
