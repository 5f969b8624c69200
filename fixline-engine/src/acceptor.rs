/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Server side: accepts counterparties and runs one task per connection.

use crate::connection::Role;
use crate::engine::Engine;
use fixline_core::error::FixError;
use fixline_transport::tcp;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::{TcpListener, ToSocketAddrs};
use tracing::{info, warn};

/// Listens for counterparties and hands each socket to the engine.
#[derive(Debug)]
pub struct Acceptor {
    engine: Engine,
    listener: TcpListener,
}

impl Acceptor {
    /// Binds the listening socket.
    ///
    /// # Errors
    /// Returns the bind error.
    pub async fn bind<A: ToSocketAddrs>(engine: Engine, addr: A) -> Result<Self, FixError> {
        let listener = tcp::listen(addr).await?;
        Ok(Self { engine, listener })
    }

    /// Address the acceptor is listening on.
    ///
    /// # Errors
    /// Returns the socket error.
    pub fn local_addr(&self) -> Result<SocketAddr, FixError> {
        Ok(self.listener.local_addr()?)
    }

    /// The engine new connections run on.
    #[must_use]
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Accepts connections forever.
    ///
    /// # Errors
    /// Never returns `Ok`; failed accepts are logged and skipped.
    pub async fn run(self) -> Result<(), FixError> {
        self.run_until(std::future::pending()).await
    }

    /// Accepts connections until `shutdown` completes. Connections already
    /// running are left alone.
    ///
    /// # Errors
    /// Reserved for listener failures; failed accepts are logged and skipped.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), FixError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("acceptor stopping");
                    return Ok(());
                }
                accepted = tcp::accept(&self.listener) => match accepted {
                    Ok((stream, peer)) => {
                        let handle = self.engine.spawn(stream, Role::Acceptor, Some(peer));
                        info!(connection = handle.id(), %peer, "counterparty connected");
                    }
                    Err(err) => warn!(error = %err, "accept failed"),
                },
            }
        }
    }
}
