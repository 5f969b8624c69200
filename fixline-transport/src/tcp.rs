/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! TCP helpers for acceptors and initiators.

use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tracing::{debug, info};

/// Binds a listener on the given address.
///
/// # Errors
/// Returns the bind error.
pub async fn listen<A: ToSocketAddrs>(addr: A) -> std::io::Result<TcpListener> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "listening for FIX connections");
    Ok(listener)
}

/// Accepts one connection and disables Nagle on it.
///
/// # Errors
/// Returns the accept error.
pub async fn accept(listener: &TcpListener) -> std::io::Result<(TcpStream, SocketAddr)> {
    let (stream, peer) = listener.accept().await?;
    stream.set_nodelay(true)?;
    debug!(%peer, "accepted connection");
    Ok((stream, peer))
}

/// Connects to a counterparty, failing after `timeout`.
///
/// # Errors
/// Returns `TimedOut` if the connection is not established in time, or the
/// underlying connect error.
pub async fn connect<A: ToSocketAddrs>(addr: A, timeout: Duration) -> std::io::Result<TcpStream> {
    let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"))??;
    stream.set_nodelay(true)?;
    debug!(peer = ?stream.peer_addr().ok(), "connected");
    Ok(stream)
}
