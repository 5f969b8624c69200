/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Configuration and logging shared by the demos.

#![allow(dead_code)]

use anyhow::Context;
use fixline::prelude::{CompId, SessionConfig};
use std::env;
use std::time::Duration;

/// Default server port.
pub const DEFAULT_PORT: u16 = 9898;

/// Default server host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Demo configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ExampleConfig {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Our CompID.
    pub sender_comp_id: String,
    /// The counterparty's CompID.
    pub target_comp_id: String,
    /// Heartbeat interval in seconds.
    pub heartbeat_interval: u64,
}

impl ExampleConfig {
    /// Client side: CLIENT talking to SERVER.
    #[must_use]
    pub fn client() -> Self {
        Self::from_env("CLIENT", "SERVER")
    }

    /// Server side: SERVER accepting CLIENT.
    #[must_use]
    pub fn server() -> Self {
        Self::from_env("SERVER", "CLIENT")
    }

    fn from_env(sender: &str, target: &str) -> Self {
        Self {
            host: env::var("FIX_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string()),
            port: env::var("FIX_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            sender_comp_id: env::var("FIX_SENDER").unwrap_or_else(|_| sender.to_string()),
            target_comp_id: env::var("FIX_TARGET").unwrap_or_else(|_| target.to_string()),
            heartbeat_interval: env::var("FIX_HEARTBEAT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
        }
    }

    /// Returns the socket address string.
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Session settings for this side.
    ///
    /// # Errors
    /// Fails if a CompID is empty or too long.
    pub fn session_config(&self, with_target: bool) -> anyhow::Result<SessionConfig> {
        let sender = CompId::new(&self.sender_comp_id)
            .with_context(|| format!("invalid sender CompID {:?}", self.sender_comp_id))?;
        let mut config = SessionConfig::new(sender, "FIX.4.4")
            .with_heartbeat_interval(Duration::from_secs(self.heartbeat_interval));
        if with_target {
            let target = CompId::new(&self.target_comp_id)
                .with_context(|| format!("invalid target CompID {:?}", self.target_comp_id))?;
            config = config.with_target_comp_id(target);
        }
        Ok(config)
    }
}

/// Initializes logging for the demos.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .try_init();
}
