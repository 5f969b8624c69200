/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Connection lifecycle state machine.
//!
//! ```text
//! Disconnected -> Connecting -> LogonPending -> Connected -> Disconnecting -> Disconnected
//!                      |              |  \
//!                      +--------------+---+--> Disconnecting
//!                                     +------> Disconnected   (logon rejected)
//! ```

use fixline_core::error::SessionError;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Lifecycle state of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No transport, or the connection has ended.
    #[default]
    Disconnected,
    /// Transport established, logon not yet started.
    Connecting,
    /// Logon received (acceptor) or sent (initiator), not yet completed.
    LogonPending,
    /// Logon completed; application messages may flow.
    Connected,
    /// Logout or failure in progress; the socket is being closed.
    Disconnecting,
}

impl ConnectionState {
    /// Returns true if the lifecycle allows moving from `self` to `to`.
    #[must_use]
    pub const fn can_transition_to(self, to: Self) -> bool {
        use ConnectionState::{Connected, Connecting, Disconnected, Disconnecting, LogonPending};
        matches!(
            (self, to),
            (Disconnected, Connecting)
                | (Connecting, LogonPending)
                | (Connecting, Disconnecting)
                | (LogonPending, Connected)
                | (LogonPending, Disconnected)
                | (LogonPending, Disconnecting)
                | (Connected, Disconnecting)
                | (Disconnecting, Disconnected)
        )
    }

    /// Returns true while the logon handshake has not completed.
    #[must_use]
    pub const fn is_logging_on(self) -> bool {
        matches!(self, Self::Connecting | Self::LogonPending)
    }

    /// Returns the state name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::LogonPending => "LogonPending",
            Self::Connected => "Connected",
            Self::Disconnecting => "Disconnecting",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks the current state and enforces the allowed transitions.
#[derive(Debug)]
pub struct StateMachine {
    state: ConnectionState,
    entered_at: Instant,
}

impl StateMachine {
    /// Creates a machine in `Disconnected`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            entered_at: Instant::now(),
        }
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Moves to `to` and returns the previous state.
    ///
    /// # Errors
    /// Returns `SessionError::InvalidTransition` if the edge is not part of
    /// the lifecycle; the state is left unchanged.
    pub fn transition(&mut self, to: ConnectionState) -> Result<ConnectionState, SessionError> {
        if !self.state.can_transition_to(to) {
            return Err(SessionError::InvalidTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        let from = std::mem::replace(&mut self.state, to);
        self.entered_at = Instant::now();
        Ok(from)
    }

    /// Time spent in the current state.
    #[must_use]
    pub fn time_in_state(&self) -> Duration {
        self.entered_at.elapsed()
    }

    /// Fails unless the machine is in `expected`.
    ///
    /// # Errors
    /// Returns `SessionError::InvalidState`.
    pub fn require(&self, expected: ConnectionState) -> Result<(), SessionError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SessionError::InvalidState {
                expected: expected.to_string(),
                current: self.state.to_string(),
            })
        }
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
