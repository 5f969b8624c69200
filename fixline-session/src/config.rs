/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Session configuration.

use crate::sequence::SequencePolicy;
use fixline_core::error::SessionError;
use fixline_core::types::CompId;
use std::time::Duration;

/// Configuration for a FIX session.
///
/// On an acceptor this is the template applied to every inbound
/// connection; `target_comp_id` may be left unset to accept any
/// counterparty the session validator lets through.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Our CompID (tag 49 on outbound messages).
    pub sender_comp_id: CompId,
    /// Expected counterparty CompID (tag 56 on outbound messages).
    pub target_comp_id: Option<CompId>,
    /// FIX version BeginString (e.g., "FIX.4.4").
    pub begin_string: String,
    /// Heartbeat interval. An acceptor adopts the interval requested in the
    /// counterparty's Logon.
    pub heartbeat_interval: Duration,
    /// Whether to reset sequence numbers on every logon.
    pub reset_on_logon: bool,
    /// Whether to reset sequence numbers after a logout exchange.
    pub reset_on_logout: bool,
    /// Whether to reset sequence numbers when the connection drops.
    pub reset_on_disconnect: bool,
    /// Maximum frame size in bytes.
    pub max_message_size: usize,
    /// Time allowed for the logon handshake.
    pub logon_timeout: Duration,
    /// Time allowed for the counterparty to answer our Logout.
    pub logout_timeout: Duration,
    /// Whether to validate incoming message checksums.
    pub validate_checksum: bool,
    /// Extra silence tolerated past the heartbeat interval before a
    /// TestRequest is sent.
    pub test_request_grace: Duration,
    /// Granularity of the connection's timer tick.
    pub timer_resolution: Duration,
    /// Handling of out-of-sequence inbound messages.
    pub sequence_policy: SequencePolicy,
}

impl SessionConfig {
    /// Creates a configuration with default timings.
    #[must_use]
    pub fn new(sender_comp_id: CompId, begin_string: impl Into<String>) -> Self {
        Self {
            sender_comp_id,
            target_comp_id: None,
            begin_string: begin_string.into(),
            heartbeat_interval: Duration::from_secs(30),
            reset_on_logon: false,
            reset_on_logout: false,
            reset_on_disconnect: false,
            max_message_size: 1024 * 1024,
            logon_timeout: Duration::from_secs(10),
            logout_timeout: Duration::from_secs(10),
            validate_checksum: true,
            test_request_grace: Duration::from_secs(1),
            timer_resolution: Duration::from_millis(250),
            sequence_policy: SequencePolicy::default(),
        }
    }

    /// Sets the expected counterparty CompID.
    #[must_use]
    pub fn with_target_comp_id(mut self, target: CompId) -> Self {
        self.target_comp_id = Some(target);
        self
    }

    /// Sets the heartbeat interval.
    #[must_use]
    pub const fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Sets whether to reset sequence numbers on logon.
    #[must_use]
    pub const fn with_reset_on_logon(mut self, reset: bool) -> Self {
        self.reset_on_logon = reset;
        self
    }

    /// Sets whether to reset sequence numbers after logout.
    #[must_use]
    pub const fn with_reset_on_logout(mut self, reset: bool) -> Self {
        self.reset_on_logout = reset;
        self
    }

    /// Sets whether to reset sequence numbers on disconnect.
    #[must_use]
    pub const fn with_reset_on_disconnect(mut self, reset: bool) -> Self {
        self.reset_on_disconnect = reset;
        self
    }

    /// Sets the maximum frame size.
    #[must_use]
    pub const fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Sets the logon timeout.
    #[must_use]
    pub const fn with_logon_timeout(mut self, timeout: Duration) -> Self {
        self.logon_timeout = timeout;
        self
    }

    /// Sets the logout timeout.
    #[must_use]
    pub const fn with_logout_timeout(mut self, timeout: Duration) -> Self {
        self.logout_timeout = timeout;
        self
    }

    /// Sets the TestRequest grace period.
    #[must_use]
    pub const fn with_test_request_grace(mut self, grace: Duration) -> Self {
        self.test_request_grace = grace;
        self
    }

    /// Sets the timer tick granularity.
    #[must_use]
    pub const fn with_timer_resolution(mut self, resolution: Duration) -> Self {
        self.timer_resolution = resolution;
        self
    }

    /// Sets the sequence policy.
    #[must_use]
    pub const fn with_sequence_policy(mut self, policy: SequencePolicy) -> Self {
        self.sequence_policy = policy;
        self
    }

    /// Returns the heartbeat interval in whole seconds, as sent in HeartBtInt.
    #[must_use]
    pub fn heartbeat_interval_secs(&self) -> u64 {
        self.heartbeat_interval.as_secs()
    }

    /// Checks the configuration for values the session cannot run with.
    ///
    /// # Errors
    /// Returns `SessionError::Configuration` describing the first problem.
    pub fn validate(&self) -> Result<(), SessionError> {
        if !self.begin_string.starts_with("FIX") {
            return Err(SessionError::Configuration(format!(
                "unsupported begin string '{}'",
                self.begin_string
            )));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(SessionError::Configuration(
                "heartbeat interval must be positive".to_string(),
            ));
        }
        if self.timer_resolution.is_zero() {
            return Err(SessionError::Configuration(
                "timer resolution must be positive".to_string(),
            ));
        }
        if self.sequence_policy.max_buffered_messages == 0 {
            return Err(SessionError::Configuration(
                "max_buffered_messages must be at least 1".to_string(),
            ));
        }
        if self.max_message_size < 32 {
            return Err(SessionError::Configuration(format!(
                "max message size {} is too small",
                self.max_message_size
            )));
        }
        Ok(())
    }
}

/// Builder for session configuration.
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    sender_comp_id: Option<CompId>,
    target_comp_id: Option<CompId>,
    begin_string: Option<String>,
    heartbeat_interval: Option<Duration>,
    reset_on_logon: bool,
    max_message_size: Option<usize>,
    logon_timeout: Option<Duration>,
    sequence_policy: Option<SequencePolicy>,
}

impl SessionConfigBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets our CompID.
    #[must_use]
    pub fn sender_comp_id(mut self, id: CompId) -> Self {
        self.sender_comp_id = Some(id);
        self
    }

    /// Sets the expected counterparty CompID.
    #[must_use]
    pub fn target_comp_id(mut self, id: CompId) -> Self {
        self.target_comp_id = Some(id);
        self
    }

    /// Sets the FIX version.
    #[must_use]
    pub fn begin_string(mut self, version: impl Into<String>) -> Self {
        self.begin_string = Some(version.into());
        self
    }

    /// Sets the heartbeat interval.
    #[must_use]
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = Some(interval);
        self
    }

    /// Sets whether to reset on logon.
    #[must_use]
    pub const fn reset_on_logon(mut self, reset: bool) -> Self {
        self.reset_on_logon = reset;
        self
    }

    /// Sets the maximum frame size.
    #[must_use]
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = Some(size);
        self
    }

    /// Sets the logon timeout.
    #[must_use]
    pub fn logon_timeout(mut self, timeout: Duration) -> Self {
        self.logon_timeout = Some(timeout);
        self
    }

    /// Sets the sequence policy.
    #[must_use]
    pub fn sequence_policy(mut self, policy: SequencePolicy) -> Self {
        self.sequence_policy = Some(policy);
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    /// Returns `SessionError::Configuration` if `sender_comp_id` is missing
    /// or a value is out of range.
    pub fn build(self) -> Result<SessionConfig, SessionError> {
        let sender = self
            .sender_comp_id
            .ok_or_else(|| SessionError::Configuration("sender_comp_id is required".to_string()))?;
        let begin_string = self.begin_string.unwrap_or_else(|| "FIX.4.4".to_string());

        let mut config = SessionConfig::new(sender, begin_string);
        config.target_comp_id = self.target_comp_id;
        config.reset_on_logon = self.reset_on_logon;
        if let Some(interval) = self.heartbeat_interval {
            config.heartbeat_interval = interval;
        }
        if let Some(size) = self.max_message_size {
            config.max_message_size = size;
        }
        if let Some(timeout) = self.logon_timeout {
            config.logon_timeout = timeout;
        }
        if let Some(policy) = self.sequence_policy {
            config.sequence_policy = policy;
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::TooLowAction;

    #[test]
    fn test_session_config_new() {
        let config = SessionConfig::new(CompId::new("SERVER").unwrap(), "FIX.4.4");

        assert_eq!(config.sender_comp_id.as_str(), "SERVER");
        assert!(config.target_comp_id.is_none());
        assert_eq!(config.begin_string, "FIX.4.4");
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.sequence_policy.too_low, TooLowAction::Disconnect);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_session_config_builder() {
        let config = SessionConfigBuilder::new()
            .sender_comp_id(CompId::new("CLIENT").unwrap())
            .target_comp_id(CompId::new("SERVER").unwrap())
            .begin_string("FIX.4.2")
            .heartbeat_interval(Duration::from_secs(60))
            .reset_on_logon(true)
            .build()
            .unwrap();

        assert_eq!(config.begin_string, "FIX.4.2");
        assert_eq!(config.target_comp_id.unwrap().as_str(), "SERVER");
        assert_eq!(config.heartbeat_interval, Duration::from_secs(60));
        assert!(config.reset_on_logon);
    }

    #[test]
    fn test_session_config_builder_requires_sender() {
        let err = SessionConfigBuilder::new().build().unwrap_err();
        assert!(matches!(err, SessionError::Configuration(_)));
    }

    #[test]
    fn test_session_config_rejects_bad_values() {
        let err = SessionConfigBuilder::new()
            .sender_comp_id(CompId::new("CLIENT").unwrap())
            .heartbeat_interval(Duration::ZERO)
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            SessionError::Configuration("heartbeat interval must be positive".to_string())
        );

        let config = SessionConfig::new(CompId::new("CLIENT").unwrap(), "HTTP/1.1");
        assert!(config.validate().is_err());
    }
}
