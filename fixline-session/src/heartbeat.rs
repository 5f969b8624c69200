/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Heartbeat and TestRequest management.
//!
//! - Sending heartbeats when we have been quiet for an interval
//! - Sending a TestRequest when the counterparty has been quiet for an
//!   interval plus a grace period
//! - Detecting a TestRequest left unanswered for a full interval

use fixline_core::types::Timestamp;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// What the timer tick asks the connection to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatAction {
    /// Nothing is due.
    Idle,
    /// Send a Heartbeat.
    SendHeartbeat,
    /// Send a TestRequest with this TestReqID.
    SendTestRequest(String),
    /// The counterparty never answered our TestRequest.
    TimedOut {
        /// Time since the last inbound message.
        elapsed: Duration,
    },
}

/// Manages heartbeat timing for a FIX session.
#[derive(Debug)]
pub struct HeartbeatManager {
    interval: Duration,
    grace: Duration,
    last_sent: Instant,
    last_received: Instant,
    test_request_pending: Option<String>,
    test_request_sent_at: Option<Instant>,
}

impl HeartbeatManager {
    /// Creates a new heartbeat manager.
    #[must_use]
    pub fn new(interval: Duration, grace: Duration) -> Self {
        let now = Instant::now();
        Self {
            interval,
            grace,
            last_sent: now,
            last_received: now,
            test_request_pending: None,
            test_request_sent_at: None,
        }
    }

    /// Records that a message was sent.
    #[inline]
    pub fn on_message_sent(&mut self) {
        self.last_sent = Instant::now();
    }

    /// Records that a message was received.
    ///
    /// Any inbound message proves the counterparty is alive, so an
    /// outstanding TestRequest is no longer awaited.
    pub fn on_message_received(&mut self) {
        self.last_received = Instant::now();
        self.test_request_pending = None;
        self.test_request_sent_at = None;
    }

    /// Checks if a heartbeat should be sent.
    #[must_use]
    pub fn should_send_heartbeat(&self) -> bool {
        self.last_sent.elapsed() >= self.interval
    }

    /// Checks if a TestRequest should be sent.
    #[must_use]
    pub fn should_send_test_request(&self) -> bool {
        self.test_request_pending.is_none()
            && self.last_received.elapsed() >= self.interval + self.grace
    }

    /// Checks whether a TestRequest has gone unanswered for an interval.
    #[must_use]
    pub fn is_timed_out(&self) -> bool {
        self.test_request_sent_at
            .is_some_and(|sent_at| sent_at.elapsed() >= self.interval)
    }

    /// Records that a TestRequest was sent.
    pub fn on_test_request_sent(&mut self, test_req_id: String) {
        let now = Instant::now();
        self.test_request_pending = Some(test_req_id);
        self.test_request_sent_at = Some(now);
        self.last_sent = now;
    }

    /// Evaluates the timers.
    ///
    /// A returned TestRequest is recorded as pending; the caller only has to
    /// send it.
    pub fn tick(&mut self) -> HeartbeatAction {
        if self.is_timed_out() {
            return HeartbeatAction::TimedOut {
                elapsed: self.last_received.elapsed(),
            };
        }
        if self.should_send_test_request() {
            let id = generate_test_req_id();
            self.on_test_request_sent(id.clone());
            return HeartbeatAction::SendTestRequest(id);
        }
        if self.should_send_heartbeat() {
            return HeartbeatAction::SendHeartbeat;
        }
        HeartbeatAction::Idle
    }

    /// Returns the pending TestRequest ID, if any.
    #[must_use]
    pub fn pending_test_request(&self) -> Option<&str> {
        self.test_request_pending.as_deref()
    }

    /// Returns the time since the last message was received.
    #[must_use]
    pub fn time_since_last_received(&self) -> Duration {
        self.last_received.elapsed()
    }

    /// Returns the heartbeat interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Changes the interval, e.g. to the value negotiated at logon.
    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    /// Resets the manager state.
    pub fn reset(&mut self) {
        let now = Instant::now();
        self.last_sent = now;
        self.last_received = now;
        self.test_request_pending = None;
        self.test_request_sent_at = None;
    }
}

/// Generates a unique TestReqID.
#[must_use]
pub fn generate_test_req_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("TEST{}-{}", Timestamp::now().as_millis(), n)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> HeartbeatManager {
        HeartbeatManager::new(Duration::from_secs(30), Duration::from_secs(1))
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_due_after_interval() {
        let mut mgr = manager();
        assert_eq!(mgr.tick(), HeartbeatAction::Idle);

        tokio::time::advance(Duration::from_secs(30)).await;
        mgr.on_message_received();
        assert_eq!(mgr.tick(), HeartbeatAction::SendHeartbeat);

        mgr.on_message_sent();
        assert_eq!(mgr.tick(), HeartbeatAction::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_test_request_after_interval_plus_grace() {
        let mut mgr = manager();

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(!mgr.should_send_test_request());

        tokio::time::advance(Duration::from_secs(1)).await;
        let HeartbeatAction::SendTestRequest(id) = mgr.tick() else {
            panic!("expected a TestRequest");
        };
        assert_eq!(mgr.pending_test_request(), Some(id.as_str()));
        // only one outstanding request at a time
        assert!(!mgr.should_send_test_request());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_test_request_times_out() {
        let mut mgr = manager();
        mgr.on_test_request_sent("T1".to_string());

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(!mgr.is_timed_out());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(matches!(mgr.tick(), HeartbeatAction::TimedOut { .. }));
    }

    #[test]
    fn test_any_inbound_message_clears_test_request() {
        let mut mgr = manager();
        mgr.on_test_request_sent("TEST123".to_string());
        assert_eq!(mgr.pending_test_request(), Some("TEST123"));

        mgr.on_message_received();
        assert!(mgr.pending_test_request().is_none());
        assert!(!mgr.is_timed_out());
    }

    #[tokio::test(start_paused = true)]
    async fn test_traffic_after_test_request_keeps_session_alive() {
        let mut mgr = manager();
        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(matches!(mgr.tick(), HeartbeatAction::SendTestRequest(_)));

        // application traffic instead of the Heartbeat answer
        for _ in 0..12 {
            tokio::time::advance(Duration::from_secs(5)).await;
            mgr.on_message_received();
            assert!(!matches!(mgr.tick(), HeartbeatAction::TimedOut { .. }));
        }

        // then silence: a fresh TestRequest, and a timeout one interval later
        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(matches!(mgr.tick(), HeartbeatAction::SendTestRequest(_)));
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(matches!(mgr.tick(), HeartbeatAction::TimedOut { .. }));
    }

    #[test]
    fn test_generate_test_req_id_is_unique() {
        let id1 = generate_test_req_id();
        let id2 = generate_test_req_id();
        assert!(id1.starts_with("TEST"));
        assert_ne!(id1, id2);
    }
}
