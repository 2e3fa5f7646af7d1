//! Feedback timeout for exchanges in transit.

use std::time::Duration;

use tokio::time::Instant;

/// Name of the timer class shared by all handlers.
pub const FEEDBACK_TIMER: &str = "netlink feedback timer";

/// A non-repeating timeout bound to one handler.
///
/// The binding only records a deadline; whoever drives the handler waits for
/// it and calls [`NetlinkHandler::handle_timeout`](super::NetlinkHandler::handle_timeout).
#[derive(Debug, Clone)]
pub struct TimeoutBinding {
    interval: Duration,
    deadline: Option<Instant>,
}

impl TimeoutBinding {
    /// Create an unarmed binding.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
        }
    }

    /// Arm the timeout, or push an armed deadline out by a full interval.
    pub fn arm(&mut self) {
        self.deadline = Some(Instant::now() + self.interval);
    }

    /// Cancel the timeout.
    pub fn stop(&mut self) {
        self.deadline = None;
    }

    /// True while a deadline is pending.
    pub fn is_active(&self) -> bool {
        self.deadline.is_some()
    }

    /// The pending deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The configured interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// True if armed and the deadline has passed at `now`.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| deadline <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arm_and_stop() {
        let mut timeout = TimeoutBinding::new(Duration::from_millis(100));
        assert!(!timeout.is_active());
        assert!(timeout.deadline().is_none());

        timeout.arm();
        assert!(timeout.is_active());
        timeout.stop();
        assert!(!timeout.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_moves_deadline() {
        let mut timeout = TimeoutBinding::new(Duration::from_millis(100));
        timeout.arm();
        let first = timeout.deadline().unwrap();

        tokio::time::advance(Duration::from_millis(60)).await;
        assert!(!timeout.is_expired(Instant::now()));
        timeout.arm();
        assert_eq!(timeout.deadline().unwrap(), first + Duration::from_millis(60));

        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(timeout.is_expired(Instant::now()));
    }
}
