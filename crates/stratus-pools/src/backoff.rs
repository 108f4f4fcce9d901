//! Reconnect pacing and error-log throttling.

use std::time::Duration;

/// Exponential backoff: 500 ms, doubling, capped at 30 s.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    cap: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new() -> Self {
        Self {
            initial: Duration::from_millis(500),
            cap: Duration::from_secs(30),
            attempt: 0,
        }
    }

    /// Delay before the next attempt; advances the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let factor = 1u64 << self.attempt.min(10);
        let delay = self.initial.saturating_mul(factor as u32).min(self.cap);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// A successful use resets the schedule.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

/// Log on the first error and every Nth thereafter, so a flapping handle
/// does not flood the log.
#[derive(Debug)]
pub struct LogThrottle {
    every: u32,
    count: u32,
}

impl LogThrottle {
    pub fn new(every: u32) -> Self {
        Self {
            every: every.max(1),
            count: 0,
        }
    }

    pub fn should_log(&mut self) -> bool {
        let log = self.count % self.every == 0;
        self.count = self.count.saturating_add(1);
        log
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_from_500ms() {
        let mut b = Backoff::new();
        assert_eq!(b.next_delay(), Duration::from_millis(500));
        assert_eq!(b.next_delay(), Duration::from_millis(1000));
        assert_eq!(b.next_delay(), Duration::from_millis(2000));
        assert_eq!(b.attempts(), 3);
    }

    #[test]
    fn test_backoff_caps_at_30s() {
        let mut b = Backoff::new();
        let mut last = Duration::ZERO;
        for _ in 0..12 {
            last = b.next_delay();
        }
        assert_eq!(last, Duration::from_secs(30));
    }

    #[test]
    fn test_backoff_reset() {
        let mut b = Backoff::new();
        b.next_delay();
        b.next_delay();
        b.reset();
        assert_eq!(b.next_delay(), Duration::from_millis(500));
    }

    #[test]
    fn test_throttle_first_and_every_nth() {
        let mut t = LogThrottle::new(5);
        let logged: Vec<bool> = (0..11).map(|_| t.should_log()).collect();
        assert_eq!(
            logged,
            vec![true, false, false, false, false, true, false, false, false, false, true]
        );
    }
}
