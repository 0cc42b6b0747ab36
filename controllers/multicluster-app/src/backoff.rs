//! Fibonacci requeue backoff
//!
//! Failed reconciliations are requeued with a progressively growing delay.
//! Fibonacci growth is gentler than exponential, which suits installs that
//! fail for a while (unreachable cluster, chart repo outage) and then
//! recover: 1m, 1m, 2m, 3m, 5m, 8m, then capped at 10m.

use std::time::Duration;

/// Per-resource backoff state following the Fibonacci sequence.
///
/// Each delay is the sum of the previous two, starting at the floor and
/// capped at the ceiling. [`reset`] restarts the sequence after a
/// successful reconciliation.
///
/// [`reset`]: FibonacciBackoff::reset
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    floor_secs: u64,
    cap_secs: u64,
    prev_secs: u64,
    current_secs: u64,
}

impl FibonacciBackoff {
    /// Creates a backoff starting at `floor` and capped at `cap`.
    pub fn new(floor: Duration, cap: Duration) -> Self {
        Self {
            floor_secs: floor.as_secs(),
            cap_secs: cap.as_secs(),
            prev_secs: 0,
            current_secs: floor.as_secs(),
        }
    }

    /// Returns the next delay and advances the sequence.
    pub fn next_delay(&mut self) -> Duration {
        let delay = Duration::from_secs(self.current_secs);
        let next = self.prev_secs + self.current_secs;
        self.prev_secs = self.current_secs;
        self.current_secs = next.min(self.cap_secs);
        delay
    }

    /// Restarts the sequence from the floor.
    pub fn reset(&mut self) {
        self.prev_secs = 0;
        self.current_secs = self.floor_secs;
    }
}

impl Default for FibonacciBackoff {
    /// Reconciliation default: 1 minute floor, 10 minute cap.
    fn default() -> Self {
        Self::new(Duration::from_secs(60), Duration::from_secs(600))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_follows_fibonacci_up_to_the_cap() {
        let mut backoff = FibonacciBackoff::default();
        let delays: Vec<u64> = (0..8).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![60, 60, 120, 180, 300, 480, 600, 600]);
    }

    #[test]
    fn test_stays_at_cap_once_reached() {
        let mut backoff = FibonacciBackoff::new(Duration::from_secs(1), Duration::from_secs(3));
        assert_eq!(backoff.next_delay().as_secs(), 1);
        assert_eq!(backoff.next_delay().as_secs(), 1);
        assert_eq!(backoff.next_delay().as_secs(), 2);
        assert_eq!(backoff.next_delay().as_secs(), 3);
        assert_eq!(backoff.next_delay().as_secs(), 3);
        assert_eq!(backoff.next_delay().as_secs(), 3);
    }

    #[test]
    fn test_reset_restarts_from_the_floor() {
        let mut backoff = FibonacciBackoff::default();
        for _ in 0..5 {
            backoff.next_delay();
        }
        backoff.reset();
        assert_eq!(backoff.next_delay().as_secs(), 60);
        assert_eq!(backoff.next_delay().as_secs(), 60);
        assert_eq!(backoff.next_delay().as_secs(), 120);
    }
}
