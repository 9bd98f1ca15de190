//! Bounded scanning countdown.

use std::time::Duration;

/// Progress counter that fills from 0 to `max` over `duration`.
///
/// Owns no timer: time only moves through [`Countdown::advance`].
#[derive(Clone, Debug)]
pub struct Countdown {
    duration: Duration,
    elapsed: Duration,
    max: u32,
}

impl Countdown {
    pub fn new(duration: Duration, max: u32) -> Self {
        Self {
            duration,
            elapsed: Duration::ZERO,
            max,
        }
    }

    /// Add elapsed time and return the new progress.
    pub fn advance(&mut self, delta: Duration) -> u32 {
        self.elapsed = self.elapsed.saturating_add(delta);
        self.progress()
    }

    /// Proportional progress, exactly `max` once the duration has passed.
    pub fn progress(&self) -> u32 {
        if self.is_expired() {
            return self.max;
        }
        let scaled = u128::from(self.max) * self.elapsed.as_nanos() / self.duration.as_nanos().max(1);
        scaled.min(u128::from(self.max)) as u32
    }

    pub fn is_expired(&self) -> bool {
        self.elapsed >= self.duration
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn remaining(&self) -> Duration {
        self.duration.saturating_sub(self.elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_is_proportional() {
        let mut countdown = Countdown::new(Duration::from_secs(10), 100);
        assert_eq!(countdown.progress(), 0);
        assert_eq!(countdown.advance(Duration::from_secs(1)), 10);
        assert_eq!(countdown.advance(Duration::from_millis(4500)), 55);
        assert!(!countdown.is_expired());
        assert_eq!(countdown.remaining(), Duration::from_millis(4500));
    }

    #[test]
    fn test_expiry_pins_to_max() {
        let mut countdown = Countdown::new(Duration::from_secs(3), 100);
        countdown.advance(Duration::from_secs(2));
        assert_eq!(countdown.advance(Duration::from_secs(5)), 100);
        assert!(countdown.is_expired());
        assert_eq!(countdown.remaining(), Duration::ZERO);
    }

    #[test]
    fn test_uneven_ticks_reach_max_exactly() {
        let mut countdown = Countdown::new(Duration::from_millis(1000), 100);
        for _ in 0..3 {
            countdown.advance(Duration::from_millis(333));
        }
        assert_eq!(countdown.progress(), 99);
        countdown.advance(Duration::from_millis(1));
        assert_eq!(countdown.progress(), 100);
    }
}
