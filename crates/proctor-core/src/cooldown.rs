use std::time::{Duration, Instant};

/// Minimum interval between two emissions of a warning category.
///
/// The gate opens strictly after `interval` has elapsed since the last
/// emission; a gate that has never fired is open.
#[derive(Debug, Clone)]
pub struct Cooldown {
    interval: Duration,
    last_fired: Option<Instant>,
}

impl Cooldown {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_fired: None,
        }
    }

    pub fn last_fired(&self) -> Option<Instant> {
        self.last_fired
    }

    /// Whether a warning may be emitted at `now`.
    pub fn is_ready(&self, now: Instant) -> bool {
        match self.last_fired {
            None => true,
            Some(last) => now.saturating_duration_since(last) > self.interval,
        }
    }

    /// Open the gate at `now` if allowed, recording the emission.
    ///
    /// Returns `false` (and leaves the timestamp untouched) when suppressed.
    pub fn try_fire(&mut self, now: Instant) -> bool {
        if !self.is_ready(now) {
            return false;
        }
        self.last_fired = Some(now);
        true
    }

    pub fn reset(&mut self) {
        self.last_fired = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_fire_allowed() {
        let mut cd = Cooldown::new(Duration::from_secs(5));
        assert!(cd.is_ready(Instant::now()));
        assert!(cd.try_fire(Instant::now()));
    }

    #[test]
    fn test_suppresses_within_interval() {
        let t0 = Instant::now();
        let mut cd = Cooldown::new(Duration::from_secs(5));
        assert!(cd.try_fire(t0));
        assert!(!cd.try_fire(t0 + Duration::from_secs(3)));
        // Suppressed attempts do not push the window forward
        assert_eq!(cd.last_fired(), Some(t0));
        assert!(cd.try_fire(t0 + Duration::from_secs(6)));
    }

    #[test]
    fn test_boundary_is_exclusive() {
        let t0 = Instant::now();
        let mut cd = Cooldown::new(Duration::from_secs(2));
        cd.try_fire(t0);
        assert!(!cd.is_ready(t0 + Duration::from_secs(2)));
        assert!(cd.is_ready(t0 + Duration::from_millis(2001)));
    }

    #[test]
    fn test_reset_reopens() {
        let t0 = Instant::now();
        let mut cd = Cooldown::new(Duration::from_secs(60));
        cd.try_fire(t0);
        cd.reset();
        assert!(cd.try_fire(t0 + Duration::from_secs(1)));
    }
}
