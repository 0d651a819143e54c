use std::time::{Duration, Instant};

/// Quiet period before an automatically triggered legacy run fires.
pub const QUIET_PERIOD: Duration = Duration::from_millis(300);

/// A single cancellable deadline: only the last scheduling within the quiet
/// period fires.
#[derive(Debug, Clone)]
pub struct Debouncer {
    quiet: Duration,
    deadline: Option<Instant>,
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(QUIET_PERIOD)
    }
}

impl Debouncer {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            deadline: None,
        }
    }

    /// (Re)starts the quiet period at `now`, replacing any pending deadline.
    pub fn schedule(&mut self, now: Instant) {
        self.deadline = Some(now + self.quiet);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    #[inline]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Consumes the deadline if it has passed.
    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(d) if now >= d => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_after_quiet_period() {
        let t0 = Instant::now();
        let mut d = Debouncer::default();
        d.schedule(t0);
        assert!(!d.fire_if_due(t0 + Duration::from_millis(299)));
        assert!(d.fire_if_due(t0 + QUIET_PERIOD));
        assert!(!d.fire_if_due(t0 + Duration::from_secs(1)));
    }

    #[test]
    fn rescheduling_restarts_the_window() {
        let t0 = Instant::now();
        let mut d = Debouncer::default();
        d.schedule(t0);
        d.schedule(t0 + Duration::from_millis(200));
        assert!(!d.fire_if_due(t0 + Duration::from_millis(400)));
        assert!(d.fire_if_due(t0 + Duration::from_millis(500)));
    }

    #[test]
    fn cancel_drops_the_deadline() {
        let t0 = Instant::now();
        let mut d = Debouncer::default();
        d.schedule(t0);
        d.cancel();
        assert!(!d.is_pending());
        assert!(!d.fire_if_due(t0 + Duration::from_secs(1)));
    }
}
