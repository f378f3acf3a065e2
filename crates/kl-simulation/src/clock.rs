use std::time::{Duration, Instant};

/// Tracks simulated time and paces update cycles against the wall clock.
///
/// Simulated time only moves in whole `sim_interval` steps, and only through
/// [`SimClock::complete_cycle`].
#[derive(Debug, Clone)]
pub struct SimClock {
    sim_time: u64,
    sim_interval: u64,
    wall_interval: Duration,
    wall_last_update: Option<Instant>,
    real_interval_measured: Option<Duration>,
    cycles: u64,
}

impl SimClock {
    /// Create a clock at simulated time 0 with the given step (ms) and wall pacing.
    pub fn new(sim_interval: u64, wall_interval: Duration) -> Self {
        Self {
            sim_time: 0,
            sim_interval,
            wall_interval,
            wall_last_update: None,
            real_interval_measured: None,
            cycles: 0,
        }
    }

    /// Return `true` if enough wall-clock time has passed since the last
    /// completed cycle. The first cycle is always due.
    pub fn is_due(&self, now: Instant) -> bool {
        match self.wall_last_update {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.wall_interval,
        }
    }

    /// Record a completed cycle at wall-clock instant `now` and advance
    /// simulated time by one step. Returns the new simulated time.
    pub fn complete_cycle(&mut self, now: Instant) -> u64 {
        if let Some(last) = self.wall_last_update {
            self.real_interval_measured = Some(now.saturating_duration_since(last));
        }
        self.wall_last_update = Some(now);
        self.sim_time += self.sim_interval;
        self.cycles += 1;
        self.sim_time
    }

    /// Current simulated time in milliseconds.
    pub fn sim_time(&self) -> u64 {
        self.sim_time
    }

    /// Simulated milliseconds per cycle.
    pub fn sim_interval(&self) -> u64 {
        self.sim_interval
    }

    /// Minimum wall-clock time between cycles.
    pub fn wall_interval(&self) -> Duration {
        self.wall_interval
    }

    /// Change the wall-clock pacing. Zero runs cycles back to back.
    pub fn set_wall_interval(&mut self, interval: Duration) {
        self.wall_interval = interval;
    }

    /// Wall-clock time between the last two completed cycles.
    pub fn real_interval_measured(&self) -> Option<Duration> {
        self.real_interval_measured
    }

    /// Number of completed cycles.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Simulated time over wall-clock time for the last cycle, if measurable.
    pub fn speed_ratio(&self) -> Option<f64> {
        let real = self.real_interval_measured?.as_secs_f64();
        (real > 0.0).then(|| (self.sim_interval as f64 / 1000.0) / real)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_initial_state() {
        let clock = SimClock::new(100, Duration::from_millis(100));
        assert_eq!(clock.sim_time(), 0);
        assert_eq!(clock.cycles(), 0);
        assert!(clock.real_interval_measured().is_none());
        assert!(clock.speed_ratio().is_none());
    }

    #[test]
    fn first_cycle_is_always_due() {
        let clock = SimClock::new(100, Duration::from_secs(3600));
        assert!(clock.is_due(Instant::now()));
    }

    #[test]
    fn due_only_after_wall_interval() {
        let mut clock = SimClock::new(100, Duration::from_millis(100));
        let t0 = Instant::now();
        clock.complete_cycle(t0);
        assert!(!clock.is_due(t0));
        assert!(!clock.is_due(t0 + Duration::from_millis(99)));
        assert!(clock.is_due(t0 + Duration::from_millis(100)));
        assert!(clock.is_due(t0 + Duration::from_millis(250)));
    }

    #[test]
    fn complete_cycle_advances_by_step() {
        let mut clock = SimClock::new(50, Duration::ZERO);
        let t0 = Instant::now();
        assert_eq!(clock.complete_cycle(t0), 50);
        assert_eq!(clock.complete_cycle(t0 + Duration::from_millis(25)), 100);
        assert_eq!(clock.cycles(), 2);
        assert_eq!(
            clock.real_interval_measured(),
            Some(Duration::from_millis(25))
        );
        let ratio = clock.speed_ratio().unwrap();
        assert!((ratio - 2.0).abs() < 1e-9);
    }

    #[test]
    fn earlier_instant_does_not_underflow() {
        let mut clock = SimClock::new(100, Duration::from_millis(100));
        let t1 = Instant::now() + Duration::from_millis(10);
        clock.complete_cycle(t1);
        assert!(!clock.is_due(Instant::now()));
    }
}
