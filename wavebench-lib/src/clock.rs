use std::time::Duration;

use tokio::time::{Instant, sleep};

/// Wall-clock window of a single simulation run.
///
/// Started once, read-only afterwards. All elapsed time is measured
/// against the actual clock, so scheduling drift between ticks is
/// reflected in [`SimulationClock::elapsed_minutes`] rather than accumulated.
#[derive(Debug, Clone)]
pub struct SimulationClock {
    start_time: Instant,
    end_time: Instant,
    tick_interval: Duration,
}

impl SimulationClock {
    /// Start a clock which expires `duration` from now.
    ///
    /// The caller guarantees that neither `duration` nor `tick_interval` is zero,
    /// and that `duration` fits within the clock range.
    pub fn start(duration: Duration, tick_interval: Duration) -> Self {
        debug_assert!(!duration.is_zero(), "simulation duration must be positive");
        debug_assert!(!tick_interval.is_zero(), "tick interval must be positive");

        let start_time = Instant::now();
        Self {
            start_time,
            end_time: start_time + duration,
            tick_interval,
        }
    }

    pub fn start_time(&self) -> Instant {
        self.start_time
    }

    pub fn end_time(&self) -> Instant {
        self.end_time
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    pub fn total(&self) -> Duration {
        self.end_time - self.start_time
    }

    pub fn total_minutes(&self) -> f64 {
        self.total().as_secs_f64() / 60.
    }

    pub fn elapsed(&self) -> Duration {
        Instant::now().saturating_duration_since(self.start_time)
    }

    pub fn elapsed_minutes(&self) -> f64 {
        self.elapsed().as_secs_f64() / 60.
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.end_time
    }

    /// Suspend for (at least) one tick.
    pub async fn wait_tick(&self) {
        sleep(self.tick_interval).await;
    }
}
