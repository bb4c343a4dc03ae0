use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::prelude::{Epoch, TimeScale};

/// Wall-clock abstraction driving the synchronizer deadlines.
///
/// Production deployments use the [SystemClock]; deterministic implementations
/// make the scheduling logic testable.
pub trait WallClock: Send + Sync {
    /// Monotonic time elapsed since this clock was started
    fn now(&self) -> Duration;

    /// Current system time
    fn system_time(&self) -> SystemTime;

    /// Blocks the calling thread
    fn sleep(&self, duration: Duration);

    /// Current [Epoch], expressed in [TimeScale::GPST]
    fn epoch_now(&self) -> Epoch {
        let unix = self
            .system_time()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();

        Epoch::from_unix_seconds(unix).to_time_scale(TimeScale::GPST)
    }
}

/// [WallClock] backed by the operating system.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    /// Start time for monotonic duration calculations
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl WallClock for SystemClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn system_clock() {
        let clock = SystemClock::new();
        let t0 = clock.now();
        clock.sleep(Duration::from_millis(2));
        assert!(clock.now() >= t0 + Duration::from_millis(2));
        assert_eq!(clock.epoch_now().time_scale, TimeScale::GPST);
    }
}
