
mod engine;
mod network;
mod registry;

pub use data::*;
pub use source::*;

use log::LevelFilter;
use std::sync::{Arc, Mutex, Once};
use std::time::{Duration as StdDuration, SystemTime, UNIX_EPOCH};

use crate::prelude::WallClock;

static INIT: Once = Once::new();

pub fn init_logger() {
    INIT.call_once(|| {
        env_logger::builder()
            .is_test(true)
            .filter_level(LevelFilter::Debug)
            .init();
    });
}

/// Deterministic [WallClock]: only moves when slept on or advanced.
/// Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<StdDuration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, dt: StdDuration) {
        *self.now.lock().unwrap() += dt;
    }

    pub fn now_secs(&self) -> f64 {
        self.now().as_secs_f64()
    }
}

impl WallClock for ManualClock {
    fn now(&self) -> StdDuration {
        *self.now.lock().unwrap()
    }

    fn system_time(&self) -> SystemTime {
        // 2020-06-25T00:00:00 UTC
        UNIX_EPOCH + StdDuration::from_secs(1_593_043_200) + self.now()
    }

    fn sleep(&self, duration: StdDuration) {
        self.advance(duration);
    }
}
