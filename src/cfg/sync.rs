//! Epoch synchronization options
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::prelude::{Epoch, Error};

const fn default_epoch_interval() -> f64 {
    1.0
}

const fn default_epoch_tolerance() -> f64 {
    0.5
}

const fn default_wait_next_epoch() -> f64 {
    1.0
}

const fn default_wait_all_stations() -> f64 {
    0.5
}

const fn default_initial_wait() -> f64 {
    10.0
}

const fn default_retry_sleep_ms() -> u64 {
    1
}

const fn default_require_obs() -> bool {
    true
}

/// [SyncOpts] drives the epoch synchronizer: cadence, matching tolerances
/// and the wall-clock deadlines applied when polling the input channels.
/// Durations are expressed in seconds.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SyncOpts {
    /// Nominal spacing between epochs (s)
    #[cfg_attr(feature = "serde", serde(default = "default_epoch_interval"))]
    pub epoch_interval: f64,
    /// Tolerance used when matching observations to an epoch (s).
    /// Also used to snap the epoch clock to integer seconds.
    #[cfg_attr(feature = "serde", serde(default = "default_epoch_tolerance"))]
    pub epoch_tolerance: f64,
    /// Nominal wall-clock time between two loops (s)
    #[cfg_attr(feature = "serde", serde(default = "default_wait_next_epoch"))]
    pub wait_next_epoch: f64,
    /// Grace period granted to all stations once data arrived (s)
    #[cfg_attr(feature = "serde", serde(default = "default_wait_all_stations"))]
    pub wait_all_stations: f64,
    /// Wall-clock delay before the first nominal loop start (s)
    #[cfg_attr(feature = "serde", serde(default = "default_initial_wait"))]
    pub initial_wait: f64,
    /// Sleep between two polling attempts (ms)
    #[cfg_attr(feature = "serde", serde(default = "default_retry_sleep_ms"))]
    pub retry_sleep_ms: u64,
    /// When set, exhaustion of all inputs terminates the run,
    /// epochs are never formed without observations and a station
    /// that is not ready after one polling pass is not retried.
    #[cfg_attr(feature = "serde", serde(default = "default_require_obs"))]
    pub require_obs: bool,
    /// Match observations to the closest epoch (half cadence tolerance)
    /// instead of using [Self::epoch_tolerance].
    #[cfg_attr(feature = "serde", serde(default))]
    pub assign_closest_epoch: bool,
    /// Stop after this many epochs (0 = unlimited)
    #[cfg_attr(feature = "serde", serde(default))]
    pub max_epochs: usize,
    /// Stop once this [Epoch] has been processed
    #[cfg_attr(feature = "serde", serde(default))]
    pub end_epoch: Option<Epoch>,
}

impl Default for SyncOpts {
    fn default() -> Self {
        Self {
            epoch_interval: default_epoch_interval(),
            epoch_tolerance: default_epoch_tolerance(),
            wait_next_epoch: default_wait_next_epoch(),
            wait_all_stations: default_wait_all_stations(),
            initial_wait: default_initial_wait(),
            retry_sleep_ms: default_retry_sleep_ms(),
            require_obs: default_require_obs(),
            assign_closest_epoch: false,
            max_epochs: 0,
            end_epoch: None,
        }
    }
}

impl SyncOpts {
    /// Matching tolerance (s) applied when requesting a batch.
    pub(crate) fn matching_tolerance(&self) -> f64 {
        if self.assign_closest_epoch {
            self.epoch_interval / 2.0
        } else {
            self.epoch_tolerance
        }
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        if !(self.epoch_interval > 0.0) {
            return Err(Error::InvalidConfig("epoch_interval must be strictly positive"));
        }
        if self.epoch_tolerance < 0.0 {
            return Err(Error::InvalidConfig("epoch_tolerance must be positive"));
        }
        if self.wait_next_epoch < 0.0 || self.wait_all_stations < 0.0 || self.initial_wait < 0.0
        {
            return Err(Error::InvalidConfig("wait durations must be positive"));
        }
        Ok(())
    }
}
