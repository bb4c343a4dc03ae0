//! Engine configuration preset
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::prelude::{Error, SV};

mod network;
mod reject;
mod station;
mod sync;

pub use network::{NetworkOpts, StateOpts};
pub use reject::{MeasReactionKind, RejectOpts, StateReactionKind};
pub use station::{ElevationMappingFunction, StationOpts};
pub use sync::SyncOpts;

fn default_threads() -> Option<usize> {
    None
}

/// [Config] is the read-only parametrization of the whole engine.
/// It is handed once to the [Engine](crate::prelude::Engine) and never modified
/// while the main loop is running.
#[derive(Default, Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Config {
    /// Epoch scheduling and admission control
    #[cfg_attr(feature = "serde", serde(default))]
    pub sync: SyncOpts,
    /// Rejection policies
    #[cfg_attr(feature = "serde", serde(default))]
    pub reject: RejectOpts,
    /// Network estimator states and noises
    #[cfg_attr(feature = "serde", serde(default))]
    pub network: NetworkOpts,
    /// Per station processing
    #[cfg_attr(feature = "serde", serde(default))]
    pub station: StationOpts,
    /// Admissible satellites: placeholder states are created
    /// for each of them when the engine is deployed.
    #[cfg_attr(feature = "serde", serde(default))]
    pub satellites: Vec<SV>,
    /// Number of worker threads for per station processing.
    /// None = use rayon default (all cores).
    #[cfg_attr(feature = "serde", serde(default = "default_threads"))]
    pub threads: Option<usize>,
}

impl Config {
    /// Returns [Config] suited for real-time streams: observations are not
    /// mandatory (the clock free-runs on wall time) and each station
    /// is assigned to its closest epoch.
    pub fn realtime_preset(epoch_interval_s: f64) -> Self {
        let mut s = Self::default();
        s.sync.epoch_interval = epoch_interval_s;
        s.sync.wait_next_epoch = epoch_interval_s;
        s.sync.require_obs = false;
        s.sync.assign_closest_epoch = true;
        s
    }

    /// Returns [Config] suited for post processing of recorded files:
    /// no waiting, exhaustion of all inputs terminates the run.
    pub fn post_processing_preset(epoch_interval_s: f64) -> Self {
        let mut s = Self::default();
        s.sync.epoch_interval = epoch_interval_s;
        s.sync.wait_next_epoch = 0.0;
        s.sync.wait_all_stations = 0.0;
        s.sync.require_obs = true;
        s
    }

    /// Copies and returns [Config] with admissible satellites.
    pub fn with_satellites(&self, satellites: &[SV]) -> Self {
        let mut s = self.clone();
        s.satellites = satellites.to_vec();
        s
    }

    /// Verifies this preset is self consistent.
    pub fn validate(&self) -> Result<(), Error> {
        self.sync.validate()?;
        self.reject.validate()?;
        self.network.validate()?;
        if self.threads == Some(0) {
            return Err(Error::InvalidConfig("threads must be strictly positive"));
        }
        Ok(())
    }
}
