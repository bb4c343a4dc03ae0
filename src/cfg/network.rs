//! Network estimator options
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::prelude::Error;

/// Initialization and random walk of one family of states.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StateOpts {
    /// Initial standard deviation
    pub sigma0: f64,
    /// Random walk process noise, per square root second
    pub proc_noise: f64,
}

impl StateOpts {
    pub const fn new(sigma0: f64, proc_noise: f64) -> Self {
        Self { sigma0, proc_noise }
    }
}

const fn default_rec_clock() -> StateOpts {
    StateOpts::new(1.0E4, 1.0E2)
}

const fn default_sat_clock() -> StateOpts {
    StateOpts::new(1.0E4, 1.0E1)
}

const fn default_ambiguity() -> StateOpts {
    StateOpts::new(1.0E2, 0.0)
}

const fn default_min_elevation() -> f64 {
    5.0
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NetworkOpts {
    /// Receiver clock states (m)
    #[cfg_attr(feature = "serde", serde(default = "default_rec_clock"))]
    pub rec_clock: StateOpts,
    /// Satellite clock states (m)
    #[cfg_attr(feature = "serde", serde(default = "default_sat_clock"))]
    pub sat_clock: StateOpts,
    /// Phase ambiguity states (m)
    #[cfg_attr(feature = "serde", serde(default = "default_ambiguity"))]
    pub ambiguity: StateOpts,
    /// Estimate orbit corrections (position and velocity).
    /// None = orbits are held fixed.
    #[cfg_attr(feature = "serde", serde(default))]
    pub orbit: Option<StateOpts>,
    /// Orbit pseudo observations standard deviation (m).
    /// None = no pseudo observations.
    #[cfg_attr(feature = "serde", serde(default))]
    pub orbit_pseudo_obs_sigma: Option<f64>,
    /// Elevation mask (°) below which observations do not contribute
    #[cfg_attr(feature = "serde", serde(default = "default_min_elevation"))]
    pub min_elevation: f64,
}

impl Default for NetworkOpts {
    fn default() -> Self {
        Self {
            rec_clock: default_rec_clock(),
            sat_clock: default_sat_clock(),
            ambiguity: default_ambiguity(),
            orbit: None,
            orbit_pseudo_obs_sigma: None,
            min_elevation: default_min_elevation(),
        }
    }
}

impl NetworkOpts {
    pub(crate) fn validate(&self) -> Result<(), Error> {
        let families = [
            Some(self.rec_clock),
            Some(self.sat_clock),
            Some(self.ambiguity),
            self.orbit,
        ];

        for opts in families.iter().flatten() {
            if !(opts.sigma0 > 0.0) || opts.proc_noise < 0.0 {
                return Err(Error::InvalidConfig("invalid state noise"));
            }
        }

        if let Some(sigma) = self.orbit_pseudo_obs_sigma {
            if !(sigma > 0.0) {
                return Err(Error::InvalidConfig("pseudo obs sigma must be strictly positive"));
            }
        }
        Ok(())
    }
}
