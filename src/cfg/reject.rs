//! Rejection policies
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::prelude::Error;

/// Measurement reactions that may be registered, in order,
/// in the measurement chain of the rejection pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MeasReactionKind {
    /// Tag the raw observation signal as phase error
    SignalErrors,
    /// Increment then invalidate the phase reject counter
    PhaseRejectCount,
    /// Inflate the measurement variance
    Deweight,
    /// Deweight every measurement of the same station
    StationDeweight,
    /// Pseudo observations cascade onto orbit states
    PseudoObsCascade,
}

/// State reactions that may be registered, in order,
/// in the state chain of the rejection pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum StateReactionKind {
    /// Reject every measurement referencing the state
    CascadeToMeasurements,
    /// Reinitialize clocks and connected ambiguities
    ClockGlitch,
    /// Re-noise the orbit of the satellite
    OrbitGlitch,
}

fn default_meas_reactions() -> Vec<MeasReactionKind> {
    vec![
        MeasReactionKind::SignalErrors,
        MeasReactionKind::PhaseRejectCount,
        MeasReactionKind::Deweight,
        MeasReactionKind::PseudoObsCascade,
    ]
}

fn default_state_reactions() -> Vec<StateReactionKind> {
    vec![
        StateReactionKind::CascadeToMeasurements,
        StateReactionKind::ClockGlitch,
        StateReactionKind::OrbitGlitch,
    ]
}

const fn default_deweight_factor() -> f64 {
    1000.0
}

const fn default_true() -> bool {
    true
}

const fn default_prefit_sigma() -> Option<f64> {
    Some(4.0)
}

const fn default_state_sigma() -> Option<f64> {
    Some(4.0)
}

const fn default_max_iterations() -> usize {
    5
}

const fn default_phase_reject_limit() -> u32 {
    2
}

const fn default_phase_outage_limit() -> u32 {
    10
}

const fn default_orbit_pos_proc_noise() -> f64 {
    10.0
}

const fn default_orbit_vel_proc_noise() -> f64 {
    5.0
}

const fn default_orbit_vel_proc_noise_trail() -> f64 {
    1.0
}

const fn default_orbit_vel_proc_noise_trail_tau() -> f64 {
    100.0
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RejectOpts {
    /// Variance inflation factor applied to rejected measurements.
    /// 0 disables deweighting.
    #[cfg_attr(feature = "serde", serde(default = "default_deweight_factor"))]
    pub deweight_factor: f64,
    /// Reject every measurement referencing a state that failed its test
    #[cfg_attr(feature = "serde", serde(default = "default_true"))]
    pub reject_on_state_error: bool,
    /// Reinitialize clocks (and linked ambiguities) on clock errors
    #[cfg_attr(feature = "serde", serde(default))]
    pub reinit_on_clock_error: bool,
    /// Normalized prefit residual threshold (None = test disabled)
    #[cfg_attr(feature = "serde", serde(default = "default_prefit_sigma"))]
    pub prefit_sigma: Option<f64>,
    /// Normalized state correction threshold (None = test disabled)
    #[cfg_attr(feature = "serde", serde(default = "default_state_sigma"))]
    pub state_sigma: Option<f64>,
    /// Maximal number of filter iterations per epoch
    #[cfg_attr(feature = "serde", serde(default = "default_max_iterations"))]
    pub max_iterations: usize,
    /// Ambiguity is reset once its phase reject counter exceeds this value
    #[cfg_attr(feature = "serde", serde(default = "default_phase_reject_limit"))]
    pub phase_reject_limit: u32,
    /// Ambiguity is reset once the signal has not been used for this many epochs
    #[cfg_attr(feature = "serde", serde(default = "default_phase_outage_limit"))]
    pub phase_outage_limit: u32,
    /// Orbit position process noise applied on glitch (m)
    #[cfg_attr(feature = "serde", serde(default = "default_orbit_pos_proc_noise"))]
    pub orbit_pos_proc_noise: f64,
    /// Orbit velocity process noise applied on glitch (m/s)
    #[cfg_attr(feature = "serde", serde(default = "default_orbit_vel_proc_noise"))]
    pub orbit_vel_proc_noise: f64,
    /// Initial magnitude of the decaying velocity noise installed on glitch (m/s)
    #[cfg_attr(
        feature = "serde",
        serde(default = "default_orbit_vel_proc_noise_trail")
    )]
    pub orbit_vel_proc_noise_trail: f64,
    /// Time constant of the decaying velocity noise (s)
    #[cfg_attr(
        feature = "serde",
        serde(default = "default_orbit_vel_proc_noise_trail_tau")
    )]
    pub orbit_vel_proc_noise_trail_tau: f64,
    /// Measurement chain, in registration order
    #[cfg_attr(feature = "serde", serde(default = "default_meas_reactions"))]
    pub meas_reactions: Vec<MeasReactionKind>,
    /// State chain, in registration order
    #[cfg_attr(feature = "serde", serde(default = "default_state_reactions"))]
    pub state_reactions: Vec<StateReactionKind>,
}

impl Default for RejectOpts {
    fn default() -> Self {
        Self {
            deweight_factor: default_deweight_factor(),
            reject_on_state_error: default_true(),
            reinit_on_clock_error: false,
            prefit_sigma: default_prefit_sigma(),
            state_sigma: default_state_sigma(),
            max_iterations: default_max_iterations(),
            phase_reject_limit: default_phase_reject_limit(),
            phase_outage_limit: default_phase_outage_limit(),
            orbit_pos_proc_noise: default_orbit_pos_proc_noise(),
            orbit_vel_proc_noise: default_orbit_vel_proc_noise(),
            orbit_vel_proc_noise_trail: default_orbit_vel_proc_noise_trail(),
            orbit_vel_proc_noise_trail_tau: default_orbit_vel_proc_noise_trail_tau(),
            meas_reactions: default_meas_reactions(),
            state_reactions: default_state_reactions(),
        }
    }
}

impl RejectOpts {
    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.deweight_factor < 0.0 {
            return Err(Error::InvalidConfig("deweight_factor must be positive"));
        }
        if self.max_iterations == 0 {
            return Err(Error::InvalidConfig("max_iterations must be strictly positive"));
        }
        if !(self.orbit_vel_proc_noise_trail_tau > 0.0) {
            return Err(Error::InvalidConfig(
                "orbit_vel_proc_noise_trail_tau must be strictly positive",
            ));
        }
        Ok(())
    }
}
