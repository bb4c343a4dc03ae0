//! Per station options
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ElevationMappingFunction {
    /// a + b * e-elev/c
    pub a: f64,
    /// a + b * e-elev/c
    pub b: f64,
    /// a + b * e-elev/c
    pub c: f64,
}

impl ElevationMappingFunction {
    /// Standard deviation for given elevation angle (°)
    pub(crate) fn eval(&self, elev_deg: f64) -> f64 {
        self.a + self.b * (-elev_deg / self.c).exp()
    }
}

const fn default_code_weight() -> ElevationMappingFunction {
    ElevationMappingFunction {
        a: 0.3,
        b: 3.0,
        c: 10.0,
    }
}

const fn default_phase_weight() -> ElevationMappingFunction {
    ElevationMappingFunction {
        a: 0.003,
        b: 0.03,
        c: 10.0,
    }
}

const fn default_max_lsq_iter() -> usize {
    10
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StationOpts {
    /// Stations lacking an apriori position are rejected
    /// (instead of relying on their local solution).
    #[cfg_attr(feature = "serde", serde(default))]
    pub require_apriori_positions: bool,
    /// Stations lacking antenna details are rejected
    #[cfg_attr(feature = "serde", serde(default))]
    pub require_antenna_details: bool,
    /// Excluded station identifiers
    #[cfg_attr(feature = "serde", serde(default))]
    pub excluded: Vec<String>,
    /// Code measurement standard deviation (m)
    #[cfg_attr(feature = "serde", serde(default = "default_code_weight"))]
    pub code_weight: ElevationMappingFunction,
    /// Phase measurement standard deviation (m)
    #[cfg_attr(feature = "serde", serde(default = "default_phase_weight"))]
    pub phase_weight: ElevationMappingFunction,
    /// Iteration limit of the local position solution
    #[cfg_attr(feature = "serde", serde(default = "default_max_lsq_iter"))]
    pub max_lsq_iter: usize,
}

impl Default for StationOpts {
    fn default() -> Self {
        Self {
            require_apriori_positions: false,
            require_antenna_details: false,
            excluded: Vec::new(),
            code_weight: default_code_weight(),
            phase_weight: default_phase_weight(),
            max_lsq_iter: default_max_lsq_iter(),
        }
    }
}

impl StationOpts {
    pub(crate) fn is_excluded(&self, id: &str) -> bool {
        self.excluded.iter().any(|ex| ex.eq_ignore_ascii_case(id))
    }
}
