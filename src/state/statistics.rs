/// Reaction counters maintained alongside the [StateRegistry](super::StateRegistry).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Statistics {
    /// Deweighted measurements
    pub meas_deweight: usize,
    /// Measurements deweighted along with their station
    pub station_deweight: usize,
    /// States that triggered rejection of their measurements
    pub state_rejection: usize,
    /// Clock glitches (clock and linked ambiguities reinitialized)
    pub clock_glitch: usize,
    /// Orbits re-noised after a glitch
    pub orbit_state_reject: usize,
}

impl Statistics {
    /// Total number of reactions
    pub fn total(&self) -> usize {
        self.meas_deweight
            + self.station_deweight
            + self.state_rejection
            + self.clock_glitch
            + self.orbit_state_reject
    }

    pub(crate) fn accumulate(&mut self, rhs: &Self) {
        self.meas_deweight += rhs.meas_deweight;
        self.station_deweight += rhs.station_deweight;
        self.state_rejection += rhs.state_rejection;
        self.clock_glitch += rhs.clock_glitch;
        self.orbit_state_reject += rhs.orbit_state_reject;
    }
}

impl std::fmt::Display for Statistics {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "meas deweight={} station deweight={} state rejection={} clock glitch={} orbit state reject={}",
            self.meas_deweight,
            self.station_deweight,
            self.state_rejection,
            self.clock_glitch,
            self.orbit_state_reject,
        )
    }
}
