use crate::prelude::{Epoch, SV};

/// One tracked signal of a raw [Observation].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Signal {
    /// Signal code (for example "1C")
    pub code: String,
    /// Pseudo range (m)
    pub pseudo_range_m: Option<f64>,
    /// Carrier phase range (m)
    pub phase_range_m: Option<f64>,
    /// SNR (dB.Hz)
    pub snr_dbhz: Option<f64>,
    /// Pseudo range variance (m²), once the elevation is known
    pub code_variance: Option<f64>,
    /// Phase range variance (m²), once the elevation is known
    pub phase_variance: Option<f64>,
    /// Phase observation was rejected by the network filter
    pub phase_error: bool,
}

impl Signal {
    /// Creates a new [Signal] identified by its code
    pub fn new(code: &str) -> Self {
        Self {
            code: code.to_string(),
            ..Default::default()
        }
    }

    /// Copies and returns [Signal] with pseudo range (m)
    pub fn with_pseudo_range(&self, pr_m: f64) -> Self {
        let mut s = self.clone();
        s.pseudo_range_m = Some(pr_m);
        s
    }

    /// Copies and returns [Signal] with phase range (m)
    pub fn with_phase_range(&self, ph_m: f64) -> Self {
        let mut s = self.clone();
        s.phase_range_m = Some(ph_m);
        s
    }

    /// Copies and returns [Signal] with SNR (dB.Hz)
    pub fn with_snr(&self, snr_dbhz: f64) -> Self {
        let mut s = self.clone();
        s.snr_dbhz = Some(snr_dbhz);
        s
    }
}

/// Raw observation of one satellite by one station.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// Satellite
    pub sv: SV,
    /// Sampling [Epoch]
    pub t: Epoch,
    /// Tracked signals
    pub signals: Vec<Signal>,
    /// Elevation angle (°), once known
    pub elevation_deg: Option<f64>,
    /// Azimuth angle (°), once known
    pub azimuth_deg: Option<f64>,
}

impl Observation {
    /// Creates a new [Observation]
    pub fn new(sv: SV, t: Epoch, signals: Vec<Signal>) -> Self {
        Self {
            sv,
            t,
            signals,
            elevation_deg: None,
            azimuth_deg: None,
        }
    }

    /// First available pseudo range (m)
    pub(crate) fn prefered_pseudo_range(&self) -> Option<f64> {
        self.signals.iter().find_map(|sig| sig.pseudo_range_m)
    }
}
