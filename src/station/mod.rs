//! Station units: one receiver's per epoch local processing
use std::collections::{BTreeMap, HashMap};

use log::{debug, error, warn};
use nalgebra::Vector3;

use crate::{
    measurement::{SignalCounter, UsedFlag},
    orbit::SatelliteMap,
    prelude::{Config, Epoch, SV},
    trace::{LogTrace, TraceSink},
};

mod observation;
mod solution;

pub use observation::{Observation, Signal};
pub use solution::LocalSolution;

pub(crate) use solution::elevation_azimuth;

/// Code minus carrier jump (m) above which a cycle slip is declared
const CMC_SLIP_THRESHOLD_M: f64 = 20.0;

/// Index of one [StationUnit] in the [StationTable].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StationIndex(pub usize);

impl std::fmt::Display for StationIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Tracking status of one (satellite, signal) pair.
#[derive(Debug, Clone, Default)]
pub struct SignalStatus {
    /// Signal index, unique within the station
    pub sub: usize,
    /// Consecutive phase rejections
    pub phase_reject: SignalCounter,
    /// Epochs since the phase was last used
    pub phase_outage: SignalCounter,
    /// Epochs since the ionosphere was last observable
    pub iono_outage: SignalCounter,
    /// Signal contributed to the latest network update
    pub used: UsedFlag,
    /// Latest code minus carrier (m)
    pub last_cmc: Option<f64>,
    /// Cycle slip detected on latest epoch
    pub slip: bool,
}

/// Cumulated station statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StationSummary {
    /// First processed [Epoch]
    pub first_epoch: Option<Epoch>,
    /// Latest processed [Epoch]
    pub last_epoch: Option<Epoch>,
    /// Number of processed epochs
    pub epoch_count: usize,
    /// Number of processed observations
    pub obs_count: usize,
    /// Observations per signal code
    pub code_count: BTreeMap<String, usize>,
    /// Observations per satellite
    pub sat_count: BTreeMap<SV, usize>,
    /// Phase measurements rejected by the network
    pub phase_rejections: usize,
}

impl std::fmt::Display for StationSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match (self.first_epoch, self.last_epoch) {
            (Some(first), Some(last)) => write!(f, "{} to {}", first, last)?,
            _ => write!(f, "no epochs")?,
        }
        write!(
            f,
            " | epochs: {} | observations: {} | phase rejections: {}",
            self.epoch_count, self.obs_count, self.phase_rejections
        )?;
        for (code, count) in self.code_count.iter() {
            write!(f, " | {}: {}", code, count)?;
        }
        Ok(())
    }
}

/// [StationUnit] gathers all data and state of one receiver.
pub struct StationUnit {
    /// Station identifier
    pub id: String,
    /// Position in the [StationTable]
    pub index: StationIndex,
    /// Station contributes to the current epoch
    pub ready: bool,
    /// Station failed one of its prerequisites and is ignored until the end of the run
    pub invalid: bool,
    /// Data channel was declared dead
    pub dead: bool,
    /// Observations of the current epoch
    pub observations: Vec<Observation>,
    /// Apriori ECEF position (m)
    pub apriori_ecef_m: Option<Vector3<f64>>,
    /// Antenna model
    pub antenna: Option<String>,
    /// Latest local solution
    pub solution: Option<LocalSolution>,
    /// Receiver clock offset correction published by the network (m)
    pub(crate) net_clock_correction_m: Option<f64>,
    /// Statistics
    pub summary: StationSummary,
    signals: HashMap<(SV, String), SignalStatus>,
    codes: Vec<String>,
    trace: Box<dyn TraceSink>,
}

impl std::fmt::Debug for StationUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("StationUnit")
            .field("id", &self.id)
            .field("index", &self.index)
            .field("ready", &self.ready)
            .field("invalid", &self.invalid)
            .field("dead", &self.dead)
            .field("observations", &self.observations.len())
            .finish()
    }
}

impl StationUnit {
    /// Creates a new [StationUnit], tracing to the [log] facade
    pub fn new(id: &str, index: StationIndex) -> Self {
        Self {
            id: id.to_string(),
            index,
            ready: false,
            invalid: false,
            dead: false,
            observations: Vec::new(),
            apriori_ecef_m: None,
            antenna: None,
            solution: None,
            net_clock_correction_m: None,
            summary: StationSummary::default(),
            signals: HashMap::new(),
            codes: Vec::new(),
            trace: Box::new(LogTrace::new(id)),
        }
    }

    /// Defines apriori ECEF position (m)
    pub fn with_apriori(mut self, position_ecef_m: Vector3<f64>) -> Self {
        self.apriori_ecef_m = Some(position_ecef_m);
        self
    }

    /// Defines antenna model
    pub fn with_antenna(mut self, antenna: &str) -> Self {
        self.antenna = Some(antenna.to_string());
        self
    }

    /// Replaces the [TraceSink]
    pub fn with_trace(mut self, trace: Box<dyn TraceSink>) -> Self {
        self.trace = trace;
        self
    }

    /// Appends to this station's trace
    pub fn trace(&mut self, text: &str) {
        self.trace.append(text);
    }

    /// Receiver clock correction (m) published by the latest network update
    pub fn clock_correction(&self) -> Option<f64> {
        self.net_clock_correction_m
    }

    /// Status of this (satellite, signal) pair
    pub fn signal_status(&self, sv: SV, code: &str) -> Option<&SignalStatus> {
        self.signals.get(&(sv, code.to_string()))
    }

    /// Tracked signals
    pub fn signals(&self) -> impl Iterator<Item = (SV, &str, &SignalStatus)> {
        self.signals
            .iter()
            .map(|((sv, code), status)| (*sv, code.as_str(), status))
    }

    /// Clears the per epoch data, prior new acquisition
    pub(crate) fn reset_epoch(&mut self) {
        self.ready = false;
        self.observations.clear();
        for status in self.signals.values_mut() {
            status.used.set(false);
            status.slip = false;
        }
    }

    /// Admits a new batch of observations of the current epoch.
    /// Signals are registered on first sighting and screened for cycle slips.
    pub(crate) fn preprocess(&mut self, observations: Vec<Observation>) {
        for obs in observations.iter() {
            for signal in obs.signals.iter() {
                let sub = match self.codes.iter().position(|code| *code == signal.code) {
                    Some(sub) => sub,
                    None => {
                        self.codes.push(signal.code.clone());
                        self.codes.len() - 1
                    },
                };

                let status = self
                    .signals
                    .entry((obs.sv, signal.code.clone()))
                    .or_insert_with(|| SignalStatus {
                        sub,
                        ..Default::default()
                    });

                let (Some(code), Some(phase)) = (signal.pseudo_range_m, signal.phase_range_m)
                else {
                    status.last_cmc = None;
                    continue;
                };

                let cmc = code - phase;
                if let Some(last) = status.last_cmc {
                    if (cmc - last).abs() > CMC_SLIP_THRESHOLD_M {
                        status.slip = true;
                        debug!(
                            "{}({}) {} - cycle slip ({:.3} m jump)",
                            self.id,
                            obs.sv,
                            signal.code,
                            cmc - last
                        );
                    }
                }
                status.last_cmc = Some(cmc);
            }
        }
        self.observations.extend(observations);
    }

    /// Per epoch local processing, on ready stations.
    ///
    /// Only touches this [StationUnit]: shared satellite data is read only.
    pub(crate) fn process_epoch(&mut self, t: Epoch, satellites: &SatelliteMap, cfg: &Config) {
        if self.invalid || !self.ready {
            self.ready = false;
            return;
        }

        if cfg.station.require_apriori_positions && self.apriori_ecef_m.is_none() {
            error!("{} - missing apriori position: station rejected", self.id);
            self.trace("missing apriori position: station rejected");
            self.invalid = true;
            self.ready = false;
            return;
        }

        if cfg.station.require_antenna_details && self.antenna.is_none() {
            error!("{} - missing antenna details: station rejected", self.id);
            self.trace("missing antenna details: station rejected");
            self.invalid = true;
            self.ready = false;
            return;
        }

        let initial = self
            .solution
            .map(|sol| sol.position_ecef_m)
            .or(self.apriori_ecef_m);

        match LocalSolution::resolve(
            t,
            &self.observations,
            satellites,
            initial,
            cfg.station.max_lsq_iter,
        ) {
            Ok(solution) => {
                self.trace(&format!(
                    "{} local solution: {:.3} {:.3} {:.3} (clock {:.3} m, gdop {:.2})",
                    t,
                    solution.position_ecef_m[0],
                    solution.position_ecef_m[1],
                    solution.position_ecef_m[2],
                    solution.clock_m,
                    solution.gdop,
                ));
                self.solution = Some(solution);
            },
            Err(e) => {
                warn!("{} ({}) - local solution: {}", t, self.id, e);
                self.trace(&format!("{} local solution failure: {}", t, e));
            },
        }

        let position = match self.apriori_ecef_m.or(self.solution.map(|s| s.position_ecef_m)) {
            Some(position) => position,
            None => {
                warn!("{} ({}) - unknown position: station skipped", t, self.id);
                self.ready = false;
                return;
            },
        };

        self.observation_variances(&position, satellites, cfg);
        self.update_summary(t);

        for status in self.signals.values() {
            status.phase_outage.increment();
            status.iono_outage.increment();
        }
    }

    /// Elevation dependent measurement variances
    fn observation_variances(
        &mut self,
        position: &Vector3<f64>,
        satellites: &SatelliteMap,
        cfg: &Config,
    ) {
        for obs in self.observations.iter_mut() {
            let Some(sat) = satellites.get(&obs.sv) else {
                continue;
            };
            let Some((elev, azim)) = elevation_azimuth(position, &sat.position_m) else {
                continue;
            };

            obs.elevation_deg = Some(elev);
            obs.azimuth_deg = Some(azim);

            let code_sigma = cfg.station.code_weight.eval(elev);
            let phase_sigma = cfg.station.phase_weight.eval(elev);

            for signal in obs.signals.iter_mut() {
                signal.code_variance = signal.pseudo_range_m.map(|_| code_sigma.powi(2));
                signal.phase_variance = signal.phase_range_m.map(|_| phase_sigma.powi(2));
            }
        }
    }

    fn update_summary(&mut self, t: Epoch) {
        let summary = &mut self.summary;

        if summary.first_epoch.is_none() {
            summary.first_epoch = Some(t);
        }
        summary.last_epoch = Some(t);
        summary.epoch_count += 1;

        for obs in self.observations.iter() {
            summary.obs_count += 1;
            *summary.sat_count.entry(obs.sv).or_default() += 1;
            for signal in obs.signals.iter() {
                *summary.code_count.entry(signal.code.clone()).or_default() += 1;
            }
        }
    }
}

/// All [StationUnit]s, indexed by [StationIndex].
#[derive(Debug, Default)]
pub struct StationTable {
    units: Vec<StationUnit>,
    ids: BTreeMap<String, StationIndex>,
}

impl StationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new [StationUnit], created from its identifier.
    /// Returns the existing index if this station is already known.
    pub fn insert(&mut self, id: &str) -> StationIndex {
        if let Some(index) = self.ids.get(id) {
            return *index;
        }
        let index = StationIndex(self.units.len());
        self.units.push(StationUnit::new(id, index));
        self.ids.insert(id.to_string(), index);
        index
    }

    /// Inserts a customized [StationUnit]. Its index is reassigned.
    /// Replaces the [StationUnit] with same identifier, if any.
    pub fn insert_unit(&mut self, mut unit: StationUnit) -> StationIndex {
        if let Some(index) = self.ids.get(&unit.id).copied() {
            unit.index = index;
            self.units[index.0] = unit;
            return index;
        }
        let index = StationIndex(self.units.len());
        unit.index = index;
        self.ids.insert(unit.id.clone(), index);
        self.units.push(unit);
        index
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn get(&self, index: StationIndex) -> Option<&StationUnit> {
        self.units.get(index.0)
    }

    pub fn get_mut(&mut self, index: StationIndex) -> Option<&mut StationUnit> {
        self.units.get_mut(index.0)
    }

    /// Station lookup by identifier
    pub fn by_id(&self, id: &str) -> Option<&StationUnit> {
        let index = self.ids.get(id)?;
        self.units.get(index.0)
    }

    pub fn index_of(&self, id: &str) -> Option<StationIndex> {
        self.ids.get(id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StationUnit> {
        self.units.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut StationUnit> {
        self.units.iter_mut()
    }

    pub(crate) fn units_mut(&mut self) -> &mut [StationUnit] {
        &mut self.units
    }

    /// Identifiers of the stations contributing to the current epoch
    pub fn ready(&self) -> Vec<String> {
        self.units
            .iter()
            .filter(|unit| unit.ready && !unit.invalid)
            .map(|unit| unit.id.clone())
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::prelude::Constellation;

    fn t0() -> Epoch {
        Epoch::from_gregorian_utc_at_midnight(2020, 6, 25)
    }

    #[test]
    fn table_insertion() {
        let mut table = StationTable::new();
        let abmf = table.insert("ABMF");
        let gras = table.insert("GRAS");
        assert_eq!(abmf, StationIndex(0));
        assert_eq!(gras, StationIndex(1));
        assert_eq!(table.insert("ABMF"), abmf);
        assert_eq!(table.len(), 2);
        assert_eq!(table.by_id("GRAS").unwrap().index, gras);

        let unit = StationUnit::new("ABMF", StationIndex(10)).with_antenna("TRM57971.00");
        assert_eq!(table.insert_unit(unit), abmf);
        assert_eq!(table.get(abmf).unwrap().antenna.as_deref(), Some("TRM57971.00"));
    }

    #[test]
    fn cycle_slip_screening() {
        let g01 = SV::new(Constellation::GPS, 1);
        let mut unit = StationUnit::new("ABMF", StationIndex(0));

        let signal = Signal::new("1C")
            .with_pseudo_range(20_000_000.0)
            .with_phase_range(19_999_990.0);

        unit.preprocess(vec![Observation::new(g01, t0(), vec![signal.clone()])]);
        assert!(!unit.signal_status(g01, "1C").unwrap().slip);

        unit.reset_epoch();
        assert!(unit.observations.is_empty());

        let slipped = signal.with_phase_range(19_999_900.0);
        unit.preprocess(vec![Observation::new(g01, t0(), vec![slipped])]);
        assert!(unit.signal_status(g01, "1C").unwrap().slip);
    }

    #[test]
    fn missing_prerequisites() {
        let mut cfg = Config::default();
        cfg.station.require_antenna_details = true;

        let mut unit = StationUnit::new("ABMF", StationIndex(0));
        unit.ready = true;
        unit.process_epoch(t0(), &SatelliteMap::new(), &cfg);

        assert!(unit.invalid);
        assert!(!unit.ready);

        // invalid for the rest of the run
        unit.ready = true;
        unit.process_epoch(t0(), &SatelliteMap::new(), &Config::default());
        assert!(!unit.ready);
    }
}
