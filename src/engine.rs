use std::collections::BTreeSet;

use anise::constants::frames::IAU_EARTH_FRAME;
use log::{error, info};
use rayon::prelude::*;

use crate::{
    network::{NetworkEstimator, NetworkSolution},
    orbit::{precompute, OrbitSource, SatelliteMap},
    pipeline::RejectionPipeline,
    prelude::{Config, Epoch, Error, Frame, Statistics, SV},
    state::StateRegistry,
    station::{StationIndex, StationTable, StationUnit},
    sync::{EpochStatus, EpochSynchronizer, ObservationSource, SystemClock, WallClock},
    trace::TraceSink,
};

/// Per epoch and end of run output hooks.
pub trait EpochOutput {
    /// Called once the network update of epoch `t` was applied
    fn epoch(
        &mut self,
        t: Epoch,
        solution: &NetworkSolution,
        registry: &StateRegistry,
        stations: &StationTable,
    );

    /// Called once, when the run terminates
    fn finalize(&mut self, _summary: &RunSummary, _registry: &StateRegistry, _stations: &StationTable) {}
}

/// Run summary, reported by post processing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// First processed [Epoch]
    pub first_epoch: Option<Epoch>,
    /// Last processed [Epoch]
    pub last_epoch: Option<Epoch>,
    /// Processed epochs
    pub epochs: usize,
    /// Epochs whose network update failed
    pub failed_epochs: usize,
    /// Reaction counters of the whole run
    pub statistics: Statistics,
    /// Stations whose channel died
    pub dead_channels: Vec<String>,
}

/// [Engine] owns all components and runs the main loop on the calling thread.
/// Only the per station section runs in parallel.
pub struct Engine {
    /// [Config] preset
    pub cfg: Config,
    stations: StationTable,
    synchronizer: EpochSynchronizer,
    registry: StateRegistry,
    pipeline: RejectionPipeline,
    estimator: NetworkEstimator,
    orbits: Box<dyn OrbitSource>,
    frame: Frame,
    pool: rayon::ThreadPool,
    outputs: Vec<Box<dyn EpochOutput>>,
    summary: RunSummary,
}

impl Engine {
    /// Creates a new real time [Engine], driven by the system clock.
    pub fn new(cfg: &Config, orbits: Box<dyn OrbitSource>) -> Result<Self, Error> {
        Self::with_clock(cfg, orbits, Box::new(SystemClock::new()))
    }

    /// Creates a new [Engine] driven by this [WallClock].
    pub fn with_clock(
        cfg: &Config,
        orbits: Box<dyn OrbitSource>,
        clock: Box<dyn WallClock>,
    ) -> Result<Self, Error> {
        cfg.validate()?;

        let mut builder = rayon::ThreadPoolBuilder::new();
        if let Some(n) = cfg.threads {
            builder = builder.num_threads(n);
        }
        let pool = builder
            .build()
            .map_err(|e| Error::ThreadPool(e.to_string()))?;

        let mut registry = StateRegistry::new();
        let mut estimator = NetworkEstimator::new();
        estimator.initialize(&mut registry, cfg);

        info!(
            "deployed with {} admissible satellites, {} workers",
            cfg.satellites.len(),
            pool.current_num_threads()
        );

        Ok(Self {
            cfg: cfg.clone(),
            stations: StationTable::new(),
            synchronizer: EpochSynchronizer::new(&cfg.sync, clock),
            registry,
            pipeline: RejectionPipeline::from_opts(&cfg.reject),
            estimator,
            orbits,
            frame: IAU_EARTH_FRAME,
            pool,
            outputs: Vec::new(),
            summary: RunSummary::default(),
        })
    }

    /// Copies and returns [Engine] expressing satellite states in this [Frame]
    pub fn with_frame(mut self, frame: Frame) -> Self {
        self.frame = frame;
        self
    }

    /// Replaces the network [TraceSink]
    pub fn with_network_trace(mut self, trace: Box<dyn TraceSink>) -> Self {
        self.estimator = std::mem::take(&mut self.estimator).with_trace(trace);
        self
    }

    /// Declares a new station, fed by this [ObservationSource]
    pub fn add_station(&mut self, unit: StationUnit, source: Box<dyn ObservationSource>) -> StationIndex {
        let id = unit.id.clone();
        self.stations.insert_unit(unit);
        self.synchronizer.add_source(&mut self.stations, &id, source)
    }

    /// Declares a new [ObservationSource], its station is created on first sighting
    pub fn add_source(&mut self, id: &str, source: Box<dyn ObservationSource>) -> StationIndex {
        self.synchronizer.add_source(&mut self.stations, id, source)
    }

    /// Registers a new [EpochOutput]
    pub fn add_output(&mut self, output: Box<dyn EpochOutput>) {
        self.outputs.push(output);
    }

    /// [RejectionPipeline], for custom reactions to be registered
    pub fn pipeline_mut(&mut self) -> &mut RejectionPipeline {
        &mut self.pipeline
    }

    pub fn registry(&self) -> &StateRegistry {
        &self.registry
    }

    pub fn stations(&self) -> &StationTable {
        &self.stations
    }

    pub fn synchronizer(&self) -> &EpochSynchronizer {
        &self.synchronizer
    }

    /// Stations that contributed to the latest epoch
    pub fn ready_stations(&self) -> Vec<String> {
        self.stations.ready()
    }

    /// Runs until an end condition is met, then post processes.
    pub fn run(&mut self) -> RunSummary {
        loop {
            match self.synchronizer.next_epoch(&mut self.stations, &self.cfg.station) {
                EpochStatus::Complete => break,
                EpochStatus::Retry => continue,
                EpochStatus::Synced { t, .. } => {
                    self.process_epoch(t);
                    if !self.synchronizer.finish_epoch(t) {
                        break;
                    }
                },
            }
        }
        self.post_processing()
    }

    /// Admissible satellites of this epoch: the configured ones,
    /// or all satellites in sight when none were specified.
    fn admissible_satellites(&self) -> Vec<SV> {
        if !self.cfg.satellites.is_empty() {
            return self.cfg.satellites.clone();
        }
        self.stations
            .iter()
            .filter(|unit| unit.ready)
            .flat_map(|unit| unit.observations.iter().map(|obs| obs.sv))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Processes one synchronized epoch.
    pub fn process_epoch(&mut self, t: Epoch) {
        let satellites: SatelliteMap =
            precompute(self.orbits.as_ref(), &self.admissible_satellites(), t, self.frame);

        let cfg = &self.cfg;
        let sats = &satellites;
        let stations = &mut self.stations;

        self.pool.install(|| {
            stations
                .units_mut()
                .par_iter_mut()
                .for_each(|unit| unit.process_epoch(t, sats, cfg));
        });

        let ready = self
            .stations
            .iter()
            .filter(|unit| unit.ready && !unit.invalid)
            .map(|unit| unit.index)
            .collect::<Vec<_>>();

        if self.summary.first_epoch.is_none() {
            self.summary.first_epoch = Some(t);
        }
        self.summary.last_epoch = Some(t);
        self.summary.epochs += 1;

        match self.estimator.process_epoch(
            t,
            &mut self.registry,
            &mut self.stations,
            &ready,
            &satellites,
            &self.pipeline,
            &self.cfg,
        ) {
            Ok(solution) => {
                for output in self.outputs.iter_mut() {
                    output.epoch(t, &solution, &self.registry, &self.stations);
                }
            },
            Err(e) => {
                error!("{} - network update failed: {}", t, e);
                self.registry.close_statistics();
                self.summary.failed_epochs += 1;
            },
        }
    }

    /// Final summaries, once the main loop has ended.
    fn post_processing(&mut self) -> RunSummary {
        self.summary.statistics = *self.registry.statistics_sum();
        self.summary.dead_channels = self.synchronizer.dead_channels().to_vec();

        for unit in self.stations.iter() {
            info!("{} - {}", unit.id, unit.summary);
        }

        info!(
            "processed {} epochs ({} failed) - {}",
            self.summary.epochs, self.summary.failed_epochs, self.summary.statistics
        );

        for output in self.outputs.iter_mut() {
            output.finalize(&self.summary, &self.registry, &self.stations);
        }

        self.summary.clone()
    }
}
