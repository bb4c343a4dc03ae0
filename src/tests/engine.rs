use std::sync::{Arc, Mutex};

use crate::prelude::{
    Config, Engine, Epoch, EpochOutput, NetworkSolution, RunSummary, StateRegistry, StationIndex,
    StationTable, StationUnit, TraceBuffer,
};
use crate::tests::{
    epoch, init_logger, network_config, observations, satellite_positions, station_ids,
    station_position, ManualClock, ReplaySource, StaticOrbits,
};

#[derive(Debug, Default)]
struct Recorded {
    epochs: Vec<(Epoch, usize, usize)>,
    summary: Option<RunSummary>,
}

/// [EpochOutput] recording every callback
#[derive(Debug, Clone, Default)]
struct Recorder {
    inner: Arc<Mutex<Recorded>>,
}

impl EpochOutput for Recorder {
    fn epoch(
        &mut self,
        t: Epoch,
        solution: &NetworkSolution,
        _: &StateRegistry,
        stations: &StationTable,
    ) {
        self.inner
            .lock()
            .unwrap()
            .epochs
            .push((t, solution.stations.len(), stations.ready().len()));
    }

    fn finalize(&mut self, summary: &RunSummary, _: &StateRegistry, _: &StationTable) {
        self.inner.lock().unwrap().summary = Some(summary.clone());
    }
}

fn replay(id: &str, epochs: usize) -> Box<ReplaySource> {
    Box::new(ReplaySource::new(
        (0..epochs).map(|n| observations(id, epoch(n))).collect(),
    ))
}

fn engine(cfg: &Config, epochs: usize) -> Engine {
    let orbits = Box::new(StaticOrbits::new(satellite_positions()));
    let mut engine = Engine::with_clock(cfg, orbits, Box::new(ManualClock::new())).unwrap();

    for id in station_ids() {
        let unit = StationUnit::new(id, StationIndex(0))
            .with_apriori(station_position(id));
        engine.add_station(unit, replay(id, epochs));
    }
    engine
}

#[test]
fn post_processing_run() {
    init_logger();

    let cfg = network_config();
    let mut engine = engine(&cfg, 5);

    let recorder = Recorder::default();
    engine.add_output(Box::new(recorder.clone()));

    let summary = engine.run();

    assert_eq!(summary.epochs, 5);
    assert_eq!(summary.failed_epochs, 0);
    assert_eq!(summary.first_epoch, Some(epoch(0)));
    assert_eq!(summary.last_epoch, Some(epoch(4)));
    assert_eq!(summary.statistics.total(), 0);
    assert_eq!(summary.dead_channels, vec!["ABMF".to_string(), "GRAS".to_string()]);

    let recorded = recorder.inner.lock().unwrap();
    assert_eq!(
        recorded.epochs,
        (0..5).map(|n| (epoch(n), 2, 2)).collect::<Vec<_>>()
    );
    assert_eq!(recorded.summary.as_ref(), Some(&summary));

    // 6 satellite clocks, 2 receiver clocks, 12 ambiguities
    assert_eq!(engine.registry().len(), 20);

    for unit in engine.stations().iter() {
        assert_eq!(unit.summary.epoch_count, 5);
        assert_eq!(unit.summary.obs_count, 5 * 6);
        assert!(unit.clock_correction().is_some());
        assert!(unit.dead);
    }
}

#[test]
fn epoch_count_limit() {
    init_logger();

    let mut cfg = network_config();
    cfg.sync.max_epochs = 2;

    let mut engine = engine(&cfg, 5);
    let summary = engine.run();

    assert_eq!(summary.epochs, 2);
    assert_eq!(summary.last_epoch, Some(epoch(1)));
    assert!(summary.dead_channels.is_empty());
    assert_eq!(engine.ready_stations(), vec!["ABMF".to_string(), "GRAS".to_string()]);
}

#[test]
fn station_traces() {
    let cfg = network_config();
    let orbits = Box::new(StaticOrbits::new(satellite_positions()));

    let network = TraceBuffer::new();
    let abmf = TraceBuffer::new();

    let mut engine = Engine::with_clock(&cfg, orbits, Box::new(ManualClock::new()))
        .unwrap()
        .with_network_trace(Box::new(network.clone()));

    let unit = StationUnit::new("ABMF", StationIndex(0))
        .with_apriori(station_position("ABMF"))
        .with_trace(Box::new(abmf.clone()));

    engine.add_station(unit, replay("ABMF", 2));

    let summary = engine.run();
    assert_eq!(summary.epochs, 2);

    assert!(abmf.contains("epoch #1"));
    assert!(abmf.contains("local solution"));
    assert!(network.contains(&format!("------ {} ------", epoch(1))));
}

#[test]
fn invalid_stations_are_ignored() {
    init_logger();

    let mut cfg = network_config();
    cfg.station.require_antenna_details = true;

    let orbits = Box::new(StaticOrbits::new(satellite_positions()));
    let mut engine = Engine::with_clock(&cfg, orbits, Box::new(ManualClock::new())).unwrap();

    let abmf = StationUnit::new("ABMF", StationIndex(0))
        .with_apriori(station_position("ABMF"))
        .with_antenna("TRM57971.00 NONE");
    engine.add_station(abmf, replay("ABMF", 3));

    // no antenna details
    engine.add_source("GRAS", replay("GRAS", 3));

    let summary = engine.run();
    assert_eq!(summary.epochs, 3);

    let gras = engine.stations().by_id("GRAS").unwrap();
    assert!(gras.invalid);
    assert_eq!(gras.summary.epoch_count, 0);

    let abmf = engine.stations().by_id("ABMF").unwrap();
    assert_eq!(abmf.summary.epoch_count, 3);
}

#[test]
fn invalid_configuration() {
    let mut cfg = network_config();
    cfg.sync.epoch_interval = -1.0;

    let orbits = Box::new(StaticOrbits::new(satellite_positions()));
    assert!(Engine::with_clock(&cfg, orbits, Box::new(ManualClock::new())).is_err());
}
