use crate::prelude::{
    receiver_clock, satellite_clock, Config, Constellation, Epoch, Error, NetworkEstimator,
    NetworkSolution, Observation, RejectionPipeline, Signal, StateKey, StateOpts, StateRegistry,
    StationIndex, StationTable, StationUnit, TraceBuffer, SV,
};
use crate::tests::{
    ambiguity, epoch, init_logger, network_config, observations, satellite_map, satellites,
    station_clock, station_ids, station_position,
};

/// Network estimator fed with the synthetic stations,
/// bypassing the synchronizer.
struct Network {
    cfg: Config,
    registry: StateRegistry,
    stations: StationTable,
    estimator: NetworkEstimator,
    pipeline: RejectionPipeline,
    trace: TraceBuffer,
}

impl Network {
    fn new(cfg: Config) -> Self {
        let trace = TraceBuffer::new();
        let mut stations = StationTable::new();

        for (index, id) in station_ids().into_iter().enumerate() {
            let unit = StationUnit::new(id, StationIndex(index))
                .with_apriori(station_position(id));
            stations.insert_unit(unit);
        }

        let mut registry = StateRegistry::new();
        let mut estimator = NetworkEstimator::new().with_trace(Box::new(trace.clone()));
        estimator.initialize(&mut registry, &cfg);

        Self {
            pipeline: RejectionPipeline::from_opts(&cfg.reject),
            cfg,
            registry,
            stations,
            estimator,
            trace,
        }
    }

    fn process<F>(&mut self, t: Epoch, tamper: F) -> Result<NetworkSolution, Error>
    where
        F: Fn(&str, &mut Vec<Observation>),
    {
        let satellites = satellite_map();
        let mut ready = Vec::new();

        for id in station_ids() {
            let mut obs = observations(id, t);
            tamper(id, &mut obs);

            let index = self.stations.index_of(id).unwrap();
            let unit = self.stations.get_mut(index).unwrap();

            unit.reset_epoch();
            unit.preprocess(obs);
            unit.ready = true;
            unit.process_epoch(t, &satellites, &self.cfg);

            if unit.ready {
                ready.push(index);
            }
        }

        self.estimator.process_epoch(
            t,
            &mut self.registry,
            &mut self.stations,
            &ready,
            &satellites,
            &self.pipeline,
            &self.cfg,
        )
    }

    fn clean(&mut self, t: Epoch) -> NetworkSolution {
        self.process(t, |_, _| {}).unwrap()
    }
}

fn gps(prn: u8) -> SV {
    SV::new(Constellation::GPS, prn)
}

#[test]
fn error_free_network() {
    init_logger();
    let mut network = Network::new(network_config());

    for n in 0..3 {
        let solution = network.clean(epoch(n));
        assert_eq!(solution.t, epoch(n));
        assert_eq!(solution.stations.len(), 2);
        assert_eq!(solution.num_meas, 2 * 6 * 2);
        assert_eq!(solution.iterations, 1);
        assert_eq!(solution.rejected_meas, 0);
        assert_eq!(solution.statistics.total(), 0);
    }

    // 6 satellite clocks, 2 receiver clocks, 12 ambiguities
    assert_eq!(network.registry.len(), 20);

    for id in station_ids() {
        let (clock, _) = receiver_clock(&network.registry, id).unwrap();
        assert!((clock - station_clock(id)).abs() < 1.0E-2, "{} clock: {}", id, clock);

        let unit = network.stations.by_id(id).unwrap();
        assert_eq!(unit.clock_correction(), Some(clock));

        for sv in satellites() {
            let status = unit.signal_status(sv, "1C").unwrap();
            assert!(status.used.get());
            assert_eq!(status.phase_outage.get(), 0);
            assert_eq!(status.phase_reject.get(), 0);

            let (amb, _) = network
                .registry
                .value(&StateKey::ambiguity(id, sv, status.sub))
                .unwrap();
            assert!((amb - ambiguity(sv)).abs() < 1.0E-2, "{}({}) ambiguity", id, sv);
        }
    }

    for sv in satellites() {
        let (clock, _) = satellite_clock(&network.registry, sv).unwrap();
        assert!(clock.abs() < 1.0E-2, "{} clock: {}", sv, clock);
    }
}

#[test]
fn code_outlier_is_deweighted() {
    init_logger();
    let mut network = Network::new(network_config());

    network.clean(epoch(0));
    network.clean(epoch(1));

    let solution = network
        .process(epoch(2), |id, obs| {
            if id == "ABMF" {
                for obs in obs.iter_mut().filter(|obs| obs.sv == gps(3)) {
                    if let Some(pr) = obs.signals[0].pseudo_range_m.as_mut() {
                        *pr += 50.0;
                    }
                }
            }
        })
        .unwrap();

    assert!(solution.rejected_meas >= 1);
    assert!(solution.statistics.meas_deweight >= 1);
    assert!(solution.iterations > 1);
    assert!(network
        .trace
        .contains(&format!("prefit test failure: CODE_MEAS ABMF {}", gps(3))));

    let (clock, _) = receiver_clock(&network.registry, "ABMF").unwrap();
    assert!((clock - station_clock("ABMF")).abs() < 0.5, "ABMF clock: {}", clock);

    // statistics are closed with the epoch
    assert_eq!(network.registry.statistics().total(), 0);
    assert!(network.registry.statistics_sum().meas_deweight >= 1);
}

#[test]
fn rejected_phase_resets_ambiguity() {
    init_logger();
    let mut network = Network::new(network_config());
    let g08 = gps(8);

    let tamper = |id: &str, obs: &mut Vec<Observation>| {
        if id == "ABMF" {
            for obs in obs.iter_mut().filter(|obs| obs.sv == gps(8)) {
                if let Some(ph) = obs.signals[0].phase_range_m.as_mut() {
                    *ph += 5.0;
                }
            }
        }
    };

    network.clean(epoch(0));
    network.clean(epoch(1));

    for n in 2..5 {
        let solution = network.process(epoch(n), tamper).unwrap();
        assert!(solution.rejected_meas >= 1, "epoch {}", n);
    }

    let abmf = network.stations.by_id("ABMF").unwrap();
    assert_eq!(abmf.signal_status(g08, "1C").unwrap().phase_reject.get(), 3);
    assert_eq!(abmf.summary.phase_rejections, 3);
    assert!(abmf
        .observations
        .iter()
        .filter(|obs| obs.sv == g08)
        .all(|obs| obs.signals[0].phase_error));

    // reject limit exceeded: ambiguity is reinitialized from the tampered data
    let solution = network.process(epoch(5), tamper).unwrap();
    assert_eq!(solution.rejected_meas, 0);
    assert!(network.trace.contains("resetting ambiguity"));

    let abmf = network.stations.by_id("ABMF").unwrap();
    let status = abmf.signal_status(g08, "1C").unwrap();
    assert_eq!(status.phase_reject.get(), 0);

    let (amb, _) = network
        .registry
        .value(&StateKey::ambiguity("ABMF", g08, status.sub))
        .unwrap();
    assert!((amb - ambiguity(g08) - 5.0).abs() < 1.0E-2);
}

#[test]
fn ionosphere_outage() {
    init_logger();
    let mut network = Network::new(network_config());

    // ABMF tracks a second code signal
    let tamper = |id: &str, obs: &mut Vec<Observation>| {
        if id == "ABMF" {
            for obs in obs.iter_mut() {
                if let Some(pr) = obs.signals[0].pseudo_range_m {
                    let signal = Signal::new("2W").with_pseudo_range(pr).with_snr(45.0);
                    obs.signals.push(signal);
                }
            }
        }
    };

    for n in 0..3 {
        let solution = network.process(epoch(n), tamper).unwrap();
        assert_eq!(solution.rejected_meas, 0);
    }

    let abmf = network.stations.by_id("ABMF").unwrap();
    let gras = network.stations.by_id("GRAS").unwrap();

    for sv in satellites() {
        for code in ["1C", "2W"] {
            let status = abmf.signal_status(sv, code).unwrap();
            assert_eq!(status.iono_outage.get(), 0, "ABMF({}) {}", sv, code);
        }

        // single frequency: never observable
        let status = gras.signal_status(sv, "1C").unwrap();
        assert_eq!(status.iono_outage.get(), 3, "GRAS({})", sv);
        assert_eq!(status.phase_outage.get(), 0);
    }
}

#[test]
fn orbit_corrections() {
    init_logger();
    let mut cfg = network_config();
    cfg.network.orbit = Some(StateOpts::new(1.0, 0.0));
    cfg.network.orbit_pseudo_obs_sigma = Some(1.0);

    let mut network = Network::new(cfg);

    let solution = network.clean(epoch(0));
    // one pseudo observation per position component
    assert_eq!(solution.num_meas, 2 * 6 * 2 + 6 * 3);
    assert_eq!(solution.rejected_meas, 0);

    network.clean(epoch(1));

    for sv in satellites() {
        for component in 0..6 {
            let (dx, _) = network
                .registry
                .value(&StateKey::orbit(sv, component))
                .unwrap();
            assert!(dx.abs() < 1.0E-2, "{} orbit[{}]: {}", sv, component, dx);
        }
    }
}

#[test]
fn elevation_mask() {
    let mut cfg = network_config();
    cfg.network.min_elevation = 89.0;

    let mut network = Network::new(cfg);
    let solution = network.clean(epoch(0));

    assert_eq!(solution.num_meas, 0);
    assert_eq!(solution.iterations, 0);
    // placeholders and receiver clocks only
    assert_eq!(network.registry.len(), 6 + 2);
}

#[test]
fn no_ready_station() {
    let cfg = network_config();
    let mut network = Network::new(cfg.clone());
    let satellites = satellite_map();

    let solution = network
        .estimator
        .process_epoch(
            epoch(0),
            &mut network.registry,
            &mut network.stations,
            &[],
            &satellites,
            &network.pipeline,
            &cfg,
        )
        .unwrap();

    assert!(solution.stations.is_empty());
    assert_eq!(solution.num_meas, 0);
    assert_eq!(network.registry.len(), 6);
}
