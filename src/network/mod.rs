//! Network estimator: one shared filter updated from all ready stations
use std::collections::HashSet;

use itertools::Itertools;
use log::{debug, error, info, warn};
use nalgebra::Vector3;

use crate::{
    cfg::StateOpts,
    measurement::{BatchBuilder, MeasExtension, MeasKey, MeasKind, MeasRow, MeasurementBatch, ObsRef},
    orbit::SatelliteMap,
    pipeline::{reset_outage, reset_phase_reject, Reaction, ReactionContext, RejectionPipeline},
    prelude::{Config, Epoch, Error, NoiseModel, StateKey, StateRegistry, Statistics, SV},
    station::{StationIndex, StationTable, StationUnit},
    trace::{LogTrace, TraceSink},
};

mod kalman;

/// Summary of one network update.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkSolution {
    /// [Epoch] of this update
    pub t: Epoch,
    /// Contributing stations
    pub stations: Vec<StationIndex>,
    /// Number of states after the update
    pub num_states: usize,
    /// Number of measurement rows
    pub num_meas: usize,
    /// Number of filter iterations
    pub iterations: usize,
    /// Rows that went through the rejection pipeline
    pub rejected_meas: usize,
    /// Reaction counters of this epoch
    pub statistics: Statistics,
}

/// [NetworkEstimator] consumes all ready stations once per epoch and
/// updates the shared [StateRegistry] through the [RejectionPipeline].
pub struct NetworkEstimator {
    trace: Box<dyn TraceSink>,
}

impl Default for NetworkEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for NetworkEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("NetworkEstimator").finish()
    }
}

/// Inserts this state if absent, installing its random walk.
fn ensure_state(registry: &mut StateRegistry, key: StateKey, x0: f64, opts: &StateOpts) -> usize {
    if let Some(pos) = registry.position(&key) {
        return pos;
    }

    let pos = registry.upsert_with(key.clone(), x0, opts.sigma0.powi(2));

    if opts.proc_noise > 0.0 {
        if let Err(e) = registry.set_noise_model(&key, NoiseModel::random_walk(opts.proc_noise)) {
            error!("{} - {}", key, e);
        }
    }
    pos
}

/// Station position the observations are linearized about
fn linearization_point(unit: &StationUnit) -> Option<Vector3<f64>> {
    unit.apriori_ecef_m
        .or(unit.solution.map(|sol| sol.position_ecef_m))
}

impl NetworkEstimator {
    /// Creates a new [NetworkEstimator], tracing to the [log] facade
    pub fn new() -> Self {
        Self {
            trace: Box::new(LogTrace::new("NETWORK")),
        }
    }

    /// Replaces the network [TraceSink]
    pub fn with_trace(mut self, trace: Box<dyn TraceSink>) -> Self {
        self.trace = trace;
        self
    }

    /// Creates the placeholder satellite states of all admissible satellites.
    pub fn initialize(&mut self, registry: &mut StateRegistry, cfg: &Config) {
        for sv in cfg.satellites.iter() {
            ensure_state(registry, StateKey::sat_clock(*sv), 0.0, &cfg.network.sat_clock);
        }
        debug!("network initialized with {} states", registry.len());
    }

    /// Removes the ambiguities whose tracking was lost or failed too often.
    fn reset_ambiguities(&mut self, registry: &mut StateRegistry, stations: &StationTable, cfg: &Config) {
        let opts = &cfg.reject;

        for unit in stations.iter() {
            for (sv, code, status) in unit.signals() {
                let rejected = status.phase_reject.get() > opts.phase_reject_limit;
                let outage = status.phase_outage.get() > opts.phase_outage_limit;

                if !(rejected || outage || status.slip) {
                    continue;
                }

                let key = StateKey::ambiguity(&unit.id, sv, status.sub);
                if registry.remove(&key).is_some() {
                    self.trace.append(&format!(
                        "resetting ambiguity {} ({}): rejections={} outage={} slip={}",
                        key,
                        code,
                        status.phase_reject.get(),
                        status.phase_outage.get(),
                        status.slip,
                    ));
                }

                if rejected {
                    status.phase_reject.reset();
                }
            }
        }
    }

    /// Lazily adds the states the ready stations refer to.
    fn add_states(
        &mut self,
        registry: &mut StateRegistry,
        stations: &StationTable,
        ready: &[StationIndex],
        satellites: &SatelliteMap,
        cfg: &Config,
    ) {
        let opts = &cfg.network;

        for unit in ready.iter().filter_map(|index| stations.get(*index)) {
            let clock0 = unit.solution.map(|sol| sol.clock_m).unwrap_or_default();

            ensure_state(
                registry,
                StateKey::rec_clock(&unit.id).with_station_ref(unit.index),
                clock0,
                &opts.rec_clock,
            );

            for obs in unit.observations.iter() {
                if !satellites.contains_key(&obs.sv) {
                    continue;
                }
                match obs.elevation_deg {
                    Some(elev) if elev >= opts.min_elevation => {},
                    _ => continue,
                }

                ensure_state(registry, StateKey::sat_clock(obs.sv), 0.0, &opts.sat_clock);

                if let Some(orbit) = &opts.orbit {
                    for component in 0..6 {
                        ensure_state(registry, StateKey::orbit(obs.sv, component), 0.0, orbit);
                    }
                }

                for signal in obs.signals.iter() {
                    let (Some(code), Some(phase)) = (signal.pseudo_range_m, signal.phase_range_m)
                    else {
                        continue;
                    };
                    let Some(status) = unit.signal_status(obs.sv, &signal.code) else {
                        continue;
                    };
                    ensure_state(
                        registry,
                        StateKey::ambiguity(&unit.id, obs.sv, status.sub),
                        phase - code,
                        &opts.ambiguity,
                    );
                }
            }
        }
    }

    /// Forms the combined [MeasurementBatch] of all ready stations.
    fn form_batch(
        &self,
        registry: &StateRegistry,
        stations: &StationTable,
        ready: &[StationIndex],
        satellites: &SatelliteMap,
        cfg: &Config,
    ) -> Result<MeasurementBatch, Error> {
        let opts = &cfg.network;
        let x = registry.x();
        let value = |pos: Option<usize>| pos.map(|pos| x[pos]).unwrap_or_default();

        let mut builder = BatchBuilder::new();

        for unit in ready.iter().filter_map(|index| stations.get(*index)) {
            let Some(rx) = linearization_point(unit) else {
                continue;
            };
            let Some(rec_pos) = registry.position(&StateKey::rec_clock(&unit.id)) else {
                continue;
            };

            for (obs_index, obs) in unit.observations.iter().enumerate() {
                let Some(sat) = satellites.get(&obs.sv) else {
                    continue;
                };
                match obs.elevation_deg {
                    Some(elev) if elev >= opts.min_elevation => {},
                    _ => continue,
                }
                let Some(sat_pos) = registry.position(&StateKey::sat_clock(obs.sv)) else {
                    continue;
                };

                // orbit corrections, if estimated
                let orbit = (0..3)
                    .map(|c| registry.position(&StateKey::orbit(obs.sv, c)))
                    .collect::<Vec<_>>();

                let sat_m = sat.position_m
                    + Vector3::new(value(orbit[0]), value(orbit[1]), value(orbit[2]));

                let los = sat_m - rx;
                let rho = los.norm();
                if rho == 0.0 {
                    continue;
                }
                let e = los / rho;

                let mut geometry = vec![(rec_pos, 1.0), (sat_pos, -1.0)];
                for (c, pos) in orbit.iter().enumerate() {
                    if let Some(pos) = pos {
                        geometry.push((*pos, e[c]));
                    }
                }

                let computed = rho + x[rec_pos] - x[sat_pos];
                let obs_ref = Some(ObsRef {
                    station: unit.index,
                    observation: obs_index,
                });

                // the ionosphere is observable from a pair of code signals
                let iono_pair = obs
                    .signals
                    .iter()
                    .filter(|signal| {
                        signal.pseudo_range_m.is_some() && signal.code_variance.is_some()
                    })
                    .filter_map(|signal| unit.signal_status(obs.sv, &signal.code))
                    .map(|status| status.iono_outage.clone())
                    .collect::<Vec<_>>();

                for (signal_index, signal) in obs.signals.iter().enumerate() {
                    let Some(status) = unit.signal_status(obs.sv, &signal.code) else {
                        continue;
                    };

                    if let (Some(pr), Some(variance)) = (signal.pseudo_range_m, signal.code_variance)
                    {
                        let iono_outage_alt = iono_pair
                            .iter()
                            .find(|counter| !counter.same_as(&status.iono_outage))
                            .cloned();

                        status.used.set(true);
                        builder.push(MeasRow {
                            key: MeasKey::new(
                                MeasKind::CodeMeas,
                                Some(&unit.id),
                                Some(obs.sv),
                                signal_index,
                            ),
                            h: geometry.clone(),
                            v: pr - computed,
                            variance,
                            extension: MeasExtension {
                                iono_outage: iono_outage_alt
                                    .as_ref()
                                    .map(|_| status.iono_outage.clone()),
                                iono_outage_alt,
                                obs: obs_ref,
                                used: Some(status.used.clone()),
                                ..Default::default()
                            },
                        });
                    }

                    let (Some(ph), Some(variance)) = (signal.phase_range_m, signal.phase_variance)
                    else {
                        continue;
                    };
                    let Some(amb_pos) =
                        registry.position(&StateKey::ambiguity(&unit.id, obs.sv, status.sub))
                    else {
                        continue;
                    };

                    let mut h = geometry.clone();
                    h.push((amb_pos, 1.0));

                    status.used.set(true);
                    builder.push(MeasRow {
                        key: MeasKey::new(
                            MeasKind::PhasMeas,
                            Some(&unit.id),
                            Some(obs.sv),
                            signal_index,
                        ),
                        h,
                        v: ph - computed - x[amb_pos],
                        variance,
                        extension: MeasExtension {
                            phase_reject: Some(status.phase_reject.clone()),
                            phase_outage: Some(status.phase_outage.clone()),
                            obs: obs_ref,
                            used: Some(status.used.clone()),
                            ..Default::default()
                        },
                    });
                }
            }
        }

        if let (Some(_), Some(sigma)) = (&opts.orbit, opts.orbit_pseudo_obs_sigma) {
            let orbits = registry
                .keys()
                .iter()
                .filter(|key| key.is_orbit_position())
                .filter_map(|key| Some((key.sv?, key.sub, registry.position(key)?)))
                .sorted_by_key(|(sv, sub, _)| (*sv, *sub))
                .collect::<Vec<(SV, usize, usize)>>();

            for (sv, sub, pos) in orbits {
                builder.push(MeasRow {
                    key: MeasKey::new(MeasKind::PseudoObs, None, Some(sv), sub),
                    h: vec![(pos, 1.0)],
                    v: -x[pos],
                    variance: sigma.powi(2),
                    extension: MeasExtension::pseudo_obs(),
                });
            }
        }

        builder.build(registry.len())
    }

    /// Runs the network update of epoch `t`.
    ///
    /// Numerical failures are returned to the caller, the registry is then
    /// left in its predicted state.
    pub fn process_epoch(
        &mut self,
        t: Epoch,
        registry: &mut StateRegistry,
        stations: &mut StationTable,
        ready: &[StationIndex],
        satellites: &SatelliteMap,
        pipeline: &RejectionPipeline,
        cfg: &Config,
    ) -> Result<NetworkSolution, Error> {
        self.trace.append(&format!("------ {} ------", t));

        self.reset_ambiguities(registry, stations, cfg);
        self.add_states(registry, stations, ready, satellites, cfg);

        registry.time_update(t)?;

        let mut batch = self.form_batch(registry, stations, ready, satellites, cfg)?;

        let num_meas = batch.len();
        let mut iterations = 0;
        let mut rejected = HashSet::<usize>::new();
        let mut suppressed = HashSet::<StateKey>::new();

        if batch.is_empty() {
            warn!("{} - no measurements", t);
        } else {
            let max_iterations = cfg.reject.max_iterations.max(1);

            loop {
                iterations += 1;
                batch.check(registry.len())?;

                let testing = iterations < max_iterations;

                let p = registry.p().clone();
                let s = kalman::innovation(&batch.h, &p, &batch.r);

                if testing {
                    if let Some(sigma) = cfg.reject.prefit_sigma {
                        if let Some((row, normalized)) =
                            kalman::worst_outlier(&batch.v, &s, sigma, |_| false)
                        {
                            self.trace.append(&format!(
                                "prefit test failure: {} ({:.2} sigma)",
                                batch.keys[row], normalized
                            ));
                            let mut ctx = ReactionContext::new(
                                pipeline,
                                &cfg.reject,
                                registry,
                                &mut batch,
                                stations,
                                self.trace.as_mut(),
                            );
                            ctx.reject_measurement(row);
                            rejected.extend(ctx.visited_rows());
                            continue;
                        }
                    }
                }

                let k = kalman::gain(&p, &batch.h, &s)?;
                let dx = &k * &batch.v;

                if testing {
                    if let Some(sigma) = cfg.reject.state_sigma {
                        let keys = registry.keys();
                        let worst = kalman::worst_outlier(&dx, &p, sigma, |i| {
                            suppressed.contains(&keys[i])
                        });

                        if let Some((pos, normalized)) = worst {
                            let key = keys[pos].clone();
                            self.trace.append(&format!(
                                "state test failure: {} ({:.2} sigma)",
                                key, normalized
                            ));
                            let mut ctx = ReactionContext::new(
                                pipeline,
                                &cfg.reject,
                                registry,
                                &mut batch,
                                stations,
                                self.trace.as_mut(),
                            );
                            let outcome = ctx.reject_state(&key);
                            rejected.extend(ctx.visited_rows());
                            if outcome == Reaction::Suppress {
                                suppressed.insert(key);
                            }
                            continue;
                        }
                    }
                }

                let p = kalman::joseph(&p, &k, &batch.h, &batch.r);
                registry.correct(&dx, p)?;
                break;
            }

            for (i, ext) in batch.extensions.iter().enumerate() {
                if rejected.contains(&i) {
                    if let Some(used) = &ext.used {
                        used.set(false);
                    }
                    continue;
                }
                if ext.used.as_ref().is_some_and(|used| used.get()) {
                    reset_outage(ext);
                    reset_phase_reject(ext);
                }
            }
        }

        for index in ready.iter() {
            let Some(unit) = stations.get_mut(*index) else {
                continue;
            };
            if let Some((clock_m, _)) = registry.value(&StateKey::rec_clock(&unit.id)) {
                unit.net_clock_correction_m = Some(clock_m);
            }
        }

        let statistics = registry.close_statistics();

        info!(
            "{} - network update: {} states, {} measurements, {} iterations, {} reactions",
            t,
            registry.len(),
            num_meas,
            iterations,
            statistics.total()
        );

        Ok(NetworkSolution {
            t,
            stations: ready.to_vec(),
            num_states: registry.len(),
            num_meas,
            iterations,
            rejected_meas: rejected.len(),
            statistics,
        })
    }
}

/// Receiver clock state of this station, if estimated
pub fn receiver_clock(registry: &StateRegistry, station: &str) -> Option<(f64, f64)> {
    registry.value(&StateKey::rec_clock(station))
}

/// Satellite clock state of this [SV], if estimated
pub fn satellite_clock(registry: &StateRegistry, sv: SV) -> Option<(f64, f64)> {
    registry.value(&StateKey::sat_clock(sv))
}
