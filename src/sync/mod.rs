//! Epoch synchronization: polls the input channels under wall-clock deadlines,
//! decides the epoch time, the ready stations and how much backlog to skip.
use std::collections::HashSet;
use std::time::Duration as StdDuration;

use log::{debug, error, info, warn};

use crate::{
    cfg::{StationOpts, SyncOpts},
    prelude::{Duration, Epoch, Observation, StationIndex},
    station::StationTable,
};

mod clock;
mod source;

pub use clock::{SystemClock, WallClock};
pub use source::{ObservationSource, WaitCode};

/// Outcome of one synchronization attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum EpochStatus {
    /// Epoch `t` is formed, `ready` stations contribute to it
    Synced {
        t: Epoch,
        ready: Vec<StationIndex>,
    },
    /// Epoch time could not be fixed yet: try again
    Retry,
    /// All inputs exhausted: the run is complete
    Complete,
}

/// Number of whole cadences to skip, given the loop `overrun`
/// and the nominal loop period.
pub fn excess_epochs(overrun: StdDuration, wait_next_epoch: StdDuration) -> usize {
    let period = wait_next_epoch.as_nanos();
    if period == 0 {
        return 0;
    }
    (overrun.as_nanos() / period) as usize
}

fn seconds(s: f64) -> StdDuration {
    StdDuration::from_secs_f64(s.max(0.0))
}

/// One input channel, bound to its station.
struct Channel {
    station: StationIndex,
    id: String,
    source: Box<dyn ObservationSource>,
}

/// [EpochSynchronizer] aligns the asynchronous station channels onto
/// the common epoch grid.
pub struct EpochSynchronizer {
    opts: SyncOpts,
    channels: Vec<Channel>,
    clock: Box<dyn WallClock>,
    /// Epoch clock, undefined until the first observation fixes it
    tsync: Option<Epoch>,
    /// Epoch counter
    epoch: usize,
    /// Cadences consumed by next loop
    loop_epochs: usize,
    /// Expected start of the next loop
    next_nominal_start: StdDuration,
    /// Dead channels, by station identifier
    dead: Vec<String>,
    /// Stations that will never deliver again, no longer polled
    never: HashSet<StationIndex>,
    inputs_finished: bool,
}

impl std::fmt::Debug for EpochSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("EpochSynchronizer")
            .field("tsync", &self.tsync)
            .field("epoch", &self.epoch)
            .field("loop_epochs", &self.loop_epochs)
            .field("channels", &self.channels.len())
            .field("dead", &self.dead)
            .field("never", &self.never)
            .finish()
    }
}

impl EpochSynchronizer {
    /// Creates a new [EpochSynchronizer]. The first nominal loop start
    /// is deferred by [SyncOpts::initial_wait].
    pub fn new(opts: &SyncOpts, clock: Box<dyn WallClock>) -> Self {
        let next_nominal_start = clock.now() + seconds(opts.initial_wait);
        Self {
            opts: opts.clone(),
            channels: Vec::new(),
            clock,
            tsync: None,
            epoch: 1,
            loop_epochs: 0,
            next_nominal_start,
            dead: Vec::new(),
            never: HashSet::new(),
            inputs_finished: false,
        }
    }

    /// Binds a new [ObservationSource] to this station.
    /// The station is created on first sighting.
    pub fn add_source(
        &mut self,
        stations: &mut StationTable,
        id: &str,
        source: Box<dyn ObservationSource>,
    ) -> StationIndex {
        let station = stations.insert(id);
        self.channels.push(Channel {
            station,
            id: id.to_string(),
            source,
        });
        station
    }

    /// Epoch clock
    pub fn tsync(&self) -> Option<Epoch> {
        self.tsync
    }

    /// Epoch counter
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// Cadences the next loop will consume
    pub fn loop_epochs(&self) -> usize {
        self.loop_epochs
    }

    /// Number of live channels
    pub fn live_channels(&self) -> usize {
        self.channels.len()
    }

    /// Stations whose channel died
    pub fn dead_channels(&self) -> &[String] {
        &self.dead
    }

    /// Moves the schedule forward by the cadences consumed by the previous loop.
    fn advance_schedule(&mut self) {
        let loop_epochs = self.loop_epochs;

        if let Some(tsync) = self.tsync {
            let mut t =
                tsync + Duration::from_seconds(self.opts.epoch_interval) * loop_epochs as f64;

            let rounded = t.round(Duration::from_seconds(1.0));
            if (t - rounded).abs() < Duration::from_seconds(self.opts.epoch_tolerance) {
                t = rounded;
            }
            self.tsync = Some(t);
        }

        self.epoch += loop_epochs;
        self.next_nominal_start += seconds(self.opts.wait_next_epoch) * loop_epochs as u32;
    }

    /// Drops channels that are exhausted and dead.
    fn prune(&mut self, stations: &mut StationTable) {
        let dead = &mut self.dead;
        self.channels.retain(|channel| {
            if !channel.source.exhausted() || !channel.source.is_dead() {
                return true;
            }

            info!("no more data available on {}", channel.id);
            dead.push(channel.id.clone());

            if let Some(unit) = stations.get_mut(channel.station) {
                unit.dead = true;
                unit.observations.clear();
            }
            false
        });
    }

    /// Gathers the next epoch.
    ///
    /// Stations that did not become ready before the deadline do not
    /// contribute to this epoch.
    pub fn next_epoch(&mut self, stations: &mut StationTable, station_opts: &StationOpts) -> EpochStatus {
        self.advance_schedule();

        let mut break_time = self.next_nominal_start + seconds(self.opts.wait_all_stations);

        info!("starting epoch #{}", self.epoch);

        for unit in stations.iter_mut() {
            unit.reset_epoch();
            let header = format!("------ epoch #{} - {:?} ------", self.epoch, self.tsync);
            unit.trace(&header);
        }

        let tolerance = Duration::from_seconds(self.opts.matching_tolerance());
        let retry_sleep = StdDuration::from_millis(self.opts.retry_sleep_ms);

        let mut complete = false;
        let mut found_first = false;
        let mut repeat = true;
        let mut at_least_once = true;

        while at_least_once || (repeat && self.clock.now() < break_time) {
            at_least_once = false;

            // mandatory observations: only a discarded epoch anchor is retried
            if self.opts.require_obs {
                repeat = false;
            }

            self.prune(stations);

            if self.channels.is_empty() {
                if !self.inputs_finished {
                    self.inputs_finished = true;
                    info!("inputs finished at epoch #{}", self.epoch);
                }
                if self.opts.require_obs {
                    complete = true;
                } else {
                    // free running: idle until the nominal loop start
                    let now = self.clock.now();
                    self.clock.sleep(self.next_nominal_start.saturating_sub(now));
                }
                break;
            }

            let mut pending = false;
            let mut failed = false;

            for channel in self.channels.iter_mut() {
                let Some(unit) = stations.get_mut(channel.station) else {
                    continue;
                };

                if station_opts.is_excluded(&unit.id)
                    || unit.ready
                    || self.never.contains(&channel.station)
                {
                    continue;
                }

                let (observations, code) = loop {
                    let (observations, code) = channel.source.next_batch(self.tsync, tolerance);
                    if code == WaitCode::Early {
                        unit.preprocess(observations);
                        unit.observations.clear();
                        continue;
                    }
                    break (observations, code);
                };

                match code {
                    WaitCode::Never => {
                        info!("{} - no more data expected: no longer polled", channel.id);
                        self.never.insert(channel.station);
                        continue;
                    },
                    WaitCode::Wait | WaitCode::Early => {
                        failed = true;
                        self.clock.sleep(retry_sleep);
                        continue;
                    },
                    WaitCode::Complete => {},
                }

                let Some(first) = observations.first().map(|obs: &Observation| obs.t) else {
                    failed = true;
                    self.clock.sleep(retry_sleep);
                    continue;
                };

                match self.tsync {
                    None => {
                        let floored = first.floor(Duration::from_seconds(self.opts.epoch_interval));
                        if (first - floored).abs() > tolerance {
                            warn!(
                                "{} - {} does not fall on the epoch grid: discarded",
                                channel.id, first
                            );
                            pending = true;
                            repeat = true;
                            self.clock.sleep(retry_sleep);
                            continue;
                        }
                        info!("epoch clock fixed to {}", floored);
                        self.tsync = Some(floored);
                    },
                    Some(tsync) => {
                        if (first - tsync).abs() > tolerance {
                            debug!(
                                "{} - {} out of tolerance of {}: retrying",
                                channel.id, first, tsync
                            );
                            failed = true;
                            self.clock.sleep(retry_sleep);
                            continue;
                        }
                    },
                }

                if !found_first {
                    found_first = true;

                    // only shorten waiting periods, never extend
                    let now = self.clock.now();
                    let alternate_break = now + seconds(self.opts.wait_all_stations);
                    let alternate_start = now + seconds(self.opts.wait_next_epoch);

                    if alternate_break < break_time {
                        break_time = alternate_break;
                    }
                    if alternate_start < self.next_nominal_start {
                        self.next_nominal_start = alternate_start;
                    }
                }

                unit.preprocess(observations);
                unit.ready = true;
            }

            if failed && self.opts.require_obs {
                debug!("epoch #{} - incomplete pass: polling aborted", self.epoch);
                break;
            }
            if !pending && !failed {
                break;
            }
        }

        if complete {
            return EpochStatus::Complete;
        }

        let t = match self.tsync {
            Some(t) => t,
            None => {
                if self.opts.require_obs {
                    return EpochStatus::Retry;
                }
                let t = self.clock.epoch_now();
                self.tsync = Some(t);
                t
            },
        };

        let ready = stations
            .iter()
            .filter(|unit| unit.ready)
            .map(|unit| unit.index)
            .collect::<Vec<_>>();

        info!("{} - synced {} stations", t, ready.len());

        EpochStatus::Synced { t, ready }
    }

    /// Concludes epoch `t`: returns false once an end condition is reached.
    /// Otherwise, determines how many cadences the next loop consumes.
    pub fn finish_epoch(&mut self, t: Epoch) -> bool {
        if let Some(end) = self.opts.end_epoch {
            if t >= end {
                info!("exiting at epoch #{} ({}): end epoch reached", self.epoch, t);
                return false;
            }
        }

        if self.opts.max_epochs > 0 && self.epoch >= self.opts.max_epochs {
            info!(
                "exiting at epoch #{} ({}): epoch count reached",
                self.epoch, t
            );
            return false;
        }

        let deadline = self.next_nominal_start + seconds(self.opts.wait_all_stations);
        let overrun = self.clock.now().saturating_sub(deadline);
        let skip = excess_epochs(overrun, seconds(self.opts.wait_next_epoch));

        if skip > 0 {
            error!(
                "excessive time elapsed: skipping {} epochs to epoch #{}",
                skip,
                self.epoch + skip + 1
            );
        }

        self.loop_epochs = 1 + skip;
        true
    }
}
