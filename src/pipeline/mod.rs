//! Rejection pipeline: reactions to flagged measurements and states
use std::collections::HashSet;

use log::debug;

use crate::{
    cfg::{MeasReactionKind, RejectOpts, StateReactionKind},
    measurement::MeasurementBatch,
    prelude::{StateKey, StateRegistry},
    station::StationTable,
    trace::TraceSink,
};

mod measurement;
mod state;

pub use measurement::{
    deweight, phase_reject_count, pseudo_obs_cascade, reset_outage, reset_phase_reject,
    signal_errors, station_deweight,
};

pub use state::{cascade_to_measurements, clock_glitch, orbit_glitch};

/// Outcome of one reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Reaction {
    /// Keep going
    #[default]
    Continue,
    /// Flagged item was dealt with: it should be exempted from further testing
    /// during this epoch.
    Suppress,
}

impl Reaction {
    /// Combines two outcomes, [Reaction::Suppress] wins.
    pub fn and(self, rhs: Self) -> Self {
        match (self, rhs) {
            (Self::Continue, Self::Continue) => Self::Continue,
            _ => Self::Suppress,
        }
    }
}

/// Reaction to one flagged measurement row
pub type MeasReaction = Box<dyn Fn(&mut ReactionContext, usize) -> Reaction + Send + Sync>;

/// Reaction to one flagged state
pub type StateReaction = Box<dyn Fn(&mut ReactionContext, &StateKey) -> Reaction + Send + Sync>;

/// [RejectionPipeline] holds two ordered reaction chains.
/// Every entry of a chain runs, whatever the outcome of the previous one.
#[derive(Default)]
pub struct RejectionPipeline {
    measurement: Vec<(String, MeasReaction)>,
    state: Vec<(String, StateReaction)>,
}

impl std::fmt::Debug for RejectionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("RejectionPipeline")
            .field(
                "measurement",
                &self.measurement.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            )
            .field(
                "state",
                &self.state.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl RejectionPipeline {
    /// Creates an empty [RejectionPipeline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the [RejectionPipeline] described by [RejectOpts]
    pub fn from_opts(opts: &RejectOpts) -> Self {
        let mut s = Self::new();

        for kind in opts.meas_reactions.iter() {
            match kind {
                MeasReactionKind::SignalErrors => {
                    s.register_measurement("signal errors", signal_errors)
                },
                MeasReactionKind::PhaseRejectCount => {
                    s.register_measurement("phase reject count", phase_reject_count)
                },
                MeasReactionKind::Deweight => s.register_measurement("deweight", deweight),
                MeasReactionKind::StationDeweight => {
                    s.register_measurement("station deweight", station_deweight)
                },
                MeasReactionKind::PseudoObsCascade => {
                    s.register_measurement("pseudo obs cascade", pseudo_obs_cascade)
                },
            }
        }

        for kind in opts.state_reactions.iter() {
            match kind {
                StateReactionKind::CascadeToMeasurements => {
                    s.register_state("cascade to measurements", cascade_to_measurements)
                },
                StateReactionKind::ClockGlitch => s.register_state("clock glitch", clock_glitch),
                StateReactionKind::OrbitGlitch => s.register_state("orbit glitch", orbit_glitch),
            }
        }

        s
    }

    /// Appends a reaction to the measurement chain
    pub fn register_measurement<F>(&mut self, name: &str, reaction: F)
    where
        F: Fn(&mut ReactionContext, usize) -> Reaction + Send + Sync + 'static,
    {
        self.measurement.push((name.to_string(), Box::new(reaction)));
    }

    /// Appends a reaction to the state chain
    pub fn register_state<F>(&mut self, name: &str, reaction: F)
    where
        F: Fn(&mut ReactionContext, &StateKey) -> Reaction + Send + Sync + 'static,
    {
        self.state.push((name.to_string(), Box::new(reaction)));
    }

    /// Names of the measurement chain entries, in order
    pub fn measurement_chain(&self) -> Vec<&str> {
        self.measurement.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Names of the state chain entries, in order
    pub fn state_chain(&self) -> Vec<&str> {
        self.state.iter().map(|(name, _)| name.as_str()).collect()
    }
}

/// Everything a reaction may act upon.
///
/// One [ReactionContext] lives for one top level invocation: each row
/// and each state is reacted upon at most once, so cascades terminate.
pub struct ReactionContext<'a> {
    pipeline: &'a RejectionPipeline,
    /// Reaction options
    pub opts: &'a RejectOpts,
    /// Network states
    pub registry: &'a mut StateRegistry,
    /// Measurement batch being processed
    pub batch: &'a mut MeasurementBatch,
    /// Station table
    pub stations: &'a mut StationTable,
    /// Network trace
    pub trace: &'a mut dyn TraceSink,
    visited_rows: HashSet<usize>,
    visited_states: HashSet<StateKey>,
}

impl<'a> ReactionContext<'a> {
    pub fn new(
        pipeline: &'a RejectionPipeline,
        opts: &'a RejectOpts,
        registry: &'a mut StateRegistry,
        batch: &'a mut MeasurementBatch,
        stations: &'a mut StationTable,
        trace: &'a mut dyn TraceSink,
    ) -> Self {
        Self {
            pipeline,
            opts,
            registry,
            batch,
            stations,
            trace,
            visited_rows: HashSet::new(),
            visited_states: HashSet::new(),
        }
    }

    /// Runs the measurement chain on row `row`
    pub fn reject_measurement(&mut self, row: usize) -> Reaction {
        if row >= self.batch.len() || !self.visited_rows.insert(row) {
            return Reaction::Continue;
        }

        debug!("measurement rejection: {}", self.batch.keys[row]);

        let pipeline = self.pipeline;
        pipeline
            .measurement
            .iter()
            .fold(Reaction::Continue, |outcome, (_, reaction)| {
                outcome.and(reaction(self, row))
            })
    }

    /// Runs the state chain on `key`
    pub fn reject_state(&mut self, key: &StateKey) -> Reaction {
        if !self.visited_states.insert(key.clone()) {
            return Reaction::Continue;
        }

        debug!("state rejection: {}", key);

        let pipeline = self.pipeline;
        pipeline
            .state
            .iter()
            .fold(Reaction::Continue, |outcome, (_, reaction)| {
                outcome.and(reaction(self, key))
            })
    }

    /// Rows reacted upon so far
    pub fn visited_rows(&self) -> impl Iterator<Item = usize> + '_ {
        self.visited_rows.iter().copied()
    }

    /// Removes this state from both the registry and the batch.
    /// Its estimate is folded back into the batch residuals.
    pub fn remove_state(&mut self, key: &StateKey) {
        let Some(pos) = self.registry.position(key) else {
            return;
        };

        let x = self.registry.x()[pos];
        self.registry.remove(key);

        if pos < self.batch.num_states() {
            self.batch.remove_state(pos, x);
        }

        self.trace.append(&format!("- removing {}", key));
    }
}
