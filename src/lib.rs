#![doc = include_str!("../README.md")]
#![cfg_attr(docrs, feature(doc_cfg))]

extern crate gnss_rs as gnss;

// private modules
mod cfg;
mod engine;
mod error;
mod measurement;
mod network;
mod orbit;
mod pipeline;
mod state;
mod station;
mod sync;
mod trace;

#[cfg(test)]
mod tests;

// prelude
pub mod prelude {
    pub use crate::cfg::{
        Config, ElevationMappingFunction, MeasReactionKind, NetworkOpts, RejectOpts, StateOpts,
        StateReactionKind, StationOpts, SyncOpts,
    };
    pub use crate::engine::{Engine, EpochOutput, RunSummary};
    pub use crate::error::Error;
    pub use crate::measurement::{
        BatchBuilder, MeasExtension, MeasKey, MeasKind, MeasRow, MeasurementBatch, ObsRef,
        SignalCounter, UsedFlag,
    };
    pub use crate::network::{receiver_clock, satellite_clock, NetworkEstimator, NetworkSolution};
    pub use crate::orbit::{OrbitSource, SatelliteMap, SatelliteState};
    pub use crate::pipeline::{
        cascade_to_measurements, clock_glitch, deweight, orbit_glitch, phase_reject_count,
        pseudo_obs_cascade, reset_outage, reset_phase_reject, signal_errors, station_deweight,
        MeasReaction, Reaction, ReactionContext, RejectionPipeline, StateReaction,
    };
    pub use crate::state::{NoiseModel, StateKey, StateKind, StateRegistry, Statistics};
    pub use crate::station::{
        LocalSolution, Observation, Signal, SignalStatus, StationIndex, StationSummary,
        StationTable, StationUnit,
    };
    pub use crate::sync::{
        excess_epochs, EpochStatus, EpochSynchronizer, ObservationSource, SystemClock, WaitCode,
        WallClock,
    };
    pub use crate::trace::{LogTrace, TraceBuffer, TraceSink};
    // re-export
    pub use anise::prelude::{Frame, Orbit};
    pub use gnss::prelude::{Constellation, SV};
    pub use hifitime::{Duration, Epoch, TimeScale, Unit};
    pub use nalgebra::Vector3;
}

// pub export
pub use error::Error;
