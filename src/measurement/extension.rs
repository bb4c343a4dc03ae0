use std::sync::{
    atomic::{AtomicBool, AtomicU32, Ordering},
    Arc,
};

use crate::prelude::StationIndex;

/// Shared signal counter (phase rejections, outages).
/// The owning station keeps one end, measurement rows may hold another one.
#[derive(Debug, Clone, Default)]
pub struct SignalCounter(Arc<AtomicU32>);

impl SignalCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }

    /// Increments and returns the new value
    pub fn increment(&self) -> u32 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn reset(&self) {
        self.0.store(0, Ordering::Relaxed);
    }

    /// True when both handles refer to the same counter
    pub fn same_as(&self, rhs: &Self) -> bool {
        Arc::ptr_eq(&self.0, &rhs.0)
    }
}

/// Shared "used in solution" flag of one signal.
#[derive(Debug, Clone, Default)]
pub struct UsedFlag(Arc<AtomicBool>);

impl UsedFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self, used: bool) {
        self.0.store(used, Ordering::Relaxed);
    }
}

/// Reference to one raw observation held by a station.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObsRef {
    /// Owning station
    pub station: StationIndex,
    /// Index in the station observation list
    pub observation: usize,
}

/// Typed per-row extension record of a [MeasurementBatch](super::MeasurementBatch).
///
/// Counter handles are live until a reaction invalidates them: a handle
/// taken out of the record after an increment can no longer be reset
/// within the same batch pass.
#[derive(Debug, Clone, Default)]
pub struct MeasExtension {
    /// Phase reject counter
    pub phase_reject: Option<SignalCounter>,
    /// Phase outage counter
    pub phase_outage: Option<SignalCounter>,
    /// Ionosphere outage counter
    pub iono_outage: Option<SignalCounter>,
    /// Ionosphere outage counter of the other signal of the code pair
    pub iono_outage_alt: Option<SignalCounter>,
    /// Raw observation this row was formed from
    pub obs: Option<ObsRef>,
    /// Signal "used" flag
    pub used: Option<UsedFlag>,
    /// Row is a pseudo observation (constraint) rather than a measurement
    pub pseudo_obs: bool,
}

impl MeasExtension {
    /// Creates a pseudo observation record
    pub fn pseudo_obs() -> Self {
        Self {
            pseudo_obs: true,
            ..Default::default()
        }
    }
}
