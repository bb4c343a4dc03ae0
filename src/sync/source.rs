use crate::prelude::{Duration, Epoch, Observation};

/// Outcome of one [ObservationSource::next_batch] request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitCode {
    /// Data for the requested epoch is complete: the station is ready
    Complete,
    /// Data prior the requested epoch was returned, more should follow
    Early,
    /// No data yet, retry later
    Wait,
    /// No data will ever come: the station is no longer polled during this run
    Never,
}

impl std::fmt::Display for WaitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Complete => write!(f, "complete"),
            Self::Early => write!(f, "early"),
            Self::Wait => write!(f, "wait"),
            Self::Never => write!(f, "never"),
        }
    }
}

/// Observation channel of one station. Channels are independent
/// and unreliable: they may lag, stall or die at any point.
pub trait ObservationSource: Send {
    /// True when no buffered data remains
    fn exhausted(&self) -> bool;

    /// True when the underlying channel is closed and will not deliver anymore
    fn is_dead(&self) -> bool;

    /// Requests the observations sampled within `tolerance` of `t`.
    /// `t` is undefined until the first epoch is fixed: sources then
    /// deliver the first data available.
    fn next_batch(&mut self, t: Option<Epoch>, tolerance: Duration) -> (Vec<Observation>, WaitCode);
}
