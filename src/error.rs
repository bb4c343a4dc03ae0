use thiserror::Error;

use crate::prelude::{Epoch, StateKey};

#[derive(Debug, PartialEq, Error)]
pub enum Error {
    /// Matrices handed to the [StateRegistry](crate::prelude::StateRegistry)
    /// do not match the current state dimension.
    #[error("internal error: invalid matrix dimension (expected {expected}x{expected}, got {rows}x{cols})")]
    MatrixDimension {
        expected: usize,
        rows: usize,
        cols: usize,
    },

    /// Design matrix and state vector disagree, this is a logic error
    /// in the batch formation.
    #[error("measurement batch does not match state vector ({0} columns for {1} states)")]
    BatchDimension(usize, usize),

    /// Innovation covariance could not be inverted.
    /// Bad signal data or ill-conditioned prior may wind up here.
    #[error("failed to invert matrix")]
    MatrixInversion,

    /// Time update requested toward the past.
    #[error("bad operation: negative time ({0} prior {1})")]
    TimeUnderflow(Epoch, Epoch),

    /// Requested state is not registered.
    #[error("unknown state: {0}")]
    UnknownState(StateKey),

    /// Filter converged to NaN or non finite values.
    #[error("filter converged to physically invalid state")]
    StateUpdate,

    /// Inconsistent [Config](crate::prelude::Config) preset.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// Local position solution requires at least 4 pseudo ranges.
    #[error("not enough candidates provided ({0})")]
    NotEnoughCandidates(usize),

    /// Local position solution did not converge.
    #[error("local solution did not converge")]
    LocalSolution,

    /// Station worker pool could not be created.
    #[error("thread pool: {0}")]
    ThreadPool(String),
}
