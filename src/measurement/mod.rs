//! Stacked observation equations
use nalgebra::{DMatrix, DVector};

use crate::prelude::{Error, SV};

mod extension;

pub use extension::{MeasExtension, ObsRef, SignalCounter, UsedFlag};

/// Type of measurement a row stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeasKind {
    /// Pseudo range
    CodeMeas,
    /// Carrier phase range
    PhasMeas,
    /// Constraint on states
    PseudoObs,
}

impl std::fmt::Display for MeasKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::CodeMeas => write!(f, "CODE_MEAS"),
            Self::PhasMeas => write!(f, "PHAS_MEAS"),
            Self::PseudoObs => write!(f, "PSEUDO_OBS"),
        }
    }
}

/// Identity of one measurement row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MeasKey {
    pub kind: MeasKind,
    pub sv: Option<SV>,
    pub station: Option<String>,
    /// Signal index, in the raw observation
    pub signal: usize,
}

impl std::fmt::Display for MeasKey {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(station) = &self.station {
            write!(f, " {}", station)?;
        }
        if let Some(sv) = self.sv {
            write!(f, " {}", sv)?;
        }
        write!(f, " {}", self.signal)
    }
}

impl MeasKey {
    pub fn new(kind: MeasKind, station: Option<&str>, sv: Option<SV>, signal: usize) -> Self {
        Self {
            kind,
            sv,
            station: station.map(|s| s.to_string()),
            signal,
        }
    }
}

/// [MeasurementBatch] stacks one epoch's linearized observation equations:
/// `v = H·dx + ε`, `ε ~ N(0, R)`.
///
/// `rows(H) == rows(R) == len(v) == len(keys) == len(extensions)` and
/// `cols(H)` equals the state dimension it was formed against.
#[derive(Debug, Clone)]
pub struct MeasurementBatch {
    /// Design matrix
    pub h: DMatrix<f64>,
    /// Measurement covariance
    pub r: DMatrix<f64>,
    /// Prefit residuals (observed minus computed)
    pub v: DVector<f64>,
    /// Row identities
    pub keys: Vec<MeasKey>,
    /// Row extension records
    pub extensions: Vec<MeasExtension>,
}

impl MeasurementBatch {
    /// Creates an empty [MeasurementBatch] against `n` states
    pub fn empty(n: usize) -> Self {
        Self {
            h: DMatrix::zeros(0, n),
            r: DMatrix::zeros(0, 0),
            v: DVector::zeros(0),
            keys: Vec::new(),
            extensions: Vec::new(),
        }
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Number of states this batch refers to
    pub fn num_states(&self) -> usize {
        self.h.ncols()
    }

    /// Scales row and column `i` of `R` by `factor`
    pub fn deweight(&mut self, i: usize, factor: f64) {
        let mut row = self.r.row_mut(i);
        row *= factor;
        let mut column = self.r.column_mut(i);
        column *= factor;
    }

    /// Rows with a non zero design entry for state column `col`
    pub fn rows_referencing(&self, col: usize) -> Vec<usize> {
        (0..self.len()).filter(|i| self.h[(*i, col)] != 0.0).collect()
    }

    /// Removes state column `col` whose estimate was `x_col`.
    /// Its contribution is folded back into the residuals so each row
    /// remains linearized about a consistent state.
    pub(crate) fn remove_state(&mut self, col: usize, x_col: f64) {
        for i in 0..self.len() {
            self.v[i] += self.h[(i, col)] * x_col;
        }
        let h = std::mem::replace(&mut self.h, DMatrix::zeros(0, 0));
        self.h = h.remove_column(col);
    }

    /// Verifies the dimensions of this batch against `n` states
    pub fn check(&self, n: usize) -> Result<(), Error> {
        let rows = self.len();
        if self.h.nrows() != rows
            || self.r.nrows() != rows
            || self.r.ncols() != rows
            || self.v.len() != rows
            || self.extensions.len() != rows
        {
            return Err(Error::BatchDimension(self.h.nrows(), rows));
        }
        if self.h.ncols() != n {
            return Err(Error::BatchDimension(self.h.ncols(), n));
        }
        Ok(())
    }
}

/// One observation equation, prior to stacking.
#[derive(Debug, Clone)]
pub struct MeasRow {
    pub key: MeasKey,
    /// (state position, partial derivative)
    pub h: Vec<(usize, f64)>,
    /// Prefit residual
    pub v: f64,
    /// Variance
    pub variance: f64,
    pub extension: MeasExtension,
}

/// Accumulates [MeasRow]s and stacks them into a [MeasurementBatch].
#[derive(Debug, Default)]
pub struct BatchBuilder {
    rows: Vec<MeasRow>,
}

impl BatchBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: MeasRow) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Stacks all rows against `n` states (uncorrelated measurements)
    pub fn build(self, n: usize) -> Result<MeasurementBatch, Error> {
        let m = self.rows.len();

        let mut h = DMatrix::<f64>::zeros(m, n);
        let mut r = DMatrix::<f64>::zeros(m, m);
        let mut v = DVector::<f64>::zeros(m);
        let mut keys = Vec::with_capacity(m);
        let mut extensions = Vec::with_capacity(m);

        for (i, row) in self.rows.into_iter().enumerate() {
            for (j, dh) in row.h {
                if j >= n {
                    return Err(Error::BatchDimension(j + 1, n));
                }
                h[(i, j)] += dh;
            }
            r[(i, i)] = row.variance;
            v[i] = row.v;
            keys.push(row.key);
            extensions.push(row.extension);
        }

        Ok(MeasurementBatch {
            h,
            r,
            v,
            keys,
            extensions,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::prelude::Constellation;

    fn row(kind: MeasKind, h: Vec<(usize, f64)>, v: f64, variance: f64) -> MeasRow {
        MeasRow {
            key: MeasKey::new(kind, Some("ABMF"), Some(SV::new(Constellation::GPS, 1)), 0),
            h,
            v,
            variance,
            extension: MeasExtension::default(),
        }
    }

    #[test]
    fn stacking() {
        let mut builder = BatchBuilder::new();
        builder.push(row(MeasKind::CodeMeas, vec![(0, 1.0), (2, -1.0)], 3.0, 4.0));
        builder.push(row(MeasKind::PhasMeas, vec![(1, 1.0)], 1.0, 0.01));

        let batch = builder.build(3).unwrap();
        assert!(batch.check(3).is_ok());
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.h[(0, 2)], -1.0);
        assert_eq!(batch.r[(1, 1)], 0.01);
        assert_eq!(batch.rows_referencing(0), vec![0]);
        assert_eq!(batch.rows_referencing(1), vec![1]);
    }

    #[test]
    fn out_of_range_state() {
        let mut builder = BatchBuilder::new();
        builder.push(row(MeasKind::CodeMeas, vec![(3, 1.0)], 3.0, 4.0));
        assert!(builder.build(3).is_err());
    }

    #[test]
    fn state_removal_folds_residuals() {
        let mut builder = BatchBuilder::new();
        builder.push(row(MeasKind::CodeMeas, vec![(0, 1.0), (1, 2.0)], 3.0, 1.0));
        let mut batch = builder.build(2).unwrap();

        batch.remove_state(1, 0.5);
        assert!(batch.check(1).is_ok());
        assert_eq!(batch.v[0], 4.0);
        assert_eq!(batch.h[(0, 0)], 1.0);
    }
}
