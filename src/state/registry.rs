use std::collections::HashMap;

use log::{debug, trace};
use nalgebra::{DMatrix, DVector};

use crate::{
    prelude::{Epoch, Error},
    state::{NoiseModel, StateKey, Statistics},
};

/// [StateRegistry] owns the network state vector `x`, its covariance `P`
/// and the [StateKey] to position index.
///
/// `len(x) == rows(P) == cols(P) == len(index)` holds before and after
/// every operation. Insertion appends a new position; removal deletes
/// the row and column and renumbers the following positions.
#[derive(Debug, Clone)]
pub struct StateRegistry {
    /// Epoch of the latest propagation
    t: Option<Epoch>,
    x: DVector<f64>,
    p: DMatrix<f64>,
    /// Keys ordered by position
    keys: Vec<StateKey>,
    index: HashMap<StateKey, usize>,
    noise: HashMap<StateKey, NoiseModel>,
    /// Reactions of the ongoing epoch
    pub(crate) statistics: Statistics,
    /// Reactions since deployment
    statistics_sum: Statistics,
}

impl Default for StateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StateRegistry {
    /// Creates a new empty [StateRegistry]
    pub fn new() -> Self {
        Self {
            t: None,
            x: DVector::zeros(0),
            p: DMatrix::zeros(0, 0),
            keys: Vec::new(),
            index: HashMap::new(),
            noise: HashMap::new(),
            statistics: Statistics::default(),
            statistics_sum: Statistics::default(),
        }
    }

    /// Number of states
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// [Epoch] of latest propagation
    pub fn epoch(&self) -> Option<Epoch> {
        self.t
    }

    /// State vector
    pub fn x(&self) -> &DVector<f64> {
        &self.x
    }

    /// State covariance
    pub fn p(&self) -> &DMatrix<f64> {
        &self.p
    }

    /// [StateKey]s, ordered by position
    pub fn keys(&self) -> &[StateKey] {
        &self.keys
    }

    pub fn contains(&self, key: &StateKey) -> bool {
        self.index.contains_key(key)
    }

    /// Position of this [StateKey]
    pub fn position(&self, key: &StateKey) -> Option<usize> {
        self.index.get(key).copied()
    }

    /// Returns (estimate, variance) of this [StateKey]
    pub fn value(&self, key: &StateKey) -> Option<(f64, f64)> {
        let i = self.position(key)?;
        Some((self.x[i], self.p[(i, i)]))
    }

    /// Inserts a zero-initialized state if absent. Returns its position.
    pub fn upsert(&mut self, key: StateKey) -> usize {
        self.upsert_with(key, 0.0, 0.0)
    }

    /// Inserts a state initialized to `x0` with `variance0` if absent.
    /// Existing states are left untouched. Returns its position.
    pub fn upsert_with(&mut self, key: StateKey, x0: f64, variance0: f64) -> usize {
        if let Some(i) = self.index.get(&key) {
            return *i;
        }

        let n = self.keys.len();

        let x = std::mem::replace(&mut self.x, DVector::zeros(0));
        self.x = x.insert_row(n, x0);

        let p = std::mem::replace(&mut self.p, DMatrix::zeros(0, 0));
        self.p = p.insert_row(n, 0.0).insert_column(n, 0.0);
        self.p[(n, n)] = variance0;

        trace!("new state {} (#{})", key, n);

        self.index.insert(key.clone(), n);
        self.keys.push(key);
        n
    }

    /// Removes this state. Silently ignored when absent.
    /// Returns the position it used to occupy.
    pub fn remove(&mut self, key: &StateKey) -> Option<usize> {
        let i = self.index.remove(key)?;

        let x = std::mem::replace(&mut self.x, DVector::zeros(0));
        self.x = x.remove_row(i);

        let p = std::mem::replace(&mut self.p, DMatrix::zeros(0, 0));
        self.p = p.remove_row(i).remove_column(i);

        self.keys.remove(i);
        self.noise.remove(key);

        for (pos, key) in self.keys.iter().enumerate().skip(i) {
            if let Some(index) = self.index.get_mut(key) {
                *index = pos;
            }
        }

        debug!("removed state {} (#{})", key, i);
        Some(i)
    }

    /// Installs a [NoiseModel] on this state, applied from the next propagation on.
    pub fn set_noise_model(&mut self, key: &StateKey, model: NoiseModel) -> Result<(), Error> {
        if !self.contains(key) {
            return Err(Error::UnknownState(key.clone()));
        }
        self.noise.insert(key.clone(), model);
        Ok(())
    }

    /// [NoiseModel] installed on this state
    pub fn noise_model(&self, key: &StateKey) -> Option<&NoiseModel> {
        self.noise.get(key)
    }

    fn check_dimensions(&self, m: &DMatrix<f64>) -> Result<(), Error> {
        let n = self.len();
        if m.nrows() != n || m.ncols() != n {
            return Err(Error::MatrixDimension {
                expected: n,
                rows: m.nrows(),
                cols: m.ncols(),
            });
        }
        Ok(())
    }

    fn check_epoch(&self, t: Epoch) -> Result<(), Error> {
        match self.t {
            Some(t0) if t < t0 => Err(Error::TimeUnderflow(t, t0)),
            _ => Ok(()),
        }
    }

    /// Applies `x ← F·x`, `P ← F·P·Fᵗ + Q`.
    fn transition(&mut self, f: &DMatrix<f64>, q: &DMatrix<f64>, t: Epoch) {
        self.x = f * &self.x;
        let p = f * &self.p * f.transpose() + q;
        self.p = (&p + p.transpose()) * 0.5;
        self.t = Some(t);
    }

    /// Full time update: applies the transition `F`, the additive process noise `Q`
    /// and the noise models of each state.
    pub fn propagate(&mut self, f: &DMatrix<f64>, q: &DMatrix<f64>, t: Epoch) -> Result<(), Error> {
        self.check_dimensions(f)?;
        self.check_dimensions(q)?;
        self.check_epoch(t)?;

        let mut q = q.clone();

        for (key, model) in self.noise.iter_mut() {
            if let Some(i) = self.index.get(key) {
                q[(*i, *i)] += model.variance(self.t, t);
            }
        }

        self.noise.retain(|key, model| {
            let expired = model.is_expired(t);
            if expired {
                trace!("{} - noise model expired", key);
            }
            !expired
        });

        self.transition(f, &q, t);
        Ok(())
    }

    /// Out of band time update: applies the given (`F`, `Q`) pair only,
    /// noise models are not applied.
    pub fn manual_transition(
        &mut self,
        f: &DMatrix<f64>,
        q: &DMatrix<f64>,
        t: Epoch,
    ) -> Result<(), Error> {
        self.check_dimensions(f)?;
        self.check_dimensions(q)?;
        self.check_epoch(t)?;
        self.transition(f, q, t);
        Ok(())
    }

    /// Nominal time update toward `t`: orbit positions integrate their velocity
    /// components, every other state is held constant and only the
    /// noise models contribute process noise.
    pub fn time_update(&mut self, t: Epoch) -> Result<(), Error> {
        let n = self.len();
        let dt = match self.t {
            Some(t0) => (t - t0).to_seconds(),
            None => 0.0,
        };

        let mut f = DMatrix::<f64>::identity(n, n);

        for (vel, key) in self.keys.iter().enumerate() {
            if !key.is_orbit_velocity() {
                continue;
            }
            let position = StateKey {
                sub: key.sub - 3,
                ..key.clone()
            };
            if let Some(pos) = self.position(&position) {
                f[(pos, vel)] = dt;
            }
        }

        let q = DMatrix::<f64>::zeros(n, n);
        self.propagate(&f, &q, t)
    }

    /// Applies a measurement update: `x ← x + dx`, `P ← p`.
    pub(crate) fn correct(&mut self, dx: &DVector<f64>, p: DMatrix<f64>) -> Result<(), Error> {
        if dx.len() != self.len() {
            return Err(Error::BatchDimension(dx.len(), self.len()));
        }
        self.check_dimensions(&p)?;

        let x = &self.x + dx;
        if x.iter().any(|x| !x.is_finite()) {
            return Err(Error::StateUpdate);
        }

        self.x = x;
        self.p = p;
        Ok(())
    }

    /// Reaction counters of the ongoing epoch
    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    /// Reaction counters since deployment (closed epochs only)
    pub fn statistics_sum(&self) -> &Statistics {
        &self.statistics_sum
    }

    /// Closes the epoch statistics, accumulating them into the total.
    pub(crate) fn close_statistics(&mut self) -> Statistics {
        let epoch = self.statistics;
        self.statistics_sum.accumulate(&epoch);
        self.statistics = Statistics::default();
        epoch
    }
}
