use crate::prelude::Epoch;

/// Process noise model attached to one state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NoiseModel {
    /// Random walk: `variance_rate · Δt` is injected at each propagation.
    Constant {
        /// Variance injected per second (unit²/s)
        variance_rate: f64,
    },
    /// Localized inflation decaying toward zero:
    /// `initial · exp(-(t - t₀)/τ)` is injected at each propagation,
    /// `t₀` being the installation epoch.
    Exponential {
        /// Variance injected at installation (unit²)
        initial: f64,
        /// Time constant (s)
        tau: f64,
        /// Installation epoch, defined on first propagation if unknown.
        since: Option<Epoch>,
    },
}

/// Decaying profiles are dropped once negligible with respect to their initial value.
const EXPONENTIAL_CUTOFF: f64 = 1.0E-9;

impl NoiseModel {
    /// Creates a new random walk [NoiseModel] from its standard deviation per √s.
    pub fn random_walk(sigma: f64) -> Self {
        Self::Constant {
            variance_rate: sigma.powi(2),
        }
    }

    /// Creates a new decaying [NoiseModel] from its initial standard deviation.
    pub fn exponential(sigma: f64, tau: f64, since: Option<Epoch>) -> Self {
        Self::Exponential {
            initial: sigma.powi(2),
            tau,
            since,
        }
    }

    /// Variance to inject when propagating from `t0` to `t1`.
    pub(crate) fn variance(&mut self, t0: Option<Epoch>, t1: Epoch) -> f64 {
        match self {
            Self::Constant { variance_rate } => match t0 {
                Some(t0) => *variance_rate * (t1 - t0).to_seconds().max(0.0),
                None => 0.0,
            },
            Self::Exponential {
                initial,
                tau,
                since,
            } => {
                let t_ref = *since.get_or_insert(t1);
                let elapsed = (t1 - t_ref).to_seconds().max(0.0);
                *initial * (-elapsed / *tau).exp()
            },
        }
    }

    /// True once this model no longer contributes.
    pub(crate) fn is_expired(&self, t: Epoch) -> bool {
        match self {
            Self::Constant { .. } => false,
            Self::Exponential {
                tau,
                since: Some(since),
                ..
            } => (-(t - *since).to_seconds() / tau).exp() < EXPONENTIAL_CUTOFF,
            Self::Exponential { since: None, .. } => false,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::prelude::{Duration, Epoch};

    #[test]
    fn random_walk() {
        let t0 = Epoch::from_gpst_seconds(100.0);
        let t1 = t0 + Duration::from_seconds(30.0);
        let mut model = NoiseModel::random_walk(2.0);
        assert_eq!(model.variance(None, t1), 0.0);
        assert_eq!(model.variance(Some(t0), t1), 120.0);
        assert!(!model.is_expired(t1));
    }

    #[test]
    fn exponential_decay() {
        let t0 = Epoch::from_gpst_seconds(100.0);
        let mut model = NoiseModel::exponential(3.0, 10.0, Some(t0));
        assert_eq!(model.variance(Some(t0), t0), 9.0);

        let t1 = t0 + Duration::from_seconds(10.0);
        let var = model.variance(Some(t0), t1);
        assert!((var - 9.0 * (-1.0_f64).exp()).abs() < 1.0E-9);

        let t2 = t0 + Duration::from_seconds(1000.0);
        assert!(model.is_expired(t2));
    }

    #[test]
    fn exponential_installed_on_first_propagation() {
        let t0 = Epoch::from_gpst_seconds(100.0);
        let mut model = NoiseModel::exponential(1.0, 10.0, None);
        assert_eq!(model.variance(None, t0), 1.0);
        match model {
            NoiseModel::Exponential { since, .. } => assert_eq!(since, Some(t0)),
            _ => unreachable!(),
        }
    }
}
