use std::collections::HashMap;

use log::warn;
use nalgebra::Vector3;

use crate::prelude::{Epoch, Frame, Orbit, SV};

/// Any [Orbit] provider should implement the [OrbitSource] trait to provide
/// satellite states to the network.
pub trait OrbitSource: Send + Sync {
    /// Provide the [Orbit]al state of this [SV] at requested [Epoch],
    /// expressed in requested [Frame]. Returns None when the state
    /// cannot be determined (missing ephemeris, outdated products..).
    ///
    /// Requests are issued once per epoch and per admissible satellite,
    /// in chronological order.
    fn state_at(&self, t: Epoch, sv: SV, frame: Frame) -> Option<Orbit>;
}

/// Satellite state precomputed once per epoch, shared read-only
/// by every station.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SatelliteState {
    /// ECEF position (m)
    pub position_m: Vector3<f64>,
}

impl SatelliteState {
    /// Builds [SatelliteState] from [Orbit]al state (km)
    pub fn from_orbit(orbit: &Orbit) -> Self {
        let pos_vel_m = orbit.to_cartesian_pos_vel() * 1.0E3;
        Self {
            position_m: Vector3::new(pos_vel_m[0], pos_vel_m[1], pos_vel_m[2]),
        }
    }
}

/// Read-only satellite data of one epoch.
pub type SatelliteMap = HashMap<SV, SatelliteState>;

/// Resolves the state of every admissible satellite at `t`.
/// Satellites without state are logged and left out.
pub(crate) fn precompute(
    source: &dyn OrbitSource,
    satellites: &[SV],
    t: Epoch,
    frame: Frame,
) -> SatelliteMap {
    let mut map = SatelliteMap::with_capacity(satellites.len());
    for sv in satellites {
        match source.state_at(t, *sv, frame) {
            Some(orbit) => {
                map.insert(*sv, SatelliteState::from_orbit(&orbit));
            },
            None => {
                warn!("{} ({}) - no orbital state", t, sv);
            },
        }
    }
    map
}
