use nalgebra::{DMatrix, DVector, Vector3};

use crate::{
    orbit::SatelliteMap,
    prelude::{Epoch, Error, Observation},
};

/// Convergence criterion of the local solution (m)
const CONVERGENCE_M: f64 = 1.0E-4;

/// Receiver local solution, resolved from pseudo ranges only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalSolution {
    /// Sampling [Epoch]
    pub t: Epoch,
    /// ECEF position (m)
    pub position_ecef_m: Vector3<f64>,
    /// Receiver clock offset (m)
    pub clock_m: f64,
    /// Number of satellites contributing
    pub num_sv: usize,
    /// Iterations until convergence
    pub iterations: usize,
    /// Geometric dilution of precision
    pub gdop: f64,
}

impl LocalSolution {
    /// Iterative least squares over pseudo ranges and precomputed satellite positions.
    /// `initial` is the linearization point, usually the apriori position
    /// or the previous solution.
    pub(crate) fn resolve(
        t: Epoch,
        observations: &[Observation],
        satellites: &SatelliteMap,
        initial: Option<Vector3<f64>>,
        max_iter: usize,
    ) -> Result<Self, Error> {
        let candidates = observations
            .iter()
            .filter_map(|obs| {
                let sat = satellites.get(&obs.sv)?;
                let pr = obs.prefered_pseudo_range()?;
                Some((sat.position_m, pr))
            })
            .collect::<Vec<_>>();

        let m = candidates.len();
        if m < 4 {
            return Err(Error::NotEnoughCandidates(m));
        }

        let mut x = DVector::<f64>::zeros(4);
        if let Some(initial) = initial {
            x[0] = initial[0];
            x[1] = initial[1];
            x[2] = initial[2];
        }

        let mut g = DMatrix::<f64>::zeros(m, 4);
        let mut y = DVector::<f64>::zeros(m);

        for iteration in 1..=max_iter {
            let rx = Vector3::new(x[0], x[1], x[2]);

            for (i, (sat_m, pr)) in candidates.iter().enumerate() {
                let los = sat_m - rx;
                let rho = los.norm();
                if rho == 0.0 {
                    return Err(Error::LocalSolution);
                }
                g[(i, 0)] = -los[0] / rho;
                g[(i, 1)] = -los[1] / rho;
                g[(i, 2)] = -los[2] / rho;
                g[(i, 3)] = 1.0;
                y[i] = pr - rho - x[3];
            }

            let gt = g.transpose();
            let gtg_inv = (&gt * &g).try_inverse().ok_or(Error::MatrixInversion)?;
            let dx = &gtg_inv * (&gt * &y);

            if !dx.iter().all(|v| v.is_finite()) {
                return Err(Error::LocalSolution);
            }

            x += &dx;

            if dx.norm() < CONVERGENCE_M {
                return Ok(Self {
                    t,
                    position_ecef_m: Vector3::new(x[0], x[1], x[2]),
                    clock_m: x[3],
                    num_sv: m,
                    iterations: iteration,
                    gdop: gtg_inv.trace().sqrt(),
                });
            }
        }

        Err(Error::LocalSolution)
    }
}

/// Elevation and azimuth angles (°) of the satellite at `sat_m`
/// seen from `rx_m`, using the geocentric vertical.
pub(crate) fn elevation_azimuth(rx_m: &Vector3<f64>, sat_m: &Vector3<f64>) -> Option<(f64, f64)> {
    let up = rx_m.try_normalize(0.0)?;
    let los = (sat_m - rx_m).try_normalize(0.0)?;

    let east = Vector3::new(-rx_m[1], rx_m[0], 0.0).try_normalize(0.0)?;
    let north = up.cross(&east);

    let elev = up.dot(&los).clamp(-1.0, 1.0).asin().to_degrees();
    let mut azim = los.dot(&east).atan2(los.dot(&north)).to_degrees();
    if azim < 0.0 {
        azim += 360.0;
    }

    Some((elev, azim))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        orbit::SatelliteState,
        prelude::{Constellation, Signal, SV},
    };

    fn scenario(rx: Vector3<f64>, clock_m: f64) -> (Vec<Observation>, SatelliteMap) {
        let t = Epoch::from_gregorian_utc_at_midnight(2020, 6, 25);
        let positions = [
            Vector3::new(15_600.0E3, 7_540.0E3, 20_140.0E3),
            Vector3::new(18_760.0E3, 2_750.0E3, 18_610.0E3),
            Vector3::new(17_610.0E3, 14_630.0E3, 13_480.0E3),
            Vector3::new(19_170.0E3, 610.0E3, 18_390.0E3),
            Vector3::new(26_000.0E3, 1_000.0E3, 5_000.0E3),
        ];

        let mut observations = Vec::new();
        let mut satellites = SatelliteMap::new();

        for (i, pos) in positions.iter().enumerate() {
            let sv = SV::new(Constellation::GPS, i as u8 + 1);
            let pr = (pos - rx).norm() + clock_m;
            observations.push(Observation::new(
                sv,
                t,
                vec![Signal::new("1C").with_pseudo_range(pr)],
            ));
            satellites.insert(
                sv,
                SatelliteState { position_m: *pos },
            );
        }
        (observations, satellites)
    }

    #[test]
    fn local_solution() {
        let rx = Vector3::new(6_378_137.0, 0.0, 0.0);
        let (observations, satellites) = scenario(rx, 150.0);
        let t = observations[0].t;

        let solution = LocalSolution::resolve(
            t,
            &observations,
            &satellites,
            Some(Vector3::new(6_300_000.0, 10_000.0, 10_000.0)),
            10,
        )
        .unwrap();

        assert_eq!(solution.num_sv, 5);
        assert!((solution.position_ecef_m - rx).norm() < 1.0E-3);
        assert!((solution.clock_m - 150.0).abs() < 1.0E-3);
        assert!(solution.gdop > 0.0);
    }

    #[test]
    fn not_enough_candidates() {
        let rx = Vector3::new(6_378_137.0, 0.0, 0.0);
        let (observations, satellites) = scenario(rx, 0.0);
        let t = observations[0].t;

        assert_eq!(
            LocalSolution::resolve(t, &observations[..3], &satellites, None, 10),
            Err(Error::NotEnoughCandidates(3)),
        );
    }

    #[test]
    fn zenith_elevation() {
        let rx = Vector3::new(6_378_137.0, 0.0, 0.0);
        let sat = Vector3::new(26_000_000.0, 0.0, 0.0);
        let (elev, _) = elevation_azimuth(&rx, &sat).unwrap();
        assert!((elev - 90.0).abs() < 1.0E-6);
    }
}
