use nalgebra::{DMatrix, DVector};

use crate::prelude::Error;

/// Innovation covariance `S = H·P·Hᵗ + R`
pub(crate) fn innovation(h: &DMatrix<f64>, p: &DMatrix<f64>, r: &DMatrix<f64>) -> DMatrix<f64> {
    h * p * h.transpose() + r
}

/// Position and magnitude of the largest normalized value exceeding `threshold`.
/// Each value is normalized by the square root of its variance,
/// entries with a non positive variance or for which `skip` holds are ignored.
pub(crate) fn worst_outlier<F>(
    values: &DVector<f64>,
    variances: &DMatrix<f64>,
    threshold: f64,
    skip: F,
) -> Option<(usize, f64)>
where
    F: Fn(usize) -> bool,
{
    let mut worst = None::<(usize, f64)>;

    for i in 0..values.len() {
        let var = variances[(i, i)];
        if var <= 0.0 || skip(i) {
            continue;
        }

        let normalized = values[i].abs() / var.sqrt();
        if normalized <= threshold {
            continue;
        }

        match worst {
            Some((_, w)) if w >= normalized => {},
            _ => worst = Some((i, normalized)),
        }
    }

    worst
}

/// Kalman gain `K = P·Hᵗ·S⁻¹`
pub(crate) fn gain(
    p: &DMatrix<f64>,
    h: &DMatrix<f64>,
    s: &DMatrix<f64>,
) -> Result<DMatrix<f64>, Error> {
    let s_inv = s.clone().try_inverse().ok_or(Error::MatrixInversion)?;
    Ok(p * h.transpose() * s_inv)
}

/// Joseph form covariance update `(I - K·H)·P·(I - K·H)ᵗ + K·R·Kᵗ`
pub(crate) fn joseph(
    p: &DMatrix<f64>,
    k: &DMatrix<f64>,
    h: &DMatrix<f64>,
    r: &DMatrix<f64>,
) -> DMatrix<f64> {
    let n = p.nrows();
    let i_kh = DMatrix::<f64>::identity(n, n) - k * h;
    let p = &i_kh * p * i_kh.transpose() + k * r * k.transpose();
    (&p + p.transpose()) * 0.5
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn scalar_update() {
        // one state observed directly
        let p = DMatrix::from_element(1, 1, 4.0);
        let h = DMatrix::from_element(1, 1, 1.0);
        let r = DMatrix::from_element(1, 1, 4.0);
        let v = DVector::from_element(1, 2.0);

        let s = innovation(&h, &p, &r);
        assert_eq!(s[(0, 0)], 8.0);

        let k = gain(&p, &h, &s).unwrap();
        assert_eq!(k[(0, 0)], 0.5);

        let dx = &k * &v;
        assert_eq!(dx[0], 1.0);

        let p = joseph(&p, &k, &h, &r);
        assert!((p[(0, 0)] - 2.0).abs() < 1.0E-12);
    }

    #[test]
    fn outlier_selection() {
        let values = DVector::from_vec(vec![1.0, -9.0, 6.0, 100.0]);
        let variances = DMatrix::from_diagonal(&DVector::from_vec(vec![1.0, 1.0, 1.0, 0.0]));

        assert_eq!(worst_outlier(&values, &variances, 4.0, |_| false), Some((1, 9.0)));
        assert_eq!(worst_outlier(&values, &variances, 4.0, |i| i == 1), Some((2, 6.0)));
        assert_eq!(worst_outlier(&values, &variances, 10.0, |_| false), None);
    }

    #[test]
    fn singular_innovation() {
        let p = DMatrix::zeros(1, 1);
        let h = DMatrix::from_element(1, 1, 1.0);
        let s = DMatrix::zeros(1, 1);
        assert_eq!(gain(&p, &h, &s), Err(Error::MatrixInversion));
    }
}
