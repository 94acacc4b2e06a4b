//! Local polynomial regression (loess) of one response on one predictor.
//!
//! Each point is fitted by weighted least squares over its `⌊span·n⌋` nearest
//! neighbours with tricube weights, evaluated directly at every point (no
//! interpolation surface). Compiled only with the `loess` feature; without it
//! [`loess_fit`] reports a missing capability.

use crate::error::{HvgError, Result};

/// Smoothed values of `y` against `x`, one per input point, in input order.
///
/// `degree` is the local polynomial degree (0, 1 or 2).
#[cfg(feature = "loess")]
pub fn loess_fit(x: &[f64], y: &[f64], span: f64, degree: usize) -> Result<Vec<f64>> {
    fit::fit(x, y, span, degree)
}

#[cfg(not(feature = "loess"))]
pub fn loess_fit(_x: &[f64], _y: &[f64], _span: f64, _degree: usize) -> Result<Vec<f64>> {
    require_loess().map(|_| Vec::new())
}

/// Fails with guidance when local regression was not compiled in.
pub fn require_loess() -> Result<()> {
    if cfg!(feature = "loess") {
        Ok(())
    } else {
        Err(HvgError::MissingCapability(
            "flavor 'seurat_v3' needs local regression; rebuild composable-hvg with the \
             `loess` feature enabled (e.g. `cargo build --features loess`)"
                .to_string(),
        ))
    }
}

#[cfg(feature = "loess")]
mod fit {
    use super::*;
    use nalgebra::{Matrix2, Matrix3, Vector2, Vector3};
    use rayon::prelude::*;
    use std::cmp::Ordering;

    pub(super) fn fit(x: &[f64], y: &[f64], span: f64, degree: usize) -> Result<Vec<f64>> {
        if x.len() != y.len() {
            return Err(HvgError::DimensionMismatch {
                expected: x.len(),
                actual: y.len(),
            });
        }
        if !(span > 0.0 && span <= 1.0) {
            return Err(HvgError::InvalidParameter(format!(
                "loess span must be in (0, 1], got {}",
                span
            )));
        }
        if degree > 2 {
            return Err(HvgError::InvalidParameter(format!(
                "loess degree must be 0, 1 or 2, got {}",
                degree
            )));
        }
        if x.iter().chain(y).any(|v| !v.is_finite()) {
            return Err(HvgError::Numerical(
                "loess input contains non-finite values".to_string(),
            ));
        }

        let n = x.len();
        if n == 0 {
            return Ok(Vec::new());
        }

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| x[a].partial_cmp(&x[b]).unwrap_or(Ordering::Equal));
        let xs: Vec<f64> = order.iter().map(|&i| x[i]).collect();
        let ys: Vec<f64> = order.iter().map(|&i| y[i]).collect();

        let q = ((span * n as f64).floor() as usize).clamp((degree + 1).min(n), n);
        let windows = neighbour_windows(&xs, q);

        let fitted_sorted: Vec<f64> = (0..n)
            .into_par_iter()
            .map(|i| local_fit(&xs, &ys, i, windows[i], q, degree))
            .collect();

        let mut fitted = vec![0.0; n];
        for (pos, &orig) in order.iter().enumerate() {
            fitted[orig] = fitted_sorted[pos];
        }
        Ok(fitted)
    }

    /// Start of the `q`-point window of nearest neighbours for every sorted point.
    fn neighbour_windows(xs: &[f64], q: usize) -> Vec<usize> {
        let n = xs.len();
        let mut lo = 0;
        xs.iter()
            .map(|&xi| {
                while lo + q < n && xs[lo + q] - xi < xi - xs[lo] {
                    lo += 1;
                }
                lo
            })
            .collect()
    }

    fn local_fit(xs: &[f64], ys: &[f64], i: usize, lo: usize, q: usize, degree: usize) -> f64 {
        let xi = xs[i];
        let window = lo..lo + q;
        let d = (xi - xs[lo]).max(xs[lo + q - 1] - xi);

        if d <= 0.0 {
            // All neighbours share the same x.
            let tied: Vec<f64> = window.map(|k| ys[k]).collect();
            return tied.iter().sum::<f64>() / tied.len() as f64;
        }

        // Sums of w·uᵖ and w·uᵖ·y with u scaled into [-1, 1].
        let mut s = [0.0f64; 5];
        let mut t = [0.0f64; 3];
        for k in window {
            let u = (xs[k] - xi) / d;
            let r = u.abs();
            if r >= 1.0 {
                continue;
            }
            let w = (1.0 - r * r * r).powi(3);
            let mut up = w;
            for p in 0..5 {
                s[p] += up;
                if p < 3 {
                    t[p] += up * ys[k];
                }
                up *= u;
            }
        }

        if degree >= 2 {
            let a = Matrix3::new(s[0], s[1], s[2], s[1], s[2], s[3], s[2], s[3], s[4]);
            if let Some(beta) = a.lu().solve(&Vector3::new(t[0], t[1], t[2])) {
                if beta[0].is_finite() {
                    return beta[0];
                }
            }
        }
        if degree >= 1 {
            let a = Matrix2::new(s[0], s[1], s[1], s[2]);
            if let Some(beta) = a.lu().solve(&Vector2::new(t[0], t[1])) {
                if beta[0].is_finite() {
                    return beta[0];
                }
            }
        }
        if s[0] > 0.0 {
            t[0] / s[0]
        } else {
            ys[i]
        }
    }
}


#[cfg(all(test, not(feature = "loess")))]
mod without_loess_tests {
    use super::*;

    #[test]
    fn test_fit_reports_missing_capability() {
        assert!(matches!(require_loess(), Err(HvgError::MissingCapability(_))));
        assert!(matches!(
            loess_fit(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0], 0.5, 2),
            Err(HvgError::MissingCapability(_))
        ));
    }
}
