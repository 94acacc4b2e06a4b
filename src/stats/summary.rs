//! Location and scale summaries used by the binned flavors.

use statrs::distribution::{ContinuousCDF, Normal};
use std::cmp::Ordering;

/// Mean of the non-NaN values; NaN when there are none.
pub fn nan_mean(values: &[f64]) -> f64 {
    let (sum, count) = values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, c), &v| (s + v, c + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

/// Sample standard deviation (ddof = 1) of the non-NaN values.
///
/// NaN when fewer than two values are present.
pub fn nan_std(values: &[f64]) -> f64 {
    let finite: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if finite.len() < 2 {
        return f64::NAN;
    }
    let mean = finite.iter().sum::<f64>() / finite.len() as f64;
    let ss: f64 = finite.iter().map(|v| (v - mean) * (v - mean)).sum();
    (ss / (finite.len() - 1) as f64).sqrt()
}

/// Median of the non-NaN values; NaN when there are none.
pub fn median(values: &[f64]) -> f64 {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return f64::NAN;
    }
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// Median absolute deviation scaled to be consistent with the standard
/// deviation of a normal distribution.
pub fn mad(values: &[f64]) -> f64 {
    let center = median(values);
    if center.is_nan() {
        return f64::NAN;
    }
    let deviations: Vec<f64> = values
        .iter()
        .filter(|v| !v.is_nan())
        .map(|v| (v - center).abs())
        .collect();
    median(&deviations) / normal_quartile()
}

/// Upper quartile of the standard normal (≈ 0.6745).
fn normal_quartile() -> f64 {
    Normal::new(0.0, 1.0)
        .map(|n| n.inverse_cdf(0.75))
        .unwrap_or(0.674_489_750_196_081_7)
}

/// Percentile `q` (0–100) of the non-NaN values with linear interpolation
/// between closest ranks.
pub fn percentile(values: &[f64], q: f64) -> f64 {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return f64::NAN;
    }
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let pos = (q / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Descending order of `values`, NaN last, ties kept in input order.
pub fn descending_order(values: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| cmp_desc_nan_last(values[a], values[b]));
    order
}

/// Rank of each position in [`descending_order`] (0 = largest).
pub fn descending_ranks(values: &[f64]) -> Vec<usize> {
    let mut ranks = vec![0; values.len()];
    for (rank, idx) in descending_order(values).into_iter().enumerate() {
        ranks[idx] = rank;
    }
    ranks
}

/// Descending comparison that places NaN after every number.
pub fn cmp_desc_nan_last(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}

/// Ascending comparison that places NaN after every number.
pub fn cmp_asc_nan_last(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_nan_mean_and_std() {
        let v = [1.0, f64::NAN, 3.0, 5.0];
        assert_relative_eq!(nan_mean(&v), 3.0);
        assert_relative_eq!(nan_std(&v), 2.0);
        assert!(nan_mean(&[f64::NAN]).is_nan());
        assert!(nan_std(&[4.0]).is_nan());
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), 2.5);
        assert!(median(&[]).is_nan());
    }

    #[test]
    fn test_mad_is_normal_consistent() {
        // median 3, abs deviations [2,1,0,1,2] -> median 1
        let v = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_relative_eq!(mad(&v), 1.0 / 0.674_489_750_196_081_7, epsilon = 1e-9);
        assert_eq!(mad(&[7.0]), 0.0);
    }

    #[test]
    fn test_percentile_linear() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_relative_eq!(percentile(&v, 0.0), 1.0);
        assert_relative_eq!(percentile(&v, 100.0), 5.0);
        assert_relative_eq!(percentile(&v, 10.0), 1.4);
        assert_relative_eq!(percentile(&v, 50.0), 3.0);
    }

    #[test]
    fn test_descending_ranks_stable_and_nan_last() {
        let v = [1.0, 5.0, f64::NAN, 5.0, 3.0];
        assert_eq!(descending_order(&v), vec![1, 3, 4, 0, 2]);
        assert_eq!(descending_ranks(&v), vec![3, 0, 4, 1, 2]);
    }
}
