//! Selection cutoffs: fixed interval bounds or a top-N count.

use crate::error::{HvgError, Result};
use crate::observe::Observer;
use crate::stats::summary::cmp_desc_nan_last;
use serde::{Deserialize, Serialize};

/// Strict bounds on mean expression and normalized dispersion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntervalCutoffs {
    pub min_mean: f64,
    pub max_mean: f64,
    pub min_disp: f64,
    pub max_disp: f64,
}

impl Default for IntervalCutoffs {
    fn default() -> Self {
        Self {
            min_mean: 0.0125,
            max_mean: 3.0,
            min_disp: 0.5,
            max_disp: f64::INFINITY,
        }
    }
}

impl IntervalCutoffs {
    /// `min_mean < mean < max_mean` and `min_disp < disp < max_disp`, NaN
    /// dispersion counted as 0.
    pub fn in_bounds(&self, mean: f64, disp: f64) -> bool {
        let disp = if disp.is_nan() { 0.0 } else { disp };
        mean > self.min_mean && mean < self.max_mean && disp > self.min_disp && disp < self.max_disp
    }
}

/// How genes are selected from their normalized scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Cutoff {
    Interval(IntervalCutoffs),
    TopN(usize),
}

impl Cutoff {
    /// Resolve the active cutoff. A top-N count wins over the bounds; if any
    /// bound was changed from its default a notice says it is ignored.
    pub fn resolve(
        n_top_genes: Option<usize>,
        bounds: IntervalCutoffs,
        observer: &dyn Observer,
    ) -> Result<Self> {
        match n_top_genes {
            Some(0) => Err(HvgError::InvalidParameter(
                "n_top_genes must be at least 1".to_string(),
            )),
            Some(n) => {
                if bounds != IntervalCutoffs::default() {
                    observer.info("If you pass `n_top_genes`, all cutoffs are ignored.");
                }
                Ok(Cutoff::TopN(n))
            }
            None => Ok(Cutoff::Interval(bounds)),
        }
    }

    /// Selection flags for one batch of genes.
    pub fn select(&self, means: &[f64], norm: &[f64], observer: &dyn Observer) -> Vec<bool> {
        match self {
            Cutoff::Interval(bounds) => means
                .iter()
                .zip(norm)
                .map(|(&m, &d)| bounds.in_bounds(m, d))
                .collect(),
            Cutoff::TopN(n) => {
                let n = clamp_n_top(*n, norm.len(), observer);
                let threshold = nth_highest(norm, n, observer);
                observer.debug(&format!(
                    "the {} top genes correspond to a normalized dispersion cutoff of {}",
                    n, threshold
                ));
                norm.iter()
                    .map(|&d| {
                        let d = if d.is_nan() { 0.0 } else { d };
                        d >= threshold
                    })
                    .collect()
            }
        }
    }
}

/// Clamp a requested gene count to the number of genes, warning when it
/// exceeds it.
pub fn clamp_n_top(n_top: usize, n_genes: usize, observer: &dyn Observer) -> usize {
    if n_top > n_genes {
        observer.warn(&format!(
            "`n_top_genes` ({}) > number of genes ({}), returning all genes.",
            n_top, n_genes
        ));
        n_genes
    } else {
        n_top
    }
}

/// The `n`-th highest non-NaN value (1-based).
///
/// When fewer than `n` values are finite, warns and returns the lowest one.
/// NaN when there are no non-NaN values at all.
pub fn nth_highest(values: &[f64], n: usize, observer: &dyn Observer) -> f64 {
    let mut present: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if present.is_empty() || n == 0 {
        return f64::NAN;
    }
    let n = if n > present.len() {
        observer.warn(
            "`n_top_genes` > number of normalized dispersions, returning all genes with normalized dispersions.",
        );
        present.len()
    } else {
        n
    };
    present.sort_by(|a, b| cmp_desc_nan_last(*a, *b));
    present[n - 1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observe::CollectingObserver;
    use log::Level;

    #[test]
    fn test_in_bounds_is_strict() {
        let b = IntervalCutoffs::default();
        assert!(b.in_bounds(1.0, 1.0));
        assert!(!b.in_bounds(0.0125, 1.0));
        assert!(!b.in_bounds(3.0, 1.0));
        assert!(!b.in_bounds(1.0, 0.5));
        assert!(!b.in_bounds(1.0, f64::NAN));
        let loose = IntervalCutoffs {
            min_disp: -1.0,
            ..b
        };
        assert!(loose.in_bounds(1.0, f64::NAN));
    }

    #[test]
    fn test_resolve_notice() {
        let obs = CollectingObserver::new();
        let bounds = IntervalCutoffs {
            min_mean: 0.1,
            ..Default::default()
        };
        let cutoff = Cutoff::resolve(Some(5), bounds, &obs).unwrap();
        assert_eq!(cutoff, Cutoff::TopN(5));
        assert!(obs.contains(Level::Info, "all cutoffs are ignored"));

        let quiet = CollectingObserver::new();
        Cutoff::resolve(Some(5), IntervalCutoffs::default(), &quiet).unwrap();
        assert!(quiet.events().is_empty());

        let cutoff = Cutoff::resolve(None, bounds, &quiet).unwrap();
        assert_eq!(cutoff, Cutoff::Interval(bounds));
        assert!(Cutoff::resolve(Some(0), bounds, &quiet).is_err());
    }

    #[test]
    fn test_nth_highest() {
        let obs = CollectingObserver::new();
        let v = [3.0, f64::NAN, 1.0, 5.0, 2.0];
        assert_eq!(nth_highest(&v, 1, &obs), 5.0);
        assert_eq!(nth_highest(&v, 3, &obs), 2.0);
        assert!(obs.events().is_empty());
        assert_eq!(nth_highest(&v, 5, &obs), 1.0);
        assert!(obs.contains(Level::Warn, "returning all genes with normalized dispersions"));
        assert!(nth_highest(&[f64::NAN], 1, &obs).is_nan());
    }

    #[test]
    fn test_top_n_keeps_ties() {
        let obs = CollectingObserver::new();
        let means = [1.0; 5];
        let norm = [2.0, 1.0, 2.0, 0.5, f64::NAN];
        let selected = Cutoff::TopN(1).select(&means, &norm, &obs);
        assert_eq!(selected, vec![true, false, true, false, false]);
    }

    #[test]
    fn test_top_n_clamped() {
        let obs = CollectingObserver::new();
        let means = [1.0; 3];
        let norm = [0.2, 0.1, 0.3];
        let selected = Cutoff::TopN(10).select(&means, &norm, &obs);
        assert_eq!(selected, vec![true, true, true]);
        assert!(obs.contains(Level::Warn, "returning all genes"));
    }

    #[test]
    fn test_interval_select() {
        let obs = CollectingObserver::new();
        let cutoff = Cutoff::Interval(IntervalCutoffs::default());
        let means = [0.01, 0.5, 0.5, 4.0];
        let norm = [2.0, 2.0, 0.4, 2.0];
        assert_eq!(
            cutoff.select(&means, &norm, &obs),
            vec![false, true, false, false]
        );
    }
}
