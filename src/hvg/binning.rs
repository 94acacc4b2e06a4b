//! Assignment of genes to mean-expression bins.
//!
//! Bins are right-closed intervals `(edges[i], edges[i + 1]]`.

use crate::stats::summary::percentile;

/// Bin edges plus the bin of every gene.
#[derive(Debug, Clone, PartialEq)]
pub struct MeanBins {
    edges: Vec<f64>,
    assignment: Vec<Option<usize>>,
}

impl MeanBins {
    /// `n_bins` equal-width bins over the observed range of `means`.
    ///
    /// The lowest edge is lowered by 0.1 % of the range so the minimum falls
    /// inside the first bin. A degenerate range is widened by 0.1 % of the
    /// value (or by 0.001 around zero) on both sides.
    pub fn equal_width(means: &[f64], n_bins: usize) -> Self {
        let n_bins = n_bins.max(1);
        let (lo, hi) = means
            .iter()
            .filter(|m| m.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &m| {
                (lo.min(m), hi.max(m))
            });
        if lo > hi {
            return Self::from_edges(Vec::new(), means);
        }

        let edges = if lo == hi {
            let pad = if lo == 0.0 { 0.001 } else { 0.001 * lo.abs() };
            linspace(lo - pad, hi + pad, n_bins + 1)
        } else {
            let mut edges = linspace(lo, hi, n_bins + 1);
            edges[0] -= (hi - lo) * 0.001;
            edges
        };
        Self::from_edges(edges, means)
    }

    /// Bins at the 10th, 15th, ..., 100th percentiles of `means`, bracketed
    /// by ±∞. Repeated edges are collapsed.
    pub fn percentiles(means: &[f64]) -> Self {
        let mut edges = vec![f64::NEG_INFINITY];
        edges.extend((0..19).map(|i| percentile(means, 10.0 + 5.0 * i as f64)));
        edges.push(f64::INFINITY);
        edges.retain(|e| !e.is_nan());
        edges.dedup();
        Self::from_edges(edges, means)
    }

    fn from_edges(edges: Vec<f64>, means: &[f64]) -> Self {
        let assignment = means.iter().map(|&m| locate(&edges, m)).collect();
        Self { edges, assignment }
    }

    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    /// Number of bins.
    pub fn n_bins(&self) -> usize {
        self.edges.len().saturating_sub(1)
    }

    /// Bin of each gene; `None` for means outside every bin (NaN).
    pub fn assignment(&self) -> &[Option<usize>] {
        &self.assignment
    }

    /// Genes in each bin, in gene order.
    pub fn members(&self) -> Vec<Vec<usize>> {
        let mut members = vec![Vec::new(); self.n_bins()];
        for (gene, bin) in self.assignment.iter().enumerate() {
            if let Some(b) = bin {
                members[*b].push(gene);
            }
        }
        members
    }
}

/// Index of the right-closed interval containing `value`.
fn locate(edges: &[f64], value: f64) -> Option<usize> {
    if value.is_nan() || edges.len() < 2 {
        return None;
    }
    let above = edges.partition_point(|&e| e < value);
    if above == 0 || above == edges.len() {
        None
    } else {
        Some(above - 1)
    }
}

fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![start];
    }
    let step = (stop - start) / (n - 1) as f64;
    let mut points: Vec<f64> = (0..n).map(|i| start + step * i as f64).collect();
    points[n - 1] = stop;
    points
}
