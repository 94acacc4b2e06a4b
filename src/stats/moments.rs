//! Per-gene mean and unbiased variance.
//!
//! Moments are carried in a [`MomentAccumulator`] holding the observation
//! count, per-gene means and per-gene sums of squared deviations. Two
//! accumulators over disjoint cell sets merge associatively, so a matrix can be
//! reduced block by block and combined at the end.

use crate::data::{ExpressionMatrix, GeneReductions};
use crate::error::Result;
use rayon::prelude::*;

/// Partial per-gene moments over a set of cells.
#[derive(Debug, Clone, PartialEq)]
pub struct MomentAccumulator {
    n: usize,
    mean: Vec<f64>,
    m2: Vec<f64>,
}

impl MomentAccumulator {
    /// Accumulator over zero cells.
    pub fn empty(n_genes: usize) -> Self {
        Self {
            n: 0,
            mean: vec![0.0; n_genes],
            m2: vec![0.0; n_genes],
        }
    }

    /// Two-pass moments of every gene in `matrix`.
    pub fn from_matrix<M: GeneReductions + ?Sized>(matrix: &M) -> Self {
        let n = matrix.n_cells();
        if n == 0 {
            return Self::empty(matrix.n_genes());
        }
        let mean: Vec<f64> = matrix
            .gene_sums()
            .into_iter()
            .map(|s| s / n as f64)
            .collect();
        let m2 = matrix.centered_sq_sums(&mean);
        Self { n, mean, m2 }
    }

    /// Combine moments of two disjoint cell sets (Chan et al. pairwise update).
    pub fn merge(self, other: Self) -> Self {
        if self.n == 0 {
            return other;
        }
        if other.n == 0 {
            return self;
        }
        let n = self.n + other.n;
        let (na, nb, nt) = (self.n as f64, other.n as f64, n as f64);
        let (mean, m2) = self
            .mean
            .iter()
            .zip(&self.m2)
            .zip(other.mean.iter().zip(&other.m2))
            .map(|((&ma, &m2a), (&mb, &m2b))| {
                let delta = mb - ma;
                (ma + delta * nb / nt, m2a + m2b + delta * delta * na * nb / nt)
            })
            .unzip();
        Self { n, mean, m2 }
    }

    /// Number of cells accumulated.
    pub fn n_observations(&self) -> usize {
        self.n
    }

    pub fn means(&self) -> &[f64] {
        &self.mean
    }

    /// Unbiased (n − 1) variances; NaN when fewer than two cells were seen.
    pub fn variances(&self) -> Vec<f64> {
        if self.n < 2 {
            return vec![f64::NAN; self.mean.len()];
        }
        let denom = (self.n - 1) as f64;
        self.m2.iter().map(|&m2| m2 / denom).collect()
    }

    /// Consume into `(mean, variance)`.
    pub fn finish(self) -> (Vec<f64>, Vec<f64>) {
        let var = self.variances();
        (self.mean, var)
    }
}

/// Per-gene mean and unbiased variance of an in-memory matrix.
pub fn mean_var<M: GeneReductions + ?Sized>(matrix: &M) -> (Vec<f64>, Vec<f64>) {
    MomentAccumulator::from_matrix(matrix).finish()
}

/// Per-gene mean and unbiased variance, reducing `chunk_size` cells at a time.
///
/// Chunks are reduced in parallel and merged in chunk order, so the result
/// does not depend on the thread count.
pub fn mean_var_chunked(
    matrix: &ExpressionMatrix,
    chunk_size: usize,
) -> Result<(Vec<f64>, Vec<f64>)> {
    let chunks = matrix.row_chunks(chunk_size)?;
    let partials: Vec<MomentAccumulator> = chunks
        .par_iter()
        .map(|chunk| MomentAccumulator::from_matrix(chunk.reductions()))
        .collect();
    let total = partials
        .into_iter()
        .fold(MomentAccumulator::empty(matrix.n_genes()), MomentAccumulator::merge);
    Ok(total.finish())
}

/// Moments of `matrix`, chunked when `chunk_size` is set.
pub fn gene_moments(
    matrix: &ExpressionMatrix,
    chunk_size: Option<usize>,
) -> Result<(Vec<f64>, Vec<f64>)> {
    match chunk_size {
        Some(size) => mean_var_chunked(matrix, size),
        None => Ok(mean_var(matrix.reductions())),
    }
}
