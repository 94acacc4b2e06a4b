//! Per-gene reductions shared by dense and sparse storage.
//!
//! Everything the HVG flavors need from a matrix is a column (gene) reduction,
//! so the statistics code is written once against [`GeneReductions`] and the
//! two storage types each implement it without densifying.

use nalgebra::DMatrix;
use rayon::prelude::*;
use sprs::CsMat;

/// Column-wise reductions over a cells × genes matrix.
pub trait GeneReductions: Sync {
    /// Number of cells (rows).
    fn n_cells(&self) -> usize;

    /// Number of genes (columns).
    fn n_genes(&self) -> usize;

    /// Sum of values per gene.
    fn gene_sums(&self) -> Vec<f64>;

    /// Sum of squared deviations from `centers` per gene, implicit zeros included.
    fn centered_sq_sums(&self, centers: &[f64]) -> Vec<f64>;

    /// Per-gene `(Σ min(x, clip), Σ min(x, clip)²)` after clipping each value
    /// at its gene's clip value.
    fn clipped_sums(&self, clip: &[f64]) -> (Vec<f64>, Vec<f64>);

    /// Number of cells with a strictly positive value per gene.
    fn detected_cells(&self) -> Vec<usize>;

    /// Whether every value is a non-negative integer.
    fn is_nonnegative_integer(&self) -> bool;
}

fn is_count(v: f64) -> bool {
    v >= 0.0 && v.fract() == 0.0
}

impl GeneReductions for DMatrix<f64> {
    fn n_cells(&self) -> usize {
        self.nrows()
    }

    fn n_genes(&self) -> usize {
        self.ncols()
    }

    fn gene_sums(&self) -> Vec<f64> {
        (0..self.ncols())
            .into_par_iter()
            .map(|j| self.column(j).iter().sum())
            .collect()
    }

    fn centered_sq_sums(&self, centers: &[f64]) -> Vec<f64> {
        (0..self.ncols())
            .into_par_iter()
            .map(|j| {
                let c = centers[j];
                self.column(j).iter().map(|&v| (v - c) * (v - c)).sum()
            })
            .collect()
    }

    fn clipped_sums(&self, clip: &[f64]) -> (Vec<f64>, Vec<f64>) {
        (0..self.ncols())
            .into_par_iter()
            .map(|j| {
                let limit = clip[j];
                self.column(j).iter().fold((0.0, 0.0), |(s, sq), &v| {
                    let v = if v > limit { limit } else { v };
                    (s + v, sq + v * v)
                })
            })
            .unzip()
    }

    fn detected_cells(&self) -> Vec<usize> {
        (0..self.ncols())
            .into_par_iter()
            .map(|j| self.column(j).iter().filter(|&&v| v > 0.0).count())
            .collect()
    }

    fn is_nonnegative_integer(&self) -> bool {
        self.iter().all(|&v| is_count(v))
    }
}

impl GeneReductions for CsMat<f64> {
    fn n_cells(&self) -> usize {
        self.rows()
    }

    fn n_genes(&self) -> usize {
        self.cols()
    }

    fn gene_sums(&self) -> Vec<f64> {
        let mut sums = vec![0.0; self.cols()];
        for row_vec in self.outer_iterator() {
            for (col, &val) in row_vec.iter() {
                sums[col] += val;
            }
        }
        sums
    }

    fn centered_sq_sums(&self, centers: &[f64]) -> Vec<f64> {
        let mut sq = vec![0.0; self.cols()];
        let mut stored = vec![0usize; self.cols()];
        for row_vec in self.outer_iterator() {
            for (col, &val) in row_vec.iter() {
                let d = val - centers[col];
                sq[col] += d * d;
                stored[col] += 1;
            }
        }
        // Every implicit zero deviates from the center by the center itself.
        let n = self.rows();
        for (col, total) in sq.iter_mut().enumerate() {
            let implicit = (n - stored[col]) as f64;
            *total += implicit * centers[col] * centers[col];
        }
        sq
    }

    fn clipped_sums(&self, clip: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let mut sums = vec![0.0; self.cols()];
        let mut sq = vec![0.0; self.cols()];
        for row_vec in self.outer_iterator() {
            for (col, &val) in row_vec.iter() {
                let v = if val > clip[col] { clip[col] } else { val };
                sums[col] += v;
                sq[col] += v * v;
            }
        }
        (sums, sq)
    }

    fn detected_cells(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.cols()];
        for row_vec in self.outer_iterator() {
            for (col, &val) in row_vec.iter() {
                if val > 0.0 {
                    counts[col] += 1;
                }
            }
        }
        counts
    }

    fn is_nonnegative_integer(&self) -> bool {
        self.data().iter().all(|&v| is_count(v))
    }
}
