//! Detection-based gene filtering.

use crate::data::ExpressionMatrix;
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Genes kept by a detection filter, with the counts it was decided on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneFilterResult {
    /// Keep flag per gene, in gene order.
    pub keep: Vec<bool>,
    /// Number of cells in which each gene has a positive value.
    pub n_cells: Vec<usize>,
}

impl GeneFilterResult {
    /// Indices of the kept genes.
    pub fn kept_indices(&self) -> Vec<usize> {
        self.keep
            .iter()
            .enumerate()
            .filter(|(_, k)| **k)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn n_kept(&self) -> usize {
        self.keep.iter().filter(|k| **k).count()
    }

    pub fn n_removed(&self) -> usize {
        self.keep.len() - self.n_kept()
    }
}

impl std::fmt::Display for GeneFilterResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Gene Filter Result")?;
        writeln!(f, "  Before:    {} genes", self.keep.len())?;
        writeln!(f, "  After:     {} genes", self.n_kept())?;
        writeln!(f, "  Removed:   {} genes", self.n_removed())?;
        Ok(())
    }
}

/// Flag genes detected (value > 0) in at least `min_cells` cells.
///
/// # Arguments
/// * `matrix` - Cells × genes expression values
/// * `min_cells` - Minimum number of cells a gene must be detected in
///
/// # Returns
/// A `GeneFilterResult` with the keep mask and per-gene detection counts.
pub fn filter_genes_min_cells(matrix: &ExpressionMatrix, min_cells: usize) -> GeneFilterResult {
    let n_cells = matrix.reductions().detected_cells();
    let keep = n_cells.iter().map(|&n| n >= min_cells).collect();
    GeneFilterResult { keep, n_cells }
}

/// Restrict `matrix` to the genes detected in at least `min_cells` cells.
pub fn subset_genes_min_cells(
    matrix: &ExpressionMatrix,
    min_cells: usize,
) -> Result<(ExpressionMatrix, GeneFilterResult)> {
    let result = filter_genes_min_cells(matrix, min_cells);
    let filtered = matrix.subset_genes(&result.kept_indices())?;
    Ok((filtered, result))
}
