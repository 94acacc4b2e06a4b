//! Regularized variance of raw counts (`seurat_v3`).
//!
//! Within each batch the log-variance/log-mean trend is fitted by loess, counts
//! are clipped at `mean + sqrt(N)·σ_reg`, and the variance of the clipped,
//! standardized counts ranks the genes. Batches are combined by median rank.

use crate::data::{BatchLabels, ExpressionMatrix, GeneStats};
use crate::error::{HvgError, Result};
use crate::hvg::cutoff::clamp_n_top;
use crate::hvg::DEFAULT_V3_N_TOP_GENES;
use crate::observe::Observer;
use crate::stats::loess::{loess_fit, require_loess};
use crate::stats::moments::gene_moments;
use crate::stats::summary::{cmp_asc_nan_last, descending_ranks, median};
use rayon::prelude::*;

/// Inputs of a `seurat_v3` run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeuratV3Params {
    pub n_top_genes: usize,
    /// Loess neighbourhood as a fraction of genes.
    pub span: f64,
    /// Warn when the counts are not non-negative integers.
    pub check_values: bool,
    pub chunk_size: Option<usize>,
}

impl Default for SeuratV3Params {
    fn default() -> Self {
        Self {
            n_top_genes: DEFAULT_V3_N_TOP_GENES,
            span: 0.3,
            check_values: true,
            chunk_size: None,
        }
    }
}

/// Normalized variance of each gene after loess regularization and clipping.
///
/// Genes with zero variance keep a regularized standard deviation of 1.
///
/// # Arguments
/// * `matrix` - Raw counts, cells × genes
/// * `span` - Loess neighbourhood as a fraction of the varying genes
/// * `chunk_size` - Reduce moments this many cells at a time
///
/// # Returns
/// The variance of the clipped, standardized counts for every gene.
pub fn regularized_variances(
    matrix: &ExpressionMatrix,
    span: f64,
    chunk_size: Option<usize>,
) -> Result<Vec<f64>> {
    let (means, variances) = gene_moments(matrix, chunk_size)?;
    let n = matrix.n_cells() as f64;

    let varying: Vec<usize> = (0..variances.len())
        .filter(|&g| variances[g] > 0.0)
        .collect();
    let mut log_trend = vec![0.0; variances.len()];
    if !varying.is_empty() {
        let x: Vec<f64> = varying.iter().map(|&g| means[g].log10()).collect();
        let y: Vec<f64> = varying.iter().map(|&g| variances[g].log10()).collect();
        let fitted = loess_fit(&x, &y, span, 2)?;
        for (&g, f) in varying.iter().zip(fitted) {
            log_trend[g] = f;
        }
    }

    let reg_std: Vec<f64> = log_trend.iter().map(|f| 10f64.powf(*f).sqrt()).collect();
    let clip: Vec<f64> = reg_std
        .iter()
        .zip(&means)
        .map(|(s, m)| s * n.sqrt() + m)
        .collect();
    let (sums, squares) = matrix.reductions().clipped_sums(&clip);

    Ok((0..means.len())
        .map(|g| {
            let m = means[g];
            let s = reg_std[g];
            (n * m * m + squares[g] - 2.0 * m * sums[g]) / ((n - 1.0) * s * s)
        })
        .collect())
}

/// `seurat_v3` selection, in input gene order.
///
/// With `batches`, every batch is regularized separately and the output
/// carries `highly_variable_nbatches`.
///
/// # Arguments
/// * `matrix` - Raw counts, cells × genes
/// * `batches` - Optional batch of every cell
/// * `params` - Number of genes, loess span, value check and chunking
/// * `observer` - Receives the non-integer and clamp warnings
///
/// # Returns
/// One row per gene with `means`, `variances`, `variances_norm` and the
/// median rank, or `MissingCapability` when loess is not compiled in.
pub fn highly_variable_seurat_v3(
    matrix: &ExpressionMatrix,
    batches: Option<&BatchLabels>,
    params: &SeuratV3Params,
    observer: &dyn Observer,
) -> Result<Vec<GeneStats>> {
    require_loess()?;
    if params.n_top_genes == 0 {
        return Err(HvgError::InvalidParameter(
            "n_top_genes must be at least 1".to_string(),
        ));
    }
    if params.check_values && !matrix.reductions().is_nonnegative_integer() {
        observer.warn(
            "`flavor='seurat_v3'` expects raw count data, but non-integers were found.",
        );
    }

    let (means, variances) = gene_moments(matrix, params.chunk_size)?;

    let single;
    let labels = match batches {
        Some(labels) => labels,
        None => {
            single = BatchLabels::single(matrix.n_cells());
            &single
        }
    };
    let per_batch: Vec<Vec<f64>> = if labels.n_batches() == 1 {
        vec![regularized_variances(matrix, params.span, params.chunk_size)?]
    } else {
        (0..labels.n_batches())
            .into_par_iter()
            .map(|b| {
                let cells = matrix.subset_cells(&labels.cells_in(b))?;
                regularized_variances(&cells, params.span, params.chunk_size)
            })
            .collect::<Result<Vec<_>>>()?
    };

    let n_genes = matrix.n_genes();
    let n_top = params.n_top_genes;
    let ranks: Vec<Vec<f64>> = per_batch
        .iter()
        .map(|norm| {
            descending_ranks(norm)
                .into_iter()
                .map(|r| if r < n_top { r as f64 } else { f64::NAN })
                .collect()
        })
        .collect();

    let nbatches: Vec<usize> = (0..n_genes)
        .map(|g| ranks.iter().filter(|r| !r[g].is_nan()).count())
        .collect();
    let median_rank: Vec<f64> = (0..n_genes)
        .map(|g| median(&ranks.iter().map(|r| r[g]).collect::<Vec<_>>()))
        .collect();
    let variances_norm: Vec<f64> = (0..n_genes)
        .map(|g| per_batch.iter().map(|v| v[g]).sum::<f64>() / per_batch.len() as f64)
        .collect();

    let mut order: Vec<usize> = (0..n_genes).collect();
    order.sort_by(|&a, &b| {
        cmp_asc_nan_last(median_rank[a], median_rank[b]).then(nbatches[b].cmp(&nbatches[a]))
    });
    let n_selected = clamp_n_top(n_top, n_genes, observer);
    let mut selected = vec![false; n_genes];
    for &g in order.iter().take(n_selected) {
        selected[g] = true;
    }

    Ok(matrix
        .gene_ids()
        .iter()
        .enumerate()
        .map(|(g, id)| {
            let mut gene = GeneStats::new(id.clone(), means[g]);
            gene.variances = Some(variances[g]);
            gene.variances_norm = Some(variances_norm[g]);
            gene.highly_variable_rank = Some(median_rank[g]);
            if batches.is_some() {
                gene.highly_variable_nbatches = Some(nbatches[g]);
            }
            gene.highly_variable = selected[g];
            gene
        })
        .collect())
}
