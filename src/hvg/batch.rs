//! Cross-batch aggregation for the dispersion flavors.
//!
//! Each batch is processed on its own, restricted to the genes detected in
//! that batch. Genes missing from a batch contribute a zero row (not
//! selected) so every batch reports every gene. The per-batch tables are then
//! averaged per gene and the final selection is re-derived.

use crate::data::{BatchLabels, ExpressionMatrix, GeneStats};
use crate::error::Result;
use crate::filter::filter_genes_min_cells;
use crate::hvg::cutoff::Cutoff;
use crate::hvg::dispersion::{highly_variable_dispersion, DispersionParams};
use crate::observe::Observer;
use crate::stats::summary::{cmp_desc_nan_last, nan_mean};

/// Dispersion-flavor selection over several batches, in input gene order.
///
/// # Arguments
/// * `matrix` - Cells × genes expression values
/// * `batches` - Batch of every cell
/// * `params` - Dispersion parameters applied within each batch
/// * `cutoff` - Applied per batch, then again on the averaged statistics
/// * `observer` - Diagnostics sink, fed batch by batch
///
/// # Returns
/// One row per gene with batch-averaged statistics,
/// `highly_variable_nbatches` and `highly_variable_intersection`.
pub fn highly_variable_batched(
    matrix: &ExpressionMatrix,
    batches: &BatchLabels,
    params: &DispersionParams,
    cutoff: &Cutoff,
    observer: &dyn Observer,
) -> Result<Vec<GeneStats>> {
    let per_batch = (0..batches.n_batches())
        .map(|b| batch_table(matrix, &batches.cells_in(b), params, cutoff, observer))
        .collect::<Result<Vec<_>>>()?;

    let n_batches = per_batch.len();
    let mut genes: Vec<GeneStats> = matrix
        .gene_ids()
        .iter()
        .enumerate()
        .map(|(g, id)| {
            let column = |f: fn(&GeneStats) -> f64| -> Vec<f64> {
                per_batch.iter().map(|t| f(&t[g])).collect()
            };
            let mut gene = GeneStats::new(id.clone(), nan_mean(&column(|s| s.means)));
            gene.dispersions = Some(nan_mean(&column(|s| s.dispersions.unwrap_or(f64::NAN))));
            gene.dispersions_norm = Some(nan_mean(&column(|s| {
                s.dispersions_norm.unwrap_or(f64::NAN)
            })));
            let nbatches = per_batch.iter().filter(|t| t[g].highly_variable).count();
            gene.highly_variable_nbatches = Some(nbatches);
            gene.highly_variable_intersection = Some(nbatches == n_batches);
            gene
        })
        .collect();

    match cutoff {
        Cutoff::TopN(n) => {
            let mut order: Vec<usize> = (0..genes.len()).collect();
            order.sort_by(|&a, &b| {
                let (ga, gb) = (&genes[a], &genes[b]);
                gb.highly_variable_nbatches
                    .cmp(&ga.highly_variable_nbatches)
                    .then(cmp_desc_nan_last(ga.normalized(), gb.normalized()))
            });
            for &g in order.iter().take(*n) {
                genes[g].highly_variable = true;
            }
        }
        Cutoff::Interval(bounds) => {
            for gene in genes.iter_mut() {
                gene.highly_variable = bounds.in_bounds(gene.means, gene.normalized());
            }
        }
    }

    Ok(genes)
}

/// One batch's table over all genes, zero-filled where the gene is undetected.
fn batch_table(
    matrix: &ExpressionMatrix,
    cells: &[usize],
    params: &DispersionParams,
    cutoff: &Cutoff,
    observer: &dyn Observer,
) -> Result<Vec<GeneStats>> {
    let subset = matrix.subset_cells(cells)?;
    let detected = filter_genes_min_cells(&subset, 1);
    let kept = detected.kept_indices();

    let mut table: Vec<GeneStats> = matrix
        .gene_ids()
        .iter()
        .map(|id| {
            let mut gene = GeneStats::new(id.clone(), 0.0);
            gene.dispersions = Some(0.0);
            gene.dispersions_norm = Some(0.0);
            gene
        })
        .collect();
    if kept.is_empty() {
        return Ok(table);
    }

    let subset = subset.subset_genes(&kept)?;
    let stats = highly_variable_dispersion(&subset, params, cutoff, observer)?;
    for (&g, gene) in kept.iter().zip(stats) {
        table[g] = gene;
    }
    Ok(table)
}
