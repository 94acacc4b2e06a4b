//! Binned dispersion normalization for the `seurat` and `cell_ranger` flavors.

use crate::data::{ExpressionMatrix, GeneStats};
use crate::error::{HvgError, Result};
use crate::hvg::binning::MeanBins;
use crate::hvg::cutoff::Cutoff;
use crate::hvg::Flavor;
use crate::observe::Observer;
use crate::stats::moments::gene_moments;
use crate::stats::summary::{mad, median, nan_mean, nan_std};
use rayon::prelude::*;

/// Mean values below this are replaced before dividing.
const MEAN_FLOOR: f64 = 1e-12;

/// Inputs of a single-batch dispersion run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispersionParams {
    pub flavor: Flavor,
    /// Number of equal-width bins (`seurat` only).
    pub n_bins: usize,
    /// Base of a previous log1p transform; `None` is natural log.
    pub log1p_base: Option<f64>,
    pub chunk_size: Option<usize>,
}

impl DispersionParams {
    pub fn new(flavor: Flavor) -> Self {
        Self {
            flavor,
            n_bins: 20,
            log1p_base: None,
            chunk_size: None,
        }
    }
}

/// Per-gene dispersion statistics before selection.
#[derive(Debug, Clone)]
pub struct DispersionStats {
    pub means: Vec<f64>,
    pub dispersions: Vec<f64>,
    pub dispersions_norm: Vec<f64>,
    pub bins: MeanBins,
}

/// Compute means, dispersions and bin-normalized dispersions.
///
/// For `seurat` the matrix is taken to hold log1p values: it is moved back to
/// linear scale, and the reported means and dispersions are logarithmic.
///
/// # Arguments
/// * `matrix` - Cells × genes expression values
/// * `params` - Flavor, bin count, log1p base and chunking
/// * `observer` - Receives the single-gene-bin diagnostic
///
/// # Returns
/// Per-gene statistics in input gene order together with the bins used.
pub fn dispersion_stats(
    matrix: &ExpressionMatrix,
    params: &DispersionParams,
    observer: &dyn Observer,
) -> Result<DispersionStats> {
    if params.n_bins == 0 {
        return Err(HvgError::InvalidParameter(
            "n_bins must be at least 1".to_string(),
        ));
    }

    let (mut means, variances) = match params.flavor {
        Flavor::Seurat => {
            let linear = match params.log1p_base {
                Some(base) => {
                    let scale = base.ln();
                    matrix.map_values(|v| (v * scale).exp_m1())
                }
                None => matrix.map_values(f64::exp_m1),
            };
            gene_moments(&linear, params.chunk_size)?
        }
        Flavor::CellRanger => gene_moments(matrix, params.chunk_size)?,
        Flavor::SeuratV3 => {
            return Err(HvgError::InvalidParameter(
                "seurat_v3 is not a dispersion flavor".to_string(),
            ))
        }
    };

    for m in means.iter_mut() {
        if *m == 0.0 {
            *m = MEAN_FLOOR;
        }
    }
    let mut dispersions: Vec<f64> = variances
        .iter()
        .zip(&means)
        .map(|(v, m)| v / m)
        .collect();

    if params.flavor == Flavor::Seurat {
        for d in dispersions.iter_mut() {
            *d = if *d == 0.0 { f64::NAN } else { d.ln() };
        }
        for m in means.iter_mut() {
            *m = m.ln_1p();
        }
    }

    let bins = match params.flavor {
        Flavor::Seurat => MeanBins::equal_width(&means, params.n_bins),
        _ => MeanBins::percentiles(&means),
    };
    let (location, scale) = bin_summaries(&dispersions, &bins, params.flavor, observer);

    let dispersions_norm = dispersions
        .iter()
        .zip(bins.assignment())
        .map(|(&d, bin)| match bin {
            Some(b) => (d - location[*b]) / scale[*b],
            None => f64::NAN,
        })
        .collect();

    Ok(DispersionStats {
        means,
        dispersions,
        dispersions_norm,
        bins,
    })
}

/// Location and scale of the dispersions in each bin.
fn bin_summaries(
    dispersions: &[f64],
    bins: &MeanBins,
    flavor: Flavor,
    observer: &dyn Observer,
) -> (Vec<f64>, Vec<f64>) {
    let members = bins.members();
    let (mut location, mut scale): (Vec<f64>, Vec<f64>) = members
        .par_iter()
        .map(|genes| {
            let values: Vec<f64> = genes.iter().map(|&g| dispersions[g]).collect();
            match flavor {
                Flavor::CellRanger => (median(&values), mad(&values)),
                _ => (nan_mean(&values), nan_std(&values)),
            }
        })
        .unzip();

    if flavor == Flavor::Seurat {
        // A bin whose spread is undefined normalizes its genes to 1.
        let lonely: Vec<usize> = (0..members.len())
            .filter(|&b| !members[b].is_empty() && scale[b].is_nan())
            .collect();
        if !lonely.is_empty() {
            let mut genes: Vec<usize> = lonely.iter().flat_map(|&b| members[b].clone()).collect();
            genes.sort_unstable();
            observer.debug(&format!(
                "Gene indices {:?} fell into a single bin: their normalized dispersion \
                 was set to 1.\n    Decreasing `n_bins` will likely avoid this effect.",
                genes
            ));
            for b in lonely {
                scale[b] = location[b];
                location[b] = 0.0;
            }
        }
    }

    (location, scale)
}

/// Single-batch selection for a dispersion flavor, in input gene order.
///
/// # Arguments
/// * `matrix` - Cells × genes expression values
/// * `params` - Dispersion parameters
/// * `cutoff` - Interval bounds or top-N on the normalized dispersion
/// * `observer` - Diagnostics sink
///
/// # Returns
/// One row per gene with `means`, `dispersions`, `dispersions_norm`, the mean
/// bin and the selection flag.
pub fn highly_variable_dispersion(
    matrix: &ExpressionMatrix,
    params: &DispersionParams,
    cutoff: &Cutoff,
    observer: &dyn Observer,
) -> Result<Vec<GeneStats>> {
    let stats = dispersion_stats(matrix, params, observer)?;
    let selected = cutoff.select(&stats.means, &stats.dispersions_norm, observer);

    Ok(matrix
        .gene_ids()
        .iter()
        .enumerate()
        .map(|(i, id)| {
            let mut gene = GeneStats::new(id.clone(), stats.means[i]);
            gene.dispersions = Some(stats.dispersions[i]);
            gene.dispersions_norm = Some(stats.dispersions_norm[i]);
            gene.mean_bin = stats.bins.assignment()[i];
            gene.highly_variable = selected[i];
            gene
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hvg::cutoff::IntervalCutoffs;
    use crate::observe::CollectingObserver;
    use approx::assert_relative_eq;
    use log::Level;
    use nalgebra::DMatrix;

    fn ids(prefix: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{}{}", prefix, i)).collect()
    }

    /// 4 cells × 3 genes of raw counts.
    fn counts() -> ExpressionMatrix {
        let data = DMatrix::from_row_slice(
            4,
            3,
            &[
                1.0, 0.0, 5.0, //
                3.0, 2.0, 5.0, //
                2.0, 0.0, 5.0, //
                2.0, 6.0, 5.0,
            ],
        );
        ExpressionMatrix::from_dense(data, ids("c", 4), ids("g", 3)).unwrap()
    }

    #[test]
    fn test_cell_ranger_dispersion() {
        let obs = CollectingObserver::new();
        let stats =
            dispersion_stats(&counts(), &DispersionParams::new(Flavor::CellRanger), &obs).unwrap();
        // gene 0: mean 2, var 2/3
        assert_relative_eq!(stats.means[0], 2.0);
        assert_relative_eq!(stats.dispersions[0], (2.0 / 3.0) / 2.0, epsilon = 1e-12);
        // gene 1: mean 2, var 8
        assert_relative_eq!(stats.dispersions[1], 4.0, epsilon = 1e-12);
        // constant gene has zero dispersion (no log for cell_ranger)
        assert_eq!(stats.dispersions[2], 0.0);
    }

    #[test]
    fn test_seurat_back_transforms_log1p() {
        let obs = CollectingObserver::new();
        let raw = counts();
        let logged = raw.map_values(f64::ln_1p);
        let stats =
            dispersion_stats(&logged, &DispersionParams::new(Flavor::Seurat), &obs).unwrap();
        assert_relative_eq!(stats.means[0], 3.0f64.ln(), epsilon = 1e-9);
        assert_relative_eq!(stats.dispersions[1], 4.0f64.ln(), epsilon = 1e-9);
        // zero dispersion becomes NaN for seurat
        assert!(stats.dispersions[2].is_nan());
        assert!(stats.dispersions_norm[2].is_nan());
    }

    #[test]
    fn test_seurat_log1p_base() {
        let obs = CollectingObserver::new();
        let log2 = counts().map_values(|v| v.ln_1p() / 2.0f64.ln());
        let params = DispersionParams {
            log1p_base: Some(2.0),
            ..DispersionParams::new(Flavor::Seurat)
        };
        let stats = dispersion_stats(&log2, &params, &obs).unwrap();
        assert_relative_eq!(stats.means[0], 3.0f64.ln(), epsilon = 1e-9);
        assert_relative_eq!(stats.dispersions[1], 4.0f64.ln(), epsilon = 1e-9);
    }

    #[test]
    fn test_single_gene_bin_normalizes_to_one() {
        let obs = CollectingObserver::new();
        let data = DMatrix::from_row_slice(
            4,
            2,
            &[
                1.0, 0.0, //
                3.0, 10.0, //
                2.0, 0.0, //
                2.0, 30.0,
            ],
        );
        let raw = ExpressionMatrix::from_dense(data, ids("c", 4), ids("g", 2)).unwrap();
        let logged = raw.map_values(f64::ln_1p);
        let params = DispersionParams {
            n_bins: 2,
            ..DispersionParams::new(Flavor::Seurat)
        };
        let stats = dispersion_stats(&logged, &params, &obs).unwrap();
        assert_eq!(stats.bins.assignment(), &[Some(0), Some(1)]);
        assert_relative_eq!(stats.dispersions_norm[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(stats.dispersions_norm[1], 1.0, epsilon = 1e-12);
        assert!(obs.contains(Level::Debug, "Gene indices [0, 1] fell into a single bin"));
    }

    #[test]
    fn test_cell_ranger_normalizes_by_bin_median_and_mad() {
        let obs = CollectingObserver::new();
        let data = DMatrix::from_fn(30, 40, |c, g| ((c * (g + 3) + g * g) % (g + 2)) as f64);
        let m = ExpressionMatrix::from_dense(data, ids("c", 30), ids("g", 40)).unwrap();
        let stats = dispersion_stats(&m, &DispersionParams::new(Flavor::CellRanger), &obs).unwrap();

        let sorted_median = |mut v: Vec<f64>| {
            v.sort_by(|a, b| a.partial_cmp(b).unwrap());
            let n = v.len();
            if n % 2 == 1 {
                v[n / 2]
            } else {
                (v[n / 2 - 1] + v[n / 2]) / 2.0
            }
        };

        let mut checked = 0;
        for genes in stats.bins.members().iter().filter(|g| g.len() >= 3) {
            let d: Vec<f64> = genes.iter().map(|&g| stats.dispersions[g]).collect();
            let center = sorted_median(d.clone());
            let spread = sorted_median(d.iter().map(|v| (v - center).abs()).collect())
                / 0.674_489_750_196_081_7;
            if spread == 0.0 {
                continue;
            }
            for &g in genes {
                let expected = (stats.dispersions[g] - center) / spread;
                assert_relative_eq!(stats.dispersions_norm[g], expected, epsilon = 1e-9);
                checked += 1;
            }
        }
        assert!(checked >= 3);
    }

    #[test]
    fn test_lonely_genes_reported_in_gene_order() {
        let obs = CollectingObserver::new();
        // Genes 0 and 2 sit alone at the extremes; gene 1 is alone in between.
        let data = DMatrix::from_row_slice(
            4,
            3,
            &[
                30.0, 3.0, 0.0, //
                10.0, 5.0, 0.0, //
                30.0, 4.0, 1.0, //
                10.0, 4.0, 0.0,
            ],
        );
        let raw = ExpressionMatrix::from_dense(data, ids("c", 4), ids("g", 3)).unwrap();
        let params = DispersionParams {
            n_bins: 3,
            ..DispersionParams::new(Flavor::Seurat)
        };
        dispersion_stats(&raw.map_values(f64::ln_1p), &params, &obs).unwrap();
        assert!(obs.contains(Level::Debug, "Gene indices [0, 1, 2] fell into a single bin"));
    }

    #[test]
    fn test_seurat_bin_normalization() {
        let obs = CollectingObserver::new();
        // One bin for all three genes: normalized dispersions are z-scores.
        let data = DMatrix::from_row_slice(
            3,
            3,
            &[
                1.0, 0.0, 2.0, //
                0.0, 2.0, 0.0, //
                1.0, 1.0, 1.0,
            ],
        );
        let m = ExpressionMatrix::from_dense(data, ids("c", 3), ids("g", 3)).unwrap();
        let params = DispersionParams {
            n_bins: 1,
            ..DispersionParams::new(Flavor::Seurat)
        };
        let stats = dispersion_stats(&m, &params, &obs).unwrap();
        let d = &stats.dispersions;
        let loc = (d[0] + d[1] + d[2]) / 3.0;
        let ss = (d[0] - loc).powi(2) + (d[1] - loc).powi(2) + (d[2] - loc).powi(2);
        let sd = (ss / 2.0).sqrt();
        for g in 0..3 {
            assert_relative_eq!(stats.dispersions_norm[g], (d[g] - loc) / sd, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_selection_in_gene_order() {
        let obs = CollectingObserver::new();
        let genes = highly_variable_dispersion(
            &counts(),
            &DispersionParams::new(Flavor::CellRanger),
            &Cutoff::TopN(1),
            &obs,
        )
        .unwrap();
        assert_eq!(genes.len(), 3);
        assert_eq!(genes[0].gene_id, "g0");
        assert_eq!(genes.iter().filter(|g| g.highly_variable).count(), 1);
        assert!(genes.iter().all(|g| g.mean_bin.is_some()));
    }

    #[test]
    fn test_interval_matches_predicate() {
        let obs = CollectingObserver::new();
        let bounds = IntervalCutoffs::default();
        let logged = counts().map_values(f64::ln_1p);
        let params = DispersionParams::new(Flavor::Seurat);
        let genes =
            highly_variable_dispersion(&logged, &params, &Cutoff::Interval(bounds), &obs).unwrap();
        for g in &genes {
            let norm = g.dispersions_norm.unwrap_or(f64::NAN);
            assert_eq!(g.highly_variable, bounds.in_bounds(g.means, norm));
        }
    }

    #[test]
    fn test_rejects_v3() {
        let obs = CollectingObserver::new();
        let params = DispersionParams::new(Flavor::SeuratV3);
        assert!(dispersion_stats(&counts(), &params, &obs).is_err());
    }
}
