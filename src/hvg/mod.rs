//! Highly variable gene selection.
//!
//! Three flavors are supported:
//!
//! - **seurat**: log-mean binned dispersion, normalized by per-bin mean and
//!   standard deviation. Expects log1p-transformed data.
//! - **cell_ranger**: percentile-binned dispersion, normalized by per-bin
//!   median and MAD.
//! - **seurat_v3**: loess-regularized variance of raw counts, ranked per batch.
//!
//! The entry points are [`highly_variable_genes`] and the [`HvgSelector`]
//! builder; both are driven by an [`HvgConfig`].

pub mod batch;
pub mod binning;
pub mod cutoff;
pub mod dispersion;
pub mod select;
pub mod seurat_v3;

pub use batch::highly_variable_batched;
pub use binning::MeanBins;
pub use cutoff::{Cutoff, IntervalCutoffs};
pub use dispersion::{highly_variable_dispersion, DispersionParams, DispersionStats};
pub use select::{compute_highly_variable_genes, highly_variable_genes, HvgSelector};
pub use seurat_v3::{highly_variable_seurat_v3, SeuratV3Params};

use crate::error::{HvgError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default number of genes selected by `seurat_v3` when none is given.
pub const DEFAULT_V3_N_TOP_GENES: usize = 2000;

/// HVG selection method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flavor {
    /// Binned dispersion on log1p data.
    #[default]
    Seurat,
    /// Percentile-binned robust dispersion.
    CellRanger,
    /// Loess-regularized variance on raw counts.
    SeuratV3,
}

impl Flavor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Flavor::Seurat => "seurat",
            Flavor::CellRanger => "cell_ranger",
            Flavor::SeuratV3 => "seurat_v3",
        }
    }

    /// Whether the flavor selects on normalized dispersion.
    pub fn is_dispersion_based(&self) -> bool {
        matches!(self, Flavor::Seurat | Flavor::CellRanger)
    }
}

impl fmt::Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Flavor {
    type Err = HvgError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "seurat" => Ok(Flavor::Seurat),
            "cell_ranger" => Ok(Flavor::CellRanger),
            "seurat_v3" => Ok(Flavor::SeuratV3),
            other => Err(HvgError::UnknownFlavor(other.to_string())),
        }
    }
}

/// Parameters for one HVG selection run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HvgConfig {
    /// Layer to read instead of `X`.
    pub layer: Option<String>,
    /// Number of genes to keep; overrides the interval bounds.
    pub n_top_genes: Option<usize>,
    pub min_disp: f64,
    pub max_disp: f64,
    pub min_mean: f64,
    pub max_mean: f64,
    /// Fraction of genes in each loess neighbourhood (`seurat_v3`).
    pub span: f64,
    /// Number of mean bins (`seurat`).
    pub n_bins: usize,
    pub flavor: Flavor,
    /// Restrict the output to the selected genes.
    pub subset: bool,
    /// Write results into the annotated matrix instead of returning them.
    pub inplace: bool,
    /// Categorical cell annotation defining batches.
    pub batch_key: Option<String>,
    /// Warn when `seurat_v3` input is not integer counts.
    pub check_values: bool,
    /// Reduce moments this many cells at a time.
    pub chunk_size: Option<usize>,
}

impl Default for HvgConfig {
    fn default() -> Self {
        let bounds = IntervalCutoffs::default();
        Self {
            layer: None,
            n_top_genes: None,
            min_disp: bounds.min_disp,
            max_disp: bounds.max_disp,
            min_mean: bounds.min_mean,
            max_mean: bounds.max_mean,
            span: 0.3,
            n_bins: 20,
            flavor: Flavor::Seurat,
            subset: false,
            inplace: true,
            batch_key: None,
            check_values: true,
            chunk_size: None,
        }
    }
}

impl HvgConfig {
    /// Load from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(HvgError::from)
    }

    /// Save to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(HvgError::from)
    }

    /// Save to pretty JSON. Infinite bounds are written as `null`.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(HvgError::from)
    }

    /// The interval bounds as a cutoff set.
    pub fn interval(&self) -> IntervalCutoffs {
        IntervalCutoffs {
            min_mean: self.min_mean,
            max_mean: self.max_mean,
            min_disp: self.min_disp,
            max_disp: self.max_disp,
        }
    }

    /// Check parameter ranges.
    pub fn validate(&self) -> Result<()> {
        if self.n_top_genes == Some(0) {
            return Err(HvgError::InvalidParameter(
                "n_top_genes must be at least 1".to_string(),
            ));
        }
        if self.n_bins == 0 {
            return Err(HvgError::InvalidParameter(
                "n_bins must be at least 1".to_string(),
            ));
        }
        if !(self.span > 0.0 && self.span <= 1.0) {
            return Err(HvgError::InvalidParameter(format!(
                "span must be in (0, 1], got {}",
                self.span
            )));
        }
        if self.chunk_size == Some(0) {
            return Err(HvgError::InvalidParameter(
                "chunk_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flavor_parse() {
        assert_eq!("seurat".parse::<Flavor>().unwrap(), Flavor::Seurat);
        assert_eq!("cell_ranger".parse::<Flavor>().unwrap(), Flavor::CellRanger);
        assert_eq!("seurat_v3".parse::<Flavor>().unwrap(), Flavor::SeuratV3);
        assert!(matches!(
            "pearson".parse::<Flavor>(),
            Err(HvgError::UnknownFlavor(f)) if f == "pearson"
        ));
        assert_eq!(Flavor::CellRanger.to_string(), "cell_ranger");
    }

    #[test]
    fn test_defaults() {
        let config = HvgConfig::default();
        assert_eq!(config.min_disp, 0.5);
        assert!(config.max_disp.is_infinite());
        assert_eq!(config.min_mean, 0.0125);
        assert_eq!(config.max_mean, 3.0);
        assert_eq!(config.n_bins, 20);
        assert_eq!(config.flavor, Flavor::Seurat);
        assert!(config.inplace);
        assert!(config.check_values);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_roundtrip() {
        let yaml = r#"
flavor: seurat_v3
n_top_genes: 500
batch_key: sample
span: 0.5
"#;
        let config = HvgConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.flavor, Flavor::SeuratV3);
        assert_eq!(config.n_top_genes, Some(500));
        assert_eq!(config.batch_key.as_deref(), Some("sample"));
        // Unlisted fields keep their defaults
        assert_eq!(config.n_bins, 20);

        let back = HvgConfig::from_yaml(&config.to_yaml().unwrap()).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_unknown_flavor_in_yaml() {
        assert!(HvgConfig::from_yaml("flavor: pearson_residuals").is_err());
    }

    #[test]
    fn test_validate() {
        let bad = [
            HvgConfig {
                n_top_genes: Some(0),
                ..Default::default()
            },
            HvgConfig {
                n_bins: 0,
                ..Default::default()
            },
            HvgConfig {
                span: 0.0,
                ..Default::default()
            },
            HvgConfig {
                span: 1.5,
                ..Default::default()
            },
            HvgConfig {
                chunk_size: Some(0),
                ..Default::default()
            },
        ];
        for config in bad {
            assert!(matches!(config.validate(), Err(HvgError::InvalidParameter(_))));
        }
    }
}
