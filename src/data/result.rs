//! Result types for highly variable gene selection.

use crate::error::Result;
use crate::hvg::Flavor;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Per-gene statistics produced by one selection run.
///
/// Which optional fields are populated depends on the flavor and on whether a
/// batch key was used; see [`HvgTable::columns`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneStats {
    /// Gene identifier.
    pub gene_id: String,
    /// Mean expression (log1p of the linear mean for `seurat`).
    pub means: f64,
    /// Dispersion (dispersion-based flavors).
    pub dispersions: Option<f64>,
    /// Dispersion normalized within its mean bin.
    pub dispersions_norm: Option<f64>,
    /// Variance over all cells (`seurat_v3`).
    pub variances: Option<f64>,
    /// Regularized normalized variance, averaged over batches (`seurat_v3`).
    pub variances_norm: Option<f64>,
    /// Mean-expression bin (single-batch dispersion flavors).
    pub mean_bin: Option<usize>,
    /// Rank by normalized variance; median over batches, NaN when unranked.
    pub highly_variable_rank: Option<f64>,
    /// Number of batches in which the gene was selected.
    pub highly_variable_nbatches: Option<usize>,
    /// Selected in every batch.
    pub highly_variable_intersection: Option<bool>,
    /// Final selection flag.
    pub highly_variable: bool,
}

impl GeneStats {
    /// Gene with only a mean set; everything else filled in by the flavor.
    pub fn new(gene_id: String, means: f64) -> Self {
        Self {
            gene_id,
            means,
            dispersions: None,
            dispersions_norm: None,
            variances: None,
            variances_norm: None,
            mean_bin: None,
            highly_variable_rank: None,
            highly_variable_nbatches: None,
            highly_variable_intersection: None,
            highly_variable: false,
        }
    }

    /// The normalized score the flavor selects on (NaN if absent).
    pub fn normalized(&self) -> f64 {
        self.dispersions_norm
            .or(self.variances_norm)
            .unwrap_or(f64::NAN)
    }
}

/// Per-gene HVG statistics in input gene order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HvgTable {
    /// Flavor used to produce the table.
    pub flavor: Flavor,
    /// Whether results were aggregated over a batch key.
    pub batched: bool,
    /// One row per gene.
    pub genes: Vec<GeneStats>,
}

impl HvgTable {
    pub fn new(flavor: Flavor, batched: bool, genes: Vec<GeneStats>) -> Self {
        Self {
            flavor,
            batched,
            genes,
        }
    }

    /// Number of genes.
    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    /// Iterate over genes.
    pub fn iter(&self) -> impl Iterator<Item = &GeneStats> {
        self.genes.iter()
    }

    /// Look up a gene by identifier.
    pub fn get(&self, gene_id: &str) -> Option<&GeneStats> {
        self.genes.iter().find(|g| g.gene_id == gene_id)
    }

    /// Selection flags in gene order.
    pub fn mask(&self) -> Vec<bool> {
        self.genes.iter().map(|g| g.highly_variable).collect()
    }

    /// Genes flagged highly variable.
    pub fn selected(&self) -> Vec<&GeneStats> {
        self.genes.iter().filter(|g| g.highly_variable).collect()
    }

    pub fn n_selected(&self) -> usize {
        self.genes.iter().filter(|g| g.highly_variable).count()
    }

    /// Table restricted to the selected genes.
    pub fn subset_selected(&self) -> Self {
        Self {
            flavor: self.flavor,
            batched: self.batched,
            genes: self
                .genes
                .iter()
                .filter(|g| g.highly_variable)
                .cloned()
                .collect(),
        }
    }

    /// Column names present in this table, in output order.
    pub fn columns(&self) -> Vec<&'static str> {
        let mut cols = vec!["highly_variable", "means"];
        if self.flavor.is_dispersion_based() {
            cols.extend(["dispersions", "dispersions_norm"]);
            if !self.batched {
                cols.push("mean_bin");
            }
        } else {
            cols.extend(["variances", "variances_norm", "highly_variable_rank"]);
        }
        if self.batched {
            cols.push("highly_variable_nbatches");
            if self.flavor.is_dispersion_based() {
                cols.push("highly_variable_intersection");
            }
        }
        cols
    }

    fn format_cell(gene: &GeneStats, column: &str) -> String {
        fn float(v: Option<f64>) -> String {
            v.map(|v| format!("{:.6}", v))
                .unwrap_or_else(|| "NA".to_string())
        }
        match column {
            "highly_variable" => gene.highly_variable.to_string(),
            "means" => format!("{:.6}", gene.means),
            "dispersions" => float(gene.dispersions),
            "dispersions_norm" => float(gene.dispersions_norm),
            "variances" => float(gene.variances),
            "variances_norm" => float(gene.variances_norm),
            "highly_variable_rank" => float(gene.highly_variable_rank),
            "mean_bin" => gene
                .mean_bin
                .map(|b| b.to_string())
                .unwrap_or_else(|| "NA".to_string()),
            "highly_variable_nbatches" => gene
                .highly_variable_nbatches
                .map(|n| n.to_string())
                .unwrap_or_else(|| "NA".to_string()),
            "highly_variable_intersection" => gene
                .highly_variable_intersection
                .map(|b| b.to_string())
                .unwrap_or_else(|| "NA".to_string()),
            _ => "NA".to_string(),
        }
    }

    /// Write the table to a TSV file, one row per gene.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        let columns = self.columns();

        write!(writer, "gene_id")?;
        for col in &columns {
            write!(writer, "\t{}", col)?;
        }
        writeln!(writer)?;

        for gene in &self.genes {
            write!(writer, "{}", gene.gene_id)?;
            for col in &columns {
                write!(writer, "\t{}", Self::format_cell(gene, col))?;
            }
            writeln!(writer)?;
        }

        Ok(())
    }

    /// Serialize the table to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Count selected genes and NaN scores.
    pub fn summary(&self) -> HvgSummary {
        HvgSummary {
            flavor: self.flavor,
            total: self.len(),
            selected: self.n_selected(),
            nan_scores: self
                .genes
                .iter()
                .filter(|g| g.normalized().is_nan())
                .count(),
            intersection: self
                .genes
                .iter()
                .filter(|g| g.highly_variable_intersection == Some(true))
                .count(),
        }
    }
}

/// Summary statistics for an [`HvgTable`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HvgSummary {
    pub flavor: Flavor,
    pub total: usize,
    pub selected: usize,
    pub nan_scores: usize,
    pub intersection: usize,
}

impl std::fmt::Display for HvgSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Highly variable genes ({})", self.flavor)?;
        writeln!(f, "  Genes:       {}", self.total)?;
        writeln!(f, "  Selected:    {}", self.selected)?;
        writeln!(f, "  NaN scores:  {}", self.nan_scores)?;
        if self.intersection > 0 {
            writeln!(f, "  In all batches: {}", self.intersection)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::NamedTempFile;

    fn table() -> HvgTable {
        let mut a = GeneStats::new("g1".into(), 0.5);
        a.dispersions = Some(1.2);
        a.dispersions_norm = Some(2.0);
        a.mean_bin = Some(3);
        a.highly_variable = true;
        let mut b = GeneStats::new("g2".into(), 0.1);
        b.dispersions = Some(f64::NAN);
        b.dispersions_norm = Some(f64::NAN);
        b.mean_bin = Some(0);
        HvgTable::new(Flavor::Seurat, false, vec![a, b])
    }

    #[test]
    fn test_columns_by_flavor() {
        let t = table();
        assert_eq!(
            t.columns(),
            vec!["highly_variable", "means", "dispersions", "dispersions_norm", "mean_bin"]
        );
        let batched = HvgTable::new(Flavor::SeuratV3, true, vec![]);
        assert_eq!(
            batched.columns(),
            vec![
                "highly_variable",
                "means",
                "variances",
                "variances_norm",
                "highly_variable_rank",
                "highly_variable_nbatches"
            ]
        );
    }

    #[test]
    fn test_summary_and_subset() {
        let t = table();
        let summary = t.summary();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.selected, 1);
        assert_eq!(summary.nan_scores, 1);

        let sub = t.subset_selected();
        assert_eq!(sub.len(), 1);
        assert_eq!(sub.genes[0].gene_id, "g1");
        assert_eq!(t.mask(), vec![true, false]);
    }

    #[test]
    fn test_to_tsv() {
        let t = table();
        let file = NamedTempFile::new().unwrap();
        t.to_tsv(file.path()).unwrap();

        let mut contents = String::new();
        File::open(file.path())
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("gene_id\thighly_variable\tmeans"));
        assert!(lines[1].starts_with("g1\ttrue\t0.500000\t1.200000\t2.000000\t3"));
        assert!(lines[2].contains("NaN"));
    }
}
