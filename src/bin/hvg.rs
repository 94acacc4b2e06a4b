//! HVG - Highly Variable Gene selection CLI
//!
//! Command-line interface for composable highly variable gene selection.

use clap::{Parser, Subcommand, ValueEnum};
use composable_hvg::data::{AnnotatedMatrix, CellMetadata, ExpressionMatrix, HvgTable, Log1pInfo};
use composable_hvg::error::Result;
use composable_hvg::hvg::{Flavor, HvgConfig, HvgSelector};
use std::path::{Path, PathBuf};

/// CLI-friendly flavor enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliFlavor {
    /// Binned dispersion on log1p-transformed data
    Seurat,
    /// Percentile-binned robust dispersion
    CellRanger,
    /// Loess-regularized variance on raw counts
    SeuratV3,
}

impl From<CliFlavor> for Flavor {
    fn from(flavor: CliFlavor) -> Self {
        match flavor {
            CliFlavor::Seurat => Flavor::Seurat,
            CliFlavor::CellRanger => Flavor::CellRanger,
            CliFlavor::SeuratV3 => Flavor::SeuratV3,
        }
    }
}

/// Composable Highly Variable Gene selection
#[derive(Parser)]
#[command(name = "hvg")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Select highly variable genes with command-line parameters
    Select {
        /// Path to expression matrix TSV (genes as rows, cells as columns)
        #[arg(short = 'c', long)]
        counts: PathBuf,

        /// Path to cell metadata TSV
        #[arg(long)]
        obs: Option<PathBuf>,

        /// Selection flavor
        #[arg(short, long, value_enum, default_value = "seurat")]
        flavor: CliFlavor,

        /// Number of genes to select (seurat_v3 defaults to 2000)
        #[arg(short = 'n', long)]
        n_top_genes: Option<usize>,

        /// Metadata column defining batches
        #[arg(short, long)]
        batch_key: Option<String>,

        /// Number of mean bins (seurat)
        #[arg(long, default_value = "20")]
        n_bins: usize,

        /// Loess span (seurat_v3)
        #[arg(long, default_value = "0.3")]
        span: f64,

        /// Base of the log1p transform applied to the input
        #[arg(long)]
        log1p_base: Option<f64>,

        /// Lower bound on mean expression
        #[arg(long, default_value = "0.0125")]
        min_mean: f64,

        /// Upper bound on mean expression
        #[arg(long, default_value = "3")]
        max_mean: f64,

        /// Lower bound on normalized dispersion
        #[arg(long, default_value = "0.5")]
        min_disp: f64,

        /// Reduce moments this many cells at a time
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Only write the selected genes
        #[arg(long)]
        subset: bool,

        /// Output path for results TSV
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Select highly variable genes from a YAML configuration file
    Run {
        /// Path to HVG configuration YAML
        #[arg(long)]
        config: PathBuf,

        /// Path to expression matrix TSV (genes as rows, cells as columns)
        #[arg(short = 'c', long)]
        counts: PathBuf,

        /// Path to cell metadata TSV
        #[arg(long)]
        obs: Option<PathBuf>,

        /// Base of the log1p transform applied to the input
        #[arg(long)]
        log1p_base: Option<f64>,

        /// Output path for results TSV
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() {
    pretty_env_logger::formatted_builder()
        .parse_filters(&std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Select {
            counts,
            obs,
            flavor,
            n_top_genes,
            batch_key,
            n_bins,
            span,
            log1p_base,
            min_mean,
            max_mean,
            min_disp,
            chunk_size,
            subset,
            output,
        } => {
            let config = HvgConfig {
                flavor: flavor.into(),
                n_top_genes,
                batch_key,
                n_bins,
                span,
                min_mean,
                max_mean,
                min_disp,
                chunk_size,
                subset,
                ..Default::default()
            };
            cmd_select(config, &counts, obs.as_deref(), log1p_base, &output)
        }

        Commands::Run {
            config,
            counts,
            obs,
            log1p_base,
            output,
        } => cmd_run(&config, &counts, obs.as_deref(), log1p_base, &output),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Run a selection from a YAML configuration
fn cmd_run(
    config_path: &Path,
    counts_path: &Path,
    obs_path: Option<&Path>,
    log1p_base: Option<f64>,
    output_path: &Path,
) -> Result<()> {
    eprintln!("Loading HVG configuration from {:?}...", config_path);
    let config_str = std::fs::read_to_string(config_path)?;
    let config = HvgConfig::from_yaml(&config_str)?;
    cmd_select(config, counts_path, obs_path, log1p_base, output_path)
}

/// Run a selection with an explicit configuration
fn cmd_select(
    config: HvgConfig,
    counts_path: &Path,
    obs_path: Option<&Path>,
    log1p_base: Option<f64>,
    output_path: &Path,
) -> Result<()> {
    let adata = load(counts_path, obs_path, log1p_base)?;
    eprintln!(
        "Loaded {} cells x {} genes",
        adata.n_cells(),
        adata.n_genes()
    );

    eprintln!("Selecting highly variable genes ({})...", config.flavor);
    let table = HvgSelector::from_config(config).compute(&adata)?;
    write_table(&table, output_path)
}

fn load(
    counts_path: &Path,
    obs_path: Option<&Path>,
    log1p_base: Option<f64>,
) -> Result<AnnotatedMatrix> {
    eprintln!("Loading data...");
    let counts = ExpressionMatrix::from_tsv(counts_path)?;
    let mut adata = AnnotatedMatrix::new(counts);
    if let Some(path) = obs_path {
        adata = adata.with_obs(CellMetadata::from_tsv(path)?)?;
    }
    if log1p_base.is_some() {
        adata = adata.with_log1p(Log1pInfo { base: log1p_base });
    }
    Ok(adata)
}

fn write_table(table: &HvgTable, output_path: &Path) -> Result<()> {
    eprintln!("Writing results to {:?}...", output_path);
    table.to_tsv(output_path)?;
    eprintln!("Done!");
    eprint!("{}", table.summary());
    Ok(())
}
