//! Basic example of highly variable gene selection.
//!
//! This example shows how to:
//! 1. Create synthetic counts for two samples
//! 2. Drop genes that are never detected
//! 3. Select genes with the dispersion and regularized-variance flavors
//! 4. Examine results

use composable_hvg::prelude::*;
use sprs::TriMat;

const N_CELLS: usize = 80;
const N_GENES: usize = 40;

fn main() -> Result<()> {
    println!("=== Composable HVG Example ===\n");

    let (counts, obs) = create_example_data()?;
    println!("Data dimensions:");
    println!("  Cells: {}", counts.n_cells());
    println!("  Genes: {}", counts.n_genes());
    println!();

    let detected = filter_genes_min_cells(&counts, 1);
    print!("{}", detected);
    let counts = counts.subset_genes(&detected.kept_indices())?;
    println!();

    // Dispersion flavors read log1p values from X; seurat_v3 reads raw counts
    let logged = counts.map_values(f64::ln_1p);
    let mut adata = AnnotatedMatrix::new(logged)
        .with_layer("counts", counts)?
        .with_obs(obs)?
        .with_log1p(Log1pInfo::default());

    println!("=== seurat, interval cutoffs ===\n");
    let table = HvgSelector::new().compute(&adata)?;
    print!("{}", table.summary());
    println!();

    println!("=== cell_ranger, top 10 per sample ===\n");
    let table = HvgSelector::new()
        .flavor(Flavor::CellRanger)
        .n_top_genes(10)
        .batch_key("sample")
        .compute(&adata)?;
    print!("{}", table.summary());
    println!();

    println!("=== seurat_v3 on raw counts, written to var ===\n");
    HvgSelector::new()
        .flavor(Flavor::SeuratV3)
        .layer("counts")
        .n_top_genes(10)
        .run(&mut adata)?;

    if let (Some(mask), Some(ranks)) = (
        adata.var("highly_variable").and_then(|c| c.as_bool()),
        adata.var("highly_variable_rank").and_then(|c| c.as_float()),
    ) {
        let mut top: Vec<(f64, &str)> = adata
            .gene_ids()
            .iter()
            .zip(mask.iter().zip(ranks))
            .filter(|(_, (selected, _))| **selected)
            .map(|(id, (_, rank))| (*rank, id.as_str()))
            .collect();
        top.sort_by(|a, b| a.0.total_cmp(&b.0));
        println!("rank   gene");
        for (rank, id) in top {
            println!("{:<6} {}", rank, id);
        }
    }

    Ok(())
}

/// Two samples of Poisson-like counts; every fifth gene bursts in a few cells
/// and the last gene is never detected.
fn create_example_data() -> Result<(ExpressionMatrix, CellMetadata)> {
    let mut seed: u64 = 42;
    let mut next = move || {
        seed = seed
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (seed >> 33) as f64 / (1u64 << 31) as f64
    };

    let mut tri = TriMat::new((N_CELLS, N_GENES));
    for cell in 0..N_CELLS {
        for gene in 0..N_GENES - 1 {
            let base = 1.0 + (gene % 7) as f64;
            let burst = if gene % 5 == 0 && next() < 0.1 { 20.0 } else { 0.0 };
            let value = (base * next() * 2.0 + burst).floor();
            if value > 0.0 {
                tri.add_triplet(cell, gene, value);
            }
        }
    }

    let cells: Vec<String> = (0..N_CELLS).map(|i| format!("cell_{}", i)).collect();
    let genes = (0..N_GENES).map(|i| format!("gene_{}", i)).collect();
    let counts = ExpressionMatrix::from_sparse(tri.to_csr(), cells.clone(), genes)?;

    let samples: Vec<&str> = (0..N_CELLS)
        .map(|c| if c < N_CELLS / 2 { "A" } else { "B" })
        .collect();
    let obs = CellMetadata::new(cells).with_categorical("sample", &samples)?;
    Ok((counts, obs))
}
