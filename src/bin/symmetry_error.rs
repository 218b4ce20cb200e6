// SPDX-License-Identifier: AGPL-3.0-only

//! Mean symmetric error over grid cells sharing the same ln(sAEC/Dc).
//!
//! Reads a fitted WSM table for the cell grid and the processed table for
//! the observed scores.
//!
//! Usage: symmetry_error [--system=human|mouse] [--wsm=PATH] [--data=PATH]

use sporefit::data::{self, DataTable};
use sporefit::error::SporeFitError;
use sporefit::symmetry::{find_identical_ratios, mean_symmetric_error};
use std::path::PathBuf;

fn run(args: &[String]) -> Result<(), SporeFitError> {
    let system = data::parse_system_from_args(args);
    let wsm_path = data::parse_cli_string(args, "--wsm")
        .map_or_else(|| PathBuf::from(format!("WSM_{}.csv", system.name())), PathBuf::from);
    let data_path = data::parse_cli_string(args, "--data")
        .map_or_else(|| PathBuf::from(system.processed_file_name()), PathBuf::from);

    println!("═══════════════════════════════════════════════════════════");
    println!("  Symmetry error ({} system)", system.name());
    println!("═══════════════════════════════════════════════════════════\n");

    let rows = data::read_wsm_table(&wsm_path)?;
    let groups = find_identical_ratios(&rows);
    println!("  Identical ratios in {} ({} groups):", wsm_path.display(), groups.len());
    for g in &groups {
        let cells: Vec<String> = g
            .cells
            .iter()
            .map(|(s, d)| format!("(sAEC={s}, Dc={d})"))
            .collect();
        println!("    ln(sAEC/Dc) = {:.4}: {}", g.ln_ratio, cells.join(", "));
    }

    let table = DataTable::load(&data_path)?;
    let me = mean_symmetric_error(&groups, &table)?;
    println!("\n  Mean symmetric error {} ME = {me:.6}", system.name());
    Ok(())
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Err(e) = run(&args) {
        eprintln!("❌ symmetry_error failed: {e}");
        std::process::exit(1);
    }
}
