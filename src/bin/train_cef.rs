// SPDX-License-Identifier: AGPL-3.0-only

//! Fit the compressed exponential function per grid cell and persist the
//! parameter table.
//!
//! Usage: train_cef [--system=human|mouse] [--data=PATH] [--out=PATH] [--seed=N]

use sporefit::calibrate::train_cef;
use sporefit::data::{self, CovariateFilter, DataTable};
use sporefit::error::SporeFitError;
use sporefit::models::{self, CompressedExponential};
use std::path::PathBuf;

fn run(args: &[String]) -> Result<(), SporeFitError> {
    let system = data::parse_system_from_args(args);
    let data_path = data::parse_cli_string(args, "--data")
        .map_or_else(|| PathBuf::from(system.processed_file_name()), PathBuf::from);
    let out_path = data::parse_cli_string(args, "--out")
        .map_or_else(|| PathBuf::from(format!("CEF_{}.csv", system.name())), PathBuf::from);
    let mut rng = data::rng_from_args(args);

    println!("═══════════════════════════════════════════════════════════");
    println!("  CEF per-cell calibration ({} system)", system.name());
    println!("═══════════════════════════════════════════════════════════\n");

    let table = DataTable::load(&data_path)?;
    println!("  Loaded {} configurations from {}", table.len(), data_path.display());

    let rows = train_cef(&table, &mut rng)?;

    // Reported metric: mean of per-cell MADs, anchor cells included.
    let cef = CompressedExponential;
    let mut mad_sum = 0.0;
    for row in &rows {
        let set = table.calibration_set(&CovariateFilter::cell_with_con(
            row.n_of_con,
            row.dc,
            row.s_aec,
        ))?;
        let mad = models::mean_absolute_deviation(&cef, &[row.beta, row.gamma], &set);
        mad_sum += mad;
        println!(
            "  nOfCon={}, Dc={}, sAEC={} :: beta={:.6}, gamma={:.6} (MAD {:.4})",
            row.n_of_con, row.dc, row.s_aec, row.beta, row.gamma, mad
        );
    }

    data::write_cef_table(&out_path, &rows)?;
    println!("\n  {} rows written to {}", rows.len(), out_path.display());
    println!("  CEF {} MAD = {:.6}", system.name(), mad_sum / rows.len() as f64);
    Ok(())
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Err(e) = run(&args) {
        eprintln!("❌ train_cef failed: {e}");
        std::process::exit(1);
    }
}
