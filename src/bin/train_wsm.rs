// SPDX-License-Identifier: AGPL-3.0-only

//! Fit the Weibull survival model per (Dc, sAEC) cell on the low
//! fungal-burden stratum and persist the parameter table.
//!
//! Usage: train_wsm [--system=human|mouse] [--data=PATH] [--out=PATH] [--seed=N]

use sporefit::calibrate::train_wsm;
use sporefit::data::{self, CovariateFilter, DataTable};
use sporefit::error::SporeFitError;
use sporefit::models::{self, WeibullSurvival};
use std::path::PathBuf;

fn run(args: &[String]) -> Result<(), SporeFitError> {
    let system = data::parse_system_from_args(args);
    let data_path = data::parse_cli_string(args, "--data")
        .map_or_else(|| PathBuf::from(system.processed_file_name()), PathBuf::from);
    let out_path = data::parse_cli_string(args, "--out")
        .map_or_else(|| PathBuf::from(format!("WSM_{}.csv", system.name())), PathBuf::from);
    let mut rng = data::rng_from_args(args);

    println!("═══════════════════════════════════════════════════════════");
    println!("  WSM per-cell calibration ({} system, nOfCon = 1)", system.name());
    println!("═══════════════════════════════════════════════════════════\n");

    let table = DataTable::load(&data_path)?;
    println!("  Loaded {} configurations from {}", table.len(), data_path.display());

    let rows = train_wsm(&table, &mut rng)?;

    let wsm = WeibullSurvival;
    let mut mad_sum = 0.0;
    for row in &rows {
        let set =
            table.calibration_set(&CovariateFilter::cell_with_con(1, row.dc, row.s_aec))?;
        let mad = models::mean_absolute_deviation(&wsm, &[row.lambda], &set);
        mad_sum += mad;
        println!(
            "  Dc={}, sAEC={} :: Lambda={:.6} (MAD {:.4})",
            row.dc, row.s_aec, row.lambda, mad
        );
    }

    data::write_wsm_table(&out_path, &rows)?;
    println!("\n  {} rows written to {}", rows.len(), out_path.display());
    println!("  WSM {} MAD = {:.6}", system.name(), mad_sum / rows.len() as f64);
    Ok(())
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Err(e) = run(&args) {
        eprintln!("❌ train_wsm failed: {e}");
        std::process::exit(1);
    }
}
