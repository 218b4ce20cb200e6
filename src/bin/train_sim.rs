// SPDX-License-Identifier: AGPL-3.0-only

//! Calibrate the 14-parameter surrogate infection model on the full
//! calibration set and persist the natural-space parameters.
//!
//! The seed comes from a fitted CEF table when `--cef=` is given (two
//! blend-function fits over its beta and gamma columns), otherwise from the
//! stored per-system seed.
//!
//! Usage: train_sim [--system=human|mouse] [--data=PATH] [--cef=PATH]
//!                  [--out=PATH] [--outer=N] [--inner=N] [--seed=N]

use sporefit::calibrate::{fit_sim_seed_from_cef, train_sim, CalibrationConfig};
use sporefit::data::{self, CovariateFilter, DataTable};
use sporefit::error::SporeFitError;
use sporefit::models::{self, SurrogateInfectionModel};
use std::path::PathBuf;

fn run(args: &[String]) -> Result<(), SporeFitError> {
    let system = data::parse_system_from_args(args);
    let data_path = data::parse_cli_string(args, "--data")
        .map_or_else(|| PathBuf::from(system.processed_file_name()), PathBuf::from);
    let out_path = data::parse_cli_string(args, "--out")
        .map_or_else(|| PathBuf::from(format!("SIM_{}.csv", system.name())), PathBuf::from);
    let mut rng = data::rng_from_args(args);

    let defaults = CalibrationConfig::sim_default();
    let config = defaults.clone().with_trials(
        data::parse_cli_usize(args, "--outer", defaults.outer_trials),
        data::parse_cli_usize(args, "--inner", defaults.inner_trials),
    );

    println!("═══════════════════════════════════════════════════════════");
    println!("  SIM calibration ({} system)", system.name());
    println!("  {} outer × {} inner noisy restarts, noise σ = {}",
        config.outer_trials, config.inner_trials, config.noise_scale);
    println!("═══════════════════════════════════════════════════════════\n");

    let table = DataTable::load(&data_path)?;
    let set = table.calibration_set(&CovariateFilter::unconstrained())?;
    println!("  Number of datapoints: {}", set.len());

    let seed = match data::parse_cli_string(args, "--cef") {
        Some(cef_path) => {
            let cef_rows = data::read_cef_table(&PathBuf::from(&cef_path))?;
            println!("  Deriving seed from {} CEF rows ({cef_path})", cef_rows.len());
            fit_sim_seed_from_cef(&cef_rows, &mut rng)?
        }
        None => {
            println!("  Using stored {} seed", system.name());
            system.sim_seed().to_vec()
        }
    };

    let sim = SurrogateInfectionModel;
    println!("  LSE from seedpoint: {:.6}", models::mean_squared_error(&sim, &seed, &set));
    println!("  MAD from seedpoint: {:.6}", models::mean_absolute_deviation(&sim, &seed, &set));

    let result = train_sim(&set, &seed, config, None, &mut rng)?;
    println!("\n  Final LSE = {:.6}", result.mse);
    if let Some(mad) = result.mad {
        println!("  SIM {} MAD = {mad:.6}", system.name());
    }

    data::write_sim_parameters(&out_path, &result.params)?;
    println!("  Parameters written to {}", out_path.display());
    Ok(())
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Err(e) = run(&args) {
        eprintln!("❌ train_sim failed: {e}");
        std::process::exit(1);
    }
}
