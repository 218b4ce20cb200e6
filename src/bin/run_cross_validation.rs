// SPDX-License-Identifier: AGPL-3.0-only

//! Repeated stratified k-fold cross-validation of the calibrated surrogate
//! against the feed-forward network and the random forest.
//!
//! Usage: run_cross_validation [--system=human|mouse] [--data=PATH]
//!            [--folds=K] [--repeats=N] [--outer=N] [--inner=N]
//!            [--epochs=N] [--trees=N] [--out=PATH] [--json=PATH] [--seed=N]

use sporefit::calibrate::CalibrationConfig;
use sporefit::crossval::{
    mean_test_mad, run_cross_validation, save_cv_summary_json, write_cv_report,
    CrossValidationConfig,
};
use sporefit::data::{self, DataTable};
use sporefit::error::SporeFitError;
use std::path::PathBuf;

fn run(args: &[String]) -> Result<(), SporeFitError> {
    let system = data::parse_system_from_args(args);
    let data_path = data::parse_cli_string(args, "--data")
        .map_or_else(|| PathBuf::from(system.processed_file_name()), PathBuf::from);
    let report_path = data::parse_cli_string(args, "--out")
        .map_or_else(|| PathBuf::from(format!("cv_{}.csv", system.name())), PathBuf::from);
    let json_path = data::parse_cli_string(args, "--json")
        .map_or_else(|| PathBuf::from(format!("cv_{}.json", system.name())), PathBuf::from);
    let mut rng = data::rng_from_args(args);

    let sim_defaults = CalibrationConfig::sim_default();
    let sim_config = sim_defaults.clone().with_trials(
        data::parse_cli_usize(args, "--outer", sim_defaults.outer_trials),
        data::parse_cli_usize(args, "--inner", sim_defaults.inner_trials),
    );
    let defaults = CrossValidationConfig::default();
    let config = CrossValidationConfig::default()
        .with_folds(data::parse_cli_usize(args, "--folds", defaults.k))
        .with_repeats(data::parse_cli_usize(args, "--repeats", defaults.repeats))
        .with_sim_config(sim_config)
        .with_mlp_epochs(data::parse_cli_usize(args, "--epochs", defaults.mlp_epochs))
        .with_forest_trees(data::parse_cli_usize(args, "--trees", defaults.forest_trees));

    println!("═══════════════════════════════════════════════════════════");
    println!("  Cross-validation ({} system)", system.name());
    println!("  {} repeats × {}-fold, models: Surr / DNN / RF", config.repeats, config.k);
    println!("═══════════════════════════════════════════════════════════\n");

    let table = DataTable::load(&data_path)?;
    println!("  Loaded {} configurations from {}\n", table.len(), data_path.display());

    let records = run_cross_validation(&table, system, &config, &mut rng)?;

    println!("\n── Mean test MAD over {} records ──", records.len());
    for (model, mad) in mean_test_mad(&records) {
        println!("  {model:<4} {mad:.6}");
    }

    write_cv_report(&report_path, &records)?;
    println!("\n  Report written to {}", report_path.display());
    save_cv_summary_json(&json_path, system, &config, &records)?;
    println!("  Summary written to {}", json_path.display());
    Ok(())
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Err(e) = run(&args) {
        eprintln!("❌ run_cross_validation failed: {e}");
        std::process::exit(1);
    }
}
