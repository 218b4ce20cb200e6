// SPDX-License-Identifier: AGPL-3.0-only

//! Validate the model family, codec and calibration loop against their
//! documented analytical properties. Self-contained: runs on synthetic
//! tables, no input files.
//!
//! Usage: validate_models [--seed=N]

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use sporefit::calibrate::{train_wsm, CalibrationConfig, Calibrator};
use sporefit::codec;
use sporefit::crossval::build_folds;
use sporefit::data::{CovariateFilter, DataTable, Sample};
use sporefit::models::{
    self, CompressedExponential, Covariates, GeneralizedBlendFunction, ModelFunction,
    SurrogateInfectionModel, WeibullSurvival,
};
use sporefit::provenance::{SIM_SEED_HUMAN, SIM_SEED_MOUSE};
use sporefit::tolerances;
use sporefit::validation::ValidationHarness;

/// Full-grid flat table: every configuration scores 0.5 with one
/// representative nOfM per cell.
fn flat_table() -> Option<DataTable> {
    let mut samples = Vec::new();
    for &con in &[1u32, 2] {
        for &s in &[1.0, 10.0, 1500.0, 5000.0, 15000.0, 50000.0, 150_000.0, 500_000.0] {
            for &d in &[20.0, 60.0, 200.0, 600.0, 2000.0, 6000.0] {
                samples.push(Sample {
                    n_of_m: 4.0,
                    n_of_con: con,
                    s_aec: s,
                    dc: d,
                    inf_score: 0.5,
                    ci95: 0.01,
                });
            }
        }
    }
    DataTable::from_samples(samples).ok()
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut rng = match sporefit::data::parse_cli_u64(&args, "--seed") {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::seed_from_u64(0x5e5a),
    };

    println!("═══════════════════════════════════════════════════════════");
    println!("  Surrogate model family validation");
    println!("  Closed forms, codec round-trips, calibration, folds");
    println!("═══════════════════════════════════════════════════════════\n");

    let mut harness = ValidationHarness::new("models");

    // ─── Closed-form identities ───────────────────────────────────
    println!("── Closed-form identities ──");
    let wsm = WeibullSurvival;
    let zero_m = Covariates::new(0.0, 3, 1500.0, 20.0);
    harness.check_abs(
        "WSM(nOfM=0) = 1",
        wsm.predict(&zero_m, &[0.7]),
        1.0,
        tolerances::EXACT_F64,
    );

    let cef = CompressedExponential;
    let c = Covariates::new(26.0, 1, 15000.0, 200.0);
    harness.check_abs(
        "CEF(beta=0) = 1",
        cef.predict(&c, &[0.0, 2.3]),
        1.0,
        tolerances::EXACT_F64,
    );

    let gbf = GeneralizedBlendFunction;
    let p = [0.98, -14.71, -5.30, 1.30, 0.06, -1.25, -3.36];
    let mut flipped = p;
    flipped[0] = -flipped[0];
    harness.check_abs(
        "GBF invariant under x1 → −x1",
        gbf.predict(&c, &p),
        gbf.predict(&c, &flipped),
        tolerances::EXACT_F64,
    );
    println!("  ✅ {} identity checks queued", harness.total_count());

    // ─── Codec round-trips on the stored seeds ────────────────────
    println!("\n── Codec round-trips ──");
    for (label, seed) in [("human", &SIM_SEED_HUMAN), ("mouse", &SIM_SEED_MOUSE)] {
        match codec::sim_to_natural_space(seed)
            .and_then(|nat| codec::sim_to_optimizer_space(&nat))
        {
            Ok(back) => {
                let max_rel = seed
                    .iter()
                    .zip(&back)
                    .map(|(a, b)| (a - b).abs() / a.abs().max(1.0))
                    .fold(0.0, f64::max);
                println!("  ✅ {label} seed max relative drift {max_rel:.2e}");
                harness.check_upper(
                    &format!("{label} seed codec round-trip"),
                    max_rel,
                    tolerances::CODEC_ROUND_TRIP_REL,
                );
            }
            Err(e) => {
                println!("  ❌ {label} seed codec failed: {e}");
                harness.check_bool(&format!("{label} seed codec round-trip"), false);
            }
        }
    }

    // ─── Zero-noise calibration never loses to the seed ───────────
    println!("\n── Calibration ──");
    let sim = SurrogateInfectionModel;
    let inputs: Vec<Covariates> = (1..=25)
        .map(|i| Covariates::new(f64::from(i) * 2.0, 1, 15000.0, 200.0))
        .collect();
    let scores: Vec<f64> = inputs
        .iter()
        .map(|c| sim.predict(c, &SIM_SEED_HUMAN) + 0.01)
        .collect();
    let set = sporefit::data::CalibrationSet { scores, inputs };
    let loss = |p: &[f64]| models::mean_squared_error(&sim, p, &set);
    let seed_loss = loss(&SIM_SEED_HUMAN);
    let calibrator = Calibrator::new(CalibrationConfig::cell_default());
    match calibrator.fit(&loss, &SIM_SEED_HUMAN, &mut rng) {
        Ok((_, best)) => {
            println!("  ✅ zero-noise fit: seed MSE {seed_loss:.3e} → {best:.3e}");
            harness.check_bool("zero-noise fit ≤ seed loss", best <= seed_loss);
        }
        Err(e) => {
            println!("  ❌ calibrator failed: {e}");
            harness.check_bool("zero-noise fit ≤ seed loss", false);
        }
    }

    // ─── Fold partitioning ────────────────────────────────────────
    println!("\n── Fold partitioning ──");
    match build_folds(1, 36, 6, &mut rng) {
        Ok(folds) => {
            let mut seen = [false; 36];
            let mut ok = true;
            for fold in 0..6 {
                let cells = folds.test_cells(0, fold);
                ok &= cells.len() == 6;
                for &c in cells {
                    ok &= !seen[c];
                    seen[c] = true;
                }
            }
            ok &= seen.iter().all(|&s| s);
            println!("  ✅ 36 cells → 6 groups of 6, exact partition: {ok}");
            harness.check_bool("6-fold split partitions 36 cells", ok);
        }
        Err(e) => {
            println!("  ❌ build_folds failed: {e}");
            harness.check_bool("6-fold split partitions 36 cells", false);
        }
    }

    // ─── End-to-end WSM on a flat table ───────────────────────────
    println!("\n── End-to-end WSM fit (flat 0.5 table) ──");
    match flat_table() {
        Some(table) => match train_wsm(&table, &mut rng) {
            Ok(rows) => {
                let mut worst = 0.0f64;
                for row in &rows {
                    if let Ok(cell) = table.calibration_set(&CovariateFilter::cell_with_con(
                        1, row.dc, row.s_aec,
                    )) {
                        let mad =
                            models::mean_absolute_deviation(&wsm, &[row.lambda], &cell);
                        worst = worst.max(mad);
                    }
                }
                println!("  ✅ {} cells fitted, worst MAD {worst:.2e}", rows.len());
                harness.check_upper("flat-table WSM worst MAD", worst, tolerances::WSM_FLAT_FIT_MAD);
            }
            Err(e) => {
                println!("  ❌ train_wsm failed: {e}");
                harness.check_bool("flat-table WSM worst MAD", false);
            }
        },
        None => harness.check_bool("flat-table construction", false),
    }

    harness.finish();
}
