// SPDX-License-Identifier: AGPL-3.0-only

//! Integration tests: full calibration pipeline from a synthetic table to
//! persisted parameter tables.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use sporefit::calibrate::{
    fit_sim_seed_from_cef, train_cef, train_sim, train_wsm, CalibrationConfig,
};
use sporefit::data::{self, CovariateFilter, DataTable, Sample};
use sporefit::models::{
    self, Covariates, ModelFunction, SurrogateInfectionModel, WeibullSurvival,
};
use sporefit::provenance::SIM_SEED_HUMAN;
use sporefit::tolerances::WSM_FLAT_FIT_MAD;

fn rng() -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(0xca11b)
}

/// Table whose scores come from the stored human SIM seed, small grid.
fn sim_generated_table() -> DataTable {
    let sim = SurrogateInfectionModel;
    let mut samples = Vec::new();
    for &con in &[1u32, 2] {
        for &s in &[1.0, 10.0, 1500.0, 5000.0, 15000.0, 50000.0] {
            for &d in &[20.0, 200.0, 6000.0] {
                for i in 1..=5 {
                    let m = f64::from(i) * 2.0;
                    let c = Covariates::new(m, con, s, d);
                    samples.push(Sample {
                        n_of_m: m,
                        n_of_con: con,
                        s_aec: s,
                        dc: d,
                        inf_score: sim.predict(&c, &SIM_SEED_HUMAN),
                        ci95: 0.01,
                    });
                }
            }
        }
    }
    DataTable::from_samples(samples).expect("no duplicates")
}

#[test]
fn sim_calibration_on_self_generated_scores_stays_near_zero_loss() {
    let table = sim_generated_table();
    let set = table
        .calibration_set(&CovariateFilter::unconstrained())
        .expect("filter");
    // The generating parameters are a perfect fit, so the seed loss is 0
    // and no restart may end above it.
    let config = CalibrationConfig::sim_default().with_trials(1, 2);
    let result = train_sim(&set, &SIM_SEED_HUMAN, config, None, &mut rng()).expect("fit");
    assert!(result.mse <= 1e-20, "mse = {}", result.mse);
    assert!(result.mad.expect("mad reported") < 1e-9);
}

#[test]
fn cef_then_seed_search_then_sim_pipeline_runs_end_to_end() {
    let table = sim_generated_table();
    let mut rng = rng();

    let cef_rows = train_cef(&table, &mut rng).expect("cef");
    // 2 strata × (4 central sAEC × 3 Dc + 2 anchors).
    assert_eq!(cef_rows.len(), 2 * (4 * 3 + 2));
    assert!(cef_rows.iter().all(|r| r.beta.is_finite() && r.gamma.is_finite()));

    let seed = fit_sim_seed_from_cef(&cef_rows, &mut rng).expect("seed search");
    assert_eq!(seed.len(), 14);

    let set = table
        .calibration_set(&CovariateFilter::unconstrained())
        .expect("filter");
    let config = CalibrationConfig::sim_default().with_trials(1, 3);
    let result = train_sim(&set, &seed, config, None, &mut rng).expect("sim fit");

    let sim = SurrogateInfectionModel;
    let seed_mse = models::mean_squared_error(&sim, &seed, &set);
    assert!(result.mse <= seed_mse);
}

#[test]
fn fitted_wsm_table_round_trips_and_predicts_the_flat_score() {
    // Flat 0.5 table with one representative nOfM per cell.
    let mut samples = Vec::new();
    for &s in &[1.0, 10.0, 1500.0, 5000.0, 15000.0, 50000.0] {
        for &d in &[20.0, 6000.0] {
            samples.push(Sample {
                n_of_m: 10.0,
                n_of_con: 1,
                s_aec: s,
                dc: d,
                inf_score: 0.5,
                ci95: 0.01,
            });
        }
    }
    let table = DataTable::from_samples(samples).expect("table");
    let rows = train_wsm(&table, &mut rng()).expect("wsm");

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("WSM_flat.csv");
    data::write_wsm_table(&path, &rows).expect("write");
    let back = data::read_wsm_table(&path).expect("read");
    assert_eq!(back.len(), rows.len());

    let wsm = WeibullSurvival;
    let c = Covariates::new(10.0, 1, 1500.0, 20.0);
    for row in &back {
        let pred = wsm.predict(&c, &[row.lambda]);
        assert!(
            (pred - 0.5).abs() < WSM_FLAT_FIT_MAD,
            "lambda {} predicts {pred}",
            row.lambda
        );
    }
}

#[test]
fn sim_training_writes_a_readable_natural_parameter_table() {
    let table = sim_generated_table();
    let set = table
        .calibration_set(&CovariateFilter::unconstrained())
        .expect("filter");
    let config = CalibrationConfig::sim_default().with_trials(1, 1);
    let result = train_sim(&set, &SIM_SEED_HUMAN, config, None, &mut rng()).expect("fit");

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("SIM_human.csv");
    data::write_sim_parameters(&path, &result.params).expect("write");
    let back = data::read_sim_parameters(&path).expect("read");
    for (a, b) in result.params.iter().zip(&back) {
        assert!((a - b).abs() <= 1e-9 * a.abs().max(1.0));
    }
}
