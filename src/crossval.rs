// SPDX-License-Identifier: AGPL-3.0-only

//! Stratified k-fold cross-validation comparing three model families.
//!
//! The calibration set is strictly ordered (stratum → cell → nOfM, see
//! `data`), so fold membership is decided at the cell level: a cell's whole
//! nOfM column goes to either train or test, never split. One
//! [`FoldAssignment`] is built per repeat and reused for the surrogate, the
//! feed-forward network and the random forest, so all three see
//! byte-identical partitions of fold i.
//!
//! The stratum stride is taken from the actual per-stratum cell count of
//! the loaded table (anchor cells included), so tables with different grid
//! sizes partition correctly.

use crate::calibrate::CalibrationConfig;
use crate::data::{CalibrationSet, DataTable, HostSystem};
use crate::error::SporeFitError;
use crate::regress::{
    FeedForwardRegressor, GenericRegressor, RandomForestRegressor, SurrogateRegressor,
    FOREST_TREES, MLP_EPOCHS,
};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use std::path::Path;

/// Per-repeat test-group membership: `groups[stratum][fold]` holds the cell
/// indices whose samples are the test set of that fold.
#[derive(Debug, Clone)]
pub struct FoldAssignment {
    groups: Vec<Vec<Vec<usize>>>,
    k: usize,
    cells_per_stratum: usize,
}

impl FoldAssignment {
    /// Number of folds.
    #[must_use]
    pub fn k(&self) -> usize {
        self.k
    }

    /// Test-cell indices of one stratum and fold.
    #[must_use]
    pub fn test_cells(&self, stratum: usize, fold: usize) -> &[usize] {
        &self.groups[stratum][fold]
    }
}

/// Shuffle each stratum's cell indices and split them into `k` nearly-equal
/// contiguous groups (the first `cells mod k` groups take the extra
/// element).
///
/// # Errors
///
/// [`SporeFitError::Domain`] if `k` is zero or exceeds the cell count.
pub fn build_folds(
    n_strata: usize,
    cells_per_stratum: usize,
    k: usize,
    rng: &mut impl Rng,
) -> Result<FoldAssignment, SporeFitError> {
    if k == 0 || k > cells_per_stratum {
        return Err(SporeFitError::Domain(format!(
            "cannot split {cells_per_stratum} cells into {k} folds"
        )));
    }
    let mut groups = Vec::with_capacity(n_strata);
    for _ in 0..n_strata {
        let mut cells: Vec<usize> = (0..cells_per_stratum).collect();
        cells.shuffle(rng);
        let base = cells_per_stratum / k;
        let extra = cells_per_stratum % k;
        let mut folds = Vec::with_capacity(k);
        let mut offset = 0;
        for fold in 0..k {
            let size = base + usize::from(fold < extra);
            folds.push(cells[offset..offset + size].to_vec());
            offset += size;
        }
        groups.push(folds);
    }
    Ok(FoldAssignment {
        groups,
        k,
        cells_per_stratum,
    })
}

/// Split an ordered calibration set into the train and test sides of one
/// fold. Order within each side preserves the stratum/cell/nOfM nesting.
///
/// # Errors
///
/// [`SporeFitError::Domain`] if the set length is not
/// `strata × cells × len_n_of_m` for this assignment.
pub fn split_fold(
    set: &CalibrationSet,
    folds: &FoldAssignment,
    fold: usize,
    len_n_of_m: usize,
) -> Result<(CalibrationSet, CalibrationSet), SporeFitError> {
    let n_strata = folds.groups.len();
    let cells = folds.cells_per_stratum;
    if set.len() != n_strata * cells * len_n_of_m {
        return Err(SporeFitError::Domain(format!(
            "calibration set of {} samples does not tile {n_strata} strata × {cells} cells × {len_n_of_m} nOfM",
            set.len()
        )));
    }
    let mut train = CalibrationSet::default();
    let mut test = CalibrationSet::default();
    for stratum in 0..n_strata {
        let test_cells = &folds.groups[stratum][fold];
        for cell in 0..cells {
            let side = if test_cells.contains(&cell) {
                &mut test
            } else {
                &mut train
            };
            let base = stratum * cells * len_n_of_m + cell * len_n_of_m;
            for i in base..base + len_n_of_m {
                side.scores.push(set.scores[i]);
                side.inputs.push(set.inputs[i]);
            }
        }
    }
    Ok((train, test))
}

/// One report row: a train or test MAD for one model, fold and repeat.
#[derive(Debug, Clone, Serialize)]
pub struct CvRecord {
    /// The recorded loss value.
    pub loss: f64,
    /// Fold index within the repeat.
    pub set: usize,
    /// Repeat index.
    pub run: usize,
    /// `"train"` or `"test"`.
    pub traintest: &'static str,
    /// `"Surr"`, `"DNN"` or `"RF"`.
    pub model: &'static str,
    /// Loss metric, always `"mad"`.
    pub loss_type: &'static str,
}

/// Knobs of a cross-validation run.
#[derive(Debug, Clone)]
pub struct CrossValidationConfig {
    /// Folds per repeat.
    pub k: usize,
    /// Independent repeats, each with fresh folds.
    pub repeats: usize,
    /// Surrogate calibration settings per fold.
    pub sim_config: CalibrationConfig,
    /// Network epoch budget per fold.
    pub mlp_epochs: usize,
    /// Forest size per fold.
    pub forest_trees: usize,
}

impl Default for CrossValidationConfig {
    /// The production protocol: 5 repeats of 6-fold validation.
    fn default() -> Self {
        Self {
            k: 6,
            repeats: 5,
            sim_config: CalibrationConfig::sim_default(),
            mlp_epochs: MLP_EPOCHS,
            forest_trees: FOREST_TREES,
        }
    }
}

impl CrossValidationConfig {
    #[must_use]
    pub fn with_folds(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    #[must_use]
    pub fn with_repeats(mut self, repeats: usize) -> Self {
        self.repeats = repeats;
        self
    }

    #[must_use]
    pub fn with_sim_config(mut self, config: CalibrationConfig) -> Self {
        self.sim_config = config;
        self
    }

    #[must_use]
    pub fn with_mlp_epochs(mut self, epochs: usize) -> Self {
        self.mlp_epochs = epochs;
        self
    }

    #[must_use]
    pub fn with_forest_trees(mut self, trees: usize) -> Self {
        self.forest_trees = trees;
        self
    }
}

fn record_fold(
    records: &mut Vec<CvRecord>,
    regressor: &mut dyn GenericRegressor,
    train: &CalibrationSet,
    test: &CalibrationSet,
    fold: usize,
    run: usize,
) -> Result<(), SporeFitError> {
    regressor.fit(train)?;
    records.push(CvRecord {
        loss: regressor.mad(train),
        set: fold,
        run,
        traintest: "train",
        model: regressor.name(),
        loss_type: "mad",
    });
    records.push(CvRecord {
        loss: regressor.mad(test),
        set: fold,
        run,
        traintest: "test",
        model: regressor.name(),
        loss_type: "mad",
    });
    Ok(())
}

/// Run the full cross-validation protocol on one host system's table.
///
/// Per repeat: build folds once, then fit the surrogate on every fold,
/// the network on every fold, the forest on every fold, always from the
/// same splits. Regressor seeds derive from the injected generator, so a
/// seeded run is fully reproducible.
///
/// # Errors
///
/// Propagates table, fold and fitting errors.
pub fn run_cross_validation(
    table: &DataTable,
    system: HostSystem,
    config: &CrossValidationConfig,
    rng: &mut impl Rng,
) -> Result<Vec<CvRecord>, SporeFitError> {
    let set = table.calibration_set(&crate::data::CovariateFilter::unconstrained())?;
    let n_strata = table.distinct_n_of_con().len();
    let len_n_of_m = table.distinct_n_of_m().len();
    let cells = table.cells_per_stratum()?;
    let sim_seed = system.sim_seed().to_vec();

    let mut records = Vec::new();
    for run in 0..config.repeats {
        println!(
            "#### {} #### Run {} / {}",
            system.name(),
            run + 1,
            config.repeats
        );
        let folds = build_folds(n_strata, cells, config.k, rng)?;
        let splits: Vec<(CalibrationSet, CalibrationSet)> = (0..config.k)
            .map(|fold| split_fold(&set, &folds, fold, len_n_of_m))
            .collect::<Result<_, _>>()?;

        println!("Train SIM");
        for (fold, (train, test)) in splits.iter().enumerate() {
            let mut surr = SurrogateRegressor::new(
                sim_seed.clone(),
                config.sim_config.clone(),
                rng.gen(),
            );
            record_fold(&mut records, &mut surr, train, test, fold, run)?;
        }

        println!("Train MLP");
        for (fold, (train, test)) in splits.iter().enumerate() {
            let mut net = FeedForwardRegressor::with_epochs(rng.gen(), config.mlp_epochs);
            record_fold(&mut records, &mut net, train, test, fold, run)?;
        }

        println!("Train RDF");
        for (fold, (train, test)) in splits.iter().enumerate() {
            let mut forest = RandomForestRegressor::with_trees(rng.gen(), config.forest_trees);
            record_fold(&mut records, &mut forest, train, test, fold, run)?;
        }
    }
    Ok(records)
}

/// Write the report rows as a delimited-text table.
///
/// # Errors
///
/// [`SporeFitError::DataLoad`] if the file cannot be written.
pub fn write_cv_report(path: &Path, records: &[CvRecord]) -> Result<(), SporeFitError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| SporeFitError::DataLoad(format!("{}: {e}", path.display())))?;
    for record in records {
        writer
            .serialize(record)
            .map_err(|e| SporeFitError::DataLoad(format!("{}: {e}", path.display())))?;
    }
    writer
        .flush()
        .map_err(|e| SporeFitError::DataLoad(format!("{}: {e}", path.display())))
}

/// Mean test MAD per model over all folds and repeats.
#[must_use]
pub fn mean_test_mad(records: &[CvRecord]) -> Vec<(&'static str, f64)> {
    ["Surr", "DNN", "RF"]
        .iter()
        .filter_map(|&model| {
            let losses: Vec<f64> = records
                .iter()
                .filter(|r| r.model == model && r.traintest == "test")
                .map(|r| r.loss)
                .collect();
            if losses.is_empty() {
                None
            } else {
                Some((model, losses.iter().sum::<f64>() / losses.len() as f64))
            }
        })
        .collect()
}

/// Write a JSON summary of a run next to the row-level report.
///
/// # Errors
///
/// [`SporeFitError::DataLoad`] on serialization or write failure.
pub fn save_cv_summary_json(
    path: &Path,
    system: HostSystem,
    config: &CrossValidationConfig,
    records: &[CvRecord],
) -> Result<(), SporeFitError> {
    let means: Vec<serde_json::Value> = mean_test_mad(records)
        .into_iter()
        .map(|(model, mad)| serde_json::json!({ "model": model, "mean_test_mad": mad }))
        .collect();
    let summary = serde_json::json!({
        "system": system.name(),
        "folds": config.k,
        "repeats": config.repeats,
        "records": records.len(),
        "mean_test_mad": means,
    });
    let json = serde_json::to_string_pretty(&summary)
        .map_err(|e| SporeFitError::DataLoad(format!("JSON serialize: {e}")))?;
    std::fs::write(path, json)
        .map_err(|e| SporeFitError::DataLoad(format!("write {}: {e}", path.display())))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::models::Covariates;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(0xf01d)
    }

    #[test]
    fn six_fold_split_of_36_cells_partitions_exactly() {
        let folds = build_folds(1, 36, 6, &mut rng()).unwrap();
        let mut seen = vec![false; 36];
        for fold in 0..6 {
            let cells = folds.test_cells(0, fold);
            assert_eq!(cells.len(), 6);
            for &c in cells {
                assert!(!seen[c], "cell {c} in two folds");
                seen[c] = true;
            }
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn uneven_split_sizes_differ_by_at_most_one() {
        let folds = build_folds(2, 38, 6, &mut rng()).unwrap();
        for stratum in 0..2 {
            let sizes: Vec<usize> = (0..6).map(|f| folds.test_cells(stratum, f).len()).collect();
            // 38 = 6*6 + 2: the first two folds take 7.
            assert_eq!(sizes, vec![7, 7, 6, 6, 6, 6]);
            let total: usize = sizes.iter().sum();
            assert_eq!(total, 38);
        }
    }

    #[test]
    fn zero_or_oversized_k_is_a_domain_error() {
        assert!(matches!(
            build_folds(1, 10, 0, &mut rng()),
            Err(SporeFitError::Domain(_))
        ));
        assert!(matches!(
            build_folds(1, 10, 11, &mut rng()),
            Err(SporeFitError::Domain(_))
        ));
    }

    /// Synthetic ordered set: 2 strata × 4 cells × 3 nOfM, score encodes
    /// its own flat index so routing can be checked exactly.
    fn indexed_set() -> CalibrationSet {
        let mut set = CalibrationSet::default();
        for i in 0..(2 * 4 * 3) {
            set.scores.push(i as f64);
            set.inputs.push(Covariates::new(i as f64, 1, 1500.0, 20.0));
        }
        set
    }

    #[test]
    fn split_fold_routes_whole_cells() {
        let set = indexed_set();
        let folds = build_folds(2, 4, 2, &mut rng()).unwrap();
        let (train, test) = split_fold(&set, &folds, 0, 3).unwrap();
        assert_eq!(train.len() + test.len(), set.len());
        // Each cell contributes all 3 nOfM samples to one side.
        for side in [&train, &test] {
            assert_eq!(side.len() % 3, 0);
            for chunk in side.scores.chunks(3) {
                assert_eq!(chunk[1], chunk[0] + 1.0);
                assert_eq!(chunk[2], chunk[0] + 2.0);
            }
        }
        // Order within each side is strictly ascending (nesting preserved).
        for side in [&train, &test] {
            assert!(side.scores.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn folds_are_disjoint_and_exhaustive_over_samples() {
        let set = indexed_set();
        let folds = build_folds(2, 4, 2, &mut rng()).unwrap();
        let mut seen = vec![0usize; set.len()];
        for fold in 0..2 {
            let (_, test) = split_fold(&set, &folds, fold, 3).unwrap();
            for &s in &test.scores {
                seen[s as usize] += 1;
            }
        }
        assert!(seen.iter().all(|&c| c == 1));
    }

    #[test]
    fn mismatched_set_length_is_a_domain_error() {
        let mut set = indexed_set();
        set.scores.pop();
        set.inputs.pop();
        let folds = build_folds(2, 4, 2, &mut rng()).unwrap();
        assert!(matches!(
            split_fold(&set, &folds, 0, 3),
            Err(SporeFitError::Domain(_))
        ));
    }

    fn tiny_table() -> DataTable {
        let mut samples = Vec::new();
        for &con in &[1u32, 2] {
            for &s in &[1.0, 10.0, 1500.0, 5000.0, 15000.0] {
                for &d in &[20.0, 6000.0] {
                    for &m in &[2.0, 4.0, 6.0] {
                        // Smooth decreasing surface.
                        let score = (-0.05 * m * f64::from(con)).exp();
                        samples.push(crate::data::Sample {
                            n_of_m: m,
                            n_of_con: con,
                            s_aec: s,
                            dc: d,
                            inf_score: score,
                            ci95: 0.01,
                        });
                    }
                }
            }
        }
        DataTable::from_samples(samples).unwrap()
    }

    #[test]
    fn run_produces_a_complete_record_grid() {
        let table = tiny_table();
        // 3 central sAEC × 2 Dc + 2 anchors = 8 cells per stratum.
        let config = CrossValidationConfig::default()
            .with_folds(2)
            .with_repeats(2)
            .with_sim_config(CalibrationConfig::cell_default())
            .with_mlp_epochs(20)
            .with_forest_trees(5);
        let records =
            run_cross_validation(&table, HostSystem::Human, &config, &mut rng()).unwrap();
        // repeats × models × folds × {train, test}.
        assert_eq!(records.len(), 2 * 3 * 2 * 2);
        for model in ["Surr", "DNN", "RF"] {
            let n = records.iter().filter(|r| r.model == model).count();
            assert_eq!(n, 8, "{model}");
        }
        assert!(records.iter().all(|r| r.loss_type == "mad"));
        assert!(records.iter().all(|r| r.loss.is_finite() && r.loss >= 0.0));
        let summary = mean_test_mad(&records);
        assert_eq!(summary.len(), 3);
    }

    #[test]
    fn seeded_runs_share_fold_membership() {
        let a = build_folds(2, 8, 4, &mut rng()).unwrap();
        let b = build_folds(2, 8, 4, &mut rng()).unwrap();
        for stratum in 0..2 {
            for fold in 0..4 {
                assert_eq!(a.test_cells(stratum, fold), b.test_cells(stratum, fold));
            }
        }
    }

    #[test]
    fn report_files_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("cv_human.csv");
        let records = vec![
            CvRecord {
                loss: 0.031,
                set: 0,
                run: 0,
                traintest: "train",
                model: "Surr",
                loss_type: "mad",
            },
            CvRecord {
                loss: 0.044,
                set: 0,
                run: 0,
                traintest: "test",
                model: "Surr",
                loss_type: "mad",
            },
        ];
        write_cv_report(&csv_path, &records).unwrap();
        let text = std::fs::read_to_string(&csv_path).unwrap();
        assert!(text.starts_with("loss,set,run,traintest,model,loss_type"));
        assert!(text.contains("0.044,0,0,test,Surr,mad"));

        let json_path = dir.path().join("cv_human.json");
        save_cv_summary_json(
            &json_path,
            HostSystem::Human,
            &CrossValidationConfig::default(),
            &records,
        )
        .unwrap();
        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(parsed["system"], "human");
        assert_eq!(parsed["records"], 2);
    }
}
