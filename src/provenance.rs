// SPDX-License-Identifier: AGPL-3.0-only

//! Provenance metadata for calibration seeds and reference values.
//!
//! Every hardcoded seed vector and baseline number traces back to a specific
//! Python control run of the hABM analysis pipeline. This module centralizes
//! that metadata so binaries and tests carry machine-readable provenance.
//!
//! # Provenance chain
//!
//! ```text
//! Python script → command → output → Rust constant
//! ```

/// A single provenance record tying a Rust constant to its Python origin.
#[derive(Debug, Clone)]
pub struct BaselineProvenance {
    /// Human-readable label (e.g. "SIM seed, human system")
    pub label: &'static str,
    /// Python control script that produced the value
    pub script: &'static str,
    /// Date of the control run (ISO 8601)
    pub date: &'static str,
    /// Exact command used to produce the baseline
    pub command: &'static str,
    /// Unit or description of the value
    pub unit: &'static str,
}

/// Column names of the persisted SIM parameter table, natural space.
///
/// Flat 14-vector layout: beta block `b1..b7` (indices 0..7) followed by the
/// gamma block `g1..g7` (indices 7..14). The codec in [`crate::codec`]
/// hard-codes offsets into this layout; keep them in sync.
pub const PARAM_NAMES: [&str; 14] = [
    "b1", "b2", "b3", "b4", "b5", "b6", "b7", "g1", "g2", "g3", "g4", "g5", "g6", "g7",
];

/// Seed point for fitting the beta generalized-blend function to CEF betas.
///
/// From the initial analysis of the generalized functions; logistic offsets
/// already in optimizer space.
pub const GBF_SEED_BETA: [f64; 7] = [1.0, -15.0, -5.0, 1.0, 1.0, -1.0, -1.0];

/// Seed point for fitting the gamma generalized-blend function to CEF gammas.
pub const GBF_SEED_GAMMA: [f64; 7] = [1.0, -5.0, -15.0, 1.0, 1.0, 1.0, 1.0];

/// Stored SIM seed for the human system (optimizer space).
///
/// Optimum of the generalized-blend functions fitted to the human CEF
/// parameter table; used to seed cross-validation fits so every fold starts
/// from the same point.
pub const SIM_SEED_HUMAN: [f64; 14] = [
    0.980_678_88,
    -14.714_567_69,
    -5.300_232_24,
    1.298_432_73,
    0.060_617_95,
    -1.254_415_28,
    -3.355_663_29,
    0.151_038_59,
    -2.041_865_45,
    -10.541_542_65,
    1.015_497_63,
    1.054_369_88,
    1.291_168_51,
    0.546_436_54,
];

/// Stored SIM seed for the mouse system (optimizer space).
pub const SIM_SEED_MOUSE: [f64; 14] = [
    7.468_694_1,
    -12.694_010_84,
    -4.333_777_18,
    1.116_679_74,
    1.322_554_14,
    -0.157_144_25,
    -0.680_522_68,
    0.185_482_05,
    -4.448_376_53,
    -19.605_567_99,
    1.794_738_58,
    1.074_599_42,
    0.926_292_79,
    0.354_375_58,
];

/// Secretion-rate calibration grid (molecules/s).
pub const SAEC_GRID: [f64; 6] = [1_500.0, 5_000.0, 15_000.0, 50_000.0, 150_000.0, 500_000.0];

/// Diffusion-coefficient calibration grid (µm²/min).
pub const DC_GRID: [f64; 6] = [20.0, 60.0, 200.0, 600.0, 2_000.0, 6_000.0];

/// Provenance of the stored SIM seed vectors.
pub const SIM_SEED_PROVENANCE: BaselineProvenance = BaselineProvenance {
    label: "SIM seeds from generalized functions fitted to CEF parameters",
    script: "Analysis_SurrogateInfectionModel/utils.py (retrieve_seed_point_for_SIM)",
    date: "2022-09-14",
    command: "python train_surrogate_infection_model.py  # optimize=True",
    unit: "14 optimizer-space parameters (b1..b7, g1..g7)",
};

/// Provenance of the GBF seed points.
pub const GBF_SEED_PROVENANCE: BaselineProvenance = BaselineProvenance {
    label: "GBF seed points from initial generalized-function analysis",
    script: "Analysis_SurrogateInfectionModel/utils.py",
    date: "2022-09-14",
    command: "python train_surrogate_infection_model.py  # calculate_seeds_from_cef_para=True",
    unit: "7 optimizer-space parameters",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_names_beta_then_gamma() {
        assert_eq!(PARAM_NAMES.len(), 14);
        assert_eq!(PARAM_NAMES[0], "b1");
        assert_eq!(PARAM_NAMES[6], "b7");
        assert_eq!(PARAM_NAMES[7], "g1");
        assert_eq!(PARAM_NAMES[13], "g7");
    }

    #[test]
    fn seeds_all_finite() {
        for p in SIM_SEED_HUMAN.iter().chain(SIM_SEED_MOUSE.iter()) {
            assert!(p.is_finite());
        }
    }

    #[test]
    fn seed_scale_parameters_nonzero() {
        // Codec precondition for both stored seeds: x4 (indices 3, 10) ≠ 0.
        for seed in [&SIM_SEED_HUMAN, &SIM_SEED_MOUSE] {
            assert!(seed[3] != 0.0);
            assert!(seed[10] != 0.0);
        }
    }

    #[test]
    fn grids_ascending() {
        for w in SAEC_GRID.windows(2) {
            assert!(w[0] < w[1]);
        }
        for w in DC_GRID.windows(2) {
            assert!(w[0] < w[1]);
        }
    }

    #[test]
    fn provenance_records_have_content() {
        for p in [&SIM_SEED_PROVENANCE, &GBF_SEED_PROVENANCE] {
            assert!(!p.label.is_empty());
            assert!(!p.script.is_empty());
            assert!(!p.date.is_empty());
            assert!(!p.command.is_empty());
        }
    }
}
