// SPDX-License-Identifier: AGPL-3.0-only

//! Noisy-restart calibration of closed-form models.
//!
//! The loss landscape of the 14-parameter surrogate model has many local
//! minima, so a single local minimization from a fixed seed is not enough.
//! [`Calibrator::fit`] keeps a running best, repeatedly perturbs it with
//! Gaussian noise and re-minimizes each perturbed candidate with
//! Nelder-Mead. A candidate that fails to converge is simply a candidate
//! that did not improve; it never aborts the run.
//!
//! Also hosts the per-cell training drivers (CEF, WSM), the blend-function
//! seed search over a fitted CEF table, and the full SIM training entry
//! point.

use crate::data::{CalibrationSet, CefRow, CovariateFilter, DataTable, WsmRow};
use crate::error::SporeFitError;
use crate::models::{
    self, CompressedExponential, GeneralizedBlendFunction, ModelFunction, SurrogateInfectionModel,
    WeibullSurvival,
};
use crate::optimize::nelder_mead;
use crate::provenance::{GBF_SEED_BETA, GBF_SEED_GAMMA};
use crate::tolerances::{NM_MAX_EVALS_PER_DIM, NM_TOLERANCE};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Knobs of the noisy-restart loop.
#[derive(Debug, Clone)]
pub struct CalibrationConfig {
    /// Outer passes; each re-centers the perturbation on the running best.
    pub outer_trials: usize,
    /// Perturbed candidates per outer pass.
    pub inner_trials: usize,
    /// Standard deviation of the elementwise Gaussian perturbation.
    pub noise_scale: f64,
    /// Nelder-Mead evaluation budget per parameter dimension.
    pub max_evals_per_dim: usize,
    /// Nelder-Mead convergence tolerance.
    pub tolerance: f64,
}

impl CalibrationConfig {
    /// Full 14-parameter surrogate fit: 10 passes of 100 candidates.
    #[must_use]
    pub fn sim_default() -> Self {
        Self {
            outer_trials: 10,
            inner_trials: 100,
            noise_scale: 0.5,
            max_evals_per_dim: NM_MAX_EVALS_PER_DIM,
            tolerance: NM_TOLERANCE,
        }
    }

    /// 7-parameter blend-function seed search: one pass of 50 candidates.
    #[must_use]
    pub fn gbf_seed_default() -> Self {
        Self {
            outer_trials: 1,
            inner_trials: 50,
            noise_scale: 0.1,
            max_evals_per_dim: NM_MAX_EVALS_PER_DIM,
            tolerance: NM_TOLERANCE,
        }
    }

    /// Per-cell CEF/WSM fit: one unperturbed local minimization.
    #[must_use]
    pub fn cell_default() -> Self {
        Self {
            outer_trials: 1,
            inner_trials: 1,
            noise_scale: 0.0,
            max_evals_per_dim: NM_MAX_EVALS_PER_DIM,
            tolerance: NM_TOLERANCE,
        }
    }

    #[must_use]
    pub fn with_trials(mut self, outer: usize, inner: usize) -> Self {
        self.outer_trials = outer;
        self.inner_trials = inner;
        self
    }

    #[must_use]
    pub fn with_noise_scale(mut self, noise: f64) -> Self {
        self.noise_scale = noise;
        self
    }
}

/// Outcome of one model fit: natural-space parameters where the model has
/// a persisted form, plus the optimized and reported losses.
#[derive(Debug, Clone)]
pub struct FitResult {
    /// Model identifier (`CEF`, `WSM`, `GBF`, `SIM`).
    pub model: &'static str,
    /// Fitted parameters.
    pub params: Vec<f64>,
    /// Final mean squared error on the calibration set.
    pub mse: f64,
    /// Mean absolute deviation on the calibration set, reported post-fit.
    pub mad: Option<f64>,
}

/// Noisy-restart global-then-local minimizer.
pub struct Calibrator {
    config: CalibrationConfig,
    cancel: Option<Arc<AtomicBool>>,
}

impl Calibrator {
    #[must_use]
    pub fn new(config: CalibrationConfig) -> Self {
        Self {
            config,
            cancel: None,
        }
    }

    /// Install a cooperative cancellation flag, checked between outer
    /// passes. A cancelled fit returns the best result found so far.
    #[must_use]
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|f| f.load(Ordering::Relaxed))
    }

    /// Minimize `loss` starting from `seed`.
    ///
    /// The running best is initialized from the seed evaluation, so the
    /// returned loss is never above `loss(seed)`.
    ///
    /// # Errors
    ///
    /// [`SporeFitError::Domain`] if `noise_scale` is negative or non-finite.
    pub fn fit(
        &self,
        loss: &dyn Fn(&[f64]) -> f64,
        seed: &[f64],
        rng: &mut impl Rng,
    ) -> Result<(Vec<f64>, f64), SporeFitError> {
        // Normal::new accepts any std_dev, so reject bad scales up front.
        if !self.config.noise_scale.is_finite() || self.config.noise_scale < 0.0 {
            return Err(SporeFitError::Domain(format!(
                "invalid noise scale {}",
                self.config.noise_scale
            )));
        }
        let noise = Normal::new(0.0, self.config.noise_scale).map_err(|e| {
            SporeFitError::Domain(format!(
                "invalid noise scale {}: {e}",
                self.config.noise_scale
            ))
        })?;
        let max_evals = self.config.max_evals_per_dim * seed.len();

        let mut best_params = seed.to_vec();
        let mut best_loss = loss(seed);

        for _ in 0..self.config.outer_trials {
            if self.cancelled() {
                break;
            }
            let center = best_params.clone();
            for _ in 0..self.config.inner_trials {
                let candidate: Vec<f64> =
                    center.iter().map(|&c| c + noise.sample(rng)).collect();
                let local = nelder_mead(loss, &candidate, max_evals, self.config.tolerance);
                if local.value < best_loss {
                    best_loss = local.value;
                    best_params = local.params;
                }
            }
        }
        Ok((best_params, best_loss))
    }
}

fn fit_cell(
    model: &dyn ModelFunction,
    set: &CalibrationSet,
    seed: &[f64],
    rng: &mut impl Rng,
) -> Result<Vec<f64>, SporeFitError> {
    let calibrator = Calibrator::new(CalibrationConfig::cell_default());
    let loss = |p: &[f64]| models::mean_squared_error(model, p, set);
    let (params, _) = calibrator.fit(&loss, seed, rng)?;
    Ok(params)
}

/// Fit the compressed exponential per (nOfCon, Dc, sAEC) cell, main grid
/// then quasi-random-walk anchor cells, each from seed (β, γ) = (1, 1).
///
/// # Errors
///
/// Propagates table ([`SporeFitError::MissingSample`], `Format`) and
/// calibration errors.
pub fn train_cef(
    table: &DataTable,
    rng: &mut impl Rng,
) -> Result<Vec<CefRow>, SporeFitError> {
    let cef = CompressedExponential;
    let mut rows = Vec::new();
    let mut fit_one = |con: u32, dc: f64, s_aec: f64, rng: &mut _| -> Result<(), SporeFitError> {
        let set = table.calibration_set(&CovariateFilter::cell_with_con(con, dc, s_aec))?;
        let p = fit_cell(&cef, &set, &[1.0, 1.0], rng)?;
        rows.push(CefRow {
            n_of_con: con,
            dc,
            s_aec,
            beta: p[0],
            gamma: p[1],
        });
        Ok(())
    };

    for &con in &table.distinct_n_of_con() {
        for &dc in &table.distinct_dc() {
            for &s_aec in &table.central_s_aec_range()? {
                fit_one(con, dc, s_aec, rng)?;
            }
        }
    }
    for &con in &table.distinct_n_of_con() {
        for &s_aec in &crate::data::QRW_SAEC {
            fit_one(con, crate::data::QRW_DC, s_aec, rng)?;
        }
    }
    Ok(rows)
}

/// Fit the Weibull survival model per (Dc, sAEC) cell on the nOfCon = 1
/// stratum, from seed λ = 1.
///
/// # Errors
///
/// Propagates table and calibration errors.
pub fn train_wsm(
    table: &DataTable,
    rng: &mut impl Rng,
) -> Result<Vec<WsmRow>, SporeFitError> {
    let wsm = WeibullSurvival;
    let mut rows = Vec::new();
    let mut fit_one = |dc: f64, s_aec: f64, rng: &mut _| -> Result<(), SporeFitError> {
        let set = table.calibration_set(&CovariateFilter::cell_with_con(1, dc, s_aec))?;
        let p = fit_cell(&wsm, &set, &[1.0], rng)?;
        rows.push(WsmRow {
            dc,
            s_aec,
            lambda: p[0],
        });
        Ok(())
    };

    for &dc in &table.distinct_dc() {
        for &s_aec in &table.central_s_aec_range()? {
            fit_one(dc, s_aec, rng)?;
        }
    }
    for &s_aec in &crate::data::QRW_SAEC {
        fit_one(crate::data::QRW_DC, s_aec, rng)?;
    }
    Ok(rows)
}

/// Derive an optimizer-space 14-parameter SIM seed by fitting one blend
/// function to the CEF β column and one to the γ column.
///
/// # Errors
///
/// [`SporeFitError::Format`] on an empty CEF table; propagates
/// calibration errors.
pub fn fit_sim_seed_from_cef(
    cef_rows: &[CefRow],
    rng: &mut impl Rng,
) -> Result<Vec<f64>, SporeFitError> {
    if cef_rows.is_empty() {
        return Err(SporeFitError::Format(
            "CEF table is empty, no seed can be derived".into(),
        ));
    }
    let inputs: Vec<crate::models::Covariates> = cef_rows
        .iter()
        .map(|r| crate::models::Covariates::new(0.0, r.n_of_con, r.s_aec, r.dc))
        .collect();
    let betas: Vec<f64> = cef_rows.iter().map(|r| r.beta).collect();
    let gammas: Vec<f64> = cef_rows.iter().map(|r| r.gamma).collect();

    let gbf = GeneralizedBlendFunction;
    let calibrator = Calibrator::new(CalibrationConfig::gbf_seed_default());

    let beta_set = CalibrationSet {
        scores: betas,
        inputs: inputs.clone(),
    };
    let beta_loss = |p: &[f64]| models::mean_squared_error(&gbf, p, &beta_set);
    let (beta_opt, _) = calibrator.fit(&beta_loss, &GBF_SEED_BETA, rng)?;

    let gamma_set = CalibrationSet {
        scores: gammas,
        inputs,
    };
    let gamma_loss = |p: &[f64]| models::mean_squared_error(&gbf, p, &gamma_set);
    let (gamma_opt, _) = calibrator.fit(&gamma_loss, &GBF_SEED_GAMMA, rng)?;

    Ok([beta_opt, gamma_opt].concat())
}

/// Fit the surrogate infection model on a calibration set from an
/// optimizer-space seed. Returns optimizer-space parameters with the final
/// MSE and reported MAD.
///
/// # Errors
///
/// Propagates calibration errors.
pub fn train_sim(
    set: &CalibrationSet,
    seed: &[f64],
    config: CalibrationConfig,
    cancel: Option<Arc<AtomicBool>>,
    rng: &mut impl Rng,
) -> Result<FitResult, SporeFitError> {
    let sim = SurrogateInfectionModel;
    let mut calibrator = Calibrator::new(config);
    if let Some(flag) = cancel {
        calibrator = calibrator.with_cancel_flag(flag);
    }
    let loss = |p: &[f64]| models::mean_squared_error(&sim, p, set);
    let (params, mse) = calibrator.fit(&loss, seed, rng)?;
    let mad = models::mean_absolute_deviation(&sim, &params, set);
    Ok(FitResult {
        model: sim.name(),
        params,
        mse,
        mad: Some(mad),
    })
}
