// SPDX-License-Identifier: AGPL-3.0-only

//! Closed-form infection-score models.
//!
//! Four stateless functions mapping covariates + parameters to a predicted
//! infection score in (conceptually) [0, 1]:
//!
//! - [`CompressedExponential`]: exp(−β·nOfM^γ), 2 parameters, fit per cell.
//! - [`WeibullSurvival`]: 1 − (1 − exp(−λ·nOfM))^nOfCon, 1 parameter.
//! - [`GeneralizedBlendFunction`]: difference of two logistic curves in
//!   ln(sAEC/Dc), 7 parameters, models how β or γ varies across cells.
//! - [`SurrogateInfectionModel`]: exp(−f_β·nOfM^f_γ) with both exponent
//!   factors supplied by blend functions, 14 parameters. The primary
//!   calibration target.
//!
//! The blend function evaluates in optimizer space (see `codec`): its x2, x3
//! slots hold x4·ln(x2), x4·ln(x3) so the ill-conditioned (sAEC/Dc)^x4 never
//! appears directly. Loss is always mean squared error; mean absolute
//! deviation is reported after fitting but never optimized.

use crate::data::CalibrationSet;

/// The four covariates of one configuration, model-input form.
///
/// nOfCon is carried as `f64` because the blend function raises it to
/// fractional powers; the integral identity lives in `data::Sample`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Covariates {
    /// Effector cell count.
    pub n_of_m: f64,
    /// Pathogen particle count.
    pub n_of_con: f64,
    /// Secretion rate.
    pub s_aec: f64,
    /// Diffusion coefficient.
    pub dc: f64,
}

impl Covariates {
    /// Construct from the table's native types.
    #[must_use]
    pub fn new(n_of_m: f64, n_of_con: u32, s_aec: f64, dc: f64) -> Self {
        Self {
            n_of_m,
            n_of_con: f64::from(n_of_con),
            s_aec,
            dc,
        }
    }

    /// ln(sAEC/Dc), the single spatial feature the blend function (and the
    /// learned regressors) see.
    #[must_use]
    pub fn ln_ratio(&self) -> f64 {
        (self.s_aec / self.dc).ln()
    }
}

/// A stateless closed-form model evaluated elementwise over samples.
pub trait ModelFunction {
    /// Short identifier used in reports and file names.
    fn name(&self) -> &'static str;

    /// Length of the parameter vector this model expects.
    fn n_params(&self) -> usize;

    /// Predicted infection score for one configuration.
    fn predict(&self, c: &Covariates, params: &[f64]) -> f64;
}

/// exp(−β·nOfM^γ). Parameters `[beta, gamma]`.
///
/// Ignores sAEC, Dc and nOfCon directly; they enter through which table
/// cell the parameters were fit on.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompressedExponential;

impl ModelFunction for CompressedExponential {
    fn name(&self) -> &'static str {
        "CEF"
    }

    fn n_params(&self) -> usize {
        2
    }

    fn predict(&self, c: &Covariates, params: &[f64]) -> f64 {
        (-params[0] * c.n_of_m.powf(params[1])).exp()
    }
}

/// 1 − (1 − exp(−λ·nOfM))^nOfCon. Parameter `[lambda]`.
///
/// Each of the nOfCon pathogens must be cleared independently; λ is the
/// per-effector clearance rate of one pathogen.
#[derive(Debug, Clone, Copy, Default)]
pub struct WeibullSurvival;

impl ModelFunction for WeibullSurvival {
    fn name(&self) -> &'static str {
        "WSM"
    }

    fn n_params(&self) -> usize {
        1
    }

    fn predict(&self, c: &Covariates, params: &[f64]) -> f64 {
        1.0 - (1.0 - (-params[0] * c.n_of_m).exp()).powf(c.n_of_con)
    }
}

/// Blend-function core shared by the standalone GBF and the SIM exponent.
///
/// Optimizer-space parameters `x`: x1·[σ(−(x4·r+x2)) − σ(−(x4·r+x3))]·
/// nOfCon^x6 + x5·nOfCon^x7 with r = ln(sAEC/Dc). x1 and x4 are forced
/// non-negative through sqrt(x²).
fn blend(c: &Covariates, x: &[f64]) -> f64 {
    let r = c.ln_ratio();
    let x1 = (x[0] * x[0]).sqrt();
    let x4 = (x[3] * x[3]).sqrt();
    let logistic = sigmoid(-(x4 * r + x[1])) - sigmoid(-(x4 * r + x[2]));
    x1 * logistic * c.n_of_con.powf(x[5]) + x[4] * c.n_of_con.powf(x[6])
}

fn sigmoid(t: f64) -> f64 {
    1.0 / (1.0 + (-t).exp())
}

/// Standalone blend function, used to fit β and γ surfaces over the CEF
/// parameter table. The "score" it predicts is a CEF parameter value, not
/// an infection probability; it still plugs into the shared MSE loss.
///
/// Parameters are 7-wide, optimizer space.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeneralizedBlendFunction;

impl ModelFunction for GeneralizedBlendFunction {
    fn name(&self) -> &'static str {
        "GBF"
    }

    fn n_params(&self) -> usize {
        7
    }

    fn predict(&self, c: &Covariates, params: &[f64]) -> f64 {
        blend(c, params)
    }
}

/// exp(−f_β(nOfCon,sAEC,Dc)·nOfM^f_γ(nOfCon,sAEC,Dc)).
///
/// Parameters are 14-wide, optimizer space: β block `[0..7]`, γ block
/// `[7..14]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SurrogateInfectionModel;

impl ModelFunction for SurrogateInfectionModel {
    fn name(&self) -> &'static str {
        "SIM"
    }

    fn n_params(&self) -> usize {
        14
    }

    fn predict(&self, c: &Covariates, params: &[f64]) -> f64 {
        let f_beta = blend(c, &params[..7]);
        let f_gamma = blend(c, &params[7..]);
        (-f_beta * c.n_of_m.powf(f_gamma)).exp()
    }
}

/// Mean squared error of a model over a calibration set. The quantity
/// every fit minimizes.
#[must_use]
pub fn mean_squared_error(model: &dyn ModelFunction, params: &[f64], set: &CalibrationSet) -> f64 {
    if set.is_empty() {
        return 0.0;
    }
    let sum: f64 = set
        .inputs
        .iter()
        .zip(&set.scores)
        .map(|(c, &y)| {
            let e = y - model.predict(c, params);
            e * e
        })
        .sum();
    sum / set.len() as f64
}

/// Mean absolute deviation of a model over a calibration set. Reported,
/// never optimized.
#[must_use]
pub fn mean_absolute_deviation(
    model: &dyn ModelFunction,
    params: &[f64],
    set: &CalibrationSet,
) -> f64 {
    if set.is_empty() {
        return 0.0;
    }
    let sum: f64 = set
        .inputs
        .iter()
        .zip(&set.scores)
        .map(|(c, &y)| (y - model.predict(c, params)).abs())
        .sum();
    sum / set.len() as f64
}
