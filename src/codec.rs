// SPDX-License-Identifier: AGPL-3.0-only

//! Parameter reparameterization between natural and optimizer space.
//!
//! The blend function's logistic arguments contain (sAEC/Dc)^x4, which is
//! ill-conditioned to optimize directly. Substituting x2' = x4·ln(x2) and
//! x3' = x4·ln(x3) turns the power into a sum inside the exponent:
//! (x2·s/D)^x4 = exp(x4·ln(s/D) + x2'). Optimization and in-memory
//! evaluation use the primed form; persisted tables always hold the natural
//! form. The transform touches blend-vector indices 1, 2 with scale index 3
//! (and 8, 9 with scale 10 in the flattened 14-vector).

use crate::error::SporeFitError;

/// (reparameterized index, scale index) pairs of one 7-wide blend block.
const BLOCK_TRANSFORM: [(usize, usize); 2] = [(1, 3), (2, 3)];

fn check_scale(params: &[f64], scale_idx: usize) -> Result<(), SporeFitError> {
    if params[scale_idx] == 0.0 {
        return Err(SporeFitError::Domain(format!(
            "scale parameter at index {scale_idx} is zero, reparameterization is undefined"
        )));
    }
    Ok(())
}

fn check_len(params: &[f64], expected: usize, what: &str) -> Result<(), SporeFitError> {
    if params.len() != expected {
        return Err(SporeFitError::Domain(format!(
            "{what} parameter vector has length {}, expected {expected}",
            params.len()
        )));
    }
    Ok(())
}

/// Natural-space 7-vector to optimizer space: x2' = x4·ln(x2), x3' = x4·ln(x3).
///
/// # Errors
///
/// [`SporeFitError::Domain`] if the vector is not 7-wide or x4 is zero.
pub fn gbf_to_optimizer_space(natural: &[f64]) -> Result<Vec<f64>, SporeFitError> {
    check_len(natural, 7, "blend-function")?;
    check_scale(natural, 3)?;
    let mut p = natural.to_vec();
    for (idx, scale_idx) in BLOCK_TRANSFORM {
        p[idx] = natural[scale_idx] * natural[idx].ln();
    }
    Ok(p)
}

/// Optimizer-space 7-vector back to natural space: x2 = exp(x2')^(1/x4).
///
/// # Errors
///
/// [`SporeFitError::Domain`] if the vector is not 7-wide or x4 is zero.
pub fn gbf_to_natural_space(optimizer: &[f64]) -> Result<Vec<f64>, SporeFitError> {
    check_len(optimizer, 7, "blend-function")?;
    check_scale(optimizer, 3)?;
    let mut p = optimizer.to_vec();
    for (idx, scale_idx) in BLOCK_TRANSFORM {
        p[idx] = optimizer[idx].exp().powf(1.0 / optimizer[scale_idx]);
    }
    Ok(p)
}

/// Natural-space 14-vector (β block then γ block) to optimizer space.
///
/// # Errors
///
/// [`SporeFitError::Domain`] if the vector is not 14-wide or either scale
/// parameter (index 3 or 10) is zero.
pub fn sim_to_optimizer_space(natural: &[f64]) -> Result<Vec<f64>, SporeFitError> {
    check_len(natural, 14, "surrogate-model")?;
    let beta = gbf_to_optimizer_space(&natural[..7])?;
    let gamma = gbf_to_optimizer_space(&natural[7..])?;
    Ok([beta, gamma].concat())
}

/// Optimizer-space 14-vector back to natural space.
///
/// # Errors
///
/// [`SporeFitError::Domain`] if the vector is not 14-wide or either scale
/// parameter is zero.
pub fn sim_to_natural_space(optimizer: &[f64]) -> Result<Vec<f64>, SporeFitError> {
    check_len(optimizer, 14, "surrogate-model")?;
    let beta = gbf_to_natural_space(&optimizer[..7])?;
    let gamma = gbf_to_natural_space(&optimizer[7..])?;
    Ok([beta, gamma].concat())
}
