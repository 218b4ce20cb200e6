// SPDX-License-Identifier: AGPL-3.0-only

//! Typed errors for table ingestion, filtering, and calibration.
//!
//! Replaces `Result<_, String>` in public APIs with a proper enum so callers
//! can pattern-match on failure modes (malformed table, absent covariate
//! combination, codec precondition) rather than parsing opaque strings.

use std::fmt;

/// Errors arising from data loading, filtering, or parameter transforms.
#[derive(Debug)]
pub enum SporeFitError {
    /// Input table is malformed: missing column, non-numeric cell, or a
    /// duplicate covariate configuration.
    Format(String),

    /// A requested covariate combination has no sample in the table.
    /// Fatal for the filter call that required it.
    MissingSample {
        /// Effector cell count of the absent configuration.
        n_of_m: f64,
        /// Pathogen particle count of the absent configuration.
        n_of_con: u32,
        /// Secretion rate of the absent configuration.
        s_aec: f64,
        /// Diffusion coefficient of the absent configuration.
        dc: f64,
    },

    /// Codec precondition violated (zero scale parameter).
    Domain(String),

    /// File-level failure: open, read, or write (path and underlying error).
    DataLoad(String),
}

impl fmt::Display for SporeFitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Format(msg) => write!(f, "Malformed input table: {msg}"),
            Self::MissingSample {
                n_of_m,
                n_of_con,
                s_aec,
                dc,
            } => write!(
                f,
                "No sample for nOfM={n_of_m}, nOfCon={n_of_con}, sAEC={s_aec}, Dc={dc}"
            ),
            Self::Domain(msg) => write!(f, "Parameter domain violation: {msg}"),
            Self::DataLoad(msg) => write!(f, "Data loading failed: {msg}"),
        }
    }
}

impl std::error::Error for SporeFitError {}
