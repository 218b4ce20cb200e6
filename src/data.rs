// SPDX-License-Identifier: AGPL-3.0-only

//! Processed infection-score tables and fitted-parameter table I/O.
//!
//! The processed table is one row per simulated configuration:
//! `{nOfCon, nOfM, Dc, sAEC, infScore, confidence_int_95}`. A [`DataTable`]
//! is built once from such a file and never mutated; filtering produces a
//! fresh [`CalibrationSet`] in the deterministic order every downstream
//! consumer relies on (outer nOfCon, then sAEC, then Dc, then nOfM).
//!
//! Also hosts the [`HostSystem`] presets (human/mouse covariate grids) and
//! the persisted CEF/WSM/SIM parameter-table schemas.

use crate::codec;
use crate::error::SporeFitError;
use crate::models::Covariates;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Diffusion coefficient of the quasi-random-walk anchor configurations.
pub const QRW_DC: f64 = 6_000.0;

/// Secretion rates of the quasi-random-walk anchor configurations.
///
/// At these near-zero secretion rates chemotaxis degenerates to a random
/// walk; the configurations anchor the calibration at that extreme regime.
pub const QRW_SAEC: [f64; 2] = [1.0, 10.0];

/// One aggregated simulation configuration. Immutable once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Effector cell (macrophage) count.
    pub n_of_m: f64,
    /// Pathogen particle (conidia) count.
    pub n_of_con: u32,
    /// Secretion rate (molecules/s).
    pub s_aec: f64,
    /// Diffusion coefficient (µm²/min).
    pub dc: f64,
    /// Empirical infection probability in [0, 1].
    pub inf_score: f64,
    /// 95% binomial confidence interval half-width.
    pub ci95: f64,
}

/// Bit-exact covariate key: duplicates and lookups use the loaded bits.
type SampleKey = (u64, u32, u64, u64);

fn key_of(n_of_m: f64, n_of_con: u32, s_aec: f64, dc: f64) -> SampleKey {
    (n_of_m.to_bits(), n_of_con, s_aec.to_bits(), dc.to_bits())
}

/// 95% binomial proportion confidence interval (normal approximation).
///
/// Documented ingestion boundary: the upstream aggregation step computes
/// this per configuration from `n` simulation runs with success fraction `p`.
/// With no runs there is no interval, so `n = 0` yields a zero half-width
/// rather than NaN.
#[must_use]
pub fn binomial_ci95(p: f64, n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    1.96 * (p * (1.0 - p) / n as f64).sqrt()
}

/// Filter over the three slow covariates; `None` leaves a covariate
/// unconstrained (all distinct values included, in ascending order).
#[derive(Debug, Clone, Copy, Default)]
pub struct CovariateFilter {
    /// Required diffusion coefficient, or all.
    pub dc: Option<f64>,
    /// Required secretion rate, or the central distinct range.
    pub s_aec: Option<f64>,
    /// Required pathogen count, or all.
    pub n_of_con: Option<u32>,
}

impl CovariateFilter {
    /// No constraints: full deterministic sweep plus anchor configurations.
    #[must_use]
    pub const fn unconstrained() -> Self {
        Self {
            dc: None,
            s_aec: None,
            n_of_con: None,
        }
    }

    /// Constrain to one (Dc, sAEC) cell.
    #[must_use]
    pub const fn cell(dc: f64, s_aec: f64) -> Self {
        Self {
            dc: Some(dc),
            s_aec: Some(s_aec),
            n_of_con: None,
        }
    }

    /// Constrain to one (nOfCon, Dc, sAEC) cell.
    #[must_use]
    pub const fn cell_with_con(n_of_con: u32, dc: f64, s_aec: f64) -> Self {
        Self {
            dc: Some(dc),
            s_aec: Some(s_aec),
            n_of_con: Some(n_of_con),
        }
    }
}

/// Ordered (scores, covariates) view produced by filtering a [`DataTable`].
///
/// Positions are aligned: `scores[i]` is the observed infection score for
/// `inputs[i]`. Cross-model comparisons depend on this alignment.
#[derive(Debug, Clone, Default)]
pub struct CalibrationSet {
    /// Observed infection scores.
    pub scores: Vec<f64>,
    /// Covariates, same order as `scores`.
    pub inputs: Vec<Covariates>,
}

impl CalibrationSet {
    /// Number of samples in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    fn push(&mut self, c: Covariates, score: f64) {
        self.inputs.push(c);
        self.scores.push(score);
    }
}

/// Immutable table of samples indexed by covariate tuple.
#[derive(Debug, Clone)]
pub struct DataTable {
    samples: Vec<Sample>,
    index: HashMap<SampleKey, usize>,
}

#[derive(Debug, Deserialize)]
struct RawRow {
    #[serde(rename = "nOfCon")]
    n_of_con: u32,
    #[serde(rename = "nOfM")]
    n_of_m: f64,
    #[serde(rename = "Dc")]
    dc: f64,
    #[serde(rename = "sAEC")]
    s_aec: f64,
    #[serde(rename = "infScore")]
    inf_score: f64,
    #[serde(rename = "confidence_int_95")]
    ci95: f64,
}

impl DataTable {
    /// Build a table from samples, rejecting duplicate covariate tuples.
    ///
    /// # Errors
    ///
    /// Returns [`SporeFitError::Format`] if two samples share the same
    /// (nOfM, nOfCon, sAEC, Dc) configuration.
    pub fn from_samples(samples: Vec<Sample>) -> Result<Self, SporeFitError> {
        let mut index = HashMap::with_capacity(samples.len());
        for (i, s) in samples.iter().enumerate() {
            let key = key_of(s.n_of_m, s.n_of_con, s.s_aec, s.dc);
            if index.insert(key, i).is_some() {
                return Err(SporeFitError::Format(format!(
                    "duplicate configuration nOfM={}, nOfCon={}, sAEC={}, Dc={}",
                    s.n_of_m, s.n_of_con, s.s_aec, s.dc
                )));
            }
        }
        Ok(Self { samples, index })
    }

    /// Load a processed infection-score table from a delimited-text file.
    ///
    /// Columns are matched by name; extra columns (e.g. a pandas index) are
    /// ignored.
    ///
    /// # Errors
    ///
    /// [`SporeFitError::DataLoad`] if the file cannot be opened,
    /// [`SporeFitError::Format`] if a required column is absent, a cell is
    /// non-numeric, or a configuration is duplicated.
    pub fn load(path: &Path) -> Result<Self, SporeFitError> {
        let mut reader = csv::Reader::from_path(path)
            .map_err(|e| SporeFitError::DataLoad(format!("{}: {e}", path.display())))?;
        let mut samples = Vec::new();
        for row in reader.deserialize::<RawRow>() {
            let row = row.map_err(|e| SporeFitError::Format(e.to_string()))?;
            samples.push(Sample {
                n_of_m: row.n_of_m,
                n_of_con: row.n_of_con,
                s_aec: row.s_aec,
                dc: row.dc,
                inf_score: row.inf_score,
                ci95: row.ci95,
            });
        }
        Self::from_samples(samples)
    }

    /// All samples in load order.
    #[must_use]
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Number of configurations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the table holds no configurations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Exact-match lookup of one configuration.
    #[must_use]
    pub fn get(&self, n_of_m: f64, n_of_con: u32, s_aec: f64, dc: f64) -> Option<&Sample> {
        self.index
            .get(&key_of(n_of_m, n_of_con, s_aec, dc))
            .map(|&i| &self.samples[i])
    }

    fn score_at(&self, n_of_m: f64, n_of_con: u32, s_aec: f64, dc: f64) -> Result<f64, SporeFitError> {
        self.get(n_of_m, n_of_con, s_aec, dc)
            .map(|s| s.inf_score)
            .ok_or(SporeFitError::MissingSample {
                n_of_m,
                n_of_con,
                s_aec,
                dc,
            })
    }

    /// Distinct effector-cell counts, ascending.
    #[must_use]
    pub fn distinct_n_of_m(&self) -> Vec<f64> {
        distinct_sorted(self.samples.iter().map(|s| s.n_of_m))
    }

    /// Distinct pathogen counts, ascending.
    #[must_use]
    pub fn distinct_n_of_con(&self) -> Vec<u32> {
        let mut v: Vec<u32> = self.samples.iter().map(|s| s.n_of_con).collect();
        v.sort_unstable();
        v.dedup();
        v
    }

    /// Distinct secretion rates, ascending.
    #[must_use]
    pub fn distinct_s_aec(&self) -> Vec<f64> {
        distinct_sorted(self.samples.iter().map(|s| s.s_aec))
    }

    /// Distinct diffusion coefficients, ascending.
    #[must_use]
    pub fn distinct_dc(&self) -> Vec<f64> {
        distinct_sorted(self.samples.iter().map(|s| s.dc))
    }

    /// The 3rd through 8th smallest distinct secretion rates.
    ///
    /// With anchor configurations present this is exactly the main
    /// calibration grid (the two anchor rates are the smallest values).
    ///
    /// # Errors
    ///
    /// [`SporeFitError::Format`] if fewer than 3 distinct rates exist.
    pub fn central_s_aec_range(&self) -> Result<Vec<f64>, SporeFitError> {
        let all = self.distinct_s_aec();
        if all.len() < 3 {
            return Err(SporeFitError::Format(format!(
                "need at least 3 distinct sAEC values for the central range, found {}",
                all.len()
            )));
        }
        Ok(all[2..all.len().min(8)].to_vec())
    }

    /// Filter to an ordered calibration set.
    ///
    /// Ordering is load-bearing: outer loop over nOfCon ascending, then sAEC
    /// ascending (central range when unconstrained), then Dc ascending, then
    /// nOfM ascending. When both Dc and sAEC are unconstrained, the
    /// quasi-random-walk anchors (Dc = [`QRW_DC`], sAEC ∈ [`QRW_SAEC`]) are
    /// appended after each nOfCon stratum with the same inner ordering.
    ///
    /// # Errors
    ///
    /// [`SporeFitError::MissingSample`] if any required configuration is
    /// absent; the result is never silently shorter than requested.
    pub fn calibration_set(&self, filter: &CovariateFilter) -> Result<CalibrationSet, SporeFitError> {
        let n_of_ms = self.distinct_n_of_m();
        let dcs = match filter.dc {
            Some(v) => vec![v],
            None => self.distinct_dc(),
        };
        let s_aecs = match filter.s_aec {
            Some(v) => vec![v],
            None => self.central_s_aec_range()?,
        };
        let n_of_cons = match filter.n_of_con {
            Some(v) => vec![v],
            None => self.distinct_n_of_con(),
        };
        let with_anchors = filter.dc.is_none() && filter.s_aec.is_none();

        let mut set = CalibrationSet::default();
        for &con in &n_of_cons {
            for &s in &s_aecs {
                for &d in &dcs {
                    for &m in &n_of_ms {
                        set.push(Covariates::new(m, con, s, d), self.score_at(m, con, s, d)?);
                    }
                }
            }
            if with_anchors {
                for &s in &QRW_SAEC {
                    for &m in &n_of_ms {
                        set.push(
                            Covariates::new(m, con, s, QRW_DC),
                            self.score_at(m, con, s, QRW_DC)?,
                        );
                    }
                }
            }
        }
        Ok(set)
    }

    /// Cells (distinct sAEC×Dc combinations, anchors included) per nOfCon
    /// stratum of an unconstrained calibration set.
    ///
    /// # Errors
    ///
    /// Propagates [`SporeFitError::Format`] from the central-range lookup.
    pub fn cells_per_stratum(&self) -> Result<usize, SporeFitError> {
        Ok(self.central_s_aec_range()?.len() * self.distinct_dc().len() + QRW_SAEC.len())
    }
}

fn distinct_sorted(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut v: Vec<f64> = values.collect();
    v.sort_by(f64::total_cmp);
    v.dedup_by(|a, b| a.to_bits() == b.to_bits());
    v
}

// ═══════════════════════════════════════════════════════════════════
// Host-system presets
// ═══════════════════════════════════════════════════════════════════

/// Which host system's covariate grids and stored seeds to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostSystem {
    /// Human alveolus: 25 macrophage counts (2..50 step 2), 1-2 conidia.
    Human,
    /// Murine alveolus: 25 macrophage counts (0.1..2.5 step 0.1), 1-3 conidia.
    Mouse,
}

impl HostSystem {
    /// Parse from CLI argument string.
    #[must_use]
    pub fn from_arg(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "mouse" | "murine" => Self::Mouse,
            "human" => Self::Human,
            _ => {
                eprintln!("  WARNING: Unknown system '{s}', using human");
                Self::Human
            }
        }
    }

    /// Short lowercase name used in file names.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Mouse => "mouse",
        }
    }

    /// Conventional processed-table file name for this system.
    #[must_use]
    pub fn processed_file_name(&self) -> String {
        format!("{}_processed_data.csv", self.name())
    }

    /// Effector-cell grid.
    #[must_use]
    pub fn n_of_ms(&self) -> Vec<f64> {
        match self {
            Self::Human => (1..=25).map(|i| f64::from(i) * 2.0).collect(),
            Self::Mouse => (1..=25).map(|i| f64::from(i) * 0.1).collect(),
        }
    }

    /// Pathogen-count strata, low to high fungal burden.
    #[must_use]
    pub fn n_of_cons(&self) -> Vec<u32> {
        match self {
            Self::Human => vec![1, 2],
            Self::Mouse => vec![1, 2, 3],
        }
    }

    /// Stored SIM seed (optimizer space) for this system.
    #[must_use]
    pub const fn sim_seed(&self) -> &'static [f64; 14] {
        match self {
            Self::Human => &crate::provenance::SIM_SEED_HUMAN,
            Self::Mouse => &crate::provenance::SIM_SEED_MOUSE,
        }
    }
}

/// Parse `--system=...` from CLI args, defaulting to human.
#[must_use]
pub fn parse_system_from_args(args: &[String]) -> HostSystem {
    args.iter()
        .find(|a| a.starts_with("--system="))
        .map_or(HostSystem::Human, |a| HostSystem::from_arg(&a[9..]))
}

/// Parse `--key=value` from CLI args as `usize`, returning `default` if
/// missing or invalid.
#[must_use]
pub fn parse_cli_usize(args: &[String], key: &str, default: usize) -> usize {
    let prefix = format!("{key}=");
    args.iter()
        .find(|a| a.starts_with(&prefix))
        .and_then(|a| a.strip_prefix(&prefix)?.parse().ok())
        .unwrap_or(default)
}

/// Parse `--key=value` from CLI args as `u64` (e.g. `--seed=`), or `None`.
#[must_use]
pub fn parse_cli_u64(args: &[String], key: &str) -> Option<u64> {
    let prefix = format!("{key}=");
    args.iter()
        .find(|a| a.starts_with(&prefix))
        .and_then(|a| a.strip_prefix(&prefix)?.parse().ok())
}

/// Parse `--key=value` from CLI args as a string, or `None`.
#[must_use]
pub fn parse_cli_string(args: &[String], key: &str) -> Option<String> {
    let prefix = format!("{key}=");
    args.iter()
        .find(|a| a.starts_with(&prefix))
        .map(|a| a[prefix.len()..].to_string())
}

/// Generator for binaries: `--seed=` gives a reproducible stream, otherwise
/// OS entropy.
#[must_use]
pub fn rng_from_args(args: &[String]) -> rand_chacha::ChaCha8Rng {
    use rand::SeedableRng;
    match parse_cli_u64(args, "--seed") {
        Some(seed) => rand_chacha::ChaCha8Rng::seed_from_u64(seed),
        None => rand_chacha::ChaCha8Rng::from_entropy(),
    }
}

// ═══════════════════════════════════════════════════════════════════
// Fitted-parameter tables
// ═══════════════════════════════════════════════════════════════════

/// One row of the compressed-exponential parameter table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CefRow {
    /// Pathogen count of the fitted cell.
    #[serde(rename = "nOfCon")]
    pub n_of_con: u32,
    /// Diffusion coefficient of the fitted cell.
    #[serde(rename = "Dc")]
    pub dc: f64,
    /// Secretion rate of the fitted cell.
    #[serde(rename = "sAEC")]
    pub s_aec: f64,
    /// Fitted decay rate.
    pub beta: f64,
    /// Fitted compression exponent.
    pub gamma: f64,
}

/// One row of the Weibull survival-model parameter table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WsmRow {
    /// Diffusion coefficient of the fitted cell.
    #[serde(rename = "Dc")]
    pub dc: f64,
    /// Secretion rate of the fitted cell.
    #[serde(rename = "sAEC")]
    pub s_aec: f64,
    /// Fitted per-effector clearance rate.
    #[serde(rename = "Lambda")]
    pub lambda: f64,
}

/// Read a CEF parameter table.
///
/// # Errors
///
/// [`SporeFitError::DataLoad`] on open failure, [`SporeFitError::Format`] on
/// malformed rows.
pub fn read_cef_table(path: &Path) -> Result<Vec<CefRow>, SporeFitError> {
    read_rows(path)
}

/// Write a CEF parameter table.
///
/// # Errors
///
/// [`SporeFitError::DataLoad`] if the file cannot be written.
pub fn write_cef_table(path: &Path, rows: &[CefRow]) -> Result<(), SporeFitError> {
    write_rows(path, rows)
}

/// Read a WSM parameter table.
///
/// # Errors
///
/// [`SporeFitError::DataLoad`] on open failure, [`SporeFitError::Format`] on
/// malformed rows.
pub fn read_wsm_table(path: &Path) -> Result<Vec<WsmRow>, SporeFitError> {
    read_rows(path)
}

/// Write a WSM parameter table.
///
/// # Errors
///
/// [`SporeFitError::DataLoad`] if the file cannot be written.
pub fn write_wsm_table(path: &Path, rows: &[WsmRow]) -> Result<(), SporeFitError> {
    write_rows(path, rows)
}

fn read_rows<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Vec<T>, SporeFitError> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| SporeFitError::DataLoad(format!("{}: {e}", path.display())))?;
    let mut rows = Vec::new();
    for row in reader.deserialize::<T>() {
        rows.push(row.map_err(|e| SporeFitError::Format(e.to_string()))?);
    }
    Ok(rows)
}

fn write_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), SporeFitError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| SporeFitError::DataLoad(format!("{}: {e}", path.display())))?;
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| SporeFitError::DataLoad(format!("{}: {e}", path.display())))?;
    }
    writer
        .flush()
        .map_err(|e| SporeFitError::DataLoad(format!("{}: {e}", path.display())))
}

/// Write SIM parameters: converts optimizer-space to natural space and
/// persists one row labeled `b1..b7, g1..g7`.
///
/// # Errors
///
/// [`SporeFitError::Domain`] if a scale parameter (index 3 or 10) is zero,
/// [`SporeFitError::DataLoad`] if the file cannot be written.
pub fn write_sim_parameters(path: &Path, optimizer_params: &[f64]) -> Result<(), SporeFitError> {
    let natural = codec::sim_to_natural_space(optimizer_params)?;
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| SporeFitError::DataLoad(format!("{}: {e}", path.display())))?;
    writer
        .write_record(crate::provenance::PARAM_NAMES)
        .and_then(|()| writer.write_record(natural.iter().map(|v| format!("{v}"))))
        .and_then(|()| writer.flush().map_err(Into::into))
        .map_err(|e| SporeFitError::DataLoad(format!("{}: {e}", path.display())))
}

/// Read SIM parameters: parses the natural-space row and converts to
/// optimizer space.
///
/// # Errors
///
/// [`SporeFitError::Format`] on a malformed table,
/// [`SporeFitError::Domain`] if a persisted scale parameter is zero.
pub fn read_sim_parameters(path: &Path) -> Result<Vec<f64>, SporeFitError> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| SporeFitError::DataLoad(format!("{}: {e}", path.display())))?;
    let headers = reader
        .headers()
        .map_err(|e| SporeFitError::Format(e.to_string()))?
        .clone();
    let record = reader
        .records()
        .next()
        .ok_or_else(|| SporeFitError::Format("SIM parameter table has no data row".into()))?
        .map_err(|e| SporeFitError::Format(e.to_string()))?;

    let mut natural = Vec::with_capacity(14);
    for name in crate::provenance::PARAM_NAMES {
        let pos = headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| SporeFitError::Format(format!("missing SIM column '{name}'")))?;
        let cell = record
            .get(pos)
            .ok_or_else(|| SporeFitError::Format(format!("short SIM row at '{name}'")))?;
        natural.push(
            cell.parse::<f64>()
                .map_err(|e| SporeFitError::Format(format!("column '{name}': {e}")))?,
        );
    }
    codec::sim_to_optimizer_space(&natural)
}
