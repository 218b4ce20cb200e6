// SPDX-License-Identifier: AGPL-3.0-only

//! Symmetry-error analysis over the covariate ratio.
//!
//! The fitted models depend on sAEC and Dc only through ln(sAEC/Dc), so
//! grid cells sharing that ratio should carry the same infection score. The
//! analysis finds cells of a fitted WSM table with identical ratios and
//! measures how far the observed scores of those cells actually are from
//! each other: the mean symmetric error. A large value would invalidate the
//! ratio ansatz itself.

use crate::data::{DataTable, WsmRow};
use crate::error::SporeFitError;
use crate::tolerances::RATIO_MATCH;

/// Grid cells sharing one ln(sAEC/Dc) value.
#[derive(Debug, Clone, PartialEq)]
pub struct RatioGroup {
    /// The shared ratio, taken from the group's first cell.
    pub ln_ratio: f64,
    /// (sAEC, Dc) of each member cell, at least two.
    pub cells: Vec<(f64, f64)>,
}

/// Group WSM table cells by identical ln(sAEC/Dc).
///
/// Cells are sorted by ratio and runs of consecutive cells closer than
/// [`RATIO_MATCH`] form one group; only groups with two or more members are
/// returned.
#[must_use]
pub fn find_identical_ratios(rows: &[WsmRow]) -> Vec<RatioGroup> {
    let mut cells: Vec<(f64, f64, f64)> = rows
        .iter()
        .map(|r| ((r.s_aec / r.dc).ln(), r.s_aec, r.dc))
        .collect();
    cells.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut groups = Vec::new();
    let mut current: Vec<(f64, f64)> = Vec::new();
    let mut current_ratio = f64::NEG_INFINITY;
    for (ratio, s_aec, dc) in cells {
        if (ratio - current_ratio).abs() < RATIO_MATCH {
            current.push((s_aec, dc));
        } else {
            if current.len() > 1 {
                groups.push(RatioGroup {
                    ln_ratio: current_ratio,
                    cells: std::mem::take(&mut current),
                });
            }
            current = vec![(s_aec, dc)];
            current_ratio = ratio;
        }
    }
    if current.len() > 1 {
        groups.push(RatioGroup {
            ln_ratio: current_ratio,
            cells: current,
        });
    }
    groups
}

/// Mean symmetric error: for every nOfCon and nOfM, the mean absolute
/// score difference over all cell pairs within each ratio group, averaged
/// over the whole grid.
///
/// # Errors
///
/// [`SporeFitError::Domain`] if no group contributes a pair,
/// [`SporeFitError::MissingSample`] if a group cell is absent from the
/// table at some (nOfM, nOfCon).
pub fn mean_symmetric_error(
    groups: &[RatioGroup],
    table: &DataTable,
) -> Result<f64, SporeFitError> {
    if groups.is_empty() {
        return Err(SporeFitError::Domain(
            "no identical-ratio groups to compare".into(),
        ));
    }
    let score = |m: f64, con: u32, s: f64, d: f64| -> Result<f64, SporeFitError> {
        table
            .get(m, con, s, d)
            .map(|sample| sample.inf_score)
            .ok_or(SporeFitError::MissingSample {
                n_of_m: m,
                n_of_con: con,
                s_aec: s,
                dc: d,
            })
    };

    let mut grid_means = Vec::new();
    for &con in &table.distinct_n_of_con() {
        for &m in &table.distinct_n_of_m() {
            let mut pair_dists = Vec::new();
            for group in groups {
                for (i, &(s1, d1)) in group.cells.iter().enumerate() {
                    for &(s2, d2) in &group.cells[i + 1..] {
                        let a = score(m, con, s1, d1)?;
                        let b = score(m, con, s2, d2)?;
                        pair_dists.push((b - a).abs());
                    }
                }
            }
            if pair_dists.is_empty() {
                return Err(SporeFitError::Domain(
                    "identical-ratio groups contain no cell pairs".into(),
                ));
            }
            grid_means.push(pair_dists.iter().sum::<f64>() / pair_dists.len() as f64);
        }
    }
    Ok(grid_means.iter().sum::<f64>() / grid_means.len() as f64)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::data::Sample;

    fn wsm_row(dc: f64, s_aec: f64) -> WsmRow {
        WsmRow {
            dc,
            s_aec,
            lambda: 0.1,
        }
    }

    #[test]
    fn identical_ratios_found_across_the_standard_grid() {
        // 1500/20 = 15000/200 = 150000/2000 = 75; 5000/20 = 50000/200 etc.
        let mut rows = Vec::new();
        for &dc in &[20.0, 60.0, 200.0, 600.0, 2000.0, 6000.0] {
            for &s in &[1500.0, 5000.0, 15000.0, 50000.0, 150_000.0, 500_000.0] {
                rows.push(wsm_row(dc, s));
            }
        }
        let groups = find_identical_ratios(&rows);
        assert!(!groups.is_empty());
        let ratio_75 = groups
            .iter()
            .find(|g| (g.ln_ratio - 75.0f64.ln()).abs() < 1e-9)
            .expect("ratio 75 group");
        assert_eq!(ratio_75.cells.len(), 3);
        for &(s, d) in &ratio_75.cells {
            assert!((s / d - 75.0).abs() < 1e-9);
        }
        // Every group's members agree on the ratio.
        for g in &groups {
            assert!(g.cells.len() >= 2);
            for &(s, d) in &g.cells {
                assert!(((s / d).ln() - g.ln_ratio).abs() < RATIO_MATCH);
            }
        }
    }

    #[test]
    fn singleton_ratios_produce_no_groups() {
        let rows = vec![wsm_row(20.0, 1500.0), wsm_row(20.0, 5000.0)];
        assert!(find_identical_ratios(&rows).is_empty());
    }

    #[test]
    fn first_and_last_cells_are_not_dropped_from_runs() {
        // Three cells at one ratio at the extremes of the sorted order.
        let rows = vec![
            wsm_row(20.0, 1500.0),
            wsm_row(200.0, 15000.0),
            wsm_row(2000.0, 150_000.0),
        ];
        let groups = find_identical_ratios(&rows);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].cells.len(), 3);
    }

    fn table_with(scores: &[(f64, f64, f64)]) -> DataTable {
        // (s_aec, dc, score) at fixed nOfM=2, nOfCon=1.
        let samples = scores
            .iter()
            .map(|&(s, d, y)| Sample {
                n_of_m: 2.0,
                n_of_con: 1,
                s_aec: s,
                dc: d,
                inf_score: y,
                ci95: 0.01,
            })
            .collect();
        DataTable::from_samples(samples).unwrap()
    }

    #[test]
    fn perfectly_symmetric_scores_give_zero_error() {
        let table = table_with(&[(1500.0, 20.0, 0.4), (15000.0, 200.0, 0.4)]);
        let groups = find_identical_ratios(&[wsm_row(20.0, 1500.0), wsm_row(200.0, 15000.0)]);
        let err = mean_symmetric_error(&groups, &table).unwrap();
        assert_eq!(err, 0.0);
    }

    #[test]
    fn asymmetric_scores_give_the_pairwise_distance() {
        let table = table_with(&[(1500.0, 20.0, 0.4), (15000.0, 200.0, 0.5)]);
        let groups = find_identical_ratios(&[wsm_row(20.0, 1500.0), wsm_row(200.0, 15000.0)]);
        let err = mean_symmetric_error(&groups, &table).unwrap();
        assert!((err - 0.1).abs() < 1e-12);
    }

    #[test]
    fn missing_group_cell_errors() {
        let table = table_with(&[(1500.0, 20.0, 0.4)]);
        let groups = find_identical_ratios(&[wsm_row(20.0, 1500.0), wsm_row(200.0, 15000.0)]);
        assert!(matches!(
            mean_symmetric_error(&groups, &table),
            Err(SporeFitError::MissingSample { .. })
        ));
    }

    #[test]
    fn no_groups_is_a_domain_error() {
        let table = table_with(&[(1500.0, 20.0, 0.4)]);
        assert!(matches!(
            mean_symmetric_error(&[], &table),
            Err(SporeFitError::Domain(_))
        ));
    }
}
