// SPDX-License-Identifier: AGPL-3.0-only

//! Integration tests: table loading, filtering and parameter-table I/O
//! through real files.

use sporefit::data::{
    read_cef_table, read_sim_parameters, write_cef_table, write_sim_parameters, CefRow,
    CovariateFilter, DataTable, HostSystem, QRW_DC, QRW_SAEC,
};
use sporefit::error::SporeFitError;
use sporefit::provenance::{DC_GRID, SAEC_GRID, SIM_SEED_HUMAN};
use std::fmt::Write as _;

/// Write a full-grid processed table for one host system and load it back.
fn write_full_grid(system: HostSystem, dir: &std::path::Path) -> std::path::PathBuf {
    let mut csv = String::from(",nOfCon,nOfM,Dc,sAEC,infScore,confidence_int_95\n");
    let mut row = 0usize;
    for con in system.n_of_cons() {
        for m in system.n_of_ms() {
            for &dc in &DC_GRID {
                for &s_aec in &SAEC_GRID {
                    let score = (-0.02 * m * f64::from(con)).exp();
                    let _ = writeln!(csv, "{row},{con},{m},{dc},{s_aec},{score},0.02");
                    row += 1;
                }
            }
            for &s_aec in &QRW_SAEC {
                let _ = writeln!(csv, "{row},{con},{m},{QRW_DC},{s_aec},0.95,0.02");
                row += 1;
            }
        }
    }
    let path = dir.join(system.processed_file_name());
    std::fs::write(&path, csv).expect("write processed table");
    path
}

#[test]
fn full_human_grid_loads_and_filters() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_full_grid(HostSystem::Human, dir.path());
    let table = DataTable::load(&path).expect("load");
    // 2 nOfCon × 25 nOfM × (36 grid + 2 anchor) cells.
    assert_eq!(table.len(), 2 * 25 * 38);
    assert_eq!(table.distinct_n_of_m().len(), 25);
    assert_eq!(table.distinct_n_of_con(), vec![1, 2]);
    // 8 distinct sAEC: the 6-rate grid plus the two anchors.
    assert_eq!(table.distinct_s_aec().len(), 8);
    assert_eq!(table.central_s_aec_range().expect("central"), SAEC_GRID);
    assert_eq!(table.cells_per_stratum().expect("cells"), 38);

    let set = table
        .calibration_set(&CovariateFilter::unconstrained())
        .expect("filter");
    assert_eq!(set.len(), 2 * 38 * 25);
}

#[test]
fn mouse_grid_carries_three_strata() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_full_grid(HostSystem::Mouse, dir.path());
    let table = DataTable::load(&path).expect("load");
    assert_eq!(table.distinct_n_of_con(), vec![1, 2, 3]);
    let set = table
        .calibration_set(&CovariateFilter::unconstrained())
        .expect("filter");
    assert_eq!(set.len(), 3 * 38 * 25);
}

#[test]
fn unconstrained_set_interleaves_anchor_blocks_per_stratum() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_full_grid(HostSystem::Human, dir.path());
    let table = DataTable::load(&path).expect("load");
    let set = table
        .calibration_set(&CovariateFilter::unconstrained())
        .expect("filter");

    let per_stratum = 38 * 25;
    for stratum in 0..2 {
        let block = &set.inputs[stratum * per_stratum..(stratum + 1) * per_stratum];
        assert!(block.iter().all(|c| c.n_of_con == f64::from(stratum as u32 + 1)));
        // Main block first, anchors-at-Dc-6000 appended last.
        let anchors = &block[36 * 25..];
        assert!(anchors.iter().all(|c| c.dc == QRW_DC));
        assert!(anchors[..25].iter().all(|c| c.s_aec == 1.0));
        assert!(anchors[25..].iter().all(|c| c.s_aec == 10.0));
    }
}

#[test]
fn dropping_one_row_makes_filtering_fail_loudly() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_full_grid(HostSystem::Human, dir.path());
    let text = std::fs::read_to_string(&path).expect("read back");
    let mut lines: Vec<&str> = text.lines().collect();
    lines.remove(40);
    let trimmed = dir.path().join("trimmed.csv");
    std::fs::write(&trimmed, lines.join("\n")).expect("write trimmed");

    let table = DataTable::load(&trimmed).expect("load");
    let err = table
        .calibration_set(&CovariateFilter::unconstrained())
        .expect_err("missing combination must error");
    assert!(matches!(err, SporeFitError::MissingSample { .. }));
}

#[test]
fn cef_table_survives_disk_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("CEF_human.csv");
    let mut rows = Vec::new();
    for &dc in &DC_GRID {
        for &s_aec in &SAEC_GRID {
            rows.push(CefRow {
                n_of_con: 1,
                dc,
                s_aec,
                beta: 0.1 * (s_aec / dc).ln(),
                gamma: 1.0,
            });
        }
    }
    write_cef_table(&path, &rows).expect("write");
    assert_eq!(read_cef_table(&path).expect("read"), rows);
}

#[test]
fn sim_parameters_persist_in_natural_space() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("SIM_human.csv");
    write_sim_parameters(&path, &SIM_SEED_HUMAN).expect("write");

    let text = std::fs::read_to_string(&path).expect("read raw");
    let header = text.lines().next().expect("header");
    assert_eq!(header, "b1,b2,b3,b4,b5,b6,b7,g1,g2,g3,g4,g5,g6,g7");
    // The persisted b2 must be the natural value, not the optimizer one.
    let natural = sporefit::codec::sim_to_natural_space(&SIM_SEED_HUMAN).expect("codec");
    let first_row: Vec<f64> = text
        .lines()
        .nth(1)
        .expect("data row")
        .split(',')
        .map(|v| v.parse().expect("numeric cell"))
        .collect();
    assert!((first_row[1] - natural[1]).abs() < 1e-12 * natural[1].abs().max(1.0));

    let back = read_sim_parameters(&path).expect("read");
    for (a, b) in SIM_SEED_HUMAN.iter().zip(&back) {
        assert!((a - b).abs() <= 1e-9 * a.abs().max(1.0), "{a} vs {b}");
    }
}
