use approx::{assert_abs_diff_eq, assert_relative_eq};
use std::fs;
use swathedit::calibration::OptimizeMode;
use swathedit::edits::esf::{EditAction, EditLog};
use swathedit::edits::io::{esf_path, read_esf};
use swathedit::edits::store::EditOutput;
use swathedit::flags::{bits, BeamFlag};
use swathedit::geometry::attitude::{BiasParameters, Navigation};
use swathedit::geometry::corrector::rotate_beam;
use swathedit::gridding::grid::{BeamSample, IncrementalGrid};
use swathedit::projection::LocalProjection;
use swathedit::selection::Region;
use swathedit::swath::decoded::{DecodedBeam, DecodedFile, DecodedPing};
use swathedit::swath::reader::{read_soundings_file, COLUMNS};
use swathedit::{EditorSession, FlushPolicy, NullObserver, SessionConfig};

/// Two pings of three beams over a flat seafloor 10 m down.
fn flat_line() -> DecodedFile {
    let pings = (0..2)
        .map(|k| DecodedPing {
            nav: Navigation {
                time_d: 1_000.0 + k as f64,
                lon: 0.0,
                lat: 0.00001 * k as f64,
                altitude: 10.0,
                ..Default::default()
            },
            sensor_head: None,
            beams: (0..3)
                .map(|b| DecodedBeam {
                    bath: 10.0,
                    across: -1.5 + 1.5 * b as f64,
                    along: 0.0,
                    amp: 20.0,
                    flag: bits::NONE,
                })
                .collect(),
        })
        .collect();
    DecodedFile::new("flat", pings)
}

/// Two pings of three beams that all land on the same spot.
fn stacked_pings() -> DecodedFile {
    let baths = [[10.0, 10.2, 9.8], [10.1, 9.9, 10.0]];
    let pings = baths
        .iter()
        .enumerate()
        .map(|(k, row)| DecodedPing {
            nav: Navigation {
                time_d: 2_000.0 + k as f64,
                lon: 0.0,
                lat: 0.0,
                altitude: 10.0,
                ..Default::default()
            },
            sensor_head: None,
            beams: row
                .iter()
                .map(|&bath| DecodedBeam {
                    bath,
                    across: 0.0,
                    along: 0.0,
                    amp: 20.0,
                    flag: bits::NONE,
                })
                .collect(),
        })
        .collect();
    DecodedFile::new("stacked", pings)
}

/// Twenty pings over a flat seafloor 20 m down, logged with the roll 2 degrees off.
fn rolled_line(name: &str, heading: f64, t0: f64) -> DecodedFile {
    let pings = (0..20)
        .map(|k| DecodedPing {
            nav: Navigation {
                time_d: t0 + k as f64,
                lon: 0.0,
                lat: 0.000009 * k as f64,
                heading,
                altitude: 20.0,
                ..Default::default()
            },
            sensor_head: None,
            beams: (0..21)
                .map(|b| {
                    let (across, _, bath) =
                        rotate_beam(-20.0 + 2.0 * b as f64, 0.0, 20.0, -2.0, 0.0);
                    DecodedBeam {
                        bath,
                        across,
                        along: 0.0,
                        amp: 20.0,
                        flag: bits::NONE,
                    }
                })
                .collect(),
        })
        .collect();
    DecodedFile::new(name, pings)
}

fn session(output: EditOutput) -> EditorSession {
    let config = SessionConfig {
        cell_size: Some(1.0),
        edit_output: output,
        ..Default::default()
    };
    EditorSession::new(config, Box::new(NullObserver))
        .with_projection(Box::new(LocalProjection::new(-0.0005, -0.0005)))
}

fn mass_of_ok_soundings(s: &EditorSession) -> f64 {
    let grid = s.grid().unwrap();
    s.store()
        .files()
        .iter()
        .flat_map(|f| f.ok_samples())
        .map(|b| grid.footprint_mass(&b))
        .sum()
}

#[test]
fn flat_seafloor_grids_to_its_depth() {
    let mut s = session(EditOutput::Browse);
    s.load_file(flat_line()).unwrap();
    s.setup_grid().unwrap();

    let grid = s.grid().unwrap();
    assert!(grid.cells_with_data() > 0);
    let g = grid.geometry();
    for i in 0..g.n_columns {
        for j in 0..g.n_rows {
            if let Some(depth) = grid.cell(i, j).and_then(|c| c.depth()) {
                assert_abs_diff_eq!(depth, 10.0, epsilon = 1e-9);
            }
        }
    }
    assert_relative_eq!(grid.total_weight(), mass_of_ok_soundings(&s), max_relative = 1e-9);
}

#[test]
fn flag_and_unflag_restore_grid_exactly() {
    let mut s = session(EditOutput::Browse);
    s.load_file(flat_line()).unwrap();
    s.setup_grid().unwrap();
    let values = s.grid().unwrap().values().clone();
    let weight = s.grid().unwrap().total_weight();

    s.on_edit(0, 0, 1, BeamFlag::ManualFlag, FlushPolicy::Flush)
        .unwrap();
    assert_eq!(s.store().file(0).unwrap().ok_samples().len(), 5);
    assert_relative_eq!(
        s.grid().unwrap().total_weight(),
        mass_of_ok_soundings(&s),
        max_relative = 1e-9
    );

    s.on_edit(0, 0, 1, BeamFlag::Ok, FlushPolicy::Flush).unwrap();
    assert_eq!(s.grid().unwrap().total_weight(), weight);
    assert_eq!(s.grid().unwrap().values(), &values);
}

#[test]
fn flagging_twice_changes_the_grid_once() {
    let mut s = session(EditOutput::Browse);
    s.load_file(flat_line()).unwrap();
    s.setup_grid().unwrap();

    s.on_edit(0, 1, 0, BeamFlag::ManualFlag, FlushPolicy::NoFlush)
        .unwrap();
    let once = s.grid().unwrap().total_weight();
    s.on_edit(0, 1, 0, BeamFlag::FilterFlag, FlushPolicy::NoFlush)
        .unwrap();
    assert_eq!(s.grid().unwrap().total_weight(), once);
    assert_eq!(s.store().ping(0, 1).unwrap().flags[0], BeamFlag::FilterFlag);
    assert_eq!(s.edit_log(0).unwrap().len(), 2);
}

#[test]
fn replaying_the_log_reproduces_session_flags() {
    let mut s = session(EditOutput::Browse);
    s.load_file(flat_line()).unwrap();
    s.setup_grid().unwrap();
    let edits = [
        (0, 0, BeamFlag::ManualFlag),
        (1, 2, BeamFlag::FilterFlag),
        (0, 0, BeamFlag::Ok),
        (1, 1, BeamFlag::SonarFlag),
    ];
    for (ping, beam, flag) in edits {
        s.on_edit(0, ping, beam, flag, FlushPolicy::NoFlush).unwrap();
    }

    let file = s.store().file(0).unwrap();
    let log = EditLog::from_records(s.edit_log(0).unwrap().records().to_vec());
    let (flags, report) = log.apply(&file.ping_keys(), &file.original_flags());
    assert_eq!(report.applied, edits.len());
    assert_eq!(flags, file.current_flags());
    assert_eq!(flags[1][1], BeamFlag::ManualFlag);
}

#[test]
fn edits_persist_next_to_the_swath_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("line_0001.csv");
    let mut text = COLUMNS.join(",");
    text.push('\n');
    for (ping, lat) in [(0, 0.0), (1, 0.00001)] {
        for across in [-1.5, 0.0, 1.5] {
            text.push_str(&format!(
                "{ping},{},0.0,{lat},0,0,0,0,0,0,10,10,{across},0,20,0\n",
                1_000 + ping
            ));
        }
    }
    fs::write(&path, text).unwrap();

    {
        let mut s = session(EditOutput::Write);
        s.load_file(read_soundings_file(&path).unwrap()).unwrap();
        s.on_edit(0, 1, 2, BeamFlag::ManualFlag, FlushPolicy::Flush)
            .unwrap();
    }

    let esf = read_esf(&esf_path(&path)).unwrap();
    assert_eq!(esf.records.len(), 1);
    assert_eq!(esf.records[0].action, EditAction::Flag);
    assert_eq!(esf.records[0].beam_index(), 2);
    assert_eq!(esf.records[0].time_d, 1_001.0);

    let mut s = session(EditOutput::Browse);
    let (index, report) = s.load_file(read_soundings_file(&path).unwrap()).unwrap();
    assert_eq!(index, 0);
    assert_eq!(report.applied, 1);
    assert_eq!(report.skipped(), 0);
    assert_eq!(s.store().ping(0, 1).unwrap().flags[2], BeamFlag::ManualFlag);
    assert_eq!(s.edit_log(0).unwrap().len(), 1);

    // browsing leaves the log untouched
    s.on_edit(0, 0, 0, BeamFlag::ManualFlag, FlushPolicy::Flush)
        .unwrap();
    assert_eq!(read_esf(&esf_path(&path)).unwrap().records.len(), 1);
}

#[test]
fn bias_change_moves_soundings_and_keeps_grid_consistent() {
    let mut s = session(EditOutput::Browse);
    s.load_file(flat_line()).unwrap();
    s.setup_grid().unwrap();
    let before = s.store().ping(0, 0).unwrap().bathcorr.clone();

    s.on_bias_changed(BiasParameters {
        roll: 5.0,
        ..Default::default()
    })
    .unwrap();
    let after = &s.store().ping(0, 0).unwrap().bathcorr;
    assert_abs_diff_eq!(before[1], 10.0, epsilon = 1e-9);
    assert_abs_diff_eq!(after[1], 10.0 * 5.0f64.to_radians().cos(), epsilon = 1e-9);
    assert!((after[0] - before[0]).abs() > 0.01);
    assert!((after[2] - before[2]).abs() > 0.01);
    assert_relative_eq!(
        s.grid().unwrap().total_weight(),
        mass_of_ok_soundings(&s),
        max_relative = 1e-9
    );
}

#[test]
fn selection_picks_soundings_by_region() {
    let mut s = session(EditOutput::Browse);
    s.load_file(flat_line()).unwrap();
    s.setup_grid().unwrap();

    let all = s
        .select(&Region::Quad {
            corners: [(-1e4, -1e4), (1e4, -1e4), (1e4, 1e4), (-1e4, 1e4)],
        })
        .unwrap()
        .len();
    assert_eq!(all, 6);

    s.on_edit(0, 0, 0, BeamFlag::ManualFlag, FlushPolicy::NoFlush)
        .unwrap();
    let selection = s.select(&Region::Nav { pings: vec![(0, 0)] }).unwrap();
    assert_eq!(selection.len(), 3);
    assert_eq!(selection.num_flagged(), 1);

    let none = s
        .select(&Region::Quad {
            corners: [(5e4, 5e4), (6e4, 5e4), (6e4, 6e4), (5e4, 6e4)],
        })
        .unwrap();
    assert!(none.is_empty());
}

/// Cell value the grid should hold for `samples` alone.
fn cell_value_from(grid: &IncrementalGrid, samples: &[BeamSample], cell: (usize, usize)) -> f64 {
    let (mut sum, mut weight) = (0i128, 0i128);
    for sample in samples {
        for (i, j, c) in grid.contributions(sample) {
            if (i, j) == cell {
                sum += c.sum;
                weight += c.weight;
            }
        }
    }
    sum as f64 / weight as f64
}

#[test]
fn stacked_soundings_follow_flag_and_unflag() {
    let config = SessionConfig {
        edit_output: EditOutput::Browse,
        ..Default::default()
    };
    let mut s = EditorSession::new(config, Box::new(NullObserver))
        .with_projection(Box::new(LocalProjection::new(-0.0005, -0.0005)));
    s.load_file(stacked_pings()).unwrap();
    s.setup_grid().unwrap();

    let samples = s.store().file(0).unwrap().ok_samples();
    assert_eq!(samples.len(), 6);
    let grid = s.grid().unwrap();
    let center = grid.geometry().cell_of(samples[0].x, samples[0].y).unwrap();
    assert_eq!(center, (1, 1));
    let before = grid.cell(1, 1).unwrap();
    assert_abs_diff_eq!(before.depth().unwrap(), 10.0, epsilon = 0.05);

    s.on_edit(0, 0, 0, BeamFlag::ManualFlag, FlushPolicy::Flush)
        .unwrap();
    let remaining = s.store().file(0).unwrap().ok_samples();
    assert_eq!(remaining.len(), 5);
    let grid = s.grid().unwrap();
    let flagged = grid.cell(1, 1).unwrap();
    assert!(flagged.weight < before.weight);
    assert_relative_eq!(
        flagged.value.unwrap(),
        cell_value_from(grid, &remaining, center),
        max_relative = 1e-12
    );

    s.on_edit(0, 0, 0, BeamFlag::Ok, FlushPolicy::Flush).unwrap();
    assert_eq!(s.grid().unwrap().cell(1, 1).unwrap(), before);
}

#[test]
fn roll_search_recovers_logged_roll_error() {
    let mut s = session(EditOutput::Browse);
    s.load_file(rolled_line("north", 0.0, 3_000.0)).unwrap();
    s.load_file(rolled_line("south", 180.0, 4_000.0)).unwrap();
    s.setup_grid().unwrap();
    s.select(&Region::Quad {
        corners: [(-1e4, -1e4), (1e4, -1e4), (1e4, 1e4), (-1e4, 1e4)],
    })
    .unwrap();

    let result = s
        .optimize_bias(OptimizeMode::from_bits(OptimizeMode::ROLL))
        .unwrap();
    assert_abs_diff_eq!(result.bias.roll, 2.0, epsilon = 0.05);
    assert_eq!(result.bias.pitch, 0.0);
    assert!(result.evaluations > 0);
    assert!(result.score.unwrap().variance < 1e-6);
    // nothing is applied
    assert_eq!(s.bias(), BiasParameters::default());
}
