// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;
use tempfile::TempDir;

use abscal::{c64, AntPol, CalSolutions};

use crate::*;

/// Apply multiply gains to the uncalibrated data of a baseline.
fn calibrated(sols: &CalSolutions, i: usize, j: usize, t: usize, f: usize) -> c64 {
    let freqs = freqs();
    let sep = (j - i) as f64;
    let data = c64::new(1.0 + sep, 0.5 * sep)
        * phasor(std::f64::consts::TAU * (DELAYS[i] - DELAYS[j]) * freqs[f]);
    sols.gains[&(i, AntPol::X)][(t, f)] * sols.gains[&(j, AntPol::X)][(t, f)].conj() * data
}

#[test]
fn test_first_cal_redundant_baselines_agree() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let data = write_bundle(&delay_corrupted_bundle(), tmp_dir.path(), "data.json");
    let sols_file = tmp_dir.path().join("sols.json");

    #[rustfmt::skip]
    let cmd = abscal()
        .args([
            "first-cal",
            "--data", &format!("{}", data.display()),
            "--outputs", &format!("{}", sols_file.display()),
            "--refant", "0",
            "--no-progress-bars",
        ])
        .ok();
    assert!(cmd.is_ok(), "first-cal failed: {}", cmd.err().unwrap());

    let sols = CalSolutions::read(&sols_file).unwrap();
    assert_eq!(sols.gains.len(), 5);
    // The reference antenna has no delay.
    for g in sols.gains[&(0, AntPol::X)].iter() {
        assert_abs_diff_eq!(*g, c64::new(1.0, 0.0), epsilon = 1e-12);
    }

    // Delay calibration leaves a phase gradient across the array, but
    // baselines of the same separation end up with the same visibilities.
    for t in 0..NUM_TIMES {
        for f in 0..NUM_FREQS {
            for sep in 1..4 {
                let reference = calibrated(&sols, 0, sep, t, f);
                for i in 1..5 - sep {
                    assert_abs_diff_eq!(
                        calibrated(&sols, i, i + sep, t, f),
                        reference,
                        epsilon = 1e-3
                    );
                }
            }
        }
    }
}

#[test]
fn test_first_cal_dry_run() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let data = write_bundle(&delay_corrupted_bundle(), tmp_dir.path(), "data.json");
    let sols_file = tmp_dir.path().join("sols.json");

    #[rustfmt::skip]
    let cmd = abscal()
        .args([
            "firstcal",
            "--data", &format!("{}", data.display()),
            "--outputs", &format!("{}", sols_file.display()),
            "--dry-run",
        ])
        .ok();
    assert!(cmd.is_ok(), "first-cal failed: {}", cmd.err().unwrap());
    let (stdout, _) = get_cmd_output(cmd);
    assert!(stdout.contains("baseline pairs"), "{stdout}");
    assert!(!sols_file.exists());
}

#[test]
fn test_first_cal_errors() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");

    // No antenna positions.
    let mut bundle = delay_corrupted_bundle();
    bundle.antpos = None;
    let data = write_bundle(&bundle, tmp_dir.path(), "data.json");
    let cmd = abscal()
        .args(["first-cal", "--data", &format!("{}", data.display())])
        .ok();
    assert!(cmd.is_err());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.contains("antenna positions"), "{stderr}");

    // Cross-polarised visibilities can't be used.
    let data = write_bundle(&delay_corrupted_bundle(), tmp_dir.path(), "data2.json");
    let cmd = abscal()
        .args([
            "first-cal",
            "--data",
            &format!("{}", data.display()),
            "--pol",
            "xy",
        ])
        .ok();
    assert!(cmd.is_err());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.contains("xy"), "{stderr}");

    // Solutions can only be written as JSON.
    let cmd = abscal()
        .args([
            "first-cal",
            "--data",
            &format!("{}", data.display()),
            "--outputs",
            "sols.fits",
        ])
        .ok();
    assert!(cmd.is_err());
}
