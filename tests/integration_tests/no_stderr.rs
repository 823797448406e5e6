// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Successful runs shouldn't write anything to stderr.

use tempfile::TempDir;

use crate::*;

#[test]
fn test_help_is_quiet() {
    for args in [vec!["--help"], vec!["abs-cal", "--help"], vec!["first-cal", "--help"]] {
        let cmd = abscal().args(&args).ok();
        assert!(cmd.is_ok(), "{args:?} failed");
        let (stdout, stderr) = get_cmd_output(cmd);
        assert!(!stdout.is_empty());
        assert!(stderr.is_empty(), "stderr wasn't empty: {stderr}");
    }
}

#[test]
fn test_abs_cal_is_quiet() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let data = write_bundle(&gain_corrupted_bundle(), tmp_dir.path(), "data.json");
    let sols_file = tmp_dir.path().join("sols.json");

    #[rustfmt::skip]
    let cmd = abscal()
        .args([
            "abs-cal",
            "--data", &format!("{}", data.display()),
            "--outputs", &format!("{}", sols_file.display()),
            "--no-progress-bars",
        ])
        .ok();
    assert!(cmd.is_ok(), "abs-cal failed: {}", cmd.err().unwrap());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.is_empty(), "stderr wasn't empty: {stderr}");
}

#[test]
fn test_first_cal_is_quiet() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let data = write_bundle(&delay_corrupted_bundle(), tmp_dir.path(), "data.json");
    let sols_file = tmp_dir.path().join("sols.json");

    #[rustfmt::skip]
    let cmd = abscal()
        .args([
            "first-cal",
            "--data", &format!("{}", data.display()),
            "--outputs", &format!("{}", sols_file.display()),
            "--no-progress-bars",
        ])
        .ok();
    assert!(cmd.is_ok(), "first-cal failed: {}", cmd.err().unwrap());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.is_empty(), "stderr wasn't empty: {stderr}");
}
