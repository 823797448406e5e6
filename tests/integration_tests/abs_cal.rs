// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;
use indoc::formatdoc;
use tempfile::TempDir;

use abscal::{AntPol, CalSolutions, GainConvention};

use crate::*;

/// Calibrated data should match the model.
fn assert_calibrates(sols: &CalSolutions) {
    for i in 0..4 {
        for j in i + 1..4 {
            let g_i = &sols.gains[&(i, AntPol::X)];
            let g_j = &sols.gains[&(j, AntPol::X)];
            let g = true_gain(i) * true_gain(j).conj();
            for t in 0..NUM_TIMES {
                for f in 0..NUM_FREQS {
                    let data = sky(i, j, t, f) / g;
                    let calibrated = g_i[(t, f)] * g_j[(t, f)].conj() * data;
                    assert_abs_diff_eq!(calibrated, sky(i, j, t, f), epsilon = 1e-10);
                }
            }
        }
    }
}

#[test]
fn test_abs_cal_amp_and_phase() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let data = write_bundle(&gain_corrupted_bundle(), tmp_dir.path(), "data.json");
    let sols_file = tmp_dir.path().join("sols.json");

    #[rustfmt::skip]
    let cmd = abscal()
        .args([
            "abs-cal",
            "--data", &format!("{}", data.display()),
            "--outputs", &format!("{}", sols_file.display()),
            "--refant", "0",
            "--no-progress-bars",
        ])
        .ok();
    assert!(cmd.is_ok(), "abs-cal failed: {}", cmd.err().unwrap());

    let sols = CalSolutions::read(&sols_file).unwrap();
    assert_eq!(sols.convention, GainConvention::Multiply);
    assert_eq!(sols.gains.len(), 4);
    assert_eq!(sols.freqs.as_ref().map(|f| f.len()), Some(NUM_FREQS));
    assert!(sols.flags.values().all(|f| f.iter().all(|f| !f)));
    // The reference antenna has zero phase.
    for g in sols.gains[&(0, AntPol::X)].iter() {
        assert_abs_diff_eq!(g.arg(), 0.0, epsilon = 1e-10);
    }
    assert_calibrates(&sols);
}

#[test]
fn test_abs_cal_divide_convention() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let data = write_bundle(&gain_corrupted_bundle(), tmp_dir.path(), "data.json");
    let sols_file = tmp_dir.path().join("sols.json");

    #[rustfmt::skip]
    let cmd = abscal()
        .args([
            "abs-cal",
            "--data", &format!("{}", data.display()),
            "--outputs", &format!("{}", sols_file.display()),
            "--convention", "divide",
            "--merge-time",
            "--no-progress-bars",
        ])
        .ok();
    assert!(cmd.is_ok(), "abs-cal failed: {}", cmd.err().unwrap());

    let sols = CalSolutions::read(&sols_file).unwrap();
    assert_eq!(sols.convention, GainConvention::Divide);
    assert_calibrates(&sols.to_convention(GainConvention::Multiply));
}

#[test]
fn test_abs_cal_separate_model_and_args_file() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let bundle = gain_corrupted_bundle();
    // Move the models into their own bundle.
    let mut model_bundle = bundle.clone();
    for record in model_bundle.baselines.iter_mut() {
        record.data = record.model.take().unwrap();
    }
    let mut data_bundle = bundle;
    for record in data_bundle.baselines.iter_mut() {
        record.model = None;
    }
    let data = write_bundle(&data_bundle, tmp_dir.path(), "data.json");
    let model = write_bundle(&model_bundle, tmp_dir.path(), "model.json");
    let sols_file = tmp_dir.path().join("sols.json");
    let ignored_sols_file = tmp_dir.path().join("ignored.json");

    let args_file = tmp_dir.path().join("args.toml");
    std::fs::write(
        &args_file,
        formatdoc! {r#"
            [data]
            data = "{data}"
            model = "{model}"

            [abs-cal]
            refant = 1

            [outputs]
            solutions = "{ignored}"
        "#,
            data = data.display(),
            model = model.display(),
            ignored = ignored_sols_file.display(),
        },
    )
    .unwrap();

    // The output on the command line wins over the arguments file.
    #[rustfmt::skip]
    let cmd = abscal()
        .args([
            "abs-cal",
            &format!("{}", args_file.display()),
            "--outputs", &format!("{}", sols_file.display()),
            "--no-progress-bars",
        ])
        .ok();
    assert!(cmd.is_ok(), "abs-cal failed: {}", cmd.err().unwrap());
    assert!(!ignored_sols_file.exists());

    let sols = CalSolutions::read(&sols_file).unwrap();
    for g in sols.gains[&(1, AntPol::X)].iter() {
        assert_abs_diff_eq!(g.arg(), 0.0, epsilon = 1e-10);
    }
    assert_calibrates(&sols);
}

#[test]
fn test_abs_cal_dry_run() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let data = write_bundle(&gain_corrupted_bundle(), tmp_dir.path(), "data.json");
    let sols_file = tmp_dir.path().join("sols.json");

    #[rustfmt::skip]
    let cmd = abscal()
        .args([
            "abs-cal",
            "--data", &format!("{}", data.display()),
            "--outputs", &format!("{}", sols_file.display()),
            "--dry-run",
        ])
        .ok();
    assert!(cmd.is_ok(), "abs-cal failed: {}", cmd.err().unwrap());
    let (stdout, _) = get_cmd_output(cmd);
    assert!(stdout.contains("Dry run"), "{stdout}");
    assert!(!sols_file.exists());
}

#[test]
fn test_abs_cal_errors() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let mut bundle = gain_corrupted_bundle();
    for record in bundle.baselines.iter_mut() {
        record.model = None;
    }
    let data = write_bundle(&bundle, tmp_dir.path(), "data.json");

    let cmd = abscal()
        .args(["abs-cal", "--data", &format!("{}", data.display())])
        .ok();
    assert!(cmd.is_err());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.contains("No model visibilities"), "{stderr}");

    // Tip-tilt needs antenna positions.
    let data = write_bundle(&gain_corrupted_bundle(), tmp_dir.path(), "data2.json");
    let cmd = abscal()
        .args([
            "abs-cal",
            "--data",
            &format!("{}", data.display()),
            "--tip-tilt",
            "--outputs",
            &format!("{}", tmp_dir.path().join("sols.json").display()),
        ])
        .ok();
    assert!(cmd.is_err());

    let cmd = abscal()
        .args([
            "abs-cal",
            "--data",
            &format!("{}", data.display()),
            "--delay-kernel",
            "2",
            "3",
        ])
        .ok();
    assert!(cmd.is_err());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.contains("delay kernel"), "{stderr}");
}

#[test]
fn test_abs_cal_combined_steps() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let mut bundle = gain_corrupted_bundle();
    bundle.antpos = Some(
        [(0, [0.0, 0.0]), (1, [14.0, 3.0]), (2, [-5.0, 20.0]), (3, [30.0, -8.0])]
            .into_iter()
            .map(|(a, p)| (a, p.to_vec()))
            .collect(),
    );
    let data = write_bundle(&bundle, tmp_dir.path(), "data.json");

    for (name, extra_args) in [
        ("delay", vec!["--delay"]),
        ("tip_tilt", vec!["--tip-tilt"]),
        ("abs_amp", vec!["--abs-amp"]),
        ("everything", vec!["--delay", "--tip-tilt", "--abs-amp"]),
    ] {
        let sols_file = tmp_dir.path().join(format!("{name}.json"));
        let mut args = vec![
            "abs-cal".to_string(),
            "--data".to_string(),
            format!("{}", data.display()),
            "--outputs".to_string(),
            format!("{}", sols_file.display()),
            "--refant".to_string(),
            "0".to_string(),
            "--no-progress-bars".to_string(),
        ];
        args.extend(extra_args.iter().map(|a| a.to_string()));
        let cmd = abscal().args(&args).ok();
        assert!(cmd.is_ok(), "abs-cal {extra_args:?} failed: {}", cmd.err().unwrap());

        let sols = CalSolutions::read(&sols_file).unwrap();
        assert!(sols.flags.values().all(|f| f.iter().all(|f| !f)));
        assert_calibrates(&sols);
    }
}
