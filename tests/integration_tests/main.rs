// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Integration tests.
//!
//! Some help for laying out these tests was taken from:
//! https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html

mod abs_cal;
mod first_cal;
mod no_stderr;

use std::{
    path::{Path, PathBuf},
    process::Output,
    str::from_utf8,
};

use assert_cmd::{output::OutputError, Command};

use abscal::{
    c64,
    io::{BaselineRecord, VisBundle},
    Pol,
};

const NUM_TIMES: usize = 2;
const NUM_FREQS: usize = 32;

fn abscal() -> Command {
    Command::cargo_bin("abscal").unwrap()
}

fn get_cmd_output(result: Result<Output, OutputError>) -> (String, String) {
    let output = match result {
        Ok(o) => o,
        Err(o) => o.as_output().unwrap().clone(),
    };
    (
        from_utf8(&output.stdout).unwrap().to_string(),
        from_utf8(&output.stderr).unwrap().to_string(),
    )
}

fn freqs() -> Vec<f64> {
    (0..NUM_FREQS).map(|i| 150e6 + i as f64 * 1e6).collect()
}

fn phasor(phase: f64) -> c64 {
    let (s, c) = phase.sin_cos();
    c64::new(c, s)
}

/// The multiply gain of an antenna used to corrupt test data.
fn true_gain(ant: usize) -> c64 {
    (1.0 + 0.1 * ant as f64) * phasor(0.3 * ant as f64 - 0.4)
}

/// A sky model that varies over time and frequency.
fn sky(i: usize, j: usize, t: usize, f: usize) -> c64 {
    c64::new(
        2.0 + 0.05 * f as f64 + 0.1 * (i + j) as f64,
        0.3 * t as f64 - 0.1 * j as f64,
    )
}

fn waterfall<F: Fn(usize, usize) -> c64>(f: F) -> Vec<Vec<c64>> {
    (0..NUM_TIMES)
        .map(|t| (0..NUM_FREQS).map(|ch| f(t, ch)).collect())
        .collect()
}

/// Four antennas whose data are the model divided by `true_gain`s, i.e.
/// `true_gain(i) conj(true_gain(j)) data = model`.
fn gain_corrupted_bundle() -> VisBundle {
    let mut baselines = vec![];
    for i in 0..4 {
        for j in i + 1..4 {
            let g = true_gain(i) * true_gain(j).conj();
            baselines.push(BaselineRecord {
                ant1: i,
                ant2: j,
                pol: Pol::XX,
                data: waterfall(|t, f| sky(i, j, t, f) / g),
                model: Some(waterfall(|t, f| sky(i, j, t, f))),
                wgts: None,
                flags: None,
            });
        }
    }
    VisBundle {
        freqs: Some(freqs()),
        times: Some(vec![2459000.1, 2459000.2]),
        antpos: None,
        baselines,
    }
}

const DELAYS: [f64; 5] = [0.0, 4e-9, -3e-9, 7e-9, 1e-9];

/// Five antennas on a line, 14 m apart, with instrumental delays `DELAYS`.
fn delay_corrupted_bundle() -> VisBundle {
    let freqs = freqs();
    let mut baselines = vec![];
    for i in 0..5 {
        for j in i + 1..5 {
            let sep = (j - i) as f64;
            baselines.push(BaselineRecord {
                ant1: i,
                ant2: j,
                pol: Pol::XX,
                data: waterfall(|_, f| {
                    c64::new(1.0 + sep, 0.5 * sep)
                        * phasor(std::f64::consts::TAU * (DELAYS[i] - DELAYS[j]) * freqs[f])
                }),
                model: None,
                wgts: None,
                flags: None,
            });
        }
    }
    VisBundle {
        freqs: Some(freqs),
        times: None,
        antpos: Some((0..5).map(|a| (a, vec![14.0 * a as f64, 0.0, 0.0])).collect()),
        baselines,
    }
}

fn write_bundle(bundle: &VisBundle, dir: &Path, name: &str) -> PathBuf {
    let file = dir.join(name);
    std::fs::write(&file, serde_json::to_string(bundle).unwrap()).unwrap();
    file
}
