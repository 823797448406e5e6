// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use criterion::*;
use indexmap::IndexMap;
use ndarray::prelude::*;

use abscal::{
    c64, fft_delay, get_reds, AbsCal, AbsCalParams, BaselineKey, DataContainer, DelayOpts,
    FirstCal, Gauge, Pol, RedundantInfo,
};

const NUM_TIMES: usize = 4;
const NUM_FREQS: usize = 256;

fn freqs() -> Vec<f64> {
    (0..NUM_FREQS).map(|i| 100e6 + i as f64 * 100e3).collect()
}

fn phasor(phase: f64) -> c64 {
    let (s, c) = phase.sin_cos();
    c64::new(c, s)
}

/// Visibilities on a line of antennas, corrupted by per-antenna delays.
fn line_array(num_ants: usize) -> (DataContainer<c64>, IndexMap<usize, Vec<f64>>) {
    let freqs = freqs();
    let antpos: IndexMap<usize, Vec<f64>> = (0..num_ants)
        .map(|a| (a, vec![14.0 * a as f64, 0.0, 0.0]))
        .collect();
    let mut data = DataContainer::new();
    for i in 0..num_ants {
        for j in i + 1..num_ants {
            let sky = c64::new(1.0 + (j - i) as f64, 0.3 * (j - i) as f64);
            let tau = (i as f64 - j as f64) * 1e-9;
            let vis = Array2::from_shape_fn((NUM_TIMES, NUM_FREQS), |(_, f)| {
                sky * phasor(std::f64::consts::TAU * tau * freqs[f])
            });
            data.insert(BaselineKey::new(i, j, Pol::XX), vis).unwrap();
        }
    }
    (data, antpos)
}

fn delays(c: &mut Criterion) {
    let freqs = freqs();
    let vis = Array2::from_shape_fn((NUM_TIMES, NUM_FREQS), |(_, f)| {
        phasor(std::f64::consts::TAU * 123.4e-9 * freqs[f])
    });
    let wgts = Array2::ones(vis.dim());
    let opts = DelayOpts::default();
    c.bench_function("fft_delay", |b| {
        b.iter(|| fft_delay(vis.view(), wgts.view(), &freqs, &opts).unwrap())
    });
}

fn abscal_steps(c: &mut Criterion) {
    let (data, antpos) = line_array(32);
    let model = data.mapv(|v| c64::new(v.norm(), 0.0));
    let params = AbsCalParams {
        tip_tilt: true,
        abs_amp: true,
        delay: true,
        ..Default::default()
    };
    c.bench_function("abscal all steps, 32 antennas", |b| {
        b.iter(|| {
            let mut abscal = AbsCal::new(
                &model,
                &data,
                None,
                Some(&antpos),
                Some(freqs()),
                None,
            )
            .unwrap();
            abscal.run(&params).unwrap()
        })
    });
}

fn firstcal(c: &mut Criterion) {
    let (data, antpos) = line_array(16);
    let freqs = freqs();
    let info = RedundantInfo::new(get_reds(&antpos, 1.0)).unwrap();
    let opts = DelayOpts::default();
    c.bench_function("firstcal, 16 antennas", |b| {
        b.iter(|| {
            FirstCal::new(&data, None, &freqs, &info, Pol::XX)
                .unwrap()
                .run(&opts, Gauge::MinNorm)
                .unwrap()
        })
    });
}

criterion_group!(benches, delays, abscal_steps, firstcal);
criterion_main!(benches);
