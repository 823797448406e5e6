// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Calibration solutions as JSON.
//!
//! JSON has no NaN, so unsolved gains are written as `null`. Complex numbers
//! are `[re, im]` pairs and every waterfall is an ndarray (shape and data).

use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

use indexmap::IndexMap;
use log::debug;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};

use super::{CalSolutions, GainConvention, SolutionsReadError, SolutionsWriteError};
use crate::{c64, pol::AntPol};

#[derive(Serialize, Deserialize)]
struct SolutionsFile {
    convention: GainConvention,
    freqs: Option<Vec<f64>>,
    times: Option<Vec<f64>>,
    antennas: Vec<AntennaSolutions>,
}

#[derive(Serialize, Deserialize)]
struct AntennaSolutions {
    ant: usize,
    pol: AntPol,
    gains: Array2<Option<c64>>,
    flags: Array2<bool>,
}

pub(super) fn write(sols: &CalSolutions, file: &Path) -> Result<(), SolutionsWriteError> {
    let antennas = sols
        .gains
        .iter()
        .map(|(&(ant, pol), gains)| AntennaSolutions {
            ant,
            pol,
            gains: gains.mapv(|g| if g.is_finite() { Some(g) } else { None }),
            flags: sols
                .flags
                .get(&(ant, pol))
                .cloned()
                .unwrap_or_else(|| gains.mapv(|g| !g.is_finite())),
        })
        .collect();
    let contents = SolutionsFile {
        convention: sols.convention,
        freqs: sols.freqs.clone(),
        times: sols.times.clone(),
        antennas,
    };

    let mut writer = BufWriter::new(File::create(file)?);
    serde_json::to_writer_pretty(&mut writer, &contents)?;
    writer.flush()?;
    debug!("Wrote calibration solutions to {}", file.display());
    Ok(())
}

pub(super) fn read(file: &Path) -> Result<CalSolutions, SolutionsReadError> {
    let reader = BufReader::new(File::open(file)?);
    let contents: SolutionsFile = serde_json::from_reader(reader)?;

    let mut shape = None;
    let mut gains = IndexMap::with_capacity(contents.antennas.len());
    let mut flags = IndexMap::with_capacity(contents.antennas.len());
    for AntennaSolutions {
        ant,
        pol,
        gains: ant_gains,
        flags: ant_flags,
    } in contents.antennas
    {
        let dim = ant_gains.dim();
        let expected = *shape.get_or_insert(dim);
        for (what, expected, actual) in [
            ("times", expected.0, dim.0),
            ("frequencies", expected.1, dim.1),
            ("flag times", dim.0, ant_flags.len_of(Axis(0))),
            ("flag frequencies", dim.1, ant_flags.len_of(Axis(1))),
        ] {
            if expected != actual {
                return Err(SolutionsReadError::BadShape {
                    thing: format!("antenna {ant} ({pol}) {what}"),
                    expected,
                    actual,
                });
            }
        }
        if gains.contains_key(&(ant, pol)) {
            return Err(SolutionsReadError::DuplicateAntenna { ant, pol });
        }
        gains.insert(
            (ant, pol),
            ant_gains.mapv(|g| g.unwrap_or(c64::new(f64::NAN, f64::NAN))),
        );
        flags.insert((ant, pol), ant_flags);
    }

    if let Some((num_times, num_freqs)) = shape {
        for (thing, axis, expected) in [
            ("frequencies", &contents.freqs, num_freqs),
            ("times", &contents.times, num_times),
        ] {
            if let Some(axis) = axis {
                if axis.len() != expected {
                    return Err(SolutionsReadError::BadShape {
                        thing: thing.to_string(),
                        expected,
                        actual: axis.len(),
                    });
                }
            }
        }
    }

    debug!(
        "Read {} antenna solutions from {}",
        gains.len(),
        file.display()
    );
    Ok(CalSolutions {
        gains,
        flags,
        freqs: contents.freqs,
        times: contents.times,
        convention: contents.convention,
    })
}
