// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Reading visibilities.
//!
//! Visibilities come in a "bundle": a JSON file with per-baseline (time,
//! frequency) waterfalls of data and (optionally) model, weights and flags,
//! together with the frequencies, times and antenna positions. Complex
//! numbers are `[re, im]` pairs and waterfalls are nested arrays with times as
//! the outer dimension.

mod error;

pub use error::VisReadError;

use std::{fs::File, io::BufReader, path::Path};

use indexmap::IndexMap;
use log::{debug, info};
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    c64,
    container::{BaselineKey, ContainerError, DataContainer},
    pol::Pol,
};

/// One baseline of a [`VisBundle`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineRecord {
    pub ant1: usize,
    pub ant2: usize,
    pub pol: Pol,
    pub data: Vec<Vec<c64>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<Vec<Vec<c64>>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wgts: Option<Vec<Vec<f64>>>,

    /// Flagged pixels get zero weight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flags: Option<Vec<Vec<bool>>>,
}

/// Visibilities and their metadata, as stored on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisBundle {
    /// \[Hz\]
    #[serde(default)]
    pub freqs: Option<Vec<f64>>,

    /// \[Julian date\]
    #[serde(default)]
    pub times: Option<Vec<f64>>,

    /// Antenna positions \[metres\], (East, North, Up).
    #[serde(default)]
    pub antpos: Option<IndexMap<usize, Vec<f64>>>,

    pub baselines: Vec<BaselineRecord>,
}

/// The contents of a [`VisBundle`] as baseline containers.
#[derive(Debug, Clone)]
pub struct VisData {
    pub data: DataContainer<c64>,

    /// Only baselines with a model are present. `None` if no baseline has a
    /// model.
    pub model: Option<DataContainer<c64>>,

    /// Weights for every baseline of `data`, with flagged pixels zeroed.
    pub wgts: DataContainer<f64>,

    /// `None` if no baseline has flags.
    pub flags: Option<DataContainer<bool>>,

    pub freqs: Option<Vec<f64>>,
    pub times: Option<Vec<f64>>,
    pub antpos: Option<IndexMap<usize, Vec<f64>>>,
}

impl VisBundle {
    /// Read a bundle from a file. The format is determined by the file's
    /// extension; only ".json" is supported.
    pub fn read<P: AsRef<Path>>(file: P) -> Result<VisBundle, VisReadError> {
        let file = file.as_ref();
        match file.extension().and_then(|e| e.to_str()) {
            Some("json") => {
                let reader = BufReader::new(File::open(file)?);
                let bundle: VisBundle = serde_json::from_reader(reader)?;
                debug!(
                    "Read {} baselines from {}",
                    bundle.baselines.len(),
                    file.display()
                );
                Ok(bundle)
            }
            ext => Err(VisReadError::UnsupportedExt {
                ext: ext.unwrap_or("<no extension>").to_string(),
            }),
        }
    }

    /// Convert the nested arrays into baseline containers. All waterfalls
    /// must have the same shape.
    pub fn into_vis_data(self) -> Result<VisData, VisReadError> {
        if self.baselines.is_empty() {
            return Err(VisReadError::NoBaselines);
        }

        let mut data = DataContainer::new();
        let mut model = DataContainer::new();
        let mut wgts = DataContainer::new();
        let mut flags = DataContainer::new();
        for record in self.baselines {
            let key = BaselineKey::new(record.ant1, record.ant2, record.pol);
            let d = to_waterfall(key, "data", record.data)?;
            let dim = d.dim();
            let mut w = match record.wgts {
                Some(w) => check_shape(key, dim, to_waterfall(key, "weights", w)?)?,
                None => Array2::ones(dim),
            };
            if let Some(f) = record.flags {
                let f = check_shape(key, dim, to_waterfall(key, "flags", f)?)?;
                azip!((w in &mut w, &f in &f) {
                    if f {
                        *w = 0.0;
                    }
                });
                flags.insert(key, f)?;
            }
            if let Some(m) = record.model {
                model.insert(key, check_shape(key, dim, to_waterfall(key, "model", m)?)?)?;
            }
            data.insert(key, d)?;
            wgts.insert(key, w)?;
        }
        info!(
            "Got {} baselines of shape {:?}",
            data.len(),
            data.shape().unwrap_or_default()
        );

        Ok(VisData {
            data,
            model: if model.is_empty() { None } else { Some(model) },
            wgts,
            flags: if flags.is_empty() { None } else { Some(flags) },
            freqs: self.freqs,
            times: self.times,
            antpos: self.antpos,
        })
    }
}

/// Read a visibility bundle and convert it to baseline containers.
pub fn read_vis_bundle<P: AsRef<Path>>(file: P) -> Result<VisData, VisReadError> {
    VisBundle::read(file)?.into_vis_data()
}

fn to_waterfall<T>(
    key: BaselineKey,
    what: &'static str,
    rows: Vec<Vec<T>>,
) -> Result<Array2<T>, VisReadError> {
    let num_rows = rows.len();
    let num_cols = rows.first().map(|r| r.len()).unwrap_or(0);
    let mut flat = Vec::with_capacity(num_rows * num_cols);
    for (row, values) in rows.into_iter().enumerate() {
        if values.len() != num_cols {
            return Err(VisReadError::Ragged {
                key,
                what,
                row,
                expected: num_cols,
                got: values.len(),
            });
        }
        flat.extend(values);
    }
    Ok(Array2::from_shape_vec((num_rows, num_cols), flat)?)
}

/// Weights, flags and models must match the shape of the data.
fn check_shape<T>(
    key: BaselineKey,
    dim: (usize, usize),
    waterfall: Array2<T>,
) -> Result<Array2<T>, ContainerError> {
    if waterfall.dim() == dim {
        Ok(waterfall)
    } else {
        Err(ContainerError::ShapeMismatch {
            key,
            expected: dim,
            got: waterfall.dim(),
        })
    }
}
