// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Arguments shared by subcommands, e.g. both `abs-cal` and `first-cal` take a
//! visibility bundle as input and search for delays.


use std::{path::PathBuf, str::FromStr};

use clap::Parser;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};
use thiserror::Error;

use crate::{
    delay::{DelayOpts, Window},
    io::{read_vis_bundle, VisData, VisReadError},
    solutions::{GainConvention, CAL_SOLUTION_EXTENSIONS},
};

lazy_static::lazy_static! {
    pub(super) static ref ARG_FILE_TYPES_COMMA_SEPARATED: String = ArgFileTypes::iter().join(", ");

    pub(super) static ref ARG_FILE_HELP: String =
        format!("All arguments may be specified in a file. Any CLI arguments override arguments set in the file. Supported formats: {}", *ARG_FILE_TYPES_COMMA_SEPARATED);

    static ref WINDOW_HELP: String =
        format!("The window applied to spectra before searching for delays. Supported windows: {}. Default: {}", Window::iter().join(", "), Window::default());

    static ref CONVENTION_HELP: String =
        format!("The convention of the output gains. Supported conventions: {}. Default: {}", GainConvention::iter().join(", "), GainConvention::default());

    pub(super) static ref SOLS_OUTPUT_HELP: String =
        format!("Path to the output calibration solutions file. Supported formats: {}", *CAL_SOLUTION_EXTENSIONS);
}

#[derive(Debug, Display, EnumIter, EnumString)]
pub(super) enum ArgFileTypes {
    #[strum(serialize = "toml")]
    Toml,
    #[strum(serialize = "json")]
    Json,
}

macro_rules! unpack_arg_file {
    ($arg_file:expr) => ({
        use std::{fs::File, io::Read, str::FromStr};

        use crate::cli::common::{ArgFileTypes, ARG_FILE_TYPES_COMMA_SEPARATED};

        debug!("Attempting to parse argument file {}", $arg_file.display());

        let mut contents = String::new();
        let arg_file_type = $arg_file
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .and_then(|e| ArgFileTypes::from_str(&e).ok());

        match arg_file_type {
            Some(ArgFileTypes::Toml) => {
                debug!("Parsing toml file...");
                let mut fh = File::open(&$arg_file)?;
                fh.read_to_string(&mut contents)?;
                match toml::from_str(&contents) {
                    Ok(p) => p,
                    Err(err) => {
                        return Err(AbsCalCliError::ArgFile(format!(
                            "Couldn't decode toml structure from {:?}:\n{err}",
                            $arg_file
                        )))
                    }
                }
            }
            Some(ArgFileTypes::Json) => {
                debug!("Parsing json file...");
                let mut fh = File::open(&$arg_file)?;
                fh.read_to_string(&mut contents)?;
                match serde_json::from_str(&contents) {
                    Ok(p) => p,
                    Err(err) => {
                        return Err(AbsCalCliError::ArgFile(format!(
                            "Couldn't decode json structure from {:?}:\n{err}",
                            $arg_file
                        )))
                    }
                }
            }

            _ => {
                return Err(AbsCalCliError::ArgFile(format!(
                    "Argument file '{:?}' doesn't have a recognised file extension! Valid extensions are: {}", $arg_file, *ARG_FILE_TYPES_COMMA_SEPARATED)
                ))
            }
        }
    });
}

/// Visibility inputs.
#[derive(Parser, Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct InputVisArgs {
    /// Path to the visibility bundle (JSON) to be calibrated.
    #[clap(short, long, parse(from_os_str), help_heading = "INPUT DATA")]
    pub(super) data: Option<PathBuf>,

    /// Path to a visibility bundle whose visibilities are the model. If this
    /// isn't given, the models inside the data bundle are used.
    #[clap(short, long, parse(from_os_str), help_heading = "INPUT DATA")]
    pub(super) model: Option<PathBuf>,
}

impl InputVisArgs {
    pub(super) fn merge(self, other: Self) -> Self {
        Self {
            data: self.data.or(other.data),
            model: self.model.or(other.model),
        }
    }

    /// Read the data bundle, replacing its models with the visibilities of the
    /// model bundle (if given).
    pub(super) fn read(&self) -> Result<VisData, InputVisArgsError> {
        let data_file = self.data.as_ref().ok_or(InputVisArgsError::NoData)?;
        let mut vis = read_vis_bundle(data_file)?;
        if let Some(model_file) = &self.model {
            let model = read_vis_bundle(model_file)?;
            vis.model = Some(model.data);
        }
        Ok(vis)
    }
}

#[derive(Error, Debug)]
pub(super) enum InputVisArgsError {
    #[error("No input data was given!")]
    NoData,

    #[error(transparent)]
    VisRead(#[from] VisReadError),
}

/// Arguments controlling delay searches.
#[derive(Parser, Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct DelayArgs {
    #[clap(long, help = WINDOW_HELP.as_str(), help_heading = "DELAYS")]
    pub(super) delay_window: Option<String>,

    /// Don't refine the Fourier-peak delays with a fit to the residual phase.
    #[clap(long, help_heading = "DELAYS")]
    #[serde(default)]
    pub(super) no_fine_tune: bool,

    /// Sum spectra over time before searching for delays, finding a single
    /// delay for all times.
    #[clap(long, help_heading = "DELAYS")]
    #[serde(default)]
    pub(super) average_time: bool,

    /// Only fit the residual phase between these two frequencies [Hz].
    #[clap(long, number_of_values = 2, help_heading = "DELAYS")]
    pub(super) fit_band: Option<Vec<f64>>,
}

impl DelayArgs {
    pub(super) fn merge(self, other: Self) -> Self {
        Self {
            delay_window: self.delay_window.or(other.delay_window),
            no_fine_tune: self.no_fine_tune || other.no_fine_tune,
            average_time: self.average_time || other.average_time,
            fit_band: self.fit_band.or(other.fit_band),
        }
    }

    pub(super) fn parse(self) -> Result<DelayOpts, DelayArgsError> {
        let window = match self.delay_window {
            Some(w) => Window::from_str(&w).map_err(|_| DelayArgsError::BadWindow(w))?,
            None => Window::default(),
        };
        let fit_band = match self.fit_band.as_deref() {
            None => None,
            Some(&[lo, hi]) if lo < hi => Some((lo, hi)),
            Some(band) => return Err(DelayArgsError::BadFitBand(band.to_vec())),
        };
        Ok(DelayOpts {
            window,
            fine_tune: !self.no_fine_tune,
            average_time: self.average_time,
            fit_band,
        })
    }
}

#[derive(Error, Debug)]
pub(super) enum DelayArgsError {
    #[error("Unrecognised delay window '{0}'. Supported windows: {}", Window::iter().join(", "))]
    BadWindow(String),

    #[error("The fit band must be two increasing frequencies, but got {0:?}")]
    BadFitBand(Vec<f64>),
}

/// Output arguments shared by all calibration subcommands.
#[derive(Parser, Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct OutputSolsArgs {
    #[clap(short = 'o', long = "outputs", parse(from_os_str), help = SOLS_OUTPUT_HELP.as_str(), help_heading = "OUTPUT FILES")]
    pub(super) solutions: Option<PathBuf>,

    #[clap(long, help = CONVENTION_HELP.as_str(), help_heading = "OUTPUT FILES")]
    pub(super) convention: Option<String>,
}

impl OutputSolsArgs {
    pub(super) fn merge(self, other: Self) -> Self {
        Self {
            solutions: self.solutions.or(other.solutions),
            convention: self.convention.or(other.convention),
        }
    }

    pub(super) fn parse(
        self,
        default_filename: &str,
    ) -> Result<(PathBuf, GainConvention), OutputSolsArgsError> {
        let file = self
            .solutions
            .unwrap_or_else(|| PathBuf::from(default_filename));
        let ext = file.extension().and_then(|e| e.to_str()).unwrap_or("");
        if ext != "json" {
            return Err(OutputSolsArgsError::BadExtension {
                file: file.display().to_string(),
            });
        }
        let convention = match self.convention {
            Some(c) => {
                GainConvention::from_str(&c).map_err(|_| OutputSolsArgsError::BadConvention(c))?
            }
            None => GainConvention::default(),
        };
        Ok((file, convention))
    }
}

#[derive(Error, Debug)]
pub(super) enum OutputSolsArgsError {
    #[error("Can't write calibration solutions to '{file}'. Supported formats: {}", *CAL_SOLUTION_EXTENSIONS)]
    BadExtension { file: String },

    #[error("Unrecognised gain convention '{0}'. Supported conventions: {}", GainConvention::iter().join(", "))]
    BadConvention(String),
}
