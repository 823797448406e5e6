// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Parse redundant delay calibration arguments into parameters, and run.

use std::{path::PathBuf, str::FromStr};

use clap::Parser;
use itertools::Itertools;
use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use thiserror::Error;

use super::{
    common::{
        DelayArgs, DelayArgsError, InputVisArgs, InputVisArgsError, OutputSolsArgs,
        OutputSolsArgsError, ARG_FILE_HELP,
    },
    AbsCalCliError,
};
use crate::{
    constants::DEFAULT_REDUNDANCY_TOL,
    container::BaselineKey,
    firstcal::{get_reds, FirstCal, FirstCalParams, RedundantInfo},
    io::VisData,
    pol::Pol,
    solutions::{CalSolutions, GainConvention},
};

const DEFAULT_OUTPUT_SOLUTIONS_FILENAME: &str = "firstcal_solutions.json";

lazy_static::lazy_static! {
    static ref POL_HELP: String =
        format!("The co-polar visibility polarisation to calibrate. Supported: {}. Default: {}", Pol::iter().filter(|p| p.is_co_polar()).join(", "), Pol::XX);

    static ref REDUNDANCY_TOL_HELP: String =
        format!("Baselines are redundant if their separation vectors agree within this many metres. Default: {DEFAULT_REDUNDANCY_TOL}");
}

#[derive(Parser, Debug, Clone, Default, Serialize, Deserialize)]
struct FirstCalCliArgs {
    #[clap(long, help = POL_HELP.as_str(), help_heading = "CALIBRATION")]
    pol: Option<String>,

    #[clap(long, help = REDUNDANCY_TOL_HELP.as_str(), help_heading = "CALIBRATION")]
    redundancy_tol: Option<f64>,

    /// The antenna whose delay is fixed to zero. If not given, the
    /// minimum-norm solution is used.
    #[clap(long, help_heading = "CALIBRATION")]
    refant: Option<usize>,
}

impl FirstCalCliArgs {
    fn merge(self, other: Self) -> Self {
        Self {
            pol: self.pol.or(other.pol),
            redundancy_tol: self.redundancy_tol.or(other.redundancy_tol),
            refant: self.refant.or(other.refant),
        }
    }
}

#[derive(Parser, Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct FirstCalArgs {
    #[clap(name = "ARGUMENTS_FILE", help = ARG_FILE_HELP.as_str(), parse(from_os_str))]
    args_file: Option<PathBuf>,

    #[clap(flatten)]
    #[serde(rename = "data")]
    #[serde(default)]
    data_args: InputVisArgs,

    #[clap(flatten)]
    #[serde(rename = "first-cal")]
    #[serde(default)]
    calibration_args: FirstCalCliArgs,

    #[clap(flatten)]
    #[serde(rename = "delays")]
    #[serde(default)]
    delay_args: DelayArgs,

    #[clap(flatten)]
    #[serde(rename = "outputs")]
    #[serde(default)]
    output_args: OutputSolsArgs,
}

#[derive(Debug)]
struct FirstCalRun {
    vis: VisData,
    params: FirstCalParams,
    output_file: PathBuf,
}

impl FirstCalArgs {
    /// Consolidate the command-line arguments with those in the arguments
    /// file, preferring the command line.
    pub(super) fn merge(self) -> Result<FirstCalArgs, AbsCalCliError> {
        debug!("Merging command-line arguments with the argument file");

        let cli_args = self;

        if let Some(arg_file) = cli_args.args_file {
            let FirstCalArgs {
                args_file: _,
                data_args,
                calibration_args,
                delay_args,
                output_args,
            } = unpack_arg_file!(arg_file);

            Ok(FirstCalArgs {
                args_file: None,
                data_args: cli_args.data_args.merge(data_args),
                calibration_args: cli_args.calibration_args.merge(calibration_args),
                delay_args: cli_args.delay_args.merge(delay_args),
                output_args: cli_args.output_args.merge(output_args),
            })
        } else {
            Ok(cli_args)
        }
    }

    fn parse(self) -> Result<FirstCalRun, FirstCalArgsError> {
        debug!("{:#?}", self);

        let FirstCalArgs {
            args_file: _,
            data_args,
            calibration_args: FirstCalCliArgs {
                pol,
                redundancy_tol,
                refant,
            },
            delay_args,
            output_args,
        } = self;

        let pol = match pol {
            Some(p) => match Pol::from_str(&p) {
                Ok(p) if p.is_co_polar() => p,
                _ => return Err(FirstCalArgsError::BadPol(p)),
            },
            None => Pol::XX,
        };
        let redundancy_tol = redundancy_tol.unwrap_or(DEFAULT_REDUNDANCY_TOL);
        if redundancy_tol.is_nan() || redundancy_tol < 0.0 {
            return Err(FirstCalArgsError::BadRedundancyTol(redundancy_tol));
        }
        let delay_opts = delay_args.parse()?;
        let (output_file, convention) = output_args.parse(DEFAULT_OUTPUT_SOLUTIONS_FILENAME)?;

        let vis = data_args.read()?;
        if vis.antpos.is_none() {
            return Err(FirstCalArgsError::NoAntennaPositions);
        }
        if vis.freqs.is_none() {
            return Err(FirstCalArgsError::NoFreqs);
        }

        Ok(FirstCalRun {
            vis,
            params: FirstCalParams {
                pol,
                redundancy_tol,
                delay_opts,
                refant,
                convention,
            },
            output_file,
        })
    }

    pub(super) fn run(self, dry_run: bool) -> Result<Option<CalSolutions>, AbsCalCliError> {
        debug!("Converting arguments into parameters");
        trace!("{:#?}", self);
        let FirstCalRun {
            vis,
            params,
            output_file,
        } = self.parse()?;
        let VisData {
            data,
            wgts,
            freqs,
            times,
            antpos,
            ..
        } = vis;
        // Presence was checked while parsing.
        let (antpos, freqs) = match (antpos, freqs) {
            (Some(a), Some(f)) => (a, f),
            _ => unreachable!(),
        };

        // Only keep baselines that are in the data.
        let reds: Vec<_> = get_reds(&antpos, params.redundancy_tol)
            .into_iter()
            .map(|group| {
                group
                    .into_iter()
                    .filter(|&(i, j)| data.contains(BaselineKey::new(i, j, params.pol)))
                    .collect::<Vec<_>>()
            })
            .filter(|group| !group.is_empty())
            .collect();
        let info = RedundantInfo::new(reds)?;
        info!(
            "{} redundant groups, giving {} baseline pairs over {} antennas",
            info.reds.len(),
            info.num_pairs(),
            info.antennas.len()
        );
        if info.num_pairs() == 0 {
            warn!("There are no redundant baseline pairs; all delays will be unconstrained");
        }
        if dry_run {
            info!("Dry run -- exiting now.");
            return Ok(None);
        }

        let fc = FirstCal::new(&data, Some(&wgts), &freqs, &info, params.pol)?;
        let solution = fc.run(&params.delay_opts, params.gauge())?;
        let num_times = data.shape().map(|(t, _)| t).unwrap_or(1);
        let gains = solution.gains(&freqs, num_times)?;

        let (sols, diagnostics) = CalSolutions::new(
            gains,
            None,
            Some(freqs),
            times,
            GainConvention::Multiply,
        );
        for d in &diagnostics {
            warn!("{d}");
        }
        let sols = sols.to_convention(params.convention);
        sols.write(&output_file)?;
        info!("Calibration solutions written to {}", output_file.display());

        Ok(Some(sols))
    }
}

/// Errors associated with FirstCal arguments.
#[derive(Error, Debug)]
pub(super) enum FirstCalArgsError {
    #[error("'{0}' isn't a co-polar visibility polarisation")]
    BadPol(String),

    #[error("The redundancy tolerance must be a non-negative number of metres, but got {0}")]
    BadRedundancyTol(f64),

    #[error("FirstCal needs antenna positions, but the data bundle has none")]
    NoAntennaPositions,

    #[error("FirstCal needs frequencies, but the data bundle has none")]
    NoFreqs,

    #[error(transparent)]
    InputVis(#[from] InputVisArgsError),

    #[error(transparent)]
    Delay(#[from] DelayArgsError),

    #[error(transparent)]
    Output(#[from] OutputSolsArgsError),
}
