// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Parse absolute-calibration arguments into parameters, and run.

use std::path::PathBuf;

use clap::Parser;
use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{
    common::{
        DelayArgs, DelayArgsError, InputVisArgs, InputVisArgsError, OutputSolsArgs,
        OutputSolsArgsError, ARG_FILE_HELP,
    },
    AbsCalCliError,
};
use crate::{
    abscal::{AbsCal, AbsCalParams, MergeAxes},
    c64,
    chisq::{chisq, Accumulator, ChisqPrior},
    constants::DEFAULT_DELAY_KERNEL,
    container::DataContainer,
    flagging::synthesize_ant_flags,
    io::VisData,
    pol::AntKey,
    solutions::{CalSolutions, GainConvention},
};

const DEFAULT_OUTPUT_SOLUTIONS_FILENAME: &str = "abscal_solutions.json";

lazy_static::lazy_static! {
    static ref DELAY_KERNEL_HELP: String =
        format!("The (time, frequency) size of the median filter applied to the model/data ratio before searching for delays. Both must be odd. Default: {} {}", DEFAULT_DELAY_KERNEL.0, DEFAULT_DELAY_KERNEL.1);
}

#[derive(Parser, Debug, Clone, Default, Serialize, Deserialize)]
struct AbsCalCliArgs {
    /// Don't solve for per-antenna amplitudes.
    #[clap(long, help_heading = "CALIBRATION")]
    #[serde(default)]
    no_amp: bool,

    /// Don't solve for per-antenna phases.
    #[clap(long, help_heading = "CALIBRATION")]
    #[serde(default)]
    no_phase: bool,

    /// Solve for an overall phase and phase gradient across the array.
    /// Requires antenna positions.
    #[clap(long, help_heading = "CALIBRATION")]
    #[serde(default)]
    tip_tilt: bool,

    /// Solve for the average amplitude of the array.
    #[clap(long, help_heading = "CALIBRATION")]
    #[serde(default)]
    abs_amp: bool,

    /// Solve for per-antenna delays. Requires frequencies.
    #[clap(long, help_heading = "CALIBRATION")]
    #[serde(default)]
    delay: bool,

    /// Use the same solution for all times.
    #[clap(long, help_heading = "CALIBRATION")]
    #[serde(default)]
    merge_time: bool,

    /// Use the same solution for all frequencies.
    #[clap(long, help_heading = "CALIBRATION")]
    #[serde(default)]
    merge_freq: bool,

    /// Solve all polarisations together, including cross-polarised baselines.
    #[clap(long, help_heading = "CALIBRATION")]
    #[serde(default)]
    merge_pol: bool,

    /// Fix the overall phase of the tip-tilt solution to zero.
    #[clap(long, help_heading = "CALIBRATION")]
    #[serde(default)]
    zero_psi: bool,

    /// The antenna whose phases and delays are fixed to zero. If not given,
    /// the minimum-norm solutions are used.
    #[clap(long, help_heading = "CALIBRATION")]
    refant: Option<usize>,

    #[clap(long, number_of_values = 2, help = DELAY_KERNEL_HELP.as_str(), help_heading = "DELAYS")]
    delay_kernel: Option<Vec<usize>>,

    /// If the data have flags, flag antenna gains when more than this fraction
    /// of an antenna's baselines are flagged. Must be between 0 and 1.
    #[clap(long, help_heading = "FLAGGING")]
    flag_threshold: Option<f64>,
}

impl AbsCalCliArgs {
    fn merge(self, other: Self) -> Self {
        Self {
            no_amp: self.no_amp || other.no_amp,
            no_phase: self.no_phase || other.no_phase,
            tip_tilt: self.tip_tilt || other.tip_tilt,
            abs_amp: self.abs_amp || other.abs_amp,
            delay: self.delay || other.delay,
            merge_time: self.merge_time || other.merge_time,
            merge_freq: self.merge_freq || other.merge_freq,
            merge_pol: self.merge_pol || other.merge_pol,
            zero_psi: self.zero_psi || other.zero_psi,
            refant: self.refant.or(other.refant),
            delay_kernel: self.delay_kernel.or(other.delay_kernel),
            flag_threshold: self.flag_threshold.or(other.flag_threshold),
        }
    }
}

#[derive(Parser, Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct AbsCalArgs {
    #[clap(name = "ARGUMENTS_FILE", help = ARG_FILE_HELP.as_str(), parse(from_os_str))]
    args_file: Option<PathBuf>,

    #[clap(flatten)]
    #[serde(rename = "data")]
    #[serde(default)]
    data_args: InputVisArgs,

    #[clap(flatten)]
    #[serde(rename = "abs-cal")]
    #[serde(default)]
    calibration_args: AbsCalCliArgs,

    #[clap(flatten)]
    #[serde(rename = "delays")]
    #[serde(default)]
    delay_args: DelayArgs,

    #[clap(flatten)]
    #[serde(rename = "outputs")]
    #[serde(default)]
    output_args: OutputSolsArgs,
}

/// Everything needed to run absolute calibration.
#[derive(Debug)]
struct AbsCalRun {
    vis: VisData,
    params: AbsCalParams,
    flag_threshold: Option<f64>,
    output_file: PathBuf,
}

impl AbsCalArgs {
    /// Both command-line and file arguments overlap in terms of what is
    /// available; this function consolidates everything that was specified into
    /// a single struct. Where applicable, it will prefer CLI parameters over
    /// those in the file.
    pub(super) fn merge(self) -> Result<AbsCalArgs, AbsCalCliError> {
        debug!("Merging command-line arguments with the argument file");

        let cli_args = self;

        if let Some(arg_file) = cli_args.args_file {
            // Read in the file arguments. Ensure all of the file args are
            // accounted for by pattern matching.
            let AbsCalArgs {
                args_file: _,
                data_args,
                calibration_args,
                delay_args,
                output_args,
            } = unpack_arg_file!(arg_file);

            Ok(AbsCalArgs {
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

    fn parse(self) -> Result<AbsCalRun, AbsCalArgsError> {
        debug!("{:#?}", self);

        let AbsCalArgs {
            args_file: _,
            data_args,
            calibration_args,
            delay_args,
            output_args,
        } = self;

        let AbsCalCliArgs {
            no_amp,
            no_phase,
            tip_tilt,
            abs_amp,
            delay,
            merge_time,
            merge_freq,
            merge_pol,
            zero_psi,
            refant,
            delay_kernel,
            flag_threshold,
        } = calibration_args;

        let delay_kernel = match delay_kernel.as_deref() {
            None => DEFAULT_DELAY_KERNEL,
            Some(&[t, f]) if t % 2 == 1 && f % 2 == 1 => (t, f),
            Some(k) => return Err(AbsCalArgsError::BadDelayKernel(k.to_vec())),
        };
        if let Some(t) = flag_threshold {
            if !(0.0..=1.0).contains(&t) {
                return Err(AbsCalArgsError::BadFlagThreshold(t));
            }
        }
        let delay_opts = delay_args.parse()?;
        let (output_file, convention) = output_args.parse(DEFAULT_OUTPUT_SOLUTIONS_FILENAME)?;

        let params = AbsCalParams {
            amp: !no_amp,
            phase: !no_phase,
            tip_tilt,
            abs_amp,
            delay,
            merge: MergeAxes {
                time: merge_time,
                freq: merge_freq,
                pol: merge_pol,
            },
            zero_psi,
            refant,
            delay_kernel,
            delay_opts,
            convention,
        };
        if !(params.amp || params.phase || params.tip_tilt || params.abs_amp || params.delay) {
            return Err(AbsCalArgsError::NoSteps);
        }

        let vis = data_args.read()?;
        if vis.model.is_none() {
            return Err(AbsCalArgsError::NoModel);
        }

        Ok(AbsCalRun {
            vis,
            params,
            flag_threshold,
            output_file,
        })
    }

    pub(super) fn run(self, dry_run: bool) -> Result<Option<CalSolutions>, AbsCalCliError> {
        debug!("Converting arguments into parameters");
        trace!("{:#?}", self);
        let AbsCalRun {
            vis,
            params,
            flag_threshold,
            output_file,
        } = self.parse()?;

        info!(
            "Calibrating {} baselines; steps: amp {}, phase {}, tip-tilt {}, abs-amp {}, delay {}",
            vis.data.len(),
            params.amp,
            params.phase,
            params.tip_tilt,
            params.abs_amp,
            params.delay
        );
        if dry_run {
            info!("Dry run -- exiting now.");
            return Ok(None);
        }

        let VisData {
            data,
            model,
            wgts,
            flags,
            freqs,
            times,
            antpos,
        } = vis;
        // The model's presence was checked while parsing.
        let model = model.unwrap_or_default();

        let mut abscal = AbsCal::new(
            &model,
            &data,
            Some(&wgts),
            antpos.as_ref(),
            freqs.clone(),
            times.clone(),
        )?;
        let (gains, diagnostics) = abscal.run(&params)?;
        for d in &diagnostics {
            debug!("{d}");
        }

        let gain_flags = match (flag_threshold, flags) {
            (Some(threshold), Some(flags)) => Some(synthesize_ant_flags(&flags, threshold)?),
            (Some(_), None) => {
                warn!("A flag threshold was given, but the data have no flags");
                None
            }
            _ => None,
        };

        let (sols, diagnostics) = CalSolutions::new(
            gains,
            gain_flags,
            freqs,
            times,
            GainConvention::Multiply,
        );
        for d in &diagnostics {
            warn!("{d}");
        }
        log_chisq(&model, &data, &wgts, &sols);

        let sols = sols.to_convention(params.convention);
        sols.write(&output_file)?;
        info!("Calibration solutions written to {}", output_file.display());

        Ok(Some(sols))
    }
}

/// Report how well the gains calibrate the data. Only baselines with a model
/// are compared.
fn log_chisq(
    model: &DataContainer<c64>,
    data: &DataContainer<c64>,
    wgts: &DataContainer<f64>,
    sols: &CalSolutions,
) {
    let divide = sols.to_convention(GainConvention::Divide);
    let mut used_data = DataContainer::new();
    let mut used_wgts = DataContainer::new();
    for (key, m) in model.iter() {
        let ants_solved = key
            .pol
            .split()
            .map(|(p1, p2)| {
                let k1: AntKey = (key.ant1, p1);
                let k2: AntKey = (key.ant2, p2);
                divide.gains.contains_key(&k1) && divide.gains.contains_key(&k2)
            })
            .unwrap_or(false);
        if key.is_auto() || !ants_solved {
            continue;
        }
        if let (Some(d), Some(w)) = (data.get(key), wgts.get(key)) {
            if d.dim() == m.dim() && used_data.insert(key, d.into_owned()).is_ok() {
                // The weights have the data's shape.
                let _ = used_wgts.insert(key, w.into_owned());
            }
        }
    }

    match chisq(
        &used_data,
        model,
        &used_wgts,
        Some(&divide.gains),
        Some(&divide.flags),
        false,
        ChisqPrior::default(),
    ) {
        Ok(result) => {
            if let (Accumulator::Combined(chisq), Accumulator::Combined(n_obs)) =
                (&result.chisq, &result.n_obs)
            {
                let total_chisq = chisq.sum();
                let total_n_obs: u64 = n_obs.iter().map(|&n| u64::from(n)).sum();
                if total_n_obs > 0 {
                    info!(
                        "Chi-squared per observation after calibration: {:.6e}",
                        total_chisq / total_n_obs as f64
                    );
                }
            }
        }
        Err(e) => warn!("Couldn't compute chi-squared: {e}"),
    }
}

/// Errors associated with absolute calibration arguments.
#[derive(Error, Debug)]
pub(super) enum AbsCalArgsError {
    #[error("All calibration steps were disabled; nothing to do")]
    NoSteps,

    #[error("No model visibilities were found; supply a model bundle or models inside the data bundle")]
    NoModel,

    #[error("The delay kernel must be two odd numbers, but got {0:?}")]
    BadDelayKernel(Vec<usize>),

    #[error("The flag threshold must be between 0 and 1, but got {0}")]
    BadFlagThreshold(f64),

    #[error(transparent)]
    InputVis(#[from] InputVisArgsError),

    #[error(transparent)]
    Delay(#[from] DelayArgsError),

    #[error(transparent)]
    Output(#[from] OutputSolsArgsError),
}
