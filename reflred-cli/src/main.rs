//! reflred CLI - Command-line tool for reflectometry event reduction.
#![allow(
    clippy::uninlined_format_args,
    clippy::cast_precision_loss,
    clippy::redundant_closure_for_method_calls,
    clippy::too_many_lines
)]

use clap::{Parser, Subcommand};
use rayon::prelude::*;
use reflred_algorithms::{
    brilliance_transfer, calc_collimated, calc_reflectivity, calc_stats, CollimatedParams,
    Monitor1d, ReducedCurve, ReductionParams, RoiWindow, StatsParams,
};
use reflred_core::{EventTable, InstrumentConfig};
use reflred_io::{read_monitor_1d, read_sim_file, EventFileReader, MonitorFile, TableWriter};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("Read/write error: {0}")]
    Reflred(#[from] reflred_io::Error),
    #[error("Reduction error: {0}")]
    Core(#[from] reflred_core::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Usage(String),
}

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

#[derive(Parser)]
#[command(name = "reflred")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Instrument configuration (JSON); M-STAR defaults when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reduce sample/reference event files into a q-binned reflectivity
    Reduce {
        /// Sample event files, one per angle
        #[arg(short, long, required = true, num_args = 1..)]
        sample: Vec<PathBuf>,

        /// Reference event files, one shared file or one per sample
        #[arg(short, long, required = true, num_args = 1..)]
        reference: Vec<PathBuf>,

        /// Sample angles in degrees, one per sample
        #[arg(long, required = true, num_args = 1.., allow_negative_numbers = true)]
        omega: Vec<f64>,

        /// Reference angles in degrees; defaults to the sample angles
        #[arg(long, num_args = 1.., allow_negative_numbers = true)]
        omega_ref: Vec<f64>,

        /// Lower q limit [1/Å]
        #[arg(long, default_value = "0.005")]
        qmin: f64,

        /// Upper q limit [1/Å]
        #[arg(long, default_value = "0.35")]
        qmax: f64,

        /// Relative q resolution of the bins
        #[arg(long, default_value = "0.01")]
        qres: f64,

        /// Minimal absolute q bin width [1/Å]
        #[arg(long, default_value = "1e-4")]
        mindq: f64,

        /// Minimal accepted wavelength [Å]
        #[arg(long, default_value = "2.4")]
        lambda_min: f64,

        /// Number of skipped source pulses per frame
        #[arg(long, default_value = "0")]
        skip_pulses: u32,

        /// Treat the frame as two overlapping pulses
        #[arg(long)]
        complex_skip: bool,

        /// Use the stored wavelength column instead of time of flight
        #[arg(long)]
        no_tof: bool,

        /// Apply the detector efficiency correction
        #[arg(long)]
        detcorr: bool,

        /// Keep events in the frame-overlap region
        #[arg(long)]
        no_crop_overlap: bool,

        /// Output table
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Reduce collimated data on a logarithmic wavelength grid
    Collimated {
        /// Sample event file
        #[arg(short, long)]
        sample: PathBuf,

        /// Reference event file
        #[arg(short, long)]
        reference: PathBuf,

        /// Sample angle in degrees
        #[arg(long, allow_negative_numbers = true)]
        omega: f64,

        /// Lower wavelength limit [Å]
        #[arg(long, default_value = "3.9")]
        lambda_min: f64,

        /// Upper wavelength limit [Å]
        #[arg(long, default_value = "16.0")]
        lambda_max: f64,

        /// Output table
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Print total and ROI count rates of an event file as JSON
    Stats {
        /// Event file
        input: PathBuf,

        /// Fixed ROI instead of the automatic one
        #[arg(
            long,
            num_args = 4,
            value_names = ["XMIN", "XMAX", "YMIN", "YMAX"],
            allow_negative_numbers = true
        )]
        window: Option<Vec<f64>>,

        /// Skip the detector efficiency correction
        #[arg(long)]
        no_detcorr: bool,
    },

    /// Print the data blocks of a mccode.sim file as JSON
    SimInfo {
        /// Statistics file
        input: PathBuf,

        /// Only this component
        #[arg(short, long)]
        component: Option<String>,
    },

    /// Divide two 1D wavelength monitors
    Transfer {
        /// Monitor of the modified instrument
        data: PathBuf,

        /// Monitor of the reference instrument
        reference: PathBuf,

        /// Scale of the data monitor
        #[arg(long, default_value = "1.0")]
        data_scale: f64,

        /// Scale of the reference monitor
        #[arg(long, default_value = "1.0")]
        reference_scale: f64,

        /// Output table
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn load_config(path: Option<&Path>) -> Result<InstrumentConfig> {
    match path {
        Some(path) => Ok(InstrumentConfig::from_file(path)?),
        None => Ok(InstrumentConfig::mstar_defaults()),
    }
}

fn load_events(paths: &[PathBuf], config: &InstrumentConfig) -> Result<Vec<EventTable>> {
    paths
        .par_iter()
        .map(|path| {
            let table = EventFileReader::open(path)?
                .with_config(config.clone())
                .read()?;
            Ok(table)
        })
        .collect()
}

/// Distinct paths in first-seen order, and the position of each input path
/// among them.
fn dedup_paths(paths: &[PathBuf]) -> (Vec<PathBuf>, Vec<usize>) {
    let mut unique: Vec<PathBuf> = Vec::new();
    let index = paths
        .iter()
        .map(|path| match unique.iter().position(|u| u == path) {
            Some(i) => i,
            None => {
                unique.push(path.clone());
                unique.len() - 1
            }
        })
        .collect();
    (unique, index)
}

/// Expands a one-element list to `n` entries.
fn broadcast<T: Clone>(name: &str, values: Vec<T>, n: usize) -> Result<Vec<T>> {
    match values.len() {
        len if len == n => Ok(values),
        1 => Ok(vec![values[0].clone(); n]),
        len => Err(CliError::Usage(format!(
            "expected 1 or {n} values for --{name}, got {len}"
        ))),
    }
}

fn monitor(file: MonitorFile) -> Monitor1d {
    Monitor1d {
        lambda_min: file.xlimits.0,
        lambda_max: file.xlimits.1,
        values: file.values,
        errors: file.errors,
    }
}

fn write_curves(
    path: &Path,
    info: &str,
    omegas: &[f64],
    curves: &[ReducedCurve],
) -> Result<()> {
    let Some(first) = curves.first() else {
        return Err(CliError::Usage("nothing to write".to_string()));
    };
    let labels: Vec<(String, String)> = omegas
        .iter()
        .map(|w| (format!("R({w})"), format!("I({w})")))
        .collect();

    let mut names = vec!["q"];
    let mut units = vec!["1/Å"];
    let mut columns: Vec<&[f64]> = vec![first.q.as_slice()];
    for ((r_name, i_name), curve) in labels.iter().zip(curves) {
        names.extend([r_name.as_str(), i_name.as_str()]);
        units.extend(["1", "counts/s"]);
        columns.extend([curve.reflectivity.as_slice(), curve.intensity.as_slice()]);
    }

    let mut writer = TableWriter::create(path)?;
    writer.write_table(info, &names, &units, &columns)?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Reduce {
            sample,
            reference,
            omega,
            omega_ref,
            qmin,
            qmax,
            qres,
            mindq,
            lambda_min,
            skip_pulses,
            complex_skip,
            no_tof,
            detcorr,
            no_crop_overlap,
            output,
        } => {
            let n = sample.len();
            let omega = broadcast("omega", omega, n)?;
            let omega_ref = if omega_ref.is_empty() {
                omega.clone()
            } else {
                broadcast("omega-ref", omega_ref, n)?
            };
            let reference = broadcast("reference", reference, n)?;

            let params = ReductionParams::default()
                .with_q_binning(qmin, qmax, qres, mindq)
                .with_lambda_min(lambda_min)
                .with_skip_pulses(skip_pulses)
                .with_complex_skip(complex_skip)
                .with_tof(!no_tof)
                .with_detcorr(detcorr)
                .with_crop_overlap(!no_crop_overlap);
            params.validate()?;

            let start = Instant::now();
            let samples = load_events(&sample, &config)?;
            // a shared reference is read once
            let (reference_files, reference_index) = dedup_paths(&reference);
            let references = load_events(&reference_files, &config)?;

            let curves = samples
                .par_iter()
                .zip(reference_index.par_iter())
                .zip(omega.par_iter().zip(omega_ref.par_iter()))
                .map(|((s, r), (w, w_ref))| {
                    calc_reflectivity(s, &references[*r], *w, *w_ref, &params, &config)
                })
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let info = format!(
                "M-STAR reflectivity\nparams: {}",
                serde_json::to_string(&params)?
            );
            write_curves(&output, &info, &omega, &curves)?;

            log::info!(
                "reduced {} angle(s) in {:.2}s",
                n,
                start.elapsed().as_secs_f64()
            );
            println!("Wrote {}", output.display());
        }

        Commands::Collimated {
            sample,
            reference,
            omega,
            lambda_min,
            lambda_max,
            output,
        } => {
            let params = CollimatedParams::default().with_wavelength_range(lambda_min, lambda_max);
            let tables = load_events(&[sample, reference], &config)?;
            let curve = calc_collimated(&tables[0], &tables[1], omega, &params, &config)?;

            let info = format!(
                "M-STAR collimated reflectivity\nparams: {}",
                serde_json::to_string(&params)?
            );
            write_curves(&output, &info, &[omega], &[curve])?;
            println!("Wrote {}", output.display());
        }

        Commands::Stats {
            input,
            window,
            no_detcorr,
        } => {
            let window = match window.as_deref() {
                Some(&[xmin, xmax, ymin, ymax]) => Some(RoiWindow {
                    xmin,
                    xmax,
                    ymin,
                    ymax,
                }),
                Some(other) => {
                    return Err(CliError::Usage(format!(
                        "--window takes four values, got {}",
                        other.len()
                    )))
                }
                None => None,
            };
            let params = StatsParams::default().with_detcorr(!no_detcorr);
            let table = EventFileReader::open(&input)?
                .with_config(config.clone())
                .read()?;
            let summary = calc_stats(&table, window, &params, &config)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }

        Commands::SimInfo { input, component } => {
            let stats = read_sim_file(&input)?;
            let json = match component {
                Some(name) => {
                    let fields = stats.component(&name).ok_or_else(|| {
                        CliError::Usage(format!("no component {name:?} in {}", input.display()))
                    })?;
                    serde_json::to_string_pretty(fields)?
                }
                None => serde_json::to_string_pretty(&stats)?,
            };
            println!("{json}");
        }

        Commands::Transfer {
            data,
            reference,
            data_scale,
            reference_scale,
            output,
        } => {
            let data = monitor(read_monitor_1d(&data)?);
            let reference = monitor(read_monitor_1d(&reference)?);
            let curve = brilliance_transfer(&data, data_scale, &reference, reference_scale)?;

            let info = format!(
                "brilliance transfer\ndata_scale={data_scale} reference_scale={reference_scale}"
            );
            let mut writer = TableWriter::create(&output)?;
            writer.write_table(
                &info,
                &["lambda", "ratio", "error"],
                &["Å", "1", "1"],
                &[
                    curve.lambda.as_slice(),
                    curve.ratio.as_slice(),
                    curve.error.as_slice(),
                ],
            )?;
            println!("Wrote {}", output.display());
        }
    }

    Ok(())
}
