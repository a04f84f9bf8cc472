//! Reflectivity reduction.
//!
//! Sample and reference events are converted to wavelength and q, filtered
//! identically, projected onto the same bins and divided. The reference is
//! additionally weighted by the angular normalization so that sample and
//! reference may be measured at different nominal angles.
//!
//! Bins where the reference is empty yield non-finite reflectivity values;
//! these are data, not errors.

use crate::efficiency::DetectorEfficiency;
use crate::filter::{beam_footprint, FilterComposer};
use crate::tof::{TofConverter, WavelengthPolicy};
use reflred_core::error::{Error, Result};
use reflred_core::expr::{Column, Expr};
use reflred_core::projection::{Projection1d, Projector};
use reflred_core::{BinEdges, EventTable, InstrumentConfig, LogGrid};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::f64::consts::PI;

/// Scale from summed weights to intensity per second of measurement.
pub const DEFAULT_INTENSITY_SCALE: f64 = 15.0 / 4.0;

/// Parameters of a q-binned reduction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReductionParams {
    /// Relative q resolution (bin growth factor minus one).
    pub qres: f64,
    /// First bin edge [Å⁻¹].
    pub qmin: f64,
    /// Upper q limit [Å⁻¹].
    pub qmax: f64,
    /// Minimum bin width [Å⁻¹].
    pub mindq: f64,
    /// Derive wavelength from time of flight instead of the stored `L`.
    pub use_tof: bool,
    /// Source pulses skipped by the chopper system.
    pub skip_pulses: u32,
    /// Shortest wavelength kept [Å].
    pub lambda_min: f64,
    /// Apply the detector efficiency correction to both tables.
    pub detcorr: bool,
    /// Margin before the next frame used by the overlap crop [s].
    pub t_overlap: f64,
    /// Drop events that may alias into the following pulse.
    pub crop_overlap: bool,
    /// Use the two-single plus one-double frame scheme.
    pub complex_skip: bool,
    /// Multiplier from sample weights to reported intensity.
    pub intensity_scale: f64,
}

impl Default for ReductionParams {
    fn default() -> Self {
        Self {
            qres: 0.01,
            qmin: 0.005,
            qmax: 0.35,
            mindq: 1e-4,
            use_tof: true,
            skip_pulses: 0,
            lambda_min: 2.4,
            detcorr: false,
            t_overlap: 0.001,
            crop_overlap: true,
            complex_skip: false,
            intensity_scale: DEFAULT_INTENSITY_SCALE,
        }
    }
}

impl ReductionParams {
    /// Set q binning.
    #[must_use]
    pub fn with_q_binning(mut self, qmin: f64, qmax: f64, qres: f64, mindq: f64) -> Self {
        self.qmin = qmin;
        self.qmax = qmax;
        self.qres = qres;
        self.mindq = mindq;
        self
    }

    /// Set the wavelength cutoff.
    #[must_use]
    pub fn with_lambda_min(mut self, lambda_min: f64) -> Self {
        self.lambda_min = lambda_min;
        self
    }

    /// Set the number of skipped pulses.
    #[must_use]
    pub fn with_skip_pulses(mut self, skip_pulses: u32) -> Self {
        self.skip_pulses = skip_pulses;
        self
    }

    /// Enable or disable the dual-pulse frame scheme.
    #[must_use]
    pub fn with_complex_skip(mut self, complex_skip: bool) -> Self {
        self.complex_skip = complex_skip;
        self
    }

    /// Choose TOF-derived or stored wavelengths.
    #[must_use]
    pub fn with_tof(mut self, use_tof: bool) -> Self {
        self.use_tof = use_tof;
        self
    }

    /// Enable or disable detector efficiency correction.
    #[must_use]
    pub fn with_detcorr(mut self, detcorr: bool) -> Self {
        self.detcorr = detcorr;
        self
    }

    /// Enable or disable the overlap crop.
    #[must_use]
    pub fn with_crop_overlap(mut self, crop_overlap: bool) -> Self {
        self.crop_overlap = crop_overlap;
        self
    }

    /// Wavelength policy selected by the flags.
    #[must_use]
    pub fn policy(&self) -> WavelengthPolicy {
        WavelengthPolicy::from_flags(self.use_tof, self.skip_pulses, self.complex_skip)
    }

    /// Validate parameters not covered by bin generation.
    ///
    /// # Errors
    /// Returns a configuration error for a non-finite wavelength cutoff or
    /// intensity scale.
    pub fn validate(&self) -> Result<()> {
        if !self.lambda_min.is_finite() {
            return Err(Error::Config(format!(
                "lambda_min must be finite, got {}",
                self.lambda_min
            )));
        }
        if !self.intensity_scale.is_finite() {
            return Err(Error::Config(format!(
                "intensity_scale must be finite, got {}",
                self.intensity_scale
            )));
        }
        Ok(())
    }
}

/// A reduced reflectivity curve, one entry per bin.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReducedCurve {
    /// Bin centres (q, or wavelength-derived q for collimated data).
    pub q: Vec<f64>,
    /// Sample over reference.
    pub reflectivity: Vec<f64>,
    /// Scaled sample intensity.
    pub intensity: Vec<f64>,
}

impl ReducedCurve {
    /// Number of bins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.q.len()
    }

    /// True if the curve has no bins.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.q.is_empty()
    }

    /// Number of bins whose reflectivity is NaN or infinite.
    #[must_use]
    pub fn non_finite_count(&self) -> usize {
        self.reflectivity.iter().filter(|r| !r.is_finite()).count()
    }
}

/// Wavelength expression used for the efficiency correction: the stored
/// wavelength when present, otherwise the TOF-derived one.
fn efficiency_wavelength(table: &EventTable, tof_wavelength: &Expr) -> Expr {
    if table.has_wavelength() {
        Expr::col(Column::L)
    } else {
        tof_wavelength.clone()
    }
}

fn corrected<'a>(
    efficiency: Option<&DetectorEfficiency>,
    table: &'a EventTable,
    tof_wavelength: &Expr,
) -> Result<Cow<'a, EventTable>> {
    match efficiency {
        Some(eff) => Ok(Cow::Owned(
            eff.apply(table, &efficiency_wavelength(table, tof_wavelength))?,
        )),
        None => Ok(Cow::Borrowed(table)),
    }
}

/// Reduces a sample against a reference into a q-binned reflectivity curve.
///
/// Both tables are projected onto the same geometric q bins after deriving
/// `lamda` (per the wavelength policy) and `q` (at `omega` for both). The
/// reference weights are multiplied by the angular normalization from
/// `omega_ref` to `omega`.
///
/// # Errors
/// Returns configuration errors for invalid binning, instrument or
/// parameters, and projection errors such as a missing `L` column under the
/// direct policy.
pub fn calc_reflectivity(
    sample: &EventTable,
    reference: &EventTable,
    omega: f64,
    omega_ref: f64,
    params: &ReductionParams,
    config: &InstrumentConfig,
) -> Result<ReducedCurve> {
    params.validate()?;
    let edges = BinEdges::geometric(params.qmin, params.qmax, params.qres, params.mindq)?;
    let tof = TofConverter::new(config)?;
    let policy = params.policy();
    let lamda = tof.wavelength_expr(policy);

    let efficiency = if params.detcorr {
        Some(DetectorEfficiency::new(&config.efficiency)?)
    } else {
        None
    };
    let sample = corrected(efficiency.as_ref(), sample, &lamda)?;
    let reference = corrected(efficiency.as_ref(), reference, &lamda)?;

    let mut composer = FilterComposer::new();
    if params.crop_overlap {
        composer = composer.with_overlap_crop(&tof, params.skip_pulses, params.t_overlap)?;
    }
    let filter = composer.with_lambda_min(params.lambda_min).build();
    log::debug!(
        "reducing ω={omega}° (ref {omega_ref}°) with {policy:?}, {} q bins, filter {filter}",
        edges.bin_count()
    );

    let sample_request = Projection1d::new(Column::Q, edges.clone())
        .derive(Column::Lamda, lamda)
        .derive(Column::Q, tof.q_expr(omega))
        .filter(filter);
    let reference_request = sample_request
        .clone()
        .norm(tof.angular_norm_expr(omega, omega_ref));

    let (sample_hist, reference_hist) = rayon::join(
        || sample.project1d(&sample_request),
        || reference.project1d(&reference_request),
    );
    let sample_hist = sample_hist?;
    let reference_hist = reference_hist?;

    let curve = ReducedCurve {
        q: edges.centers(),
        reflectivity: sample_hist
            .counts
            .iter()
            .zip(&reference_hist.counts)
            .map(|(s, r)| s / r)
            .collect(),
        intensity: sample_hist
            .counts
            .iter()
            .map(|s| s * params.intensity_scale)
            .collect(),
    };
    let degenerate = curve.non_finite_count();
    if degenerate > 0 {
        log::debug!("{degenerate} of {} q bins have no reference counts", curve.len());
    }
    Ok(curve)
}

/// Parameters of a collimated (wavelength-binned) reduction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollimatedParams {
    /// Shortest wavelength and frame start [Å].
    pub lambda_min: f64,
    /// Longest wavelength [Å].
    pub lambda_max: f64,
    /// Ratio between neighbouring wavelength points.
    pub grid_ratio: f64,
    /// Relative angular divergence used for the transverse cut.
    pub divergence: f64,
    /// Multiplier from sample weights to reported intensity.
    pub intensity_scale: f64,
}

impl Default for CollimatedParams {
    fn default() -> Self {
        Self {
            lambda_min: 3.9,
            lambda_max: 16.0,
            grid_ratio: 1.01,
            divergence: 0.02,
            intensity_scale: DEFAULT_INTENSITY_SCALE,
        }
    }
}

impl CollimatedParams {
    /// Set the wavelength range.
    #[must_use]
    pub fn with_wavelength_range(mut self, lambda_min: f64, lambda_max: f64) -> Self {
        self.lambda_min = lambda_min;
        self.lambda_max = lambda_max;
        self
    }
}

/// Reduces collimated data on a logarithmic wavelength grid.
///
/// The frame starts at `lambda_min`. The reference is projected unfiltered;
/// the sample keeps only events within three beam footprints of the
/// specular position. Reflectivity is `I / ref / ω²` with `ω` in degrees and
/// `q = 4π/λ · sin ω` at the grid wavelengths.
///
/// # Errors
/// Returns configuration errors for an invalid grid or instrument and
/// projection errors from either table.
pub fn calc_collimated(
    sample: &EventTable,
    reference: &EventTable,
    omega: f64,
    params: &CollimatedParams,
    config: &InstrumentConfig,
) -> Result<ReducedCurve> {
    let grid = LogGrid::new(params.lambda_min, params.lambda_max, params.grid_ratio)?;
    let tof = TofConverter::new(&config.clone().with_frame_lambda_min(params.lambda_min))?;
    let lamda = tof.wavelength_expr(WavelengthPolicy::SingleSkip { skip_pulses: 0 });

    let footprint = beam_footprint(omega, tof.detector_distance(), params.divergence);
    let filter = FilterComposer::new().with_transverse_cut(footprint).build();
    log::debug!(
        "collimated ω={omega}°, {} wavelength bins, filter {filter}",
        grid.edges.bin_count()
    );

    let reference_request =
        Projection1d::new(Column::Lamda, grid.edges.clone()).derive(Column::Lamda, lamda);
    let sample_request = reference_request.clone().filter(filter);

    let (sample_hist, reference_hist) = rayon::join(
        || sample.project1d(&sample_request),
        || reference.project1d(&reference_request),
    );
    let sample_hist = sample_hist?;
    let reference_hist = reference_hist?;

    let sin_omega = omega.to_radians().sin();
    let omega_sq = omega * omega;
    Ok(ReducedCurve {
        q: grid
            .centers
            .iter()
            .map(|l| 4.0 * PI / l * sin_omega)
            .collect(),
        reflectivity: sample_hist
            .counts
            .iter()
            .zip(&reference_hist.counts)
            .map(|(s, r)| s / r / omega_sq)
            .collect(),
        intensity: sample_hist
            .counts
            .iter()
            .map(|s| s * params.intensity_scale)
            .collect(),
    })
}
