//! reflred-algorithms: Reduction algorithms for reflectometry event data.
//!
//! This crate provides:
//! - **TOF conversion** - wavelength, q and angular-normalization expressions
//! - **Filters** - overlap crop, wavelength cutoff and transverse cut
//! - **Detector efficiency** - boron-layer absorption model
//! - **Reflectivity** - q-binned and collimated sample/reference reduction
//! - **Beam statistics** - total and ROI count rates
//! - **Optimizer** - shrinking-step coordinate search
//!
#![warn(missing_docs)]

mod efficiency;
mod filter;
pub mod optimize;
mod reflectivity;
mod stats;
mod tof;
mod transfer;

pub use efficiency::DetectorEfficiency;
pub use filter::{beam_footprint, FilterComposer, TRANSVERSE_CUT_FOOTPRINTS};
pub use optimize::{
    CoordinateSearch, Evaluation, FigureOfMerit, Phase, SearchConfig, SearchResult, SearchState,
    Termination,
};
pub use reflectivity::{
    calc_collimated, calc_reflectivity, CollimatedParams, ReducedCurve, ReductionParams,
    DEFAULT_INTENSITY_SCALE,
};
pub use stats::{auto_roi, calc_stats, RoiWindow, StatsParams, StatsSummary};
pub use tof::{TofConverter, WavelengthPolicy};
pub use transfer::{brilliance_transfer, Monitor1d, TransferCurve};
