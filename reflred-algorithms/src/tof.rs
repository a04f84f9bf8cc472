//! Time-of-flight to wavelength and q conversion expressions.
//!
//! Three wavelength policies are supported:
//!
//! - **Direct**: the table already stores the wavelength (`L`).
//! - **Single skip**: the arrival time is folded into one frame after
//!   subtracting the frame start `t0`. With `n` skipped pulses the frame is
//!   `(n + 1)` source periods long.
//! - **Dual pulse**: events within two source periods after `t0` are folded
//!   into a single period; later events belong to a double-length frame and
//!   are shifted back by exactly two periods without folding.

use reflred_core::error::{Error, Result};
use reflred_core::expr::{Column, Expr};
use reflred_core::InstrumentConfig;
use std::f64::consts::PI;

/// How an event's wavelength is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WavelengthPolicy {
    /// Read the stored `L` column.
    Direct,
    /// Fold into a frame of `skip_pulses + 1` source periods.
    SingleSkip {
        /// Pulses skipped between frames.
        skip_pulses: u32,
    },
    /// Two single frames followed by one double-length frame.
    DualPulse,
}

impl WavelengthPolicy {
    /// Policy selected by the reduction flags; `complex_skip` wins over
    /// `use_tof`.
    #[must_use]
    pub fn from_flags(use_tof: bool, skip_pulses: u32, complex_skip: bool) -> Self {
        if complex_skip {
            WavelengthPolicy::DualPulse
        } else if use_tof {
            WavelengthPolicy::SingleSkip { skip_pulses }
        } else {
            WavelengthPolicy::Direct
        }
    }
}

/// Builds TOF, q and angular normalization expressions for one instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct TofConverter {
    conversion: f64,
    t_min: f64,
    t0: f64,
    period: f64,
    detector_distance: f64,
}

impl TofConverter {
    /// Derives the frame timing from the instrument configuration.
    ///
    /// # Errors
    /// Returns a configuration error if the instrument fails validation or
    /// a derived period, start time or conversion factor is not positive.
    pub fn new(config: &InstrumentConfig) -> Result<Self> {
        config.validate()?;
        let conversion = Error::ensure_positive("tof_conversion", config.tof_conversion())?;
        let period = Error::ensure_positive("pulse_period", config.pulse_period())?;
        let t_min = config.frame_lambda_min / conversion;
        let t0 = Error::ensure_positive("t0", config.start_offset_s + t_min)?;
        let detector_distance =
            Error::ensure_positive("detector_distance", config.detector_distance)?;

        log::debug!(
            "TOF frame: conversion={conversion:.4} Å/s, t_min={t_min:.6} s, t0={t0:.6} s, period={period:.6} s"
        );
        Ok(Self {
            conversion,
            t_min,
            t0,
            period,
            detector_distance,
        })
    }

    /// Wavelength per second of flight [Å/s].
    #[must_use]
    pub fn conversion(&self) -> f64 {
        self.conversion
    }

    /// Flight time of the shortest frame wavelength [s].
    #[must_use]
    pub fn t_min(&self) -> f64 {
        self.t_min
    }

    /// Frame start [s].
    #[must_use]
    pub fn t0(&self) -> f64 {
        self.t0
    }

    /// Source pulse period [s].
    #[must_use]
    pub fn pulse_period(&self) -> f64 {
        self.period
    }

    /// Frame length when `skip_pulses` pulses are skipped [s].
    #[must_use]
    pub fn frame_period(&self, skip_pulses: u32) -> f64 {
        (f64::from(skip_pulses) + 1.0) * self.period
    }

    /// Detector distance used by the angle expressions [m].
    #[must_use]
    pub fn detector_distance(&self) -> f64 {
        self.detector_distance
    }

    /// Wavelength expression for `policy`.
    #[must_use]
    pub fn wavelength_expr(&self, policy: WavelengthPolicy) -> Expr {
        let t = || Expr::col(Column::T);
        match policy {
            WavelengthPolicy::Direct => Expr::col(Column::L),
            WavelengthPolicy::SingleSkip { skip_pulses } => {
                ((t() - self.t0).modulo(self.frame_period(skip_pulses)) + self.t_min)
                    * self.conversion
            }
            WavelengthPolicy::DualPulse => {
                let boundary = self.t0 + 2.0 * self.period;
                let folded = (t() - self.t0).modulo(self.period) + self.t_min;
                let unfolded = t() - (boundary - self.t_min);
                Expr::select(t().less_than(boundary), folded, unfolded) * self.conversion
            }
        }
    }

    /// Wavelength at arrival time `t`; `None` for the direct policy, which
    /// does not depend on time.
    #[must_use]
    pub fn wavelength_at(&self, policy: WavelengthPolicy, t: f64) -> Option<f64> {
        match policy {
            WavelengthPolicy::Direct => None,
            _ => Some(self.wavelength_expr(policy).eval_at_time(t)),
        }
    }

    /// Nominal angle plus the detector-position offset, in radians.
    fn scattering_angle(&self, omega_deg: f64) -> Expr {
        Expr::constant(omega_deg * PI / 180.0)
            + (-Expr::col(Column::X)).atan2(self.detector_distance)
    }

    /// `q = 4π/λ · sin(ω + atan2(-x, D))` over the derived `lamda` column.
    #[must_use]
    pub fn q_expr(&self, omega_deg: f64) -> Expr {
        Expr::constant(4.0 * PI) / Expr::col(Column::Lamda) * self.scattering_angle(omega_deg).sin()
    }

    /// `sin(ω + atan2(-x, D)) / sin(ω_ref + atan2(-x, D))`, the weight that
    /// rescales a reference measured at `omega_ref_deg` to `omega_deg`.
    #[must_use]
    pub fn angular_norm_expr(&self, omega_deg: f64, omega_ref_deg: f64) -> Expr {
        self.scattering_angle(omega_deg).sin() / self.scattering_angle(omega_ref_deg).sin()
    }
}
