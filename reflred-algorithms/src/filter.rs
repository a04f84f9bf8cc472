//! Event filter composition.
//!
//! Each clause is optional; absent clauses are left out of the composed
//! predicate rather than replaced by a tautology, so an empty composer
//! renders as an empty string.

use crate::tof::{TofConverter, WavelengthPolicy};
use reflred_core::error::{Error, Result};
use reflred_core::expr::{Column, Expr, Predicate};

/// Transverse cut half-width in units of the beam footprint.
pub const TRANSVERSE_CUT_FOOTPRINTS: f64 = 3.0;

/// Transverse half-width of the beam at `distance` for relative angular
/// divergence `divergence` at nominal angle `omega_deg`.
#[must_use]
pub fn beam_footprint(omega_deg: f64, distance: f64, divergence: f64) -> f64 {
    distance * (omega_deg.to_radians() * divergence).tan()
}

/// Builder for the reduction filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterComposer {
    lambda_min: Option<f64>,
    overlap_cutoff: Option<f64>,
    transverse_half_width: Option<f64>,
}

impl FilterComposer {
    /// Composer with no clauses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects events with `lamda` below `lambda_min`.
    #[must_use]
    pub fn with_lambda_min(mut self, lambda_min: f64) -> Self {
        self.lambda_min = Some(lambda_min);
        self
    }

    /// Rejects events whose wavelength exceeds the value reached `t_overlap`
    /// seconds before the next frame starts, i.e. events that may alias into
    /// the following pulse.
    ///
    /// # Errors
    /// Returns a configuration error if `t_overlap` is negative or not
    /// finite.
    pub fn with_overlap_crop(
        mut self,
        tof: &TofConverter,
        skip_pulses: u32,
        t_overlap: f64,
    ) -> Result<Self> {
        if !t_overlap.is_finite() || t_overlap < 0.0 {
            return Err(Error::Config(format!(
                "overlap margin must be a non-negative number, got {t_overlap}"
            )));
        }
        let boundary = tof.t0() + tof.frame_period(skip_pulses) - t_overlap;
        self.overlap_cutoff =
            tof.wavelength_at(WavelengthPolicy::SingleSkip { skip_pulses }, boundary);
        Ok(self)
    }

    /// Keeps only events with `|x| < 3 × footprint`.
    #[must_use]
    pub fn with_transverse_cut(mut self, footprint: f64) -> Self {
        self.transverse_half_width = Some(TRANSVERSE_CUT_FOOTPRINTS * footprint);
        self
    }

    /// Wavelength above which events are cropped, if overlap cropping is on.
    #[must_use]
    pub fn overlap_cutoff(&self) -> Option<f64> {
        self.overlap_cutoff
    }

    /// Composes the configured clauses with logical AND.
    #[must_use]
    pub fn build(&self) -> Predicate {
        let lamda = || Expr::col(Column::Lamda);
        Predicate::all(
            [
                self.overlap_cutoff.map(|cut| lamda().at_most(cut)),
                self.lambda_min.map(|min| lamda().at_least(min)),
                self.transverse_half_width
                    .map(|half| Expr::col(Column::X).abs().less_than(half)),
            ]
            .into_iter()
            .flatten(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use reflred_core::{ColumnValues, InstrumentConfig};

    fn row(lamda: f64, x: f64) -> ColumnValues {
        let mut row = [f64::NAN; Column::COUNT];
        row[Column::Lamda.index()] = lamda;
        row[Column::X.index()] = x;
        row
    }

    #[test]
    fn test_empty_composer_is_omitted() {
        let filter = FilterComposer::new().build();
        assert!(filter.is_always());
        assert_eq!(filter.to_string(), "");
        assert!(filter.eval(&row(f64::NAN, f64::NAN)));
    }

    #[test]
    fn test_lambda_min_only() {
        let filter = FilterComposer::new().with_lambda_min(2.4).build();
        assert_eq!(filter.clause_count(), 1);
        assert_eq!(filter.to_string(), "(lamda >= 2.4)");
        assert!(filter.eval(&row(2.4, 0.0)));
        assert!(!filter.eval(&row(2.39, 0.0)));
    }

    #[test]
    fn test_overlap_cutoff_value() {
        let tof = TofConverter::new(&InstrumentConfig::mstar_defaults()).unwrap();
        let composer = FilterComposer::new()
            .with_overlap_crop(&tof, 0, 0.001)
            .unwrap();
        let expected = (tof.pulse_period() - 0.001 + tof.t_min()) * tof.conversion();
        assert_relative_eq!(composer.overlap_cutoff().unwrap(), expected, max_relative = 1e-9);

        let filter = composer.with_lambda_min(2.4).build();
        assert_eq!(filter.clause_count(), 2);
        assert!(filter.eval(&row(5.0, 0.0)));
        assert!(!filter.eval(&row(expected + 0.1, 0.0)));
    }

    #[test]
    fn test_overlap_cutoff_with_skipping() {
        let tof = TofConverter::new(&InstrumentConfig::mstar_defaults()).unwrap();
        let none = FilterComposer::new().with_overlap_crop(&tof, 0, 0.001).unwrap();
        let one = FilterComposer::new().with_overlap_crop(&tof, 1, 0.001).unwrap();
        let gained = one.overlap_cutoff().unwrap() - none.overlap_cutoff().unwrap();
        assert_relative_eq!(gained, tof.pulse_period() * tof.conversion(), max_relative = 1e-9);
    }

    #[test]
    fn test_negative_overlap_margin() {
        let tof = TofConverter::new(&InstrumentConfig::mstar_defaults()).unwrap();
        assert!(FilterComposer::new().with_overlap_crop(&tof, 0, -1.0).is_err());
    }

    #[test]
    fn test_transverse_cut() {
        let footprint = beam_footprint(1.0, 3.0, 0.02);
        assert_relative_eq!(footprint, 3.0 * (0.02_f64.to_radians()).tan(), max_relative = 1e-12);

        let filter = FilterComposer::new().with_transverse_cut(footprint).build();
        let half = 3.0 * footprint;
        assert!(filter.eval(&row(5.0, 0.99 * half)));
        assert!(filter.eval(&row(5.0, -0.99 * half)));
        assert!(!filter.eval(&row(5.0, 1.01 * half)));
        assert!(filter.to_string().starts_with("(abs(x) < "));
    }
}
