//! Boron-layer detector efficiency correction.
//!
//! The transmission efficiency of a two-layer converter is modelled from the
//! wavelength-dependent absorption cross-section. A correction multiplies the
//! event weights by the efficiency and returns a new table; applying it twice
//! corrects twice, so callers are responsible for doing it once.

use rayon::prelude::*;
use reflred_core::error::{Error, Result};
use reflred_core::expr::Expr;
use reflred_core::{DetectorEfficiencyConfig, EventTable};

/// Absorption per µm at 1.8 Å, before the incidence-angle factor.
const ABSORPTION_AT_1P8: f64 = (2.3 * 6.022e23 / 10.33) * 0.8 * 3844.0 * 1e-28;

/// Evaluates and applies the detector efficiency model.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorEfficiency {
    config: DetectorEfficiencyConfig,
    sin_incidence: f64,
}

impl DetectorEfficiency {
    /// Creates the model.
    ///
    /// # Errors
    /// Returns a configuration error if the parameters fail validation.
    pub fn new(config: &DetectorEfficiencyConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            sin_incidence: config.incidence_deg.to_radians().sin(),
            config: config.clone(),
        })
    }

    /// Absorption cross-section per µm of path at `wavelength` [Å].
    #[must_use]
    pub fn sigma(&self, wavelength: f64) -> f64 {
        ABSORPTION_AT_1P8 * wavelength / 1.8 / self.sin_incidence
    }

    /// Efficiency for a converter with ranges `r1` and `r2` [µm].
    fn layer_efficiency(sigma: f64, r1: f64, r2: f64) -> f64 {
        // (1 - e^-x) / 2x, the fraction lost for one range
        let lost = |r: f64| {
            let x = sigma * r;
            -(-x).exp_m1() / (2.0 * x)
        };
        1.0 - lost(r1) - lost(r2)
    }

    /// Mixed efficiency of the primary and alternate configurations.
    #[must_use]
    pub fn efficiency(&self, wavelength: f64) -> f64 {
        let c = &self.config;
        let sigma = self.sigma(wavelength);
        (1.0 - c.fa) * Self::layer_efficiency(sigma, c.r1, c.r2)
            + c.fa * Self::layer_efficiency(sigma, c.r1a, c.r2a)
    }

    /// Returns a copy of `table` with each weight multiplied by the
    /// efficiency at the wavelength given by `wavelength`.
    ///
    /// `wavelength` may only read stored columns.
    ///
    /// # Errors
    /// Returns [`Error::MissingColumn`] if `wavelength` reads a derived or
    /// absent column, or a length error for an inconsistent table.
    pub fn apply(&self, table: &EventTable, wavelength: &Expr) -> Result<EventTable> {
        table.check_lengths()?;
        if let Some(missing) = wavelength
            .columns()
            .into_iter()
            .find(|c| table.column(*c).is_none())
        {
            return Err(Error::MissingColumn(missing.name().to_string()));
        }

        let weights: Vec<f64> = (0..table.len())
            .into_par_iter()
            .map(|i| {
                let row = table.row(i);
                table.p[i] * self.efficiency(wavelength.eval(&row))
            })
            .collect();
        log::debug!(
            "efficiency correction over {} events using {wavelength}",
            table.len()
        );
        table.with_weights(weights)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use reflred_core::expr::Column;

    fn model() -> DetectorEfficiency {
        DetectorEfficiency::new(&DetectorEfficiencyConfig::default()).unwrap()
    }

    #[test]
    fn test_sigma_scales_linearly() {
        let eff = model();
        assert_relative_eq!(eff.sigma(3.6), 2.0 * eff.sigma(1.8), max_relative = 1e-12);
        let expected = ABSORPTION_AT_1P8 / 5.0_f64.to_radians().sin();
        assert_relative_eq!(eff.sigma(1.8), expected, max_relative = 1e-12);
    }

    #[test]
    fn test_efficiency_bounded() {
        let eff = model();
        for i in 1..=60 {
            let wavelength = 0.5 * f64::from(i);
            let value = eff.efficiency(wavelength);
            assert!(value > 0.0 && value < 1.0, "eff({wavelength}) = {value}");
        }
    }

    #[test]
    fn test_efficiency_grows_with_wavelength() {
        let eff = model();
        assert!(eff.efficiency(2.0) < eff.efficiency(4.0));
        assert!(eff.efficiency(4.0) < eff.efficiency(12.0));
    }

    #[test]
    fn test_matches_closed_form() {
        let eff = model();
        let s = eff.sigma(4.0);
        let closed = |r1: f64, r2: f64| {
            1.0 - 1.0 / (2.0 * r1 * s) - 1.0 / (2.0 * r2 * s)
                + (-s * r2).exp() / (2.0 * s * r2)
                + (-s * r1).exp() / (2.0 * s * r1)
        };
        let expected = 0.94 * closed(3.08, 1.38) + 0.06 * closed(3.97, 1.61);
        assert_relative_eq!(eff.efficiency(4.0), expected, max_relative = 1e-12);
    }

    #[test]
    fn test_apply_is_elementwise() {
        let eff = model();
        let mut table = EventTable::default();
        table.push_with_wavelength(1.0, 0.0, 0.0, 0.0, 0.01, 3.0);
        table.push_with_wavelength(2.5, 0.1, 0.0, 0.0, 0.02, 7.0);

        let corrected = eff.apply(&table, &Expr::col(Column::L)).unwrap();
        assert_eq!(corrected.p[0], eff.efficiency(3.0));
        assert_eq!(corrected.p[1], 2.5 * eff.efficiency(7.0));
        assert_eq!(corrected.x, table.x);
        assert_eq!(corrected.wavelength, table.wavelength);
        // the input is left untouched
        assert_eq!(table.p, vec![1.0, 2.5]);
    }

    #[test]
    fn test_apply_rejects_derived_columns() {
        let eff = model();
        let mut table = EventTable::default();
        table.push(1.0, 0.0, 0.0, 0.0, 0.01);
        assert!(eff.apply(&table, &Expr::col(Column::L)).is_err());
        assert!(eff.apply(&table, &Expr::col(Column::Lamda)).is_err());
        assert!(eff.apply(&table, &(Expr::col(Column::T) * 188.0)).is_ok());
    }
}
