//! Brilliance transfer between two wavelength monitors.

use reflred_core::error::{Error, Result};
use serde::Serialize;

/// A 1D wavelength monitor with equally spaced points.
#[derive(Debug, Clone, PartialEq)]
pub struct Monitor1d {
    /// Wavelength of the first point [Å].
    pub lambda_min: f64,
    /// Wavelength of the last point [Å].
    pub lambda_max: f64,
    /// Intensity per point.
    pub values: Vec<f64>,
    /// Standard error per point.
    pub errors: Vec<f64>,
}

impl Monitor1d {
    /// Wavelengths of the monitor points, `lambda_min..=lambda_max`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn wavelengths(&self) -> Vec<f64> {
        let n = self.values.len();
        if n < 2 {
            return vec![self.lambda_min; n];
        }
        let step = (self.lambda_max - self.lambda_min) / (n - 1) as f64;
        (0..n).map(|i| self.lambda_min + step * i as f64).collect()
    }

    fn check(&self, name: &str) -> Result<()> {
        if self.errors.len() == self.values.len() {
            Ok(())
        } else {
            Err(Error::LengthMismatch {
                column: format!("{name} errors"),
                expected: self.values.len(),
                actual: self.errors.len(),
            })
        }
    }
}

/// Ratio of two monitors with propagated errors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferCurve {
    /// Wavelength [Å].
    pub lambda: Vec<f64>,
    /// `data / reference`.
    pub ratio: Vec<f64>,
    /// Propagated standard error of the ratio.
    pub error: Vec<f64>,
}

/// Divides `data` by `reference` point by point after scaling each.
///
/// The error is `sqrt((de/r)² + (re·d/r²)²)`. Points where the reference is
/// zero come out non-finite. Wavelengths are taken from `data`.
///
/// # Errors
/// Returns [`Error::LengthMismatch`] if the monitors differ in length or a
/// monitor's errors do not match its values.
pub fn brilliance_transfer(
    data: &Monitor1d,
    data_scale: f64,
    reference: &Monitor1d,
    reference_scale: f64,
) -> Result<TransferCurve> {
    data.check("data")?;
    reference.check("reference")?;
    if data.values.len() != reference.values.len() {
        return Err(Error::LengthMismatch {
            column: "reference".to_string(),
            expected: data.values.len(),
            actual: reference.values.len(),
        });
    }

    let (ratio, error) = data
        .values
        .iter()
        .zip(&data.errors)
        .zip(reference.values.iter().zip(&reference.errors))
        .map(|((dv, de), (rv, re))| {
            let (d, de) = (dv * data_scale, de * data_scale);
            let (r, re) = (rv * reference_scale, re * reference_scale);
            let err = ((de / r).powi(2) + (re * d / (r * r)).powi(2)).sqrt();
            (d / r, err)
        })
        .unzip();

    Ok(TransferCurve {
        lambda: data.wavelengths(),
        ratio,
        error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn monitor(values: Vec<f64>, errors: Vec<f64>) -> Monitor1d {
        Monitor1d {
            lambda_min: 2.0,
            lambda_max: 10.0,
            values,
            errors,
        }
    }

    #[test]
    fn test_wavelengths() {
        let m = monitor(vec![0.0; 5], vec![0.0; 5]);
        assert_eq!(m.wavelengths(), vec![2.0, 4.0, 6.0, 8.0, 10.0]);
        assert_eq!(monitor(vec![1.0], vec![0.0]).wavelengths(), vec![2.0]);
    }

    #[test]
    fn test_ratio_and_error() {
        let data = monitor(vec![2.0, 4.0], vec![0.2, 0.4]);
        let reference = monitor(vec![1.0, 8.0], vec![0.1, 0.0]);
        let curve = brilliance_transfer(&data, 3.0, &reference, 1.5).unwrap();

        assert_relative_eq!(curve.ratio[0], 6.0 / 1.5);
        assert_relative_eq!(curve.ratio[1], 12.0 / 12.0);
        let expected = ((0.6_f64 / 1.5).powi(2) + (0.15 * 6.0 / 2.25_f64).powi(2)).sqrt();
        assert_relative_eq!(curve.error[0], expected, max_relative = 1e-12);
        assert_relative_eq!(curve.error[1], 1.2 / 12.0, max_relative = 1e-12);
        assert_eq!(curve.lambda, vec![2.0, 10.0]);
    }

    #[test]
    fn test_zero_reference_is_non_finite() {
        let data = monitor(vec![1.0], vec![0.1]);
        let reference = monitor(vec![0.0], vec![0.0]);
        let curve = brilliance_transfer(&data, 1.0, &reference, 1.0).unwrap();
        assert!(!curve.ratio[0].is_finite());
    }

    #[test]
    fn test_length_mismatch() {
        let data = monitor(vec![1.0, 2.0], vec![0.1, 0.1]);
        let reference = monitor(vec![1.0], vec![0.1]);
        assert!(brilliance_transfer(&data, 1.0, &reference, 1.0).is_err());
        let broken = monitor(vec![1.0, 2.0], vec![0.1]);
        assert!(brilliance_transfer(&broken, 1.0, &data, 1.0).is_err());
    }
}
