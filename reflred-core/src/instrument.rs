//! Instrument geometry and physical constants.
//!
//! Everything the TOF, q and efficiency builders need is carried here and
//! passed by reference, so several instrument geometries can be reduced
//! side by side without shared state.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Conversion from kinetic energy in MeV to wavelength in Å: `λ = C / sqrt(E)`.
pub const ENERGY_MEV_TO_WAVELENGTH: f64 = 0.000_286_014_35;

/// Parameters of the boron-layer detector absorption model.
///
/// Thicknesses are in µm. Two layer configurations are mixed: the primary
/// one with weight `1 - fa` and the alternate one (`r1a`, `r2a`) with `fa`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorEfficiencyConfig {
    /// Grazing incidence angle on the converter layer (degrees).
    pub incidence_deg: f64,
    /// Primary configuration, first range (µm).
    pub r1: f64,
    /// Primary configuration, second range (µm).
    pub r2: f64,
    /// Alternate configuration, first range (µm).
    pub r1a: f64,
    /// Alternate configuration, second range (µm).
    pub r2a: f64,
    /// Fraction of events seeing the alternate configuration.
    pub fa: f64,
}

impl Default for DetectorEfficiencyConfig {
    fn default() -> Self {
        Self {
            incidence_deg: 5.0,
            r1: 3.08,
            r2: 1.38,
            r1a: 3.97,
            r2a: 1.61,
            fa: 0.06,
        }
    }
}

impl DetectorEfficiencyConfig {
    /// Validate ranges and mixing fraction.
    ///
    /// # Errors
    /// Returns an error if a range or the incidence angle is not positive, or
    /// if `fa` lies outside `[0, 1]`.
    pub fn validate(&self) -> Result<()> {
        Error::ensure_positive("incidence_deg", self.incidence_deg)?;
        Error::ensure_positive("r1", self.r1)?;
        Error::ensure_positive("r2", self.r2)?;
        Error::ensure_positive("r1a", self.r1a)?;
        Error::ensure_positive("r2a", self.r2a)?;
        if !(0.0..=1.0).contains(&self.fa) {
            return Err(Error::Config(format!(
                "fa must lie in [0, 1], got {}",
                self.fa
            )));
        }
        Ok(())
    }
}

/// Beamline configuration for a TOF reflectometer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentConfig {
    /// Planck constant [g·m²/s].
    pub planck: f64,
    /// Neutron mass [g].
    pub neutron_mass: f64,
    /// Source to detector distance [m].
    pub flight_path_length: f64,
    /// Sample to detector distance [m].
    pub detector_distance: f64,
    /// Source repetition rate [Hz].
    pub source_frequency_hz: f64,
    /// Shortest wavelength of a frame, defines the TOF frame start [Å].
    pub frame_lambda_min: f64,
    /// Extra delay added to the frame start [s].
    pub start_offset_s: f64,
    /// Detector absorption model.
    pub efficiency: DetectorEfficiencyConfig,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self::mstar_defaults()
    }
}

impl InstrumentConfig {
    /// M-STAR reflectometer layout: 21 m flight path, detector 3 m behind
    /// the sample, 15 Hz source.
    #[must_use]
    pub fn mstar_defaults() -> Self {
        Self {
            planck: 6.626_069_3e-31,
            neutron_mass: 1.674_93e-24,
            flight_path_length: 21.0,
            detector_distance: 3.0,
            source_frequency_hz: 15.0,
            frame_lambda_min: 2.0,
            start_offset_s: 0.0002,
            efficiency: DetectorEfficiencyConfig::default(),
        }
    }

    /// Load configuration from a JSON file.
    ///
    /// Missing keys fall back to [`InstrumentConfig::mstar_defaults`].
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON string.
    ///
    /// # Errors
    /// Returns an error if the string cannot be parsed or validated.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every geometric and timing parameter.
    ///
    /// # Errors
    /// Returns [`Error::NonPositive`] for a zero or negative length, frequency
    /// or constant.
    pub fn validate(&self) -> Result<()> {
        Error::ensure_positive("planck", self.planck)?;
        Error::ensure_positive("neutron_mass", self.neutron_mass)?;
        Error::ensure_positive("flight_path_length", self.flight_path_length)?;
        Error::ensure_positive("detector_distance", self.detector_distance)?;
        Error::ensure_positive("source_frequency_hz", self.source_frequency_hz)?;
        Error::ensure_positive("frame_lambda_min", self.frame_lambda_min)?;
        if !self.start_offset_s.is_finite() || self.start_offset_s < 0.0 {
            return Err(Error::Config(format!(
                "start_offset_s must be non-negative, got {}",
                self.start_offset_s
            )));
        }
        self.efficiency.validate()
    }

    /// Set the source frequency.
    #[must_use]
    pub fn with_source_frequency(mut self, hz: f64) -> Self {
        self.source_frequency_hz = hz;
        self
    }

    /// Set the flight path length.
    #[must_use]
    pub fn with_flight_path_length(mut self, meters: f64) -> Self {
        self.flight_path_length = meters;
        self
    }

    /// Set the sample to detector distance.
    #[must_use]
    pub fn with_detector_distance(mut self, meters: f64) -> Self {
        self.detector_distance = meters;
        self
    }

    /// Set the frame minimum wavelength.
    #[must_use]
    pub fn with_frame_lambda_min(mut self, angstrom: f64) -> Self {
        self.frame_lambda_min = angstrom;
        self
    }

    /// Set the frame start offset.
    #[must_use]
    pub fn with_start_offset(mut self, seconds: f64) -> Self {
        self.start_offset_s = seconds;
        self
    }

    /// `h / m_n` scaled to Å·m/s; dividing by a velocity yields a wavelength.
    #[must_use]
    pub fn velocity_wavelength_product(&self) -> f64 {
        self.planck / self.neutron_mass * 1e10
    }

    /// Å per second of flight over the full flight path.
    #[must_use]
    pub fn tof_conversion(&self) -> f64 {
        self.velocity_wavelength_product() / self.flight_path_length
    }

    /// Time between two source pulses [s].
    #[must_use]
    pub fn pulse_period(&self) -> f64 {
        1.0 / self.source_frequency_hz
    }

    /// Wavelength in Å from a speed in m/s.
    #[must_use]
    pub fn wavelength_from_velocity(&self, speed: f64) -> f64 {
        self.velocity_wavelength_product() / speed
    }
}

/// Wavelength in Å from kinetic energy in MeV.
#[inline]
#[must_use]
pub fn wavelength_from_energy(ekin_mev: f64) -> f64 {
    ENERGY_MEV_TO_WAVELENGTH / ekin_mev.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mstar_defaults() {
        let config = InstrumentConfig::mstar_defaults();
        assert!(config.validate().is_ok());
        assert_relative_eq!(config.pulse_period(), 1.0 / 15.0);
        // h/m_n ≈ 3956 Å·m/s
        assert_relative_eq!(
            config.velocity_wavelength_product(),
            3956.0,
            max_relative = 1e-3
        );
        assert_relative_eq!(config.tof_conversion(), 3956.0 / 21.0, max_relative = 1e-3);
    }

    #[test]
    fn test_json_partial_config() {
        let json = r#"{ "source_frequency_hz": 14.0, "efficiency": { "fa": 0.1 } }"#;
        let config = InstrumentConfig::from_json(json).expect("Should parse partial config");

        assert_relative_eq!(config.source_frequency_hz, 14.0);
        assert_relative_eq!(config.flight_path_length, 21.0);
        assert_relative_eq!(config.efficiency.fa, 0.1);
        assert_relative_eq!(config.efficiency.r1, 3.08);
    }

    #[test]
    fn test_json_empty_object() {
        let config = InstrumentConfig::from_json("{}").expect("Should parse minimal config");
        assert_eq!(config, InstrumentConfig::mstar_defaults());
    }

    #[test]
    fn test_json_rejects_zero_flight_path() {
        let result = InstrumentConfig::from_json(r#"{ "flight_path_length": 0.0 }"#);
        let err = result.unwrap_err().to_string();
        assert!(err.contains("flight_path_length"), "unexpected error: {err}");
    }

    #[test]
    fn test_negative_detector_distance_rejected() {
        let config = InstrumentConfig::mstar_defaults().with_detector_distance(-3.0);
        assert!(matches!(
            config.validate(),
            Err(Error::NonPositive {
                name: "detector_distance",
                ..
            })
        ));
    }

    #[test]
    fn test_fa_out_of_range() {
        let mut config = InstrumentConfig::mstar_defaults();
        config.efficiency.fa = 1.5;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_from_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), r#"{ "detector_distance": 2.5 }"#).unwrap();
        let config = InstrumentConfig::from_file(file.path()).unwrap();
        assert_relative_eq!(config.detector_distance, 2.5);
    }

    #[test]
    fn test_wavelength_conversions() {
        let config = InstrumentConfig::mstar_defaults();
        // 1000 m/s ≈ 3.956 Å
        assert_relative_eq!(
            config.wavelength_from_velocity(1000.0),
            3.956,
            max_relative = 1e-3
        );
        // 25.3 meV thermal neutron ≈ 1.798 Å
        assert_relative_eq!(wavelength_from_energy(25.3e-9), 1.798, max_relative = 1e-3);
    }
}
