//! Beam statistics from a single event table.
//!
//! Rates are reported for the whole detector and for a region of interest
//! (ROI), the latter per mm². When no ROI is given, the brightest cell of a
//! coarse position grid is used as its centre.

use crate::efficiency::DetectorEfficiency;
use reflred_core::error::{Error, Result};
use reflred_core::expr::{Column, Expr, Predicate};
use reflred_core::projection::{BinSpec, Projection1d, Projection2d, Projector};
use reflred_core::{EventTable, InstrumentConfig};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Rectangular detector window `[xmin, xmax] × [ymin, ymax]` in metres.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoiWindow {
    /// Lower x bound.
    pub xmin: f64,
    /// Upper x bound.
    pub xmax: f64,
    /// Lower y bound.
    pub ymin: f64,
    /// Upper y bound.
    pub ymax: f64,
}

impl RoiWindow {
    /// Window of half-width `half_width` centred on `(x0, y0)`.
    #[must_use]
    pub fn centered(x0: f64, y0: f64, half_width: f64) -> Self {
        Self {
            xmin: x0 - half_width,
            xmax: x0 + half_width,
            ymin: y0 - half_width,
            ymax: y0 + half_width,
        }
    }

    /// Area in m².
    #[must_use]
    pub fn area(&self) -> f64 {
        (self.xmax - self.xmin) * (self.ymax - self.ymin)
    }

    /// True if `(x, y)` lies inside the closed window.
    #[must_use]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        (self.xmin..=self.xmax).contains(&x) && (self.ymin..=self.ymax).contains(&y)
    }

    /// Filter selecting events inside the window.
    #[must_use]
    pub fn predicate(&self) -> Predicate {
        let x = || Expr::col(Column::X);
        let y = || Expr::col(Column::Y);
        Predicate::all([
            x().at_least(self.xmin),
            x().at_most(self.xmax),
            y().at_least(self.ymin),
            y().at_most(self.ymax),
        ])
    }
}

/// Parameters for [`calc_stats`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsParams {
    /// Apply detector efficiency correction before counting.
    pub detcorr: bool,
    /// Events with `x` below this are ignored for totals and ROI search [m].
    pub x_min: f64,
    /// Grid cells per axis for the ROI search.
    pub grid_bins: usize,
    /// Half-width of the automatic ROI [m].
    pub roi_half_width: f64,
    /// Wavelength bins.
    pub lambda_bins: usize,
    /// Factor from per-bin sums to instantaneous rates.
    pub rate_factor: f64,
    /// m² to mm².
    pub area_scale: f64,
}

impl Default for StatsParams {
    fn default() -> Self {
        Self {
            detcorr: true,
            x_min: -0.06,
            grid_bins: 20,
            roi_half_width: 0.005,
            lambda_bins: 50,
            rate_factor: 50.0,
            area_scale: 1e6,
        }
    }
}

impl StatsParams {
    /// Enable or disable efficiency correction.
    #[must_use]
    pub fn with_detcorr(mut self, detcorr: bool) -> Self {
        self.detcorr = detcorr;
        self
    }
}

/// Count rates of one event table.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StatsSummary {
    /// Average total rate.
    pub total: f64,
    /// Peak total rate.
    pub peak: f64,
    /// Wavelength of the peak total rate [Å].
    pub l_peak: f64,
    /// Average ROI rate per mm².
    pub roi: f64,
    /// Peak ROI rate per mm².
    pub roi_peak: f64,
    /// Wavelength bin centres [Å].
    pub lambda: Vec<f64>,
    /// Instantaneous total rate per wavelength bin.
    pub i_total: Vec<f64>,
    /// Instantaneous ROI rate per mm² per wavelength bin.
    pub i_roi: Vec<f64>,
    /// Window the ROI values refer to.
    pub window: RoiWindow,
}

fn total_filter(params: &StatsParams) -> Predicate {
    Expr::col(Column::X).at_least(params.x_min)
}

/// Locates the brightest cell of a coarse `x`/`y` grid and centres a window
/// on it.
///
/// # Errors
/// Propagates projection errors; fails if the grid holds no finite value.
pub fn auto_roi<P: Projector + ?Sized>(source: &P, params: &StatsParams) -> Result<RoiWindow> {
    let request = Projection2d::new(
        Column::X,
        Column::Y,
        BinSpec::Count(params.grid_bins),
        BinSpec::Count(params.grid_bins),
    )
    .filter(total_filter(params));
    let grid = source.project2d(&request)?;
    let ((ix, iy), peak) = grid
        .argmax()
        .ok_or_else(|| Error::InvalidBins("position grid has no finite cell".to_string()))?;
    let (x0, y0) = grid.cell_center(ix, iy);
    log::debug!("ROI centre ({x0:.4}, {y0:.4}) from cell ({ix}, {iy}) with weight {peak}");
    Ok(RoiWindow::centered(x0, y0, params.roi_half_width))
}

fn max_with_index(values: &[f64]) -> Option<(usize, f64)> {
    values
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .fold(None, |best, (i, v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
}

/// Computes total and ROI rates binned over the stored wavelength `L`.
///
/// A window with zero area produces non-finite ROI values.
///
/// # Errors
/// Returns [`Error::MissingColumn`] if the table stores no wavelength,
/// configuration errors for an invalid efficiency model, and projection
/// errors.
pub fn calc_stats(
    table: &EventTable,
    window: Option<RoiWindow>,
    params: &StatsParams,
    config: &InstrumentConfig,
) -> Result<StatsSummary> {
    let table = if params.detcorr {
        let efficiency = DetectorEfficiency::new(&config.efficiency)?;
        Cow::Owned(efficiency.apply(table, &Expr::col(Column::L))?)
    } else {
        Cow::Borrowed(table)
    };

    let window = match window {
        Some(window) => window,
        None => auto_roi(table.as_ref(), params)?,
    };

    let total_hist = table.project1d(
        &Projection1d::new(Column::L, BinSpec::Count(params.lambda_bins))
            .filter(total_filter(params)),
    )?;
    let lambda = total_hist.centers();
    let total = total_hist.sum();
    let i_total: Vec<f64> = total_hist
        .counts
        .iter()
        .map(|c| c * params.rate_factor)
        .collect();
    let (peak_bin, peak) = max_with_index(&i_total).unwrap_or((0, f64::NAN));
    let l_peak = lambda.get(peak_bin).copied().unwrap_or(f64::NAN);

    let roi_hist = table.project1d(
        &Projection1d::new(Column::L, total_hist.edges.clone()).filter(window.predicate()),
    )?;
    let per_area = params.area_scale * window.area();
    let roi_counts: Vec<f64> = roi_hist.counts.iter().map(|c| c / per_area).collect();
    let roi: f64 = roi_counts.iter().sum();
    let i_roi: Vec<f64> = roi_counts.iter().map(|c| c * params.rate_factor).collect();
    let roi_peak = max_with_index(&i_roi).map_or(f64::NAN, |(_, v)| v);

    log::info!("total {total:.4e}, peak {peak:.4e} at {l_peak:.2} Å, ROI {roi:.4e} /mm²");
    Ok(StatsSummary {
        total,
        peak,
        l_peak,
        roi,
        roi_peak,
        lambda,
        i_total,
        i_roi,
        window,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Bright spot around (0.01, 0.02) on a faint uniform background.
    fn spot_table() -> EventTable {
        let mut table = EventTable::default();
        for i in 0..400 {
            let fi = f64::from(i);
            let dx = 0.002 * ((fi * 0.37).sin());
            let dy = 0.002 * ((fi * 0.61).cos());
            let l = 3.0 + 7.0 * (fi / 400.0);
            table.push_with_wavelength(1.0, 0.01 + dx, 0.02 + dy, 0.0, 0.0, l);
        }
        for i in 0..40 {
            let fi = f64::from(i);
            let x = -0.05 + 0.1 * fi / 40.0;
            let y = -0.05 + 0.1 * ((fi * 0.13) % 1.0);
            table.push_with_wavelength(0.01, x, y, 0.0, 0.0, 3.0 + 0.1 * fi);
        }
        table
    }

    #[test]
    fn test_window_geometry() {
        let window = RoiWindow::centered(0.01, 0.02, 0.005);
        assert_relative_eq!(window.area(), 1e-4, max_relative = 1e-9);
        assert!(window.contains(0.01, 0.02));
        assert!(!window.contains(0.0, 0.02));
        assert_eq!(window.predicate().clause_count(), 4);
    }

    #[test]
    fn test_auto_roi_contains_centroid() {
        let table = spot_table();
        let window = auto_roi(&table, &StatsParams::default()).unwrap();
        assert!(window.contains(0.01, 0.02), "{window:?}");
    }

    #[test]
    fn test_roi_rate_below_total() {
        let table = spot_table();
        let params = StatsParams::default().with_detcorr(false);
        let stats = calc_stats(&table, None, &params, &InstrumentConfig::default()).unwrap();
        assert!(stats.roi <= stats.total);
        assert!(stats.roi > 0.0);
        assert_eq!(stats.lambda.len(), 50);
        assert_eq!(stats.i_total.len(), 50);
        assert_relative_eq!(stats.i_total.iter().sum::<f64>(), 50.0 * stats.total, max_relative = 1e-9);
        assert!(stats.peak >= stats.i_total[0]);
        assert!(stats.l_peak >= 3.0 && stats.l_peak <= 10.0);
    }

    #[test]
    fn test_explicit_window() {
        let table = spot_table();
        let window = RoiWindow::centered(0.01, 0.02, 0.005);
        let params = StatsParams::default().with_detcorr(false);
        let stats = calc_stats(&table, Some(window), &params, &InstrumentConfig::default()).unwrap();
        assert_eq!(stats.window, window);
        // all 400 spot events fall in the 1e-4 m² window, i.e. 100 mm²
        assert!(stats.roi > 3.99);
    }

    #[test]
    fn test_zero_area_window_is_non_finite() {
        let table = spot_table();
        let window = RoiWindow::centered(0.01, 0.02, 0.0);
        let params = StatsParams::default().with_detcorr(false);
        let stats = calc_stats(&table, Some(window), &params, &InstrumentConfig::default()).unwrap();
        assert!(!stats.roi.is_finite());
        assert!(stats.total.is_finite());
    }

    #[test]
    fn test_detcorr_lowers_rates() {
        let table = spot_table();
        let config = InstrumentConfig::default();
        let raw = calc_stats(&table, None, &StatsParams::default().with_detcorr(false), &config)
            .unwrap();
        let corrected = calc_stats(&table, None, &StatsParams::default(), &config).unwrap();
        assert!(corrected.total < raw.total);
    }

    #[test]
    fn test_requires_wavelength() {
        let mut table = EventTable::default();
        table.push(1.0, 0.0, 0.0, 0.0, 0.01);
        let err = calc_stats(&table, None, &StatsParams::default(), &InstrumentConfig::default())
            .unwrap_err();
        assert!(matches!(err, Error::MissingColumn(_)));
    }
}
