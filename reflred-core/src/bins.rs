//! Histogram bin edges.
//!
//! `BinEdges` is always strictly increasing with at least two edges. Bins are
//! half-open `[e_i, e_{i+1})` except the last one, which also includes its
//! upper edge.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Strictly increasing histogram bin edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct BinEdges(Vec<f64>);

impl BinEdges {
    /// Wraps explicit edges.
    ///
    /// # Errors
    /// Returns [`Error::InvalidBins`] for fewer than two edges, non-finite
    /// edges, or edges that are not strictly increasing.
    pub fn from_vec(edges: Vec<f64>) -> Result<Self> {
        if edges.len() < 2 {
            return Err(Error::InvalidBins(format!(
                "need at least 2 edges, got {}",
                edges.len()
            )));
        }
        if let Some(bad) = edges.iter().find(|e| !e.is_finite()) {
            return Err(Error::InvalidBins(format!("non-finite edge {bad}")));
        }
        if let Some(i) = edges.windows(2).position(|w| w[0] >= w[1]) {
            return Err(Error::InvalidBins(format!(
                "edges not strictly increasing at index {i}: {} >= {}",
                edges[i],
                edges[i + 1]
            )));
        }
        Ok(Self(edges))
    }

    /// Variable-width q bins with geometric growth and an absolute step floor.
    ///
    /// Starting at `qmin`, every following edge is
    /// `max(prev * (1 + qres), prev + mindq)`. Generation stops with the first
    /// edge at or above `qmax`, which is kept as the last edge.
    ///
    /// # Errors
    /// - [`Error::NonTerminatingBins`] if `qres` and `mindq` are both zero,
    ///   or if a step is lost to rounding or overflows before reaching `qmax`.
    /// - [`Error::InvalidRange`] if `qmin >= qmax` or either is non-finite.
    /// - [`Error::NonPositive`] if `qmin <= 0` while `mindq` is zero, since
    ///   multiplicative growth alone never leaves zero.
    /// - [`Error::Config`] for negative `qres` or `mindq`.
    pub fn geometric(qmin: f64, qmax: f64, qres: f64, mindq: f64) -> Result<Self> {
        if !(qmin.is_finite() && qmax.is_finite()) || qmin >= qmax {
            return Err(Error::InvalidRange {
                name: "q",
                min: qmin,
                max: qmax,
            });
        }
        if !(qres >= 0.0 && mindq >= 0.0) || !qres.is_finite() || !mindq.is_finite() {
            return Err(Error::Config(format!(
                "qres and mindq must be finite and non-negative, got qres={qres}, mindq={mindq}"
            )));
        }
        if qres == 0.0 && mindq == 0.0 {
            return Err(Error::NonTerminatingBins);
        }
        if qmin <= 0.0 && mindq == 0.0 {
            return Err(Error::NonPositive {
                name: "qmin",
                value: qmin,
            });
        }

        let growth = 1.0 + qres;
        let mut edges = vec![qmin];
        let mut last = qmin;
        while last < qmax {
            let next = (last * growth).max(last + mindq);
            if !(next.is_finite() && next > last) {
                return Err(Error::NonTerminatingBins);
            }
            last = next;
            edges.push(last);
        }
        Ok(Self(edges))
    }

    /// `n` equal-width bins spanning `[min, max]`.
    ///
    /// # Errors
    /// Returns an error for `n == 0` or an empty range.
    #[allow(clippy::cast_precision_loss)]
    pub fn uniform(min: f64, max: f64, n: usize) -> Result<Self> {
        if n == 0 {
            return Err(Error::InvalidBins("bin count must be positive".into()));
        }
        if !(min.is_finite() && max.is_finite()) || min >= max {
            return Err(Error::InvalidRange {
                name: "bin",
                min,
                max,
            });
        }
        let width = (max - min) / n as f64;
        let mut edges: Vec<f64> = (0..n).map(|i| min + width * i as f64).collect();
        edges.push(max);
        Self::from_vec(edges)
    }

    /// Returns the edges.
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Number of edges.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; kept for the `len`/`is_empty` pair.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of bins (`len() - 1`).
    #[must_use]
    pub fn bin_count(&self) -> usize {
        self.0.len() - 1
    }

    /// Lower edge of the first bin.
    #[must_use]
    pub fn first(&self) -> f64 {
        self.0[0]
    }

    /// Upper edge of the last bin.
    #[must_use]
    pub fn last(&self) -> f64 {
        self.0[self.0.len() - 1]
    }

    /// Bin centres, `(e_i + e_{i+1}) / 2`.
    #[must_use]
    pub fn centers(&self) -> Vec<f64> {
        self.0.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect()
    }

    /// Bin index for `value`, or `None` if it falls outside the edges.
    #[inline]
    #[must_use]
    pub fn find_bin(&self, value: f64) -> Option<usize> {
        let edges = &self.0;
        let last = edges.len() - 1;
        if !(value >= edges[0] && value <= edges[last]) {
            return None;
        }
        if value == edges[last] {
            return Some(last - 1);
        }
        // First edge strictly greater than value, minus one.
        Some(edges.partition_point(|&e| e <= value) - 1)
    }
}

impl TryFrom<Vec<f64>> for BinEdges {
    type Error = Error;

    fn try_from(edges: Vec<f64>) -> Result<Self> {
        Self::from_vec(edges)
    }
}

impl From<BinEdges> for Vec<f64> {
    fn from(edges: BinEdges) -> Self {
        edges.0
    }
}

/// Logarithmic wavelength grid with matching centre values.
#[derive(Debug, Clone, PartialEq)]
pub struct LogGrid {
    /// Bin edges, offset half a step below each centre.
    pub edges: BinEdges,
    /// Nominal bin wavelengths.
    pub centers: Vec<f64>,
}

impl LogGrid {
    /// Grid with constant ratio `ratio` between neighbouring points.
    ///
    /// With `a = ln(lmin)/ln(ratio)` and `b = ln(lmax)/ln(ratio)`, centres are
    /// `ratio^(a+k)` for `a + k < b + 1` and edges `ratio^(a+k-1/2)` for
    /// `a + k < b + 2`, so the grid extends one point past `lmax`.
    ///
    /// # Errors
    /// Returns an error for non-positive wavelengths, `lmin >= lmax`, or a
    /// ratio not above one.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn new(lmin: f64, lmax: f64, ratio: f64) -> Result<Self> {
        Error::ensure_positive("lambda_min", lmin)?;
        Error::ensure_positive("lambda_max", lmax)?;
        if lmin >= lmax {
            return Err(Error::InvalidRange {
                name: "lambda",
                min: lmin,
                max: lmax,
            });
        }
        if !(ratio.is_finite() && ratio > 1.0) {
            return Err(Error::Config(format!(
                "grid ratio must exceed 1, got {ratio}"
            )));
        }

        let log_ratio = ratio.ln();
        let a = lmin.ln() / log_ratio;
        let b = lmax.ln() / log_ratio;
        // Half-open ranges [a, b + 2) and [a, b + 1) with unit step.
        let n_edges = (b + 2.0 - a).ceil() as usize;
        let n_centers = (b + 1.0 - a).ceil() as usize;

        let edges = (0..n_edges)
            .map(|k| ratio.powf(a + k as f64 - 0.5))
            .collect();
        let centers = (0..n_centers).map(|k| ratio.powf(a + k as f64)).collect();

        Ok(Self {
            edges: BinEdges::from_vec(edges)?,
            centers,
        })
    }
}
