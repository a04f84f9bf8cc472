//! Projection of event tables onto histograms.
//!
//! The projection primitive is the single point where event columns are
//! read: derived columns are computed per event, the filter is applied, and
//! the event weight (times an optional normalization expression) is summed
//! into the bin of the target column. Any event source that can satisfy
//! this contract implements [`Projector`].
//!
//! [`EventTable`] implements it in memory: expression evaluation and
//! filtering run in parallel over events, then the surviving
//! `(value, weight)` pairs are summed into bins sequentially so repeated
//! projections of the same table give bit-identical histograms.

use crate::bins::BinEdges;
use crate::error::{Error, Result};
use crate::event::EventTable;
use crate::expr::{Column, Expr, Predicate};
use ndarray::Array2;
use rayon::prelude::*;
use std::collections::BTreeSet;

/// How the target axis is binned.
#[derive(Debug, Clone, PartialEq)]
pub enum BinSpec {
    /// Explicit edges.
    Edges(BinEdges),
    /// Equal-width bins spanning the minimum to maximum of the filtered values.
    Count(usize),
}

impl From<BinEdges> for BinSpec {
    fn from(edges: BinEdges) -> Self {
        BinSpec::Edges(edges)
    }
}

/// A named column computed from an expression before filtering and binning.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedColumn {
    pub column: Column,
    pub expr: Expr,
}

/// Columns computed, filter and weighting shared by 1D and 2D projections.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Selection {
    /// Derived columns, evaluated in order; later ones may use earlier ones.
    pub derived: Vec<DerivedColumn>,
    /// Events failing the filter are dropped.
    pub filter: Predicate,
    /// Multiplier applied to each event weight.
    pub norm: Option<Expr>,
}

impl Selection {
    /// Checks that every referenced column is stored or derived beforehand.
    ///
    /// `stored` reports whether the event source carries a column.
    ///
    /// # Errors
    /// Returns [`Error::MissingColumn`] for the first unresolved column.
    pub fn check_columns(&self, targets: &[Column], stored: impl Fn(Column) -> bool) -> Result<()> {
        let mut known: BTreeSet<Column> = Column::ALL.into_iter().filter(|c| stored(*c)).collect();
        let require = |columns: BTreeSet<Column>, known: &BTreeSet<Column>| {
            columns
                .into_iter()
                .find(|c| !known.contains(c))
                .map_or(Ok(()), |c| Err(Error::MissingColumn(c.name().to_string())))
        };

        for derived in &self.derived {
            require(derived.expr.columns(), &known)?;
            known.insert(derived.column);
        }

        let mut used: BTreeSet<Column> = targets.iter().copied().collect();
        used.insert(Column::P);
        self.filter.collect_columns(&mut used);
        if let Some(norm) = &self.norm {
            norm.collect_columns(&mut used);
        }
        require(used, &known)
    }
}

/// Request for a 1D histogram.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection1d {
    pub target: Column,
    pub bins: BinSpec,
    pub selection: Selection,
}

impl Projection1d {
    /// Projects `target` onto `bins` with no derivation, filter or norm.
    #[must_use]
    pub fn new(target: Column, bins: impl Into<BinSpec>) -> Self {
        Self {
            target,
            bins: bins.into(),
            selection: Selection::default(),
        }
    }

    /// Adds a derived column.
    #[must_use]
    pub fn derive(mut self, column: Column, expr: Expr) -> Self {
        self.selection.derived.push(DerivedColumn { column, expr });
        self
    }

    /// Sets the event filter.
    #[must_use]
    pub fn filter(mut self, filter: Predicate) -> Self {
        self.selection.filter = filter;
        self
    }

    /// Sets the weight normalization.
    #[must_use]
    pub fn norm(mut self, norm: Expr) -> Self {
        self.selection.norm = Some(norm);
        self
    }
}

/// Request for a 2D histogram.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection2d {
    pub x: Column,
    pub y: Column,
    pub x_bins: BinSpec,
    pub y_bins: BinSpec,
    pub selection: Selection,
}

impl Projection2d {
    /// Projects `(x, y)` onto a grid.
    #[must_use]
    pub fn new(x: Column, y: Column, x_bins: impl Into<BinSpec>, y_bins: impl Into<BinSpec>) -> Self {
        Self {
            x,
            y,
            x_bins: x_bins.into(),
            y_bins: y_bins.into(),
            selection: Selection::default(),
        }
    }

    /// Sets the event filter.
    #[must_use]
    pub fn filter(mut self, filter: Predicate) -> Self {
        self.selection.filter = filter;
        self
    }
}

/// Summed weights per bin.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram1d {
    pub edges: BinEdges,
    pub counts: Vec<f64>,
}

impl Histogram1d {
    /// Bin centres.
    #[must_use]
    pub fn centers(&self) -> Vec<f64> {
        self.edges.centers()
    }

    /// Sum over all bins.
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.counts.iter().sum()
    }

    /// Index and value of the largest bin; first one wins on ties.
    #[must_use]
    pub fn argmax(&self) -> Option<(usize, f64)> {
        argmax(self.counts.iter().copied())
    }
}

/// Summed weights on a 2D grid, indexed `[x_bin, y_bin]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram2d {
    pub x_edges: BinEdges,
    pub y_edges: BinEdges,
    pub counts: Array2<f64>,
}

impl Histogram2d {
    /// Grid cell `(x_bin, y_bin)` with the largest weight.
    #[must_use]
    pub fn argmax(&self) -> Option<((usize, usize), f64)> {
        let (_, ny) = self.counts.dim();
        argmax(self.counts.iter().copied()).map(|(flat, value)| ((flat / ny, flat % ny), value))
    }

    /// Centre of a grid cell.
    #[must_use]
    pub fn cell_center(&self, ix: usize, iy: usize) -> (f64, f64) {
        let x = self.x_edges.as_slice();
        let y = self.y_edges.as_slice();
        (0.5 * (x[ix] + x[ix + 1]), 0.5 * (y[iy] + y[iy + 1]))
    }
}

fn argmax(values: impl Iterator<Item = f64>) -> Option<(usize, f64)> {
    values
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .fold(None, |best, (i, v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
}

/// An event source that can be projected onto histograms.
pub trait Projector: Send + Sync {
    /// Bins weighted events along one column.
    ///
    /// # Errors
    /// Implementations report missing columns, invalid bins, and their own
    /// upstream failures.
    fn project1d(&self, request: &Projection1d) -> Result<Histogram1d>;

    /// Bins weighted events on a 2D grid.
    ///
    /// # Errors
    /// As for [`Projector::project1d`].
    fn project2d(&self, request: &Projection2d) -> Result<Histogram2d>;
}

/// Evaluates derived columns, filter and weight for every event and returns
/// the target values of the events that pass.
fn select<const N: usize>(
    table: &EventTable,
    selection: &Selection,
    targets: [Column; N],
) -> Result<Vec<([f64; N], f64)>> {
    table.check_lengths()?;
    selection.check_columns(&targets, |c| table.column(c).is_some())?;

    let selected = (0..table.len())
        .into_par_iter()
        .filter_map(|i| {
            let mut row = table.row(i);
            for derived in &selection.derived {
                row[derived.column.index()] = derived.expr.eval(&row);
            }
            if !selection.filter.eval(&row) {
                return None;
            }
            let norm = selection.norm.as_ref().map_or(1.0, |n| n.eval(&row));
            let weight = row[Column::P.index()] * norm;
            Some((targets.map(|c| row[c.index()]), weight))
        })
        .collect();
    Ok(selected)
}

/// Resolves a bin spec against the selected values of one axis.
///
/// A bin count spans the finite minimum to maximum; a degenerate range is
/// widened by 0.5 on either side and an empty selection falls back to
/// `[0, 1]`.
fn resolve_bins(spec: &BinSpec, values: impl Iterator<Item = f64>) -> Result<BinEdges> {
    match spec {
        BinSpec::Edges(edges) => Ok(edges.clone()),
        BinSpec::Count(n) => {
            let (min, max) = values
                .filter(|v| v.is_finite())
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                    (lo.min(v), hi.max(v))
                });
            let (min, max) = if min > max {
                (0.0, 1.0)
            } else if min == max {
                (min - 0.5, max + 0.5)
            } else {
                (min, max)
            };
            BinEdges::uniform(min, max, *n)
        }
    }
}

impl Projector for EventTable {
    fn project1d(&self, request: &Projection1d) -> Result<Histogram1d> {
        let selected = select(self, &request.selection, [request.target])?;
        let edges = resolve_bins(&request.bins, selected.iter().map(|(v, _)| v[0]))?;

        let mut counts = vec![0.0; edges.bin_count()];
        for ([value], weight) in &selected {
            if let Some(bin) = edges.find_bin(*value) {
                counts[bin] += weight;
            }
        }
        log::trace!(
            "projected {} of {} events onto {} bins of {}",
            selected.len(),
            self.len(),
            counts.len(),
            request.target
        );
        Ok(Histogram1d { edges, counts })
    }

    fn project2d(&self, request: &Projection2d) -> Result<Histogram2d> {
        let selected = select(self, &request.selection, [request.x, request.y])?;
        let x_edges = resolve_bins(&request.x_bins, selected.iter().map(|(v, _)| v[0]))?;
        let y_edges = resolve_bins(&request.y_bins, selected.iter().map(|(v, _)| v[1]))?;

        let mut counts = Array2::zeros((x_edges.bin_count(), y_edges.bin_count()));
        for ([x, y], weight) in &selected {
            if let (Some(ix), Some(iy)) = (x_edges.find_bin(*x), y_edges.find_bin(*y)) {
                counts[[ix, iy]] += weight;
            }
        }
        Ok(Histogram2d {
            x_edges,
            y_edges,
            counts,
        })
    }
}
