//! reflred-core: Core types for reflectometry event reduction.
//!
//! This crate provides the event table, instrument configuration, typed
//! expression tree, q-bin generator and the projection contract that the
//! reduction algorithms are written against, together with its parallel
//! in-memory implementation for [`EventTable`].
//!

pub mod bins;
pub mod error;
pub mod event;
pub mod expr;
pub mod instrument;
pub mod projection;

pub use bins::{BinEdges, LogGrid};
pub use error::{Error, Result};
pub use event::{EventTable, TableSummary};
pub use expr::{Column, ColumnValues, Expr, Predicate};
pub use instrument::{wavelength_from_energy, DetectorEfficiencyConfig, InstrumentConfig};
pub use projection::{
    BinSpec, DerivedColumn, Histogram1d, Histogram2d, Projection1d, Projection2d, Projector,
    Selection,
};
