//! Structure of Arrays (`SoA`) storage for detector events.
//!
//! An `EventTable` stores one column per event property. Tables are treated
//! as read-only inputs: transformations such as efficiency correction build
//! a new table instead of mutating the shared one.

use crate::error::{Error, Result};
use crate::expr::{Column, ColumnValues};
use serde::{Deserialize, Serialize};

/// A table of neutron detection events in `SoA` layout.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventTable {
    /// Statistical weight of each event (`p`).
    pub p: Vec<f64>,
    /// Transverse position on the detector [m].
    pub x: Vec<f64>,
    /// Vertical position on the detector [m].
    pub y: Vec<f64>,
    /// Position along the beam [m].
    pub z: Vec<f64>,
    /// Arrival time since the reference pulse [s].
    pub t: Vec<f64>,
    /// Precomputed wavelength [Å] (`L`), if the source stored it.
    pub wavelength: Option<Vec<f64>>,
}

impl EventTable {
    /// Creates a new empty table with specified capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            p: Vec::with_capacity(capacity),
            x: Vec::with_capacity(capacity),
            y: Vec::with_capacity(capacity),
            z: Vec::with_capacity(capacity),
            t: Vec::with_capacity(capacity),
            wavelength: None,
        }
    }

    /// Builds a table from whole columns.
    ///
    /// # Errors
    /// Returns [`Error::LengthMismatch`] if the columns differ in length.
    pub fn from_columns(
        p: Vec<f64>,
        x: Vec<f64>,
        y: Vec<f64>,
        z: Vec<f64>,
        t: Vec<f64>,
        wavelength: Option<Vec<f64>>,
    ) -> Result<Self> {
        let table = Self {
            p,
            x,
            y,
            z,
            t,
            wavelength,
        };
        table.check_lengths()?;
        Ok(table)
    }

    /// Returns the number of events in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.p.len()
    }

    /// Returns true if the table holds no events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.p.is_empty()
    }

    /// Returns true if a precomputed wavelength column is present.
    #[must_use]
    pub fn has_wavelength(&self) -> bool {
        self.wavelength.is_some()
    }

    /// Pushes a single event without a stored wavelength.
    ///
    /// Mixing this with [`EventTable::push_with_wavelength`] on the same table
    /// leaves the wavelength column short; `check_lengths` reports it.
    pub fn push(&mut self, p: f64, x: f64, y: f64, z: f64, t: f64) {
        self.p.push(p);
        self.x.push(x);
        self.y.push(y);
        self.z.push(z);
        self.t.push(t);
    }

    /// Pushes a single event together with its wavelength.
    #[allow(clippy::too_many_arguments)]
    pub fn push_with_wavelength(&mut self, p: f64, x: f64, y: f64, z: f64, t: f64, l: f64) {
        self.push(p, x, y, z, t);
        self.wavelength
            .get_or_insert_with(|| Vec::with_capacity(self.p.capacity()))
            .push(l);
    }

    /// Appends all events from another table.
    ///
    /// The wavelength column is kept only if both tables carry one.
    pub fn append(&mut self, other: &EventTable) {
        self.wavelength = match (self.wavelength.take(), &other.wavelength) {
            (Some(mut mine), Some(theirs)) => {
                mine.extend_from_slice(theirs);
                Some(mine)
            }
            (None, Some(theirs)) if self.is_empty() => Some(theirs.clone()),
            _ => None,
        };
        self.p.extend_from_slice(&other.p);
        self.x.extend_from_slice(&other.x);
        self.y.extend_from_slice(&other.y);
        self.z.extend_from_slice(&other.z);
        self.t.extend_from_slice(&other.t);
    }

    /// Returns a stored column, `None` for derived or absent ones.
    #[must_use]
    pub fn column(&self, column: Column) -> Option<&[f64]> {
        match column {
            Column::P => Some(&self.p),
            Column::X => Some(&self.x),
            Column::Y => Some(&self.y),
            Column::Z => Some(&self.z),
            Column::T => Some(&self.t),
            Column::L => self.wavelength.as_deref(),
            Column::Lamda | Column::Q => None,
        }
    }

    /// Stored column values of event `i`; derived and absent columns are NaN.
    #[inline]
    #[must_use]
    pub fn row(&self, i: usize) -> ColumnValues {
        let mut row = [f64::NAN; Column::COUNT];
        row[Column::P.index()] = self.p[i];
        row[Column::X.index()] = self.x[i];
        row[Column::Y.index()] = self.y[i];
        row[Column::Z.index()] = self.z[i];
        row[Column::T.index()] = self.t[i];
        if let Some(l) = &self.wavelength {
            row[Column::L.index()] = l[i];
        }
        row
    }

    /// Sum of all event weights.
    #[must_use]
    pub fn total_weight(&self) -> f64 {
        self.p.iter().sum()
    }

    /// Returns a copy of this table with the weights replaced.
    ///
    /// # Errors
    /// Returns [`Error::LengthMismatch`] if `weights` has the wrong length.
    pub fn with_weights(&self, weights: Vec<f64>) -> Result<Self> {
        if weights.len() != self.len() {
            return Err(Error::LengthMismatch {
                column: Column::P.name().to_string(),
                expected: self.len(),
                actual: weights.len(),
            });
        }
        Ok(Self {
            p: weights,
            ..self.clone()
        })
    }

    /// Verifies that every column has the same number of entries.
    ///
    /// # Errors
    /// Returns [`Error::LengthMismatch`] naming the first inconsistent column.
    pub fn check_lengths(&self) -> Result<()> {
        let expected = self.len();
        let columns = [
            (Column::X, self.x.len()),
            (Column::Y, self.y.len()),
            (Column::Z, self.z.len()),
            (Column::T, self.t.len()),
        ];
        for (column, actual) in columns
            .into_iter()
            .chain(self.wavelength.as_ref().map(|l| (Column::L, l.len())))
        {
            if actual != expected {
                return Err(Error::LengthMismatch {
                    column: column.name().to_string(),
                    expected,
                    actual,
                });
            }
        }
        Ok(())
    }
}

/// Compact per-table summary, handy for logging.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TableSummary {
    /// Number of events.
    pub events: usize,
    /// Sum of weights.
    pub total_weight: f64,
}

impl From<&EventTable> for TableSummary {
    fn from(table: &EventTable) -> Self {
        Self {
            events: table.len(),
            total_weight: table.total_weight(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_event_table_operations() {
        let mut table = EventTable::with_capacity(10);
        assert!(table.is_empty());

        table.push(0.5, 0.01, 0.02, 0.0, 0.03);
        assert_eq!(table.len(), 1);
        assert!(!table.has_wavelength());

        table.push(1.5, -0.01, 0.0, 0.0, 0.04);
        assert_eq!(table.len(), 2);
        assert_relative_eq!(table.total_weight(), 2.0);
        assert!(table.check_lengths().is_ok());
    }

    #[test]
    fn test_push_with_wavelength() {
        let mut table = EventTable::default();
        table.push_with_wavelength(1.0, 0.0, 0.0, 0.0, 0.02, 4.0);
        table.push_with_wavelength(1.0, 0.0, 0.0, 0.0, 0.03, 5.0);
        assert_eq!(table.column(Column::L), Some(&[4.0, 5.0][..]));
        assert!(table.column(Column::Q).is_none());
    }

    #[test]
    fn test_from_columns_length_mismatch() {
        let result = EventTable::from_columns(
            vec![1.0, 1.0],
            vec![0.0, 0.0],
            vec![0.0],
            vec![0.0, 0.0],
            vec![0.0, 0.0],
            None,
        );
        assert!(matches!(
            result,
            Err(Error::LengthMismatch { ref column, .. }) if column == "y"
        ));
    }

    #[test]
    fn test_with_weights_copies() {
        let mut table = EventTable::default();
        table.push(1.0, 0.1, 0.2, 0.3, 0.4);
        let scaled = table.with_weights(vec![0.25]).unwrap();

        assert_relative_eq!(scaled.p[0], 0.25);
        assert_relative_eq!(table.p[0], 1.0);
        assert_eq!(scaled.x, table.x);
        assert!(table.with_weights(vec![]).is_err());
    }

    #[test]
    fn test_append_drops_partial_wavelength() {
        let mut a = EventTable::default();
        a.push_with_wavelength(1.0, 0.0, 0.0, 0.0, 0.0, 3.0);
        let mut b = EventTable::default();
        b.push(1.0, 0.0, 0.0, 0.0, 0.0);

        a.append(&b);
        assert_eq!(a.len(), 2);
        assert!(!a.has_wavelength());
    }
}
