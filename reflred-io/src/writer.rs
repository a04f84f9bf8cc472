//! Whitespace-delimited table output with a commented header.
//!
//! Layout:
//!
//! ```text
//! # <info line>
//! # q                        R                        I
//! # [1/Å]                    [1]                      [counts/s]
//!     5.025000e-03     9.871000e-01     1.200000e+02
//! ```

use crate::Result;
use reflred_core::Error as CoreError;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Width of a name or unit entry in the header.
const HEADER_WIDTH: usize = 24;
/// Width of a data field.
const FIELD_WIDTH: usize = 16;

/// Formats `value` like C's `%.6e`: mantissa with six decimals and a signed
/// exponent of at least two digits.
fn format_scientific(value: f64) -> String {
    if !value.is_finite() {
        return if value.is_nan() {
            "nan".to_string()
        } else if value > 0.0 {
            "inf".to_string()
        } else {
            "-inf".to_string()
        };
    }
    let formatted = format!("{value:.6e}");
    match formatted.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => formatted,
    }
}

/// Writer for reduced curves and other column tables.
pub struct TableWriter {
    writer: BufWriter<File>,
}

impl TableWriter {
    /// Creates a new file writer.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        Ok(Self { writer })
    }

    /// Writes a complete table.
    ///
    /// `info` may span several lines, each gets a `# ` prefix. `names`,
    /// `units` and `columns` must have the same length and every column the
    /// same number of rows.
    ///
    /// # Errors
    /// Returns a length-mismatch error for inconsistent inputs and I/O
    /// errors from the file.
    pub fn write_table(
        &mut self,
        info: &str,
        names: &[&str],
        units: &[&str],
        columns: &[&[f64]],
    ) -> Result<()> {
        for (what, len) in [("units", units.len()), ("columns", columns.len())] {
            if len != names.len() {
                return Err(CoreError::LengthMismatch {
                    column: what.to_string(),
                    expected: names.len(),
                    actual: len,
                }
                .into());
            }
        }
        let rows = columns.first().map_or(0, |c| c.len());
        if let Some((i, column)) = columns.iter().enumerate().find(|(_, c)| c.len() != rows) {
            return Err(CoreError::LengthMismatch {
                column: names[i].to_string(),
                expected: rows,
                actual: column.len(),
            }
            .into());
        }

        for line in info.lines() {
            writeln!(self.writer, "# {line}")?;
        }
        let header = |entries: Vec<String>| {
            entries
                .iter()
                .map(|e| format!("{e:<HEADER_WIDTH$}"))
                .collect::<Vec<_>>()
                .join(" ")
        };
        writeln!(
            self.writer,
            "# {}",
            header(names.iter().map(|n| (*n).to_string()).collect())
        )?;
        writeln!(
            self.writer,
            "# {}",
            header(units.iter().map(|u| format!("[{u}]")).collect())
        )?;

        for row in 0..rows {
            let line = columns
                .iter()
                .map(|c| format!("{:>FIELD_WIDTH$}", format_scientific(c[row])))
                .collect::<Vec<_>>()
                .join(" ");
            writeln!(self.writer, "{line}")?;
        }

        self.writer.flush()?;
        Ok(())
    }

    /// Flushes the writer.
    ///
    /// # Errors
    /// Returns the underlying I/O error.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_format_scientific() {
        assert_eq!(format_scientific(0.005025), "5.025000e-03");
        assert_eq!(format_scientific(120.0), "1.200000e+02");
        assert_eq!(format_scientific(0.0), "0.000000e+00");
        assert_eq!(format_scientific(-1.5e-120), "-1.500000e-120");
        assert_eq!(format_scientific(f64::NAN), "nan");
        assert_eq!(format_scientific(f64::NEG_INFINITY), "-inf");
    }

    #[test]
    fn test_write_table() {
        let file = NamedTempFile::new().unwrap();
        let mut writer = TableWriter::create(file.path()).unwrap();
        writer
            .write_table(
                "M-STAR reflectivity\nomega=1.0",
                &["q", "R"],
                &["1/Å", "1"],
                &[&[0.005, 0.006], &[1.0, f64::INFINITY]],
            )
            .unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], "# M-STAR reflectivity");
        assert_eq!(lines[1], "# omega=1.0");
        assert_eq!(lines[2], format!("# {:<24} {:<24}", "q", "R"));
        assert_eq!(lines[3], format!("# {:<24} {:<24}", "[1/Å]", "[1]"));
        assert_eq!(lines[4], "    5.000000e-03     1.000000e+00");
        assert_eq!(lines[5], "    6.000000e-03              inf");
    }

    #[test]
    fn test_length_mismatch() {
        let file = NamedTempFile::new().unwrap();
        let mut writer = TableWriter::create(file.path()).unwrap();
        assert!(writer
            .write_table("", &["a", "b"], &["1", "1"], &[&[1.0], &[1.0, 2.0]])
            .is_err());
        assert!(writer.write_table("", &["a"], &[], &[&[1.0]]).is_err());
    }
}
