//! Memory-mapped readers for McStas text output.
//!
//! List-mode event files and 1D monitor files share one layout: `#` header
//! lines of `key: value` pairs, one of which (`variables`) names the
//! whitespace-separated columns of the data rows that follow.

use crate::{Error, Result};
use memmap2::Mmap;
use rayon::prelude::*;
use reflred_core::{wavelength_from_energy, EventTable, InstrumentConfig, TableSummary};
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A memory-mapped file reader.
///
/// Uses memmap2 to access file contents without loading the entire file
/// into memory.
pub struct MappedFileReader {
    mmap: Arc<Mmap>,
    path: PathBuf,
}

impl MappedFileReader {
    /// Opens a file for memory-mapped reading.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or memory-mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        // SAFETY: The file is opened read-only and we assume it is not modified concurrently.
        // This is the standard safety contract for memory mapping.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self {
            mmap: Arc::new(mmap),
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Returns the file contents as a byte slice.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.mmap[..]
    }

    /// Returns the file contents as UTF-8 text.
    ///
    /// # Errors
    /// Returns [`Error::InvalidFormat`] if the file is not valid UTF-8.
    pub fn as_text(&self) -> Result<&str> {
        std::str::from_utf8(self.as_bytes()).map_err(|e| {
            Error::format(
                0,
                format!("{} is not UTF-8 text: {e}", self.path.display()),
            )
        })
    }

    /// Path the mapping was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    /// Returns true if the file is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }
}

/// Parsed McStas text table: header metadata plus named numeric columns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct McStasTable {
    /// Header `key: value` pairs, keys and values trimmed.
    pub metadata: BTreeMap<String, String>,
    /// Column names from the `variables` header.
    pub variables: Vec<String>,
    /// One vector per variable.
    pub columns: Vec<Vec<f64>>,
}

fn parse_row(line_no: usize, line: &str, width: usize) -> Result<Vec<f64>> {
    let values = line
        .split_whitespace()
        .map(|field| {
            field
                .parse::<f64>()
                .map_err(|e| Error::format(line_no, format!("bad number {field:?}: {e}")))
        })
        .collect::<Result<Vec<f64>>>()?;
    if values.len() != width {
        return Err(Error::format(
            line_no,
            format!("expected {width} columns, found {}", values.len()),
        ));
    }
    Ok(values)
}

impl McStasTable {
    /// Parses header and data rows; rows are parsed in parallel.
    ///
    /// # Errors
    /// Returns [`Error::InvalidFormat`] for a missing `variables` header, a
    /// row of the wrong width or a field that is not a number.
    pub fn parse(text: &str) -> Result<Self> {
        let mut metadata = BTreeMap::new();
        let mut rows = Vec::new();
        for (i, line) in text.lines().enumerate() {
            let trimmed = line.trim();
            if let Some(header) = trimmed.strip_prefix('#') {
                if let Some((key, value)) = header.split_once(':') {
                    metadata.insert(key.trim().to_string(), value.trim().to_string());
                }
            } else if !trimmed.is_empty() {
                rows.push((i + 1, trimmed));
            }
        }

        let variables: Vec<String> = metadata
            .get("variables")
            .ok_or_else(|| Error::format(0, "no '# variables:' header"))?
            .split_whitespace()
            .map(str::to_string)
            .collect();
        if variables.is_empty() {
            return Err(Error::format(0, "empty '# variables:' header"));
        }
        let width = variables.len();

        let parsed = rows
            .par_iter()
            .map(|(line_no, line)| parse_row(*line_no, line, width))
            .collect::<Result<Vec<Vec<f64>>>>()?;

        let mut columns = vec![Vec::with_capacity(parsed.len()); width];
        for row in parsed {
            for (column, value) in columns.iter_mut().zip(row) {
                column.push(value);
            }
        }
        Ok(Self {
            metadata,
            variables,
            columns,
        })
    }

    /// Number of data rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    /// True if there are no data rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Column by variable name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.variables
            .iter()
            .position(|v| v == name)
            .map(|i| self.columns[i].as_slice())
    }

    fn require(&self, name: &str) -> Result<Vec<f64>> {
        self.column(name)
            .map(<[f64]>::to_vec)
            .ok_or_else(|| reflred_core::Error::MissingColumn(name.to_string()).into())
    }

    /// Converts list-mode columns to an event table.
    ///
    /// `p x y z t` are required. The wavelength is read from `L` if present,
    /// otherwise derived from `vx vy vz` or from `ekin` (MeV).
    ///
    /// # Errors
    /// Returns a missing-column error for any absent required column.
    pub fn to_event_table(&self, config: &InstrumentConfig) -> Result<EventTable> {
        let wavelength = if let Some(l) = self.column("L") {
            Some(l.to_vec())
        } else if let (Some(vx), Some(vy), Some(vz)) =
            (self.column("vx"), self.column("vy"), self.column("vz"))
        {
            Some(
                vx.par_iter()
                    .zip(vy)
                    .zip(vz)
                    .map(|((x, y), z)| config.wavelength_from_velocity(x.hypot(*y).hypot(*z)))
                    .collect(),
            )
        } else {
            self.column("ekin")
                .map(|e| e.par_iter().map(|e| wavelength_from_energy(*e)).collect())
        };
        if wavelength.is_none() {
            log::debug!("no wavelength information among {:?}", self.variables);
        }

        Ok(EventTable::from_columns(
            self.require("p")?,
            self.require("x")?,
            self.require("y")?,
            self.require("z")?,
            self.require("t")?,
            wavelength,
        )?)
    }
}

/// Reader for McStas list-mode event files.
pub struct EventFileReader {
    reader: MappedFileReader,
    config: InstrumentConfig,
}

impl EventFileReader {
    /// Opens an event file with the default instrument configuration.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or memory-mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            reader: MappedFileReader::open(path)?,
            config: InstrumentConfig::default(),
        })
    }

    /// Sets the instrument used for velocity to wavelength conversion.
    #[must_use]
    pub fn with_config(mut self, config: InstrumentConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub fn file_size(&self) -> usize {
        self.reader.len()
    }

    /// Parses the whole file into its raw columns.
    ///
    /// # Errors
    /// Returns format errors from [`McStasTable::parse`].
    pub fn read_table(&self) -> Result<McStasTable> {
        McStasTable::parse(self.reader.as_text()?)
    }

    /// Reads all events.
    ///
    /// # Errors
    /// Returns format errors or a missing-column error.
    pub fn read(&self) -> Result<EventTable> {
        let table = self.read_table()?.to_event_table(&self.config)?;
        let summary = TableSummary::from(&table);
        log::info!(
            "loaded {} events (total weight {:.4e}) from {}",
            summary.events,
            summary.total_weight,
            self.reader.path().display()
        );
        Ok(table)
    }
}

/// A McStas 1D monitor: equally spaced points between `xlimits`.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorFile {
    /// First and last x value from the `xlimits` header.
    pub xlimits: (f64, f64),
    /// Intensity column `I`.
    pub values: Vec<f64>,
    /// Error column `I_err`.
    pub errors: Vec<f64>,
}

impl MonitorFile {
    /// Extracts the monitor from a parsed table.
    ///
    /// # Errors
    /// Returns a format error for a missing or malformed `xlimits` header
    /// and a missing-column error without `I` and `I_err`.
    pub fn from_table(table: &McStasTable) -> Result<Self> {
        let limits = table
            .metadata
            .get("xlimits")
            .ok_or_else(|| Error::format(0, "no '# xlimits:' header"))?;
        let bounds = limits
            .split_whitespace()
            .map(str::parse::<f64>)
            .collect::<std::result::Result<Vec<f64>, _>>()
            .map_err(|e| Error::format(0, format!("bad xlimits {limits:?}: {e}")))?;
        let [lo, hi] = bounds[..] else {
            return Err(Error::format(
                0,
                format!("xlimits needs two values, got {limits:?}"),
            ));
        };
        Ok(Self {
            xlimits: (lo, hi),
            values: table.require("I")?,
            errors: table.require("I_err")?,
        })
    }
}

/// Reads a McStas 1D monitor file.
///
/// # Errors
/// Returns I/O, format or missing-column errors.
pub fn read_monitor_1d<P: AsRef<Path>>(path: P) -> Result<MonitorFile> {
    let reader = MappedFileReader::open(path)?;
    MonitorFile::from_table(&McStasTable::parse(reader.as_text()?)?)
}
