//! Reader for McStas `mccode.sim` statistics files.
//!
//! The file holds repeated blocks
//!
//! ```text
//! begin data
//!   component: mon3
//!   values: 1.2e3 4.5e1 1000
//! end data
//! ```
//!
//! keyed by their `component` field. Blocks without one are skipped.

use crate::{Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

const BLOCK_START: &str = "begin data";
const BLOCK_END: &str = "end data";

/// Fields of every data block, by component name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SimStatistics {
    components: BTreeMap<String, BTreeMap<String, String>>,
}

impl SimStatistics {
    /// Parses the text of a statistics file.
    ///
    /// Lines without a colon inside a block are ignored. A block missing the
    /// `component` field is skipped with a warning; a later block with the
    /// same component replaces an earlier one.
    ///
    /// # Errors
    /// Returns [`Error::InvalidFormat`] if a block is never closed.
    pub fn parse(text: &str) -> Result<Self> {
        let mut components = BTreeMap::new();
        let mut block: Option<(usize, BTreeMap<String, String>)> = None;

        for (i, line) in text.lines().enumerate() {
            let line_no = i + 1;
            let trimmed = line.trim();
            match block.as_mut() {
                None => {
                    if trimmed == BLOCK_START {
                        block = Some((line_no, BTreeMap::new()));
                    }
                }
                Some((start, fields)) => {
                    if trimmed == BLOCK_END {
                        let start = *start;
                        let fields = std::mem::take(fields);
                        block = None;
                        match fields.get("component").cloned() {
                            Some(name) => {
                                components.insert(name, fields);
                            }
                            None => log::warn!(
                                "skipping data block at line {start} without a component field"
                            ),
                        }
                    } else if let Some((key, value)) = trimmed.split_once(':') {
                        fields.insert(key.trim().to_string(), value.trim().to_string());
                    }
                }
            }
        }

        if let Some((start, _)) = block {
            return Err(Error::format(start, "data block is not closed"));
        }
        Ok(Self { components })
    }

    /// Fields of one component.
    #[must_use]
    pub fn component(&self, name: &str) -> Option<&BTreeMap<String, String>> {
        self.components.get(name)
    }

    /// Component names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.components.keys().map(String::as_str)
    }

    /// Number of components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// True if no block was kept.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// First whitespace-separated number of a field, e.g. the integrated
    /// intensity in a monitor's `values`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidFormat`] if the component or key is absent or
    /// the value does not start with a number.
    pub fn first_value(&self, component: &str, key: &str) -> Result<f64> {
        let raw = self
            .component(component)
            .and_then(|fields| fields.get(key))
            .ok_or_else(|| Error::format(0, format!("no field {key:?} for component {component:?}")))?;
        raw.split_whitespace()
            .next()
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| Error::format(0, format!("{component}.{key} is not numeric: {raw:?}")))
    }
}

/// Reads and parses a statistics file.
///
/// # Errors
/// Returns I/O or format errors.
pub fn read_sim_file<P: AsRef<Path>>(path: P) -> Result<SimStatistics> {
    let text = std::fs::read_to_string(path)?;
    SimStatistics::parse(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const SIM: &str = "\
begin instrument: mstar
  Param: selene_b=0.03
end instrument

begin data
  Date: Tue Oct 14 10:21:07 2025
  type: array_0d
  component: mon3
  values: 1.25e3 4.5e1 1000
end data

begin data
  type: array_1d(100)
  values: 7 8 9
end data

begin data
  component: detectorEvents
  filename: events.dat
  xlimits: 0 1
end data
";

    #[test]
    fn test_parse_blocks() {
        let stats = SimStatistics::parse(SIM).unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats.names().collect::<Vec<_>>(), vec!["detectorEvents", "mon3"]);
        let mon = stats.component("mon3").unwrap();
        assert_eq!(mon["type"], "array_0d");
        assert_eq!(mon["component"], "mon3");
        // only the first colon splits
        assert_eq!(mon["Date"], "Tue Oct 14 10:21:07 2025");
    }

    #[test]
    fn test_first_value() {
        let stats = SimStatistics::parse(SIM).unwrap();
        assert_relative_eq!(stats.first_value("mon3", "values").unwrap(), 1250.0);
        assert!(stats.first_value("mon3", "missing").is_err());
        assert!(stats.first_value("detectorEvents", "filename").is_err());
    }

    #[test]
    fn test_block_without_component_is_skipped() {
        let stats = SimStatistics::parse("begin data\nvalues: 1\nend data\n").unwrap();
        assert!(stats.is_empty());
    }

    #[test]
    fn test_unclosed_block() {
        let err = SimStatistics::parse("begin data\ncomponent: a\n").unwrap_err();
        assert!(matches!(err, Error::InvalidFormat { line: 1, .. }));
    }

    #[test]
    fn test_json_output() {
        let stats = SimStatistics::parse("begin data\ncomponent: a\nvalues: 1 2\nend data\n")
            .unwrap();
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["a"]["values"], "1 2");
    }
}
