//! reflred-io: File I/O for reflectometry event reduction.
//!
//! This crate reads McStas list-mode event files and 1D monitors through
//! memory-mapped files via memmap2, parses `mccode.sim` statistics, and
//! writes reduced tables with a commented header.
//!

mod error;
mod reader;
pub mod sim;
mod writer;

pub use error::{Error, Result};
pub use reader::{
    read_monitor_1d, EventFileReader, MappedFileReader, McStasTable, MonitorFile,
};
pub use sim::{read_sim_file, SimStatistics};
pub use writer::TableWriter;
