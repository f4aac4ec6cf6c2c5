//! Export writers

mod csv;

pub use self::csv::{CsvExporter, HEADER};

use crate::error::Result;
use crate::row::TransactionRow;

/// Destination for exported rows
pub trait OutputWriter {
    /// Write rows, returning how many were accepted
    fn write_rows(&mut self, rows: &[TransactionRow]) -> Result<usize>;

    /// Flush buffered output
    fn finalize(&mut self) -> Result<()>;
}
