//! CSV exporter

use crate::error::{OutputError, Result};
use crate::output::OutputWriter;
use crate::row::TransactionRow;
use futures::{Stream, StreamExt};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Column names, in the order of [`TransactionRow::to_record`]
pub const HEADER: [&str; 10] = [
    "Transaction Hash",
    "Date & Time",
    "From Address",
    "To Address",
    "Transaction Type",
    "Asset Contract Address",
    "Asset Symbol/Name",
    "Token ID",
    "Value/Amount",
    "Gas Fee (ETH)",
];

/// Writes transaction rows as CSV. The header goes out on creation, so even an
/// export with no rows produces a valid file.
pub struct CsvExporter {
    writer: csv::Writer<Box<dyn Write + Send>>,
    rows_written: usize,
    rows_skipped: usize,
}

impl CsvExporter {
    /// Export to a file (parent directories are created) or stdout
    pub fn new(path: Option<&Path>) -> Result<Self> {
        let output: Box<dyn Write + Send> = if let Some(p) = path {
            if let Some(parent) = p.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .map_err(|e| OutputError::FileCreate(format!("{}: {}", parent.display(), e)))?;
            }
            let file = File::create(p)
                .map_err(|e| OutputError::FileCreate(format!("{}: {}", p.display(), e)))?;
            Box::new(BufWriter::new(file))
        } else {
            Box::new(BufWriter::new(io::stdout()))
        };

        Self::from_writer(output)
    }

    pub fn from_writer(output: Box<dyn Write + Send>) -> Result<Self> {
        let mut writer = csv::Writer::from_writer(output);
        writer
            .write_record(HEADER)
            .map_err(|e| OutputError::CsvWrite(e.to_string()))?;

        Ok(Self {
            writer,
            rows_written: 0,
            rows_skipped: 0,
        })
    }

    pub fn rows_skipped(&self) -> usize {
        self.rows_skipped
    }

    /// Write one row; rows missing hash, time or sender are skipped
    pub fn write_row(&mut self, row: &TransactionRow) -> Result<bool> {
        if !row.is_exportable() {
            tracing::warn!(
                "Skipping {} row without hash, timestamp or sender: {:?}",
                row.transaction_type,
                row.transaction_hash
            );
            self.rows_skipped += 1;
            return Ok(false);
        }

        self.writer
            .write_record(row.to_record())
            .map_err(|e| OutputError::CsvWrite(e.to_string()))?;
        self.rows_written += 1;
        Ok(true)
    }

    /// Pull rows from a stream and write each as it arrives.
    ///
    /// `on_progress` receives the running count of written rows. An error item
    /// stops the export after flushing what was written.
    pub async fn export_stream<S, F>(&mut self, rows: S, mut on_progress: F) -> Result<usize>
    where
        S: Stream<Item = Result<TransactionRow>>,
        F: FnMut(usize),
    {
        let mut rows = std::pin::pin!(rows);
        let start = self.rows_written;

        while let Some(item) = rows.next().await {
            match item {
                Ok(row) => {
                    if self.write_row(&row)? {
                        on_progress(self.rows_written);
                    }
                }
                Err(e) => {
                    self.finalize()?;
                    return Err(e);
                }
            }
        }

        self.finalize()?;
        Ok(self.rows_written - start)
    }
}

impl OutputWriter for CsvExporter {
    fn write_rows(&mut self, rows: &[TransactionRow]) -> Result<usize> {
        let mut written = 0;
        for row in rows {
            if self.write_row(row)? {
                written += 1;
            }
        }
        Ok(written)
    }

    fn finalize(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| OutputError::CsvWrite(e.to_string()))?;
        Ok(())
    }
}
