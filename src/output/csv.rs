//! CSV export of stored records

use csv::Writer;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

use super::{ExportRow, OutputError, OutputResult};

const DEFAULT_BUFFER_SIZE: usize = 8192; // 8KB buffer

/// CSV writer for [`ExportRow`]s
pub struct CsvExportWriter {
    writer: Writer<BufWriter<File>>,
    rows_written: u64,
}

impl CsvExportWriter {
    /// Create (truncating) the CSV file at `path`
    pub fn new<P: AsRef<Path>>(path: P) -> OutputResult<Self> {
        let path = path.as_ref();
        info!("Creating CSV export: path={}", path.display());

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| OutputError::IoError(format!("Failed to create directory: {e}")))?;
        }

        let file = File::create(path)
            .map_err(|e| OutputError::IoError(format!("Failed to create file: {e}")))?;
        let buf_writer = BufWriter::with_capacity(DEFAULT_BUFFER_SIZE, file);

        // Headers are written by csv::Writer on the first serialize()
        Ok(Self {
            writer: Writer::from_writer(buf_writer),
            rows_written: 0,
        })
    }

    /// Write one row
    pub fn write_row(&mut self, row: &ExportRow) -> OutputResult<()> {
        self.writer
            .serialize(row)
            .map_err(|e| OutputError::CsvError(format!("Failed to write row: {e}")))?;
        self.rows_written += 1;
        if self.rows_written % 1000 == 0 {
            self.flush()?;
            debug!("Progress: {} rows written", self.rows_written);
        }
        Ok(())
    }

    /// Rows written so far
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Flush buffered rows to the OS
    pub fn flush(&mut self) -> OutputResult<()> {
        self.writer
            .flush()
            .map_err(|e| OutputError::IoError(format!("Failed to flush: {e}")))
    }

    /// Flush and sync; returns the number of rows written
    pub fn close(mut self) -> OutputResult<u64> {
        self.flush()?;
        let rows = self.rows_written;
        let mut inner = self
            .writer
            .into_inner()
            .map_err(|e| OutputError::IoError(format!("Failed to finalize CSV: {e}")))?;
        inner
            .flush()
            .map_err(|e| OutputError::IoError(format!("Failed to flush: {e}")))?;
        inner
            .get_ref()
            .sync_all()
            .map_err(|e| OutputError::IoError(format!("Failed to sync: {e}")))?;
        Ok(rows)
    }
}

/// Write `rows` to a new CSV file at `path`
pub fn write_export<P: AsRef<Path>>(path: P, rows: &[ExportRow]) -> OutputResult<u64> {
    let mut writer = CsvExportWriter::new(path)?;
    for row in rows {
        writer.write_row(row)?;
    }
    writer.close()
}
