use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use csv::Writer;

use super::RowSink;

/// Primary sink: one CSV file, header first, one line per flow.
pub struct CsvSink {
    writer: Writer<File>,
}

impl CsvSink {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let writer = Writer::from_path(path.as_ref())
            .with_context(|| format!("failed to create output file {}", path.as_ref().display()))?;
        Ok(Self { writer })
    }
}

impl RowSink for CsvSink {
    fn write_header(&mut self, header: &[&str]) -> Result<()> {
        self.writer.write_record(header)?;
        self.writer.flush()?;
        Ok(())
    }

    fn write_row(&mut self, row: &[String]) -> Result<()> {
        self.writer.write_record(row)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
