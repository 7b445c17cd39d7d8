mod csv;
mod sheets;

pub use csv::CsvSink;
pub use sheets::SheetsSink;

/// Destination for the header and one record per exported flow.
///
/// Implementations own their buffering; `flush` must be idempotent because
/// both the EOF path and the shutdown path call it.
pub trait RowSink {
    fn write_header(&mut self, header: &[&str]) -> anyhow::Result<()>;
    fn write_row(&mut self, row: &[String]) -> anyhow::Result<()>;
    fn flush(&mut self) -> anyhow::Result<()>;
}
