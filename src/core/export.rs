//! Tabular export.
//!
//! Reports hand a column list and rows of JSON cells to a [`TableWriter`]; the
//! writer owns the file format.

use crate::errors::{Error, Result};
use serde::Serialize;
use serde_json::Value;
use std::io::Write;

/// Columns and rows ready for a spreadsheet-like sink.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExportTable {
    /// Header row
    pub columns: Vec<String>,
    /// Data rows, each as long as `columns`
    pub rows: Vec<Vec<Value>>,
}

impl ExportTable {
    /// Table with the given header and no rows.
    #[must_use]
    pub fn with_columns(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(ToString::to_string).collect(),
            rows: Vec::new(),
        }
    }
}

/// A sink for [`ExportTable`]s.
pub trait TableWriter {
    /// Writes the header followed by every row.
    fn write_table(&mut self, table: &ExportTable) -> Result<()>;
}

/// Writes tables as CSV.
pub struct CsvTableWriter<W: Write> {
    writer: csv::Writer<W>,
}

fn cell_text(cell: &Value) -> String {
    match cell {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

impl<W: Write> CsvTableWriter<W> {
    /// Wraps `inner`.
    pub fn new(inner: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(inner),
        }
    }

    /// Flushes and returns the underlying writer.
    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| Error::Io(e.into_error()))
    }
}

impl<W: Write> TableWriter for CsvTableWriter<W> {
    fn write_table(&mut self, table: &ExportTable) -> Result<()> {
        self.writer.write_record(&table.columns)?;
        for row in &table.rows {
            self.writer.write_record(row.iter().map(cell_text))?;
        }
        self.writer.flush()?;
        tracing::debug!("Wrote {} export rows", table.rows.len());
        Ok(())
    }
}

/// Renders `table` as a CSV string.
pub fn to_csv_string(table: &ExportTable) -> Result<String> {
    let mut writer = CsvTableWriter::new(Vec::new());
    writer.write_table(table)?;
    String::from_utf8(writer.into_inner()?).map_err(|e| Error::Io(std::io::Error::other(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_csv_export() -> Result<()> {
        let mut table = ExportTable::with_columns(&["Location", "Revenue", "Note"]);
        table
            .rows
            .push(vec![json!("Tbilisi Mall"), json!(320.5), Value::Null]);
        table.rows.push(vec![json!("Batumi, Old Town"), json!(10), json!(true)]);

        let csv = to_csv_string(&table)?;
        assert_eq!(
            csv,
            "Location,Revenue,Note\nTbilisi Mall,320.5,\n\"Batumi, Old Town\",10,true\n"
        );
        Ok(())
    }
}
