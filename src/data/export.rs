use std::path::Path;

use anyhow::{Context, Result};

use super::model::Table;

pub const CSV_MIME: &str = "text/csv";

/// A CSV extract ready to be saved or offered as a download.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvDownload {
    pub file_name: String,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

impl CsvDownload {
    pub fn new(table: &Table, file_name: impl Into<String>) -> Result<Self> {
        Ok(CsvDownload {
            file_name: file_name.into(),
            mime: CSV_MIME,
            bytes: to_csv_bytes(table)?,
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, &self.bytes)
            .with_context(|| format!("writing {} to {}", self.file_name, path.display()))?;
        log::info!(
            "Exported {} bytes of {} to {}",
            self.bytes.len(),
            self.mime,
            path.display()
        );
        Ok(())
    }
}

/// Encode `table` as comma-separated UTF-8: a header row, no index column,
/// undefined cells as empty fields (see [`super::model::Value::to_csv_field`]).
pub fn to_csv_bytes(table: &Table) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(&table.columns)
        .context("writing CSV header")?;
    for (i, row) in table.rows.iter().enumerate() {
        writer
            .write_record(row.iter().map(|v| v.to_csv_field()))
            .with_context(|| format!("writing CSV row {i}"))?;
    }
    writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("flushing CSV buffer: {}", e.error()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ColumnKind, ColumnSpec, DatasetSchema};
    use crate::data::loader::read_delimited;
    use crate::data::model::Value;

    fn aggregate_table() -> Table {
        let mut t = Table::new(["department", "deaths", "population", "percentage"]);
        t.push_row(vec!["Côte-d'Or".into(), 20.0.into(), 200.0.into(), 10.0.into()]);
        t.push_row(vec!["Paris, 75".into(), 30.0.into(), 0.0.into(), Value::Null]);
        t.push_row(vec!["Lozère".into(), 1.0.into(), 3.0.into(), (100.0 / 3.0).into()]);
        t
    }

    fn reparse_schema() -> DatasetSchema {
        let mut schema = DatasetSchema::mortality();
        schema.delimiter = ',';
        schema.decimal_separator = '.';
        schema.columns = vec![
            ColumnSpec {
                name: "department".to_string(),
                kind: ColumnKind::Text,
            },
            ColumnSpec {
                name: "deaths".to_string(),
                kind: ColumnKind::Number,
            },
            ColumnSpec {
                name: "population".to_string(),
                kind: ColumnKind::Number,
            },
            ColumnSpec {
                name: "percentage".to_string(),
                kind: ColumnKind::Number,
            },
        ];
        schema
    }

    #[test]
    fn export_then_reparse_reproduces_values() {
        let table = aggregate_table();
        let bytes = to_csv_bytes(&table).unwrap();
        let reparsed = read_delimited(&bytes, &reparse_schema()).unwrap();
        assert_eq!(reparsed, table);
    }

    #[test]
    fn undefined_marker_is_an_empty_field() {
        let text = String::from_utf8(to_csv_bytes(&aggregate_table()).unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "department,deaths,population,percentage");
        assert_eq!(lines[1], "Côte-d'Or,20,200,10");
        assert_eq!(lines[2], "\"Paris, 75\",30,0,");
    }

    #[test]
    fn empty_table_exports_header_only() {
        let table = Table::new(["region", "sales"]);
        let text = String::from_utf8(to_csv_bytes(&table).unwrap()).unwrap();
        assert_eq!(text, "region,sales\n");
    }

    #[test]
    fn download_carries_name_and_mime() {
        let download = CsvDownload::new(&aggregate_table(), "mortalite_by_department.csv").unwrap();
        assert_eq!(download.mime, "text/csv");
        assert_eq!(download.file_name, "mortalite_by_department.csv");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(&download.file_name);
        download.save(&path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), download.bytes);
    }
}
