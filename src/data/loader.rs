use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Reader};
use chrono::NaiveDate;
use encoding_rs::{UTF_8, WINDOWS_1252};
use thiserror::Error;

use super::model::{Record, Table, Value};
use crate::config::{ColumnKind, ColumnSpec, DatasetSchema, TextEncoding};

/// Upload extensions accepted by [`load_file`].
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["csv", "txt", "xlsx", "xls"];

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Everything that can go wrong turning a file into a raw table.  Load errors
/// end the run and are shown to the user.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("unsupported file extension `.{0}` (expected one of: csv, txt, xlsx, xls)")]
    UnsupportedExtension(String),
    #[error("file is not valid {0} text")]
    Encoding(&'static str),
    #[error("missing expected columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
    #[error("unexpected columns: {}", .0.join(", "))]
    UnexpectedColumns(Vec<String>),
    #[error("line {line}, column `{column}`: cannot read `{raw}` as {kind}")]
    InvalidValue {
        line: usize,
        column: String,
        raw: String,
        kind: &'static str,
    },
    #[error("dataset has no data rows")]
    Empty,
    #[error("workbook has no worksheets")]
    NoWorksheet,
    #[error("no file uploaded and dataset `{0}` has no default data")]
    NoDefault(String),
    #[error("reading {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Workbook(#[from] calamine::Error),
}

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Where a raw table came from.
#[derive(Debug, Clone, PartialEq)]
pub enum DataSource {
    Upload(PathBuf),
    DefaultFile(PathBuf),
    Bundled(&'static [u8]),
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Upload(p) => write!(f, "{}", p.display()),
            DataSource::DefaultFile(p) => write!(f, "{} (default)", p.display()),
            DataSource::Bundled(_) => write!(f, "bundled sample"),
        }
    }
}

/// Pick the data source: the upload if any, else the schema's default file,
/// else the dataset compiled into the binary.
pub fn resolve_source(upload: Option<&Path>, schema: &DatasetSchema) -> Result<DataSource, LoadError> {
    if let Some(path) = upload {
        return Ok(DataSource::Upload(path.to_path_buf()));
    }
    if let Some(path) = &schema.default_data {
        if path.exists() || schema.bundled.is_none() {
            return Ok(DataSource::DefaultFile(path.clone()));
        }
        log::warn!(
            "Default data file {} not found, using the bundled sample",
            path.display()
        );
    }
    schema
        .bundled
        .map(DataSource::Bundled)
        .ok_or_else(|| LoadError::NoDefault(schema.name.clone()))
}

/// Load the raw table for `schema` from the upload or its fallbacks.
pub fn load_dataset(
    upload: Option<&Path>,
    schema: &DatasetSchema,
) -> Result<(Table, DataSource), LoadError> {
    let source = resolve_source(upload, schema)?;
    let table = match &source {
        DataSource::Upload(path) | DataSource::DefaultFile(path) => load_file(path, schema)?,
        DataSource::Bundled(bytes) => read_delimited(bytes, schema)?,
    };
    log::info!(
        "Loaded {} rows of `{}` from {source}",
        table.len(),
        schema.name
    );
    Ok((table, source))
}

/// Load a raw table from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.csv` / `.txt` – delimited text in the schema's delimiter and encoding
/// * `.xlsx` / `.xls` – first worksheet, first row is the header
pub fn load_file(path: &Path, schema: &DatasetSchema) -> Result<Table, LoadError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "csv" | "txt" => {
            let bytes = std::fs::read(path).map_err(|source| LoadError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            read_delimited(&bytes, schema)
        }
        "xlsx" | "xls" => read_workbook(path, schema),
        other => Err(LoadError::UnsupportedExtension(other.to_string())),
    }
}

// ---------------------------------------------------------------------------
// Delimited text
// ---------------------------------------------------------------------------

/// Parse delimited text bytes: decode with the declared encoding, check the
/// header against the expected columns and parse every cell.
pub fn read_delimited(bytes: &[u8], schema: &DatasetSchema) -> Result<Table, LoadError> {
    let text = decode(bytes, schema.encoding)?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(schema.delimiter_byte())
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(|s| RawCell::Text(s.to_string())).collect());
    }
    build_table(&headers, rows, schema)
}

fn decode(bytes: &[u8], encoding: TextEncoding) -> Result<Cow<'_, str>, LoadError> {
    match encoding {
        TextEncoding::Utf8 => {
            let (text, had_errors) = UTF_8.decode_with_bom_removal(bytes);
            if had_errors {
                return Err(LoadError::Encoding("UTF-8"));
            }
            Ok(text)
        }
        // Every byte maps to a character, so decoding cannot fail.
        TextEncoding::Latin1 => Ok(WINDOWS_1252.decode_with_bom_removal(bytes).0),
    }
}

// ---------------------------------------------------------------------------
// Spreadsheets
// ---------------------------------------------------------------------------

fn read_workbook(path: &Path, schema: &DatasetSchema) -> Result<Table, LoadError> {
    let mut workbook = open_workbook_auto(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(LoadError::NoWorksheet)??;

    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()
        .ok_or(LoadError::Empty)?
        .iter()
        .map(|c| c.to_string())
        .collect();
    let body = rows
        .map(|row| row.iter().map(workbook_cell).collect())
        .collect();
    build_table(&headers, body, schema)
}

fn workbook_cell(cell: &Data) -> RawCell {
    match cell {
        Data::Empty => RawCell::Empty,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => RawCell::Text(s.clone()),
        Data::Float(v) => RawCell::Number(*v),
        Data::Int(v) => RawCell::Number(*v as f64),
        Data::Bool(b) => RawCell::Text(b.to_string()),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(datetime) => RawCell::Date(datetime.date()),
            None => RawCell::Number(dt.as_f64()),
        },
        Data::Error(e) => {
            log::warn!("Spreadsheet cell error {e:?} read as empty");
            RawCell::Empty
        }
    }
}

// ---------------------------------------------------------------------------
// Shared: header check and cell parsing
// ---------------------------------------------------------------------------

/// A cell before schema-driven typing.  Text formats only produce `Text`;
/// spreadsheets may carry native numbers and dates.
#[derive(Debug, Clone, PartialEq)]
enum RawCell {
    Text(String),
    Number(f64),
    Date(NaiveDate),
    Empty,
}

fn build_table(
    headers: &[String],
    rows: Vec<Vec<RawCell>>,
    schema: &DatasetSchema,
) -> Result<Table, LoadError> {
    check_header(headers, &schema.columns)?;

    let mut table = Table::new(schema.columns.iter().map(|c| c.name.clone()));
    for (i, row) in rows.into_iter().enumerate() {
        // Header is line 1.
        let line = i + 2;
        let mut cells = row.into_iter();
        let record = schema
            .columns
            .iter()
            .map(|spec| parse_cell(cells.next().unwrap_or(RawCell::Empty), spec, schema, line))
            .collect::<Result<Record, LoadError>>()?;
        table.push_row(record);
    }

    if table.is_empty() {
        return Err(LoadError::Empty);
    }
    Ok(table)
}

/// Columns are matched by position and renamed to their canonical names.
/// Trailing blank header cells (common in spreadsheets) are ignored.
fn check_header(headers: &[String], expected: &[ColumnSpec]) -> Result<(), LoadError> {
    let used = headers
        .iter()
        .rposition(|h| !h.trim().is_empty())
        .map_or(0, |last| last + 1);
    let headers = &headers[..used];

    if headers.len() < expected.len() {
        return Err(LoadError::MissingColumns(
            expected[headers.len()..].iter().map(|c| c.name.clone()).collect(),
        ));
    }
    if headers.len() > expected.len() {
        return Err(LoadError::UnexpectedColumns(
            headers[expected.len()..].to_vec(),
        ));
    }
    for (raw, spec) in headers.iter().zip(expected) {
        if raw != &spec.name {
            log::debug!("Renamed column `{raw}` to `{}`", spec.name);
        }
    }
    Ok(())
}

fn parse_cell(
    cell: RawCell,
    spec: &ColumnSpec,
    schema: &DatasetSchema,
    line: usize,
) -> Result<Value, LoadError> {
    let invalid = |raw: String, kind: &'static str| LoadError::InvalidValue {
        line,
        column: spec.name.clone(),
        raw,
        kind,
    };

    match (spec.kind, cell) {
        (_, RawCell::Empty) => Ok(Value::Null),
        (_, RawCell::Text(s)) if s.trim().is_empty() => Ok(Value::Null),

        (ColumnKind::Text, RawCell::Text(s)) => Ok(Value::Text(s.trim().to_string())),
        (ColumnKind::Text, RawCell::Number(v)) => Ok(Value::Text(Value::Number(v).to_csv_field())),
        (ColumnKind::Text, RawCell::Date(d)) => Ok(Value::Text(d.format("%Y-%m-%d").to_string())),

        (ColumnKind::Number, RawCell::Number(v)) => Ok(Value::Number(v)),
        (ColumnKind::Number, RawCell::Text(s)) => {
            parse_number(&s, schema.decimal_separator).ok_or_else(|| invalid(s, "a number"))
        }
        (ColumnKind::Number, RawCell::Date(d)) => Err(invalid(d.to_string(), "a number")),

        (ColumnKind::Date, RawCell::Date(d)) => Ok(Value::Date(d)),
        (ColumnKind::Date, RawCell::Text(s)) => parse_date(&s, &schema.date_format)
            .map(Value::Date)
            .ok_or_else(|| invalid(s, "a date")),
        (ColumnKind::Date, RawCell::Number(v)) => Err(invalid(v.to_string(), "a date")),
    }
}

/// `NaN` is a missing-value marker and reads as null; infinities are
/// rejected.
fn parse_number(raw: &str, decimal_separator: char) -> Option<Value> {
    let trimmed = raw.trim();
    let normalized: Cow<'_, str> = if decimal_separator == '.' {
        Cow::Borrowed(trimmed)
    } else {
        Cow::Owned(trimmed.replace(decimal_separator, "."))
    };
    let v: f64 = normalized.parse().ok()?;
    if v.is_nan() {
        Some(Value::Null)
    } else if v.is_finite() {
        Some(Value::Number(v))
    } else {
        None
    }
}

/// The declared format first, then ISO-8601 (spreadsheet text dates).
fn parse_date(raw: &str, format: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    NaiveDate::parse_from_str(trimmed, format)
        .or_else(|_| NaiveDate::parse_from_str(trimmed.get(..10).unwrap_or(trimmed), "%Y-%m-%d"))
        .ok()
}
