use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDate;

use super::PipelineError;

// ---------------------------------------------------------------------------
// Value – a single cell of a table
// ---------------------------------------------------------------------------

/// A dynamically-typed cell value.
///
/// `Null` is the explicit "undefined" marker: missing input cells and
/// percentages with a zero or missing denominator both end up here.
#[derive(Debug, Clone)]
pub enum Value {
    Text(String),
    Number(f64),
    Date(NaiveDate),
    Null,
}

// -- Manual Eq/Ord/Hash so values can be grouping keys and live in BTreeSets --

/// `-0.0` folds into `0.0` so equality, ordering and hashing agree.
fn canonical(v: f64) -> f64 {
    if v == 0.0 {
        0.0
    } else {
        v
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use Value::*;
        fn discriminant(v: &Value) -> u8 {
            match v {
                Null => 0,
                Number(_) => 1,
                Date(_) => 2,
                Text(_) => 3,
            }
        }
        let da = discriminant(self);
        let db = discriminant(other);
        if da != db {
            return da.cmp(&db);
        }
        match (self, other) {
            (Number(a), Number(b)) => canonical(*a).total_cmp(&canonical(*b)),
            (Date(a), Date(b)) => a.cmp(b),
            (Text(a), Text(b)) => a.cmp(b),
            _ => std::cmp::Ordering::Equal,
        }
    }
}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Text(s) => s.hash(state),
            Value::Number(v) => canonical(*v).to_bits().hash(state),
            Value::Date(d) => d.hash(state),
            Value::Null => {}
        }
    }
}

/// Human-facing rendering used by the dashboard widgets.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => write!(f, "{s}"),
            Value::Number(v) if v.fract() == 0.0 && v.abs() < 1e15 => write!(f, "{v:.0}"),
            Value::Number(v) => write!(f, "{v:.2}"),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Null => write!(f, "n/a"),
        }
    }
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Label used to match a cell against a grouping-key selection.
    ///
    /// Distinct keys never share a label: text keeps its exact spelling,
    /// numbers and dates use their lossless CSV form.
    pub fn key_label(&self) -> String {
        match self {
            Value::Null => self.to_string(),
            Value::Number(v) => Value::Number(canonical(*v)).to_csv_field(),
            other => other.to_csv_field(),
        }
    }

    /// Lossless CSV field: numbers in shortest round-trip form, dates as
    /// ISO-8601, and the undefined marker as the empty string.
    pub fn to_csv_field(&self) -> String {
        match self {
            Value::Text(s) => s.clone(),
            Value::Number(v) => v.to_string(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::Null => String::new(),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

impl From<Option<f64>> for Value {
    fn from(v: Option<f64>) -> Self {
        v.map_or(Value::Null, Value::Number)
    }
}

// ---------------------------------------------------------------------------
// Table – named columns over an ordered sequence of records
// ---------------------------------------------------------------------------

/// One row; cells are positional and line up with [`Table::columns`].
pub type Record = Vec<Value>;

/// An ordered table of records.  Every pipeline stage produces a new table;
/// none of them mutate their input.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    /// Canonical column names, in order.
    pub columns: Vec<String>,
    /// Rows, each exactly `columns.len()` wide.
    pub rows: Vec<Record>,
}

impl Table {
    /// An empty table with the given columns.
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Table {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Append a row.  Short rows are padded with nulls, long rows truncated,
    /// so the width invariant always holds.
    pub fn push_row(&mut self, mut row: Record) {
        row.resize(self.columns.len(), Value::Null);
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Like [`Table::column_index`] but reports the missing column.
    pub fn require_column(&self, name: &str) -> Result<usize, PipelineError> {
        self.column_index(name)
            .ok_or_else(|| PipelineError::UnknownColumn(name.to_string()))
    }

    /// The cells of one column, top to bottom.
    pub fn column_values(&self, name: &str) -> Result<Vec<&Value>, PipelineError> {
        let idx = self.require_column(name)?;
        Ok(self.rows.iter().map(|row| &row[idx]).collect())
    }

    /// Sorted set of distinct labels in a column (nulls skipped), used to
    /// populate pickers.
    pub fn unique_labels(&self, name: &str) -> Result<BTreeSet<String>, PipelineError> {
        Ok(self
            .column_values(name)?
            .into_iter()
            .filter(|v| !v.is_null())
            .map(Value::key_label)
            .collect())
    }

    /// Earliest and latest date in a column, if it holds any dates.
    pub fn date_bounds(&self, name: &str) -> Result<Option<(NaiveDate, NaiveDate)>, PipelineError> {
        let dates = self.column_values(name)?.into_iter().filter_map(Value::as_date);
        Ok(dates.fold(None, |acc, d| match acc {
            None => Some((d, d)),
            Some((lo, hi)) => Some((lo.min(d), hi.max(d))),
        }))
    }

    /// Keep only the given column positions, in the given order.
    pub fn project(&self, indices: &[usize]) -> Table {
        Table {
            columns: indices.iter().map(|&i| self.columns[i].clone()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        let mut table = Table::new(["department", "date", "deaths"]);
        let d1 = NaiveDate::from_ymd_opt(2023, 3, 1).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        table.push_row(vec!["Ain".into(), d1.into(), 12.0.into()]);
        table.push_row(vec!["Aisne".into(), d2.into(), Value::Null]);
        table.push_row(vec!["Ain".into(), Value::Null, 3.0.into()]);
        table
    }

    #[test]
    fn push_row_pads_short_rows() {
        let mut table = Table::new(["a", "b"]);
        table.push_row(vec!["x".into()]);
        assert_eq!(table.rows[0], vec![Value::from("x"), Value::Null]);
    }

    #[test]
    fn unique_labels_skip_nulls_and_sort() {
        let labels = sample().unique_labels("department").unwrap();
        assert_eq!(labels.into_iter().collect::<Vec<_>>(), vec!["Ain", "Aisne"]);
    }

    #[test]
    fn date_bounds_ignore_missing_dates() {
        let bounds = sample().date_bounds("date").unwrap();
        assert_eq!(
            bounds,
            Some((
                NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2023, 3, 1).unwrap()
            ))
        );
    }

    #[test]
    fn unknown_column_is_reported_by_name() {
        let err = sample().column_values("population").unwrap_err();
        assert!(matches!(err, PipelineError::UnknownColumn(c) if c == "population"));
    }

    #[test]
    fn csv_field_uses_empty_string_for_undefined() {
        assert_eq!(Value::Null.to_csv_field(), "");
        assert_eq!(Value::Number(12.5).to_csv_field(), "12.5");
        assert_eq!(Value::Number(10.0).to_string(), "10");
        assert_eq!(Value::Null.to_string(), "n/a");
    }

    #[test]
    fn project_keeps_requested_order() {
        let projected = sample().project(&[2, 0]);
        assert_eq!(projected.columns, vec!["deaths", "department"]);
        assert_eq!(projected.rows[0], vec![Value::from(12.0), Value::from("Ain")]);
    }

    #[test]
    fn signed_zeros_are_one_value() {
        use std::collections::HashSet;
        let set: HashSet<Value> = [Value::Number(0.0), Value::Number(-0.0)].into_iter().collect();
        assert_eq!(set.len(), 1);
        assert_eq!(Value::Number(-0.0).cmp(&Value::Number(0.0)), std::cmp::Ordering::Equal);
        assert_eq!(Value::Number(-0.0).key_label(), "0");
    }

    #[test]
    fn numeric_key_labels_are_lossless() {
        let mut table = Table::new(["code", "deaths"]);
        table.push_row(vec![1.231.into(), 1.0.into()]);
        table.push_row(vec![1.234.into(), 2.0.into()]);
        let labels = table.unique_labels("code").unwrap();
        assert_eq!(labels.into_iter().collect::<Vec<_>>(), vec!["1.231", "1.234"]);
        // Display still rounds for the screen.
        assert_eq!(Value::Number(1.234).to_string(), "1.23");
    }
}
