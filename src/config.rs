use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::data::aggregate::Reducer;
use crate::data::filter::{FallbackPolicy, FilterRules};
use crate::data::percentage::PERCENTAGE_COLUMN;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "unknown dataset `{0}` (expected one of {} or a .json schema file)",
        PRESET_NAMES.join(", ")
    )]
    UnknownPreset(String),
    #[error("reading schema {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing schema {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{field} refers to undeclared column `{column}`")]
    UndeclaredColumn { field: &'static str, column: String },
    #[error("date column `{0}` must be declared with kind `date`")]
    DateColumnKind(String),
    #[error("delimiter {0:?} must be a single ASCII character")]
    InvalidDelimiter(char),
    #[error("`percentage` is derived and cannot be reduced or declared as an input column")]
    ReservedColumn,
}

// ---------------------------------------------------------------------------
// Schema types
// ---------------------------------------------------------------------------

/// How raw cells of a column are parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Text,
    Number,
    Date,
}

/// One expected input column.  Input headers are renamed positionally to
/// `name`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnKind,
}

/// Declared byte encoding of delimited text uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextEncoding {
    #[default]
    Utf8,
    /// ISO-8859-1, decoded as its Windows-1252 superset.
    Latin1,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReducerSpec {
    pub column: String,
    pub reducer: Reducer,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PercentageSpec {
    pub numerator: String,
    pub denominator: String,
}

/// Wide → long reshape feeding the treemap.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HierarchySpec {
    pub group_columns: Vec<String>,
    pub value_columns: Vec<String>,
    #[serde(default)]
    pub passthrough: Vec<String>,
}

/// Everything that distinguishes one dashboard variant from another.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DatasetSchema {
    pub name: String,
    pub title: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    #[serde(default)]
    pub encoding: TextEncoding,
    #[serde(default = "default_decimal_separator")]
    pub decimal_separator: char,
    #[serde(default = "default_date_format")]
    pub date_format: String,
    /// Expected columns in file order.
    pub columns: Vec<ColumnSpec>,
    pub group_key: String,
    #[serde(default)]
    pub date_column: Option<String>,
    #[serde(default)]
    pub identifying_columns: Vec<String>,
    pub measure_columns: Vec<String>,
    pub reducers: Vec<ReducerSpec>,
    #[serde(default)]
    pub percentage: Option<PercentageSpec>,
    pub fallback: FallbackPolicy,
    pub hierarchy: HierarchySpec,
    /// Measure plotted by the bar and pie charts.
    pub chart_measure: String,
    /// Prefix of exported file names.
    pub export_stem: String,
    /// Data file used when nothing is uploaded.
    #[serde(default)]
    pub default_data: Option<PathBuf>,
    /// Dataset compiled into the binary, used as the last resort.
    #[serde(skip)]
    pub bundled: Option<&'static [u8]>,
}

fn default_delimiter() -> char {
    ','
}

fn default_decimal_separator() -> char {
    '.'
}

fn default_date_format() -> String {
    "%Y-%m-%d".to_string()
}

pub const PRESET_NAMES: [&str; 3] = ["superstore", "mortality", "mortality-rate"];

const AGE_BRACKETS: [&str; 6] = [
    "age_0_24",
    "age_25_44",
    "age_45_64",
    "age_65_74",
    "age_75_84",
    "age_85_plus",
];

fn strings(cols: &[&str]) -> Vec<String> {
    cols.iter().map(|c| c.to_string()).collect()
}

fn column(name: &str, kind: ColumnKind) -> ColumnSpec {
    ColumnSpec {
        name: name.to_string(),
        kind,
    }
}

fn reducer(column: &str, reducer: Reducer) -> ReducerSpec {
    ReducerSpec {
        column: column.to_string(),
        reducer,
    }
}

impl DatasetSchema {
    /// Retail sample: sales by region, profit margin as the percentage.
    pub fn superstore() -> Self {
        use ColumnKind::*;
        DatasetSchema {
            name: "superstore".to_string(),
            title: "Sample SuperStore EDA".to_string(),
            delimiter: ',',
            encoding: TextEncoding::Latin1,
            decimal_separator: '.',
            date_format: "%m/%d/%Y".to_string(),
            columns: vec![
                column("order_date", Date),
                column("region", Text),
                column("state", Text),
                column("city", Text),
                column("category", Text),
                column("sub_category", Text),
                column("sales", Number),
                column("quantity", Number),
                column("profit", Number),
            ],
            group_key: "region".to_string(),
            date_column: Some("order_date".to_string()),
            identifying_columns: strings(&["order_date", "state", "city", "category", "sub_category"]),
            measure_columns: strings(&["sales", "quantity", "profit"]),
            reducers: vec![
                reducer("sales", Reducer::Sum),
                reducer("quantity", Reducer::Sum),
                reducer("profit", Reducer::Sum),
            ],
            percentage: Some(PercentageSpec {
                numerator: "profit".to_string(),
                denominator: "sales".to_string(),
            }),
            fallback: FallbackPolicy::AllRows,
            hierarchy: HierarchySpec {
                group_columns: strings(&["region", "category", "sub_category"]),
                value_columns: strings(&["sales"]),
                passthrough: strings(&["profit"]),
            },
            chart_measure: "sales".to_string(),
            export_stem: "superstore".to_string(),
            default_data: None,
            bundled: Some(include_bytes!("../data/superstore.csv")),
        }
    }

    /// Deaths by department and age bracket.  Without a selection the five
    /// rows with the most deaths are shown.
    pub fn mortality() -> Self {
        use ColumnKind::*;
        let mut columns = vec![
            column("department", Text),
            column("date", Date),
            column("deaths", Number),
            column("population", Number),
        ];
        columns.extend(AGE_BRACKETS.iter().map(|b| column(b, Number)));

        let mut reducers = vec![
            reducer("deaths", Reducer::Sum),
            reducer("population", Reducer::First),
        ];
        reducers.extend(AGE_BRACKETS.iter().map(|b| reducer(b, Reducer::Sum)));

        DatasetSchema {
            name: "mortality".to_string(),
            title: "Mortalité par département".to_string(),
            delimiter: ';',
            encoding: TextEncoding::Utf8,
            decimal_separator: ',',
            date_format: "%Y-%m-%d".to_string(),
            columns,
            group_key: "department".to_string(),
            date_column: Some("date".to_string()),
            identifying_columns: strings(&["date", "deaths", "population"]),
            measure_columns: strings(&AGE_BRACKETS),
            reducers,
            percentage: Some(PercentageSpec {
                numerator: "deaths".to_string(),
                denominator: "population".to_string(),
            }),
            fallback: FallbackPolicy::TopK {
                k: 5,
                by: "deaths".to_string(),
            },
            hierarchy: HierarchySpec {
                group_columns: strings(&["department"]),
                value_columns: strings(&AGE_BRACKETS),
                passthrough: strings(&["deaths", PERCENTAGE_COLUMN]),
            },
            chart_measure: "deaths".to_string(),
            export_stem: "mortalite".to_string(),
            default_data: None,
            bundled: Some(include_bytes!("../data/mortalite_departements.csv")),
        }
    }

    /// Same data as [`DatasetSchema::mortality`], ranked by death rate.
    pub fn mortality_rate() -> Self {
        DatasetSchema {
            name: "mortality-rate".to_string(),
            title: "Taux de mortalité par département".to_string(),
            fallback: FallbackPolicy::TopK {
                k: 10,
                by: PERCENTAGE_COLUMN.to_string(),
            },
            export_stem: "taux_mortalite".to_string(),
            ..Self::mortality()
        }
    }

    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "superstore" => Some(Self::superstore()),
            "mortality" => Some(Self::mortality()),
            "mortality-rate" => Some(Self::mortality_rate()),
            _ => None,
        }
    }

    /// Resolve a preset name, or load a JSON schema from a path.
    pub fn resolve(name_or_path: &str) -> Result<Self, ConfigError> {
        if let Some(schema) = Self::preset(name_or_path) {
            return Ok(schema);
        }
        let path = Path::new(name_or_path);
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_file(path)
        } else {
            Err(ConfigError::UnknownPreset(name_or_path.to_string()))
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let schema: DatasetSchema =
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        schema.validate()?;
        log::info!("Loaded dataset schema `{}` from {}", schema.name, path.display());
        Ok(schema)
    }

    /// Check that every referenced column is declared.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.delimiter.is_ascii() {
            return Err(ConfigError::InvalidDelimiter(self.delimiter));
        }
        if self.columns.iter().any(|c| c.name == PERCENTAGE_COLUMN)
            || self.reducers.iter().any(|r| r.column == PERCENTAGE_COLUMN)
        {
            return Err(ConfigError::ReservedColumn);
        }

        let check = |field: &'static str, column: &str| {
            if self.is_declared(column) {
                Ok(())
            } else {
                Err(ConfigError::UndeclaredColumn {
                    field,
                    column: column.to_string(),
                })
            }
        };

        check("group_key", &self.group_key)?;
        if let Some(date_col) = &self.date_column {
            check("date_column", date_col)?;
            let is_date = self
                .columns
                .iter()
                .any(|c| c.name == *date_col && c.kind == ColumnKind::Date);
            if !is_date {
                return Err(ConfigError::DateColumnKind(date_col.clone()));
            }
        }
        for col in &self.identifying_columns {
            check("identifying_columns", col)?;
        }
        for col in &self.measure_columns {
            check("measure_columns", col)?;
        }
        for r in &self.reducers {
            check("reducers", &r.column)?;
        }
        if let Some(pct) = &self.percentage {
            check("percentage.numerator", &pct.numerator)?;
            check("percentage.denominator", &pct.denominator)?;
        }
        if let FallbackPolicy::TopK { by, .. } = &self.fallback {
            check("fallback.by", by)?;
        }
        for col in self
            .hierarchy
            .group_columns
            .iter()
            .chain(&self.hierarchy.value_columns)
            .chain(&self.hierarchy.passthrough)
        {
            check("hierarchy", col)?;
        }
        if !self.reducers.iter().any(|r| r.column == self.chart_measure) {
            return Err(ConfigError::UndeclaredColumn {
                field: "chart_measure",
                column: self.chart_measure.clone(),
            });
        }
        Ok(())
    }

    /// A declared input column, or the derived percentage when configured.
    fn is_declared(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c.name == column)
            || (self.percentage.is_some() && column == PERCENTAGE_COLUMN)
    }

    pub fn delimiter_byte(&self) -> u8 {
        // Validated ASCII, so the cast is lossless.
        self.delimiter as u8
    }

    pub fn filter_rules(&self) -> FilterRules {
        let mut identifying = self.identifying_columns.clone();
        if self.percentage.is_some() {
            identifying.push(PERCENTAGE_COLUMN.to_string());
        }
        FilterRules {
            group_key: self.group_key.clone(),
            date_column: self.date_column.clone(),
            identifying_columns: identifying,
            measure_columns: self.measure_columns.clone(),
            fallback: self.fallback.clone(),
        }
    }

    pub fn reducer_pairs(&self) -> Vec<(String, Reducer)> {
        self.reducers
            .iter()
            .map(|r| (r.column.clone(), r.reducer))
            .collect()
    }

    /// Names in `measures` that are not measure columns of this dataset.
    pub fn unknown_measures<'a>(&self, measures: &'a [String]) -> Vec<&'a str> {
        measures
            .iter()
            .filter(|m| !self.measure_columns.contains(m))
            .map(String::as_str)
            .collect()
    }

    pub fn filtered_file_name(&self) -> String {
        format!("{}_filtered.csv", self.export_stem)
    }

    pub fn aggregate_file_name(&self) -> String {
        format!("{}_by_{}.csv", self.export_stem, self.group_key)
    }

    pub fn hierarchy_file_name(&self) -> String {
        format!("{}_hierarchy.csv", self.export_stem)
    }
}
