use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;

use crate::color::ColorMap;
use crate::config::DatasetSchema;
use crate::data::export::CsvDownload;
use crate::data::filter::{DateRange, FilterSpec};
use crate::data::loader::{self, DataSource};
use crate::data::model::Table;
use crate::data::pipeline::{self, PipelineOutput};

// ---------------------------------------------------------------------------
// View and export selectors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    Bar,
    Pie,
    Treemap,
    StackedBar,
    Table,
}

impl ChartKind {
    pub const ALL: [ChartKind; 5] = [
        ChartKind::Bar,
        ChartKind::Pie,
        ChartKind::Treemap,
        ChartKind::StackedBar,
        ChartKind::Table,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ChartKind::Bar => "Bar",
            ChartKind::Pie => "Pie",
            ChartKind::Treemap => "Treemap",
            ChartKind::StackedBar => "Stacked bar",
            ChartKind::Table => "Table",
        }
    }
}

/// One of the pipeline output tables, for export and the table view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum TableKind {
    Filtered,
    Aggregate,
    Hierarchy,
}

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

/// The full UI state, independent of rendering.
///
/// Widgets only write the selection fields below; [`AppState::filter_spec`]
/// freezes them into a [`FilterSpec`] and [`AppState::rerun`] feeds that to
/// the pipeline.
pub struct AppState {
    pub schema: DatasetSchema,

    /// Raw table (None until a dataset loads successfully).
    pub raw: Option<Table>,
    pub source: Option<DataSource>,

    /// Every grouping key in the raw table, sorted.
    pub key_options: Vec<String>,
    pub selected_keys: BTreeSet<String>,

    /// Date range widgets; `date_bounds` is None when the dataset has no dates.
    pub date_bounds: Option<(NaiveDate, NaiveDate)>,
    pub date_filter_enabled: bool,
    pub date_start: NaiveDate,
    pub date_end: NaiveDate,

    /// Measure subset; empty means every measure.
    pub selected_measures: BTreeSet<String>,

    /// Result of the last pipeline run.
    pub output: Option<PipelineOutput>,

    /// Colours for grouping keys and measure / bracket labels.
    pub key_colors: ColorMap,
    pub measure_colors: ColorMap,

    pub chart: ChartKind,
    /// Table shown by [`ChartKind::Table`].
    pub table_kind: TableKind,

    /// Status / error message shown in the UI.
    pub status_message: Option<String>,
}

impl AppState {
    pub fn new(schema: DatasetSchema) -> Self {
        let today = chrono::Local::now().date_naive();
        let measure_labels: BTreeSet<String> = schema
            .measure_columns
            .iter()
            .chain(&schema.hierarchy.value_columns)
            .cloned()
            .collect();
        let measure_colors = ColorMap::new(measure_labels);
        Self {
            schema,
            raw: None,
            source: None,
            key_options: Vec::new(),
            selected_keys: BTreeSet::new(),
            date_bounds: None,
            date_filter_enabled: false,
            date_start: today,
            date_end: today,
            selected_measures: BTreeSet::new(),
            output: None,
            key_colors: ColorMap::default(),
            measure_colors,
            chart: ChartKind::Bar,
            table_kind: TableKind::Aggregate,
            status_message: None,
        }
    }

    /// Load the upload (or the schema's default data) and run the pipeline.
    /// Failures land in `status_message` and keep the previous dataset.
    pub fn load(&mut self, upload: Option<&Path>) {
        match loader::load_dataset(upload, &self.schema) {
            Ok((table, source)) => {
                self.set_dataset(table, source);
            }
            Err(e) => {
                let err = anyhow::Error::new(e).context("loading dataset");
                log::error!("{err:#}");
                self.status_message = Some(format!("Error: {err:#}"));
            }
        }
    }

    /// Ingest a newly loaded raw table, reset selections and rerun.
    pub fn set_dataset(&mut self, table: Table, source: DataSource) {
        self.key_options = table
            .unique_labels(&self.schema.group_key)
            .map(|labels| labels.into_iter().collect())
            .unwrap_or_default();
        self.key_colors = ColorMap::new(self.key_options.iter().cloned());
        self.selected_keys.clear();
        self.selected_measures.clear();

        self.date_bounds = self
            .schema
            .date_column
            .as_deref()
            .and_then(|col| table.date_bounds(col).ok().flatten());
        if let Some((lo, hi)) = self.date_bounds {
            self.date_start = lo;
            self.date_end = hi;
        }
        self.date_filter_enabled = false;

        self.raw = Some(table);
        self.source = Some(source);
        self.status_message = None;
        self.rerun();
    }

    /// Freeze the current widget values.
    pub fn filter_spec(&self) -> FilterSpec {
        let mut spec = FilterSpec::default()
            .with_keys(self.selected_keys.iter().cloned())
            .with_measures(self.selected_measures.iter().cloned());
        if self.date_filter_enabled && self.date_bounds.is_some() {
            spec = spec.with_date_range(DateRange::new(self.date_start, self.date_end));
        }
        spec
    }

    /// Recompute every output table from scratch.
    pub fn rerun(&mut self) {
        let Some(raw) = &self.raw else {
            self.output = None;
            return;
        };
        match pipeline::run(raw, &self.filter_spec(), &self.schema) {
            Ok(output) => {
                self.output = Some(output);
                self.status_message = None;
            }
            Err(e) => {
                log::error!("Pipeline failed: {e}");
                self.output = None;
                self.status_message = Some(format!("Error: {e}"));
            }
        }
    }

    pub fn toggle_key(&mut self, key: &str) {
        if !self.selected_keys.remove(key) {
            self.selected_keys.insert(key.to_string());
        }
        self.rerun();
    }

    /// Clearing the selection hands control back to the fallback policy.
    pub fn clear_keys(&mut self) {
        self.selected_keys.clear();
        self.rerun();
    }

    pub fn select_all_keys(&mut self) {
        self.selected_keys = self.key_options.iter().cloned().collect();
        self.rerun();
    }

    pub fn toggle_measure(&mut self, measure: &str) {
        if !self.selected_measures.remove(measure) {
            self.selected_measures.insert(measure.to_string());
        }
        self.rerun();
    }

    pub fn set_date_filter(&mut self, enabled: bool, start: NaiveDate, end: NaiveDate) {
        self.date_filter_enabled = enabled;
        self.date_start = start;
        self.date_end = end;
        self.rerun();
    }

    pub fn table(&self, kind: TableKind) -> Option<&Table> {
        let output = self.output.as_ref()?;
        Some(match kind {
            TableKind::Filtered => &output.filtered,
            TableKind::Aggregate => &output.aggregate,
            TableKind::Hierarchy => &output.hierarchy,
        })
    }

    /// Encode one of the output tables for download.
    pub fn export(&self, kind: TableKind) -> Result<CsvDownload> {
        let table = self
            .table(kind)
            .context("nothing to export: no dataset loaded")?;
        let name = match kind {
            TableKind::Filtered => self.schema.filtered_file_name(),
            TableKind::Aggregate => self.schema.aggregate_file_name(),
            TableKind::Hierarchy => self.schema.hierarchy_file_name(),
        };
        CsvDownload::new(table, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::Value;

    fn loaded(schema: DatasetSchema) -> AppState {
        let mut state = AppState::new(schema);
        state.load(None);
        assert!(state.status_message.is_none());
        state
    }

    #[test]
    fn fresh_load_uses_fallback_and_full_date_range() {
        let state = loaded(DatasetSchema::mortality());
        assert_eq!(state.key_options.len(), 10);
        assert_eq!(state.filter_spec(), FilterSpec::default());
        assert_eq!(
            state.date_bounds,
            Some((
                NaiveDate::from_ymd_opt(2022, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2022, 7, 1).unwrap()
            ))
        );
        assert_eq!(state.output.as_ref().unwrap().filtered.len(), 5);
    }

    #[test]
    fn widget_changes_become_an_explicit_spec() {
        let mut state = loaded(DatasetSchema::mortality());
        state.toggle_key("Lozère");
        state.toggle_measure("age_0_24");
        let start = NaiveDate::from_ymd_opt(2022, 7, 1).unwrap();
        let end = state.date_end;
        state.set_date_filter(true, start, end);

        let spec = state.filter_spec();
        assert_eq!(spec.keys.iter().collect::<Vec<_>>(), vec!["Lozère"]);
        assert_eq!(spec.date_range, Some(DateRange::new(start, end)));
        assert!(spec.measures.unwrap().contains("age_0_24"));

        let output = state.output.as_ref().unwrap();
        assert_eq!(output.aggregate.len(), 1);
        assert_eq!(output.aggregate.rows[0][1], Value::from(86.0));
    }

    #[test]
    fn toggling_a_key_twice_restores_the_fallback() {
        let mut state = loaded(DatasetSchema::mortality());
        state.toggle_key("Ain");
        state.toggle_key("Ain");
        assert!(state.selected_keys.is_empty());
        assert_eq!(state.output.as_ref().unwrap().filtered.len(), 5);

        state.select_all_keys();
        assert_eq!(state.output.as_ref().unwrap().filtered.len(), 20);
        state.clear_keys();
        assert_eq!(state.output.as_ref().unwrap().filtered.len(), 5);
    }

    #[test]
    fn export_uses_schema_file_names() {
        let state = loaded(DatasetSchema::superstore());
        let download = state.export(TableKind::Aggregate).unwrap();
        assert_eq!(download.file_name, "superstore_by_region.csv");
        assert!(download.bytes.starts_with(b"region,sales,quantity,profit,percentage\n"));
    }

    #[test]
    fn failed_upload_keeps_previous_dataset() {
        let mut state = loaded(DatasetSchema::superstore());
        state.load(Some(Path::new("orders.parquet")));
        assert!(state.status_message.as_deref().unwrap().contains("parquet"));
        assert!(state.raw.is_some());
    }

    #[test]
    fn export_without_data_is_an_error() {
        let state = AppState::new(DatasetSchema::superstore());
        assert!(state.export(TableKind::Filtered).is_err());
    }
}
