use super::aggregate::{aggregate, Reducer};
use super::filter::{filter_rows, FilterSpec};
use super::model::Table;
use super::percentage::compute_percentage;
use super::reshape::reshape_for_hierarchy;
use super::PipelineError;
use crate::config::DatasetSchema;

/// The three tables every view and export consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    /// Matching raw rows, with the row-level percentage when configured.
    pub filtered: Table,
    /// One row per grouping key; percentage recomputed from the aggregated
    /// numerator and denominator.
    pub aggregate: Table,
    /// Long table for the treemap.
    pub hierarchy: Table,
}

/// Run filter → aggregate → percentage → reshape over an immutable raw table.
///
/// Pure: identical inputs give identical outputs, and nothing is cached
/// between runs.
pub fn run(
    raw: &Table,
    spec: &FilterSpec,
    schema: &DatasetSchema,
) -> Result<PipelineOutput, PipelineError> {
    let prepared = match &schema.percentage {
        Some(pct) => compute_percentage(raw, &pct.numerator, &pct.denominator)?,
        None => raw.clone(),
    };

    let filtered = filter_rows(&prepared, spec, &schema.filter_rules())?;

    // A measure subset may have dropped some reducer columns.
    let reducers: Vec<(String, Reducer)> = schema
        .reducer_pairs()
        .into_iter()
        .filter(|(col, _)| filtered.has_column(col))
        .collect();
    let mut aggregated = aggregate(&filtered, &schema.group_key, &reducers)?;
    if let Some(pct) = &schema.percentage {
        if aggregated.has_column(&pct.numerator) && aggregated.has_column(&pct.denominator) {
            aggregated = compute_percentage(&aggregated, &pct.numerator, &pct.denominator)?;
        }
    }

    let present = |cols: &[String]| -> Vec<String> {
        cols.iter()
            .filter(|c| filtered.has_column(c))
            .cloned()
            .collect()
    };
    let hierarchy = reshape_for_hierarchy(
        &filtered,
        &present(&schema.hierarchy.group_columns),
        &present(&schema.hierarchy.value_columns),
        &present(&schema.hierarchy.passthrough),
    )?;

    log::debug!(
        "pipeline `{}`: {} raw → {} filtered → {} groups, {} hierarchy rows",
        schema.name,
        raw.len(),
        filtered.len(),
        aggregated.len(),
        hierarchy.len()
    );

    Ok(PipelineOutput {
        filtered,
        aggregate: aggregated,
        hierarchy,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ColumnKind, ColumnSpec, HierarchySpec, ReducerSpec};
    use crate::data::filter::{DateRange, FallbackPolicy};
    use crate::data::loader::load_dataset;
    use crate::data::model::Value;
    use chrono::NaiveDate;

    /// Three departments, deaths and population only.
    fn abc_schema(k: usize) -> DatasetSchema {
        let mut schema = DatasetSchema::mortality();
        schema.columns = ["department", "deaths", "population"]
            .into_iter()
            .map(|name| ColumnSpec {
                name: name.to_string(),
                kind: if name == "department" {
                    ColumnKind::Text
                } else {
                    ColumnKind::Number
                },
            })
            .collect();
        schema.date_column = None;
        schema.identifying_columns = vec!["deaths".to_string(), "population".to_string()];
        schema.measure_columns = Vec::new();
        schema.reducers = vec![
            ReducerSpec {
                column: "deaths".to_string(),
                reducer: Reducer::Sum,
            },
            ReducerSpec {
                column: "population".to_string(),
                reducer: Reducer::First,
            },
        ];
        schema.fallback = FallbackPolicy::TopK {
            k,
            by: "deaths".to_string(),
        };
        schema.hierarchy = HierarchySpec {
            group_columns: vec!["department".to_string()],
            value_columns: vec!["deaths".to_string()],
            passthrough: vec!["percentage".to_string()],
        };
        schema.validate().unwrap();
        schema
    }

    fn abc_table() -> Table {
        let mut t = Table::new(["department", "deaths", "population"]);
        t.push_row(vec!["A".into(), 10.0.into(), 100.0.into()]);
        t.push_row(vec!["B".into(), 20.0.into(), 200.0.into()]);
        t.push_row(vec!["C".into(), 30.0.into(), 0.0.into()]);
        t
    }

    #[test]
    fn empty_selection_top_two_by_deaths() {
        let out = run(&abc_table(), &FilterSpec::default(), &abc_schema(2)).unwrap();
        assert_eq!(
            out.aggregate.columns,
            vec!["department", "deaths", "population", "percentage"]
        );
        assert_eq!(
            out.aggregate.rows,
            vec![
                vec![Value::from("B"), 20.0.into(), 200.0.into(), 10.0.into()],
                vec![Value::from("C"), 30.0.into(), 0.0.into(), Value::Null],
            ]
        );
        // The undefined percentage reaches the treemap data untouched.
        assert_eq!(out.hierarchy.rows[1][3], Value::Null);
    }

    #[test]
    fn explicit_selection_bypasses_fallback() {
        let spec = FilterSpec::default().with_keys(["A"]);
        let out = run(&abc_table(), &spec, &abc_schema(2)).unwrap();
        assert_eq!(out.aggregate.len(), 1);
        assert_eq!(out.aggregate.rows[0][3], Value::from(10.0));
    }

    #[test]
    fn aggregate_percentage_is_ratio_of_sums() {
        let mut raw = abc_table();
        raw.push_row(vec!["A".into(), 30.0.into(), 100.0.into()]);
        let spec = FilterSpec::default().with_keys(["A"]);
        let out = run(&raw, &spec, &abc_schema(2)).unwrap();
        // (10 + 30) / 100, not the mean of 10 % and 30 %.
        assert_eq!(out.aggregate.rows[0][3], Value::from(40.0));
        assert_eq!(out.filtered.column_values("percentage").unwrap().len(), 2);
    }

    #[test]
    fn runs_are_idempotent() {
        let (raw, _) = load_dataset(None, &DatasetSchema::mortality()).unwrap();
        let spec = FilterSpec::default().with_measures(["age_75_84", "age_85_plus"]);
        let schema = DatasetSchema::mortality_rate();
        let first = run(&raw, &spec, &schema).unwrap();
        let second = run(&raw, &spec, &schema).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn bundled_mortality_defaults_to_top_five_rows() {
        let (raw, _) = load_dataset(None, &DatasetSchema::mortality()).unwrap();
        let out = run(&raw, &FilterSpec::default(), &DatasetSchema::mortality()).unwrap();
        assert_eq!(out.filtered.len(), 5);
        let keys = out.aggregate.unique_labels("department").unwrap();
        assert_eq!(
            keys.into_iter().collect::<Vec<_>>(),
            vec!["Bouches-du-Rhône", "Nord", "Paris"]
        );
        // 5 rows × 6 age brackets.
        assert_eq!(out.hierarchy.len(), 30);
    }

    #[test]
    fn measure_subset_narrows_aggregate_and_hierarchy() {
        let (raw, _) = load_dataset(None, &DatasetSchema::mortality()).unwrap();
        let spec = FilterSpec::default()
            .with_keys(["Ain", "Lozère"])
            .with_measures(["age_85_plus"]);
        let out = run(&raw, &spec, &DatasetSchema::mortality()).unwrap();
        assert_eq!(
            out.aggregate.columns,
            vec!["department", "deaths", "population", "age_85_plus", "percentage"]
        );
        assert_eq!(out.aggregate.rows[0][3], Value::from(385.0));
        assert_eq!(out.hierarchy.len(), 4);
    }

    #[test]
    fn empty_result_flows_through_every_stage() {
        let (raw, _) = load_dataset(None, &DatasetSchema::superstore()).unwrap();
        let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).unwrap();
        let spec = FilterSpec::default().with_date_range(DateRange::new(d(2017, 1, 1), d(2016, 1, 1)));
        let out = run(&raw, &spec, &DatasetSchema::superstore()).unwrap();
        assert!(out.filtered.is_empty());
        assert!(out.aggregate.is_empty());
        assert!(out.hierarchy.is_empty());
        assert!(out.aggregate.has_column("percentage"));
    }
}
