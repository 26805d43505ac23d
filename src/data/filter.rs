use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::Deserialize;

use super::model::{Record, Table};
use super::PipelineError;

// ---------------------------------------------------------------------------
// Filter selection: what the user picked
// ---------------------------------------------------------------------------

/// Inclusive date interval.  `start > end` is a valid value that matches
/// nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        DateRange { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Immutable snapshot of the filter widgets.
///
/// * `keys` empty → no key filter, the fallback policy applies
/// * `date_range` absent → no date filter
/// * `measures` absent → every measure column is kept
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSpec {
    pub keys: BTreeSet<String>,
    pub date_range: Option<DateRange>,
    pub measures: Option<BTreeSet<String>>,
}

impl FilterSpec {
    pub fn with_keys<S: Into<String>>(mut self, keys: impl IntoIterator<Item = S>) -> Self {
        self.keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_date_range(mut self, range: DateRange) -> Self {
        self.date_range = Some(range);
        self
    }

    /// An empty measure subset means "no measure filter", never "drop all
    /// measures".
    pub fn with_measures<S: Into<String>>(mut self, measures: impl IntoIterator<Item = S>) -> Self {
        let measures: BTreeSet<String> = measures.into_iter().map(Into::into).collect();
        self.measures = (!measures.is_empty()).then_some(measures);
        self
    }
}

// ---------------------------------------------------------------------------
// Filter rules: what the dataset fixes
// ---------------------------------------------------------------------------

/// Behaviour when no grouping key is selected.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Keep every row.
    AllRows,
    /// Keep the `k` rows with the largest `by` value.
    TopK { k: usize, by: String },
}

/// Per-dataset parameters of [`filter_rows`].
#[derive(Debug, Clone, PartialEq)]
pub struct FilterRules {
    pub group_key: String,
    pub date_column: Option<String>,
    /// Columns always retained by a measure subset (besides the key).
    pub identifying_columns: Vec<String>,
    /// Columns a measure subset may drop.
    pub measure_columns: Vec<String>,
    pub fallback: FallbackPolicy,
}

// ---------------------------------------------------------------------------
// filter_rows
// ---------------------------------------------------------------------------

/// Return the rows of `table` matching `spec`, in original order.
///
/// A row passes when:
/// * its date lies inside `spec.date_range` (if any); null dates never pass
/// * its key is in `spec.keys`, or `spec.keys` is empty and the row survives
///   the fallback policy (evaluated on the date-filtered rows)
pub fn filter_rows(
    table: &Table,
    spec: &FilterSpec,
    rules: &FilterRules,
) -> Result<Table, PipelineError> {
    let key_idx = table.require_column(&rules.group_key)?;

    let mut candidates: Vec<&Record> = match (&spec.date_range, &rules.date_column) {
        (Some(range), Some(col)) => {
            let date_idx = table.require_column(col)?;
            table
                .rows
                .iter()
                .filter(|row| row[date_idx].as_date().is_some_and(|d| range.contains(d)))
                .collect()
        }
        _ => table.rows.iter().collect(),
    };

    if spec.keys.is_empty() {
        if let FallbackPolicy::TopK { k, by } = &rules.fallback {
            let rank_idx = table.require_column(by)?;
            candidates = top_k(candidates, rank_idx, *k);
        }
    } else {
        candidates.retain(|row| spec.keys.contains(&row[key_idx].key_label()));
    }

    let rows: Vec<Record> = candidates.into_iter().cloned().collect();
    let filtered = Table {
        columns: table.columns.clone(),
        rows,
    };

    match &spec.measures {
        Some(selected) => Ok(retain_measures(&filtered, selected, rules)),
        None => Ok(filtered),
    }
}

/// The `k` rows with the largest value in column `rank_idx`, emitted in their
/// original relative order.  Nulls rank below every number; ties keep input
/// order.
fn top_k(rows: Vec<&Record>, rank_idx: usize, k: usize) -> Vec<&Record> {
    let mut order: Vec<usize> = (0..rows.len()).collect();
    // Stable sort: equal ranks stay in input order.
    order.sort_by(|&a, &b| {
        let va = rows[a][rank_idx].as_f64();
        let vb = rows[b][rank_idx].as_f64();
        match (va, vb) {
            (Some(x), Some(y)) => y.total_cmp(&x),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        }
    });
    order.truncate(k);
    order.sort_unstable();
    order.into_iter().map(|i| rows[i]).collect()
}

/// Drop the measure columns that are not selected.  The key, identifying
/// columns and selected measures keep their original column order.
fn retain_measures(table: &Table, selected: &BTreeSet<String>, rules: &FilterRules) -> Table {
    let keep: Vec<usize> = table
        .columns
        .iter()
        .enumerate()
        .filter(|(_, col)| {
            **col == rules.group_key
                || rules.identifying_columns.contains(col)
                || (rules.measure_columns.contains(col) && selected.contains(*col))
        })
        .map(|(i, _)| i)
        .collect();
    table.project(&keep)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::Value;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    fn table() -> Table {
        let mut t = Table::new(["department", "date", "deaths", "age_0_24", "age_85_plus"]);
        t.push_row(vec!["A".into(), date(1, 1).into(), 10.0.into(), 1.0.into(), 4.0.into()]);
        t.push_row(vec!["B".into(), date(2, 1).into(), 20.0.into(), 2.0.into(), 8.0.into()]);
        t.push_row(vec!["C".into(), date(3, 1).into(), 30.0.into(), 3.0.into(), 9.0.into()]);
        t.push_row(vec!["A".into(), date(4, 1).into(), 20.0.into(), 1.0.into(), 5.0.into()]);
        t.push_row(vec!["B".into(), Value::Null, Value::Null, 0.0.into(), 1.0.into()]);
        t
    }

    fn rules(fallback: FallbackPolicy) -> FilterRules {
        FilterRules {
            group_key: "department".to_string(),
            date_column: Some("date".to_string()),
            identifying_columns: vec!["date".to_string(), "deaths".to_string()],
            measure_columns: vec!["age_0_24".to_string(), "age_85_plus".to_string()],
            fallback,
        }
    }

    fn keys(t: &Table) -> Vec<String> {
        t.column_values("department")
            .unwrap()
            .into_iter()
            .map(Value::key_label)
            .collect()
    }

    #[test]
    fn selection_is_sound_and_complete() {
        let spec = FilterSpec::default().with_keys(["A", "C", "Z"]);
        let out = filter_rows(&table(), &spec, &rules(FallbackPolicy::AllRows)).unwrap();
        assert_eq!(keys(&out), vec!["A", "C", "A"]);
        assert_eq!(out.columns, table().columns);
    }

    #[test]
    fn empty_selection_with_all_rows_fallback_keeps_everything() {
        let out = filter_rows(&table(), &FilterSpec::default(), &rules(FallbackPolicy::AllRows))
            .unwrap();
        assert_eq!(out, table());
    }

    #[test]
    fn top_k_fallback_breaks_ties_by_row_order_and_ranks_nulls_last() {
        let policy = FallbackPolicy::TopK {
            k: 2,
            by: "deaths".to_string(),
        };
        let out = filter_rows(&table(), &FilterSpec::default(), &rules(policy)).unwrap();
        // C (30) first by rank, then the B/A tie at 20 resolves to B (earlier row).
        assert_eq!(keys(&out), vec!["B", "C"]);

        let policy = FallbackPolicy::TopK {
            k: 10,
            by: "deaths".to_string(),
        };
        let out = filter_rows(&table(), &FilterSpec::default(), &rules(policy)).unwrap();
        assert_eq!(out.len(), 5);
    }

    #[test]
    fn date_range_is_inclusive_and_skips_missing_dates() {
        let spec = FilterSpec::default().with_date_range(DateRange::new(date(2, 1), date(3, 1)));
        let out = filter_rows(&table(), &spec, &rules(FallbackPolicy::AllRows)).unwrap();
        assert_eq!(keys(&out), vec!["B", "C"]);
    }

    #[test]
    fn inverted_date_range_yields_empty_table() {
        let spec = FilterSpec::default().with_date_range(DateRange::new(date(4, 1), date(1, 1)));
        let out = filter_rows(&table(), &spec, &rules(FallbackPolicy::AllRows)).unwrap();
        assert!(out.is_empty());
        assert_eq!(out.columns.len(), 5);
    }

    #[test]
    fn top_k_ranks_only_rows_inside_the_date_range() {
        let policy = FallbackPolicy::TopK {
            k: 1,
            by: "deaths".to_string(),
        };
        let spec = FilterSpec::default().with_date_range(DateRange::new(date(1, 1), date(2, 1)));
        let out = filter_rows(&table(), &spec, &rules(policy)).unwrap();
        assert_eq!(keys(&out), vec!["B"]);
    }

    #[test]
    fn measure_subset_keeps_key_identifying_and_selected_columns() {
        let spec = FilterSpec::default().with_measures(["age_85_plus"]);
        let out = filter_rows(&table(), &spec, &rules(FallbackPolicy::AllRows)).unwrap();
        assert_eq!(out.columns, vec!["department", "date", "deaths", "age_85_plus"]);
        assert_eq!(out.len(), 5);
    }

    #[test]
    fn empty_measure_subset_is_no_filter() {
        let spec = FilterSpec::default().with_measures(Vec::<String>::new());
        assert_eq!(spec.measures, None);
    }

    #[test]
    fn missing_ranking_column_is_an_error() {
        let policy = FallbackPolicy::TopK {
            k: 3,
            by: "percentage".to_string(),
        };
        let err = filter_rows(&table(), &FilterSpec::default(), &rules(policy)).unwrap_err();
        assert!(matches!(err, PipelineError::UnknownColumn(c) if c == "percentage"));
    }

    #[test]
    fn fallback_policy_deserializes_from_tagged_json() {
        let policy: FallbackPolicy =
            serde_json::from_str(r#"{"kind": "top_k", "k": 5, "by": "deaths"}"#).unwrap();
        assert_eq!(
            policy,
            FallbackPolicy::TopK {
                k: 5,
                by: "deaths".to_string()
            }
        );
    }

    #[test]
    fn numeric_keys_differing_past_two_decimals_select_separately() {
        let mut t = Table::new(["department", "deaths"]);
        t.push_row(vec![1.231.into(), 1.0.into()]);
        t.push_row(vec![1.234.into(), 2.0.into()]);
        let rules = FilterRules {
            group_key: "department".to_string(),
            date_column: None,
            identifying_columns: vec!["deaths".to_string()],
            measure_columns: Vec::new(),
            fallback: FallbackPolicy::AllRows,
        };
        let spec = FilterSpec::default().with_keys(["1.231"]);
        let out = filter_rows(&t, &spec, &rules).unwrap();
        assert_eq!(keys(&out), vec!["1.231"]);
    }
}
