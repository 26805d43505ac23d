use std::collections::HashMap;

use serde::Deserialize;

use super::model::{Record, Table, Value};
use super::PipelineError;

/// How a measure column collapses to one value per group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reducer {
    /// Sum of the non-null numbers; null when there are none.
    Sum,
    /// Mean of the non-null numbers; nulls are excluded, never read as zero.
    Mean,
    /// The first row's value.  Meant for figures repeated on every row of a
    /// group (e.g. a department's population).
    First,
}

/// Group `table` by `group_key` and reduce each `(column, reducer)` pair.
///
/// Output columns are the key followed by the reducer columns in declared
/// order; output rows follow the first appearance of each key.
pub fn aggregate(
    table: &Table,
    group_key: &str,
    reducers: &[(String, Reducer)],
) -> Result<Table, PipelineError> {
    let key_idx = table.require_column(group_key)?;
    let measure_idx = reducers
        .iter()
        .map(|(col, _)| table.require_column(col))
        .collect::<Result<Vec<_>, _>>()?;

    // Partition row positions by key, remembering first-seen order.
    let mut slot_of: HashMap<&Value, usize> = HashMap::new();
    let mut groups: Vec<(&Value, Vec<usize>)> = Vec::new();
    for (row_no, row) in table.rows.iter().enumerate() {
        let key = &row[key_idx];
        let slot = *slot_of.entry(key).or_insert_with(|| {
            groups.push((key, Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(row_no);
    }

    let mut out = Table::new(
        std::iter::once(group_key.to_string()).chain(reducers.iter().map(|(c, _)| c.clone())),
    );
    for (key, members) in groups {
        let mut record: Record = Vec::with_capacity(reducers.len() + 1);
        record.push(key.clone());
        for ((column, reducer), &idx) in reducers.iter().zip(&measure_idx) {
            record.push(reduce(table, &members, idx, column, *reducer)?);
        }
        out.push_row(record);
    }
    log::debug!(
        "aggregated {} rows into {} groups by `{group_key}`",
        table.len(),
        out.len()
    );
    Ok(out)
}

fn reduce(
    table: &Table,
    members: &[usize],
    idx: usize,
    column: &str,
    reducer: Reducer,
) -> Result<Value, PipelineError> {
    if reducer == Reducer::First {
        return Ok(members
            .first()
            .map(|&r| table.rows[r][idx].clone())
            .unwrap_or(Value::Null));
    }

    let mut sum = 0.0;
    let mut count = 0usize;
    for &r in members {
        match &table.rows[r][idx] {
            Value::Null => {}
            Value::Number(v) => {
                sum += v;
                count += 1;
            }
            other => {
                return Err(PipelineError::NonNumeric {
                    column: column.to_string(),
                    row: r,
                    value: other.to_string(),
                })
            }
        }
    }

    if count == 0 {
        return Ok(Value::Null);
    }
    Ok(match reducer {
        Reducer::Mean => Value::Number(sum / count as f64),
        _ => Value::Number(sum),
    })
}
