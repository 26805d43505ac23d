use super::model::{Record, Table, Value};
use super::PipelineError;

/// Column holding the source column name of each long row.
pub const BRACKET_COLUMN: &str = "bracket";
/// Column holding the measure value of each long row.
pub const VALUE_COLUMN: &str = "value";

/// Turn a wide table (one column per bracket) into a long one.
///
/// Every input row expands into one row per value column, in value column
/// order: `group_cols…, bracket, value, passthrough…`.  Passthrough cells are
/// repeated verbatim on each expanded row.
pub fn reshape_for_hierarchy(
    table: &Table,
    group_cols: &[String],
    value_cols: &[String],
    passthrough: &[String],
) -> Result<Table, PipelineError> {
    let resolve = |cols: &[String]| {
        cols.iter()
            .map(|c| table.require_column(c))
            .collect::<Result<Vec<_>, _>>()
    };
    let group_idx = resolve(group_cols)?;
    let value_idx = resolve(value_cols)?;
    let pass_idx = resolve(passthrough)?;

    let columns = group_cols
        .iter()
        .cloned()
        .chain([BRACKET_COLUMN.to_string(), VALUE_COLUMN.to_string()])
        .chain(passthrough.iter().cloned());
    let mut out = Table::new(columns);
    out.rows.reserve(table.len() * value_cols.len());

    for row in &table.rows {
        for (label, &vi) in value_cols.iter().zip(&value_idx) {
            let mut long: Record = group_idx.iter().map(|&gi| row[gi].clone()).collect();
            long.push(Value::Text(label.clone()));
            long.push(row[vi].clone());
            long.extend(pass_idx.iter().map(|&pi| row[pi].clone()));
            out.push_row(long);
        }
    }
    Ok(out)
}
