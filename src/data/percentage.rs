use super::model::{Table, Value};
use super::PipelineError;

/// Name of the derived column written by [`compute_percentage`].
pub const PERCENTAGE_COLUMN: &str = "percentage";

/// Return a copy of `table` with `percentage = numerator / denominator * 100`.
///
/// The result is [`Value::Null`] when the denominator is zero or null, or the
/// numerator is null.  An existing `percentage` column is overwritten in
/// place; otherwise the column is appended.
pub fn compute_percentage(
    table: &Table,
    numerator_col: &str,
    denominator_col: &str,
) -> Result<Table, PipelineError> {
    let num_idx = table.require_column(numerator_col)?;
    let den_idx = table.require_column(denominator_col)?;

    let values = table
        .rows
        .iter()
        .enumerate()
        .map(|(row_no, row)| {
            let num = numeric(&row[num_idx], numerator_col, row_no)?;
            let den = numeric(&row[den_idx], denominator_col, row_no)?;
            Ok(ratio(num, den))
        })
        .collect::<Result<Vec<_>, PipelineError>>()?;

    let mut out = table.clone();
    let target = match out.column_index(PERCENTAGE_COLUMN) {
        Some(idx) => idx,
        None => {
            out.columns.push(PERCENTAGE_COLUMN.to_string());
            for row in &mut out.rows {
                row.push(Value::Null);
            }
            out.columns.len() - 1
        }
    };
    for (row, value) in out.rows.iter_mut().zip(values) {
        row[target] = value;
    }
    Ok(out)
}

fn numeric(value: &Value, column: &str, row: usize) -> Result<Option<f64>, PipelineError> {
    match value {
        Value::Number(v) => Ok(Some(*v)),
        Value::Null => Ok(None),
        other => Err(PipelineError::NonNumeric {
            column: column.to_string(),
            row,
            value: other.to_string(),
        }),
    }
}

fn ratio(num: Option<f64>, den: Option<f64>) -> Value {
    match (num, den) {
        (Some(n), Some(d)) if d != 0.0 => {
            let pct = n / d * 100.0;
            if pct.is_finite() {
                Value::Number(pct)
            } else {
                Value::Null
            }
        }
        _ => Value::Null,
    }
}
