/// Data layer: core types, loading, the filter-aggregate pipeline and export.
///
/// Architecture:
/// ```text
///  .csv / .txt / .xlsx / .xls
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  decode, rename columns, parse cells → raw Table
///   └──────────┘
///        │
///        ▼
///   ┌──────────────┐
///   │ percentage    │  row-level ratio (ranking, hover data)
///   └──────────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  FilterSpec + fallback policy → filtered Table
///   └──────────┘
///        │                     │
///        ▼                     ▼
///   ┌───────────┐        ┌──────────┐
///   │ aggregate  │        │ reshape   │  wide → long for the treemap
///   └───────────┘        └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  export   │  UTF-8 CSV download blobs
///   └──────────┘
/// ```

pub mod aggregate;
pub mod export;
pub mod filter;
pub mod loader;
pub mod model;
pub mod percentage;
pub mod pipeline;
pub mod reshape;

use thiserror::Error;

/// Errors raised by the pipeline stages.  All of them are local to one run:
/// the user can change the filter input and try again.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("unknown column `{0}`")]
    UnknownColumn(String),
    #[error("column `{column}` row {row}: `{value}` is not a number")]
    NonNumeric {
        column: String,
        row: usize,
        value: String,
    },
}
