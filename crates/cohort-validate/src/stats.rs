//! Per-column statistics in a single aggregate query.

use polars::prelude::*;

use cohort_ingest::TableHandle;
use cohort_model::{ColumnStats, Definition};

use crate::error::{Result, ValidatorError};

/// Null and distinct counts for every loaded column, in header order.
///
/// Uses the row count captured at load; the row-identity column is skipped.
/// Columns the definition does not declare get no type.
pub fn column_stats(table: &TableHandle, definition: &Definition) -> Result<Vec<ColumnStats>> {
    let columns = table.columns();
    let total_rows = table.row_count();

    let mut aggregates = Vec::with_capacity(columns.len() * 2);
    for (index, name) in columns.iter().enumerate() {
        aggregates.push(
            col(name.as_str())
                .null_count()
                .cast(DataType::UInt64)
                .alias(format!("nulls_{index}")),
        );
        aggregates.push(
            col(name.as_str())
                .drop_nulls()
                .n_unique()
                .cast(DataType::UInt64)
                .alias(format!("unique_{index}")),
        );
    }
    let df = table
        .lazy()
        .select(aggregates)
        .collect()
        .map_err(|e| ValidatorError::Query {
            column: "<statistics>".to_string(),
            message: e.to_string(),
        })?;

    columns
        .iter()
        .enumerate()
        .map(|(index, name)| {
            let null_count = first_u64(&df, &format!("nulls_{index}"))?;
            let unique_count = first_u64(&df, &format!("unique_{index}"))?;
            let column_type = definition.column(name).map(|column| column.column_type);
            Ok(ColumnStats::new(
                name.as_str(),
                column_type,
                total_rows,
                null_count,
                unique_count,
            ))
        })
        .collect()
}

fn first_u64(df: &DataFrame, name: &str) -> Result<u64> {
    Ok(df.column(name)?.u64()?.get(0).unwrap_or(0))
}
