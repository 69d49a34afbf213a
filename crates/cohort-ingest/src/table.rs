//! Queryable table handles.

use std::fmt;
use std::sync::Arc;

use polars::prelude::*;
use tempfile::NamedTempFile;

use cohort_model::LoadStrategyKind;

use crate::error::{IngestError, Result};

/// Reserved 1-based row-identity column added to every loaded table.
pub const ROW_NUMBER_COLUMN: &str = "__row_number";

#[derive(Clone)]
enum Source {
    Memory(DataFrame),
    Disk {
        scan: LazyFrame,
        // Keeps the spill file alive as long as any handle.
        _spill: Arc<NamedTempFile>,
    },
}

/// A loaded table, queryable through lazy Polars plans.
///
/// Every column is text. Cloning is cheap.
#[derive(Clone)]
pub struct TableHandle {
    source: Source,
    columns: Vec<String>,
    row_count: u64,
    strategy: LoadStrategyKind,
}

impl TableHandle {
    /// Wrap an in-memory frame and attach the row-identity column.
    pub fn from_frame(df: DataFrame) -> Result<Self> {
        let columns = data_columns(df.get_column_names().into_iter().map(|name| name.as_str()))?;
        let row_count = df.height() as u64;
        let df = df
            .with_row_index(ROW_NUMBER_COLUMN.into(), Some(1))
            .map_err(|e| rejected(LoadStrategyKind::InMemory, e))?;
        Ok(Self {
            source: Source::Memory(df),
            columns,
            row_count,
            strategy: LoadStrategyKind::InMemory,
        })
    }

    pub(crate) fn from_scan(
        scan: LazyFrame,
        spill: NamedTempFile,
        columns: Vec<String>,
        row_count: u64,
    ) -> Self {
        Self {
            source: Source::Disk {
                scan: scan.with_row_index(ROW_NUMBER_COLUMN, Some(1)),
                _spill: Arc::new(spill),
            },
            columns,
            row_count,
            strategy: LoadStrategyKind::DiskBacked,
        }
    }

    /// Zero-row table with text columns named `headers`.
    pub fn empty(headers: &[String], strategy: LoadStrategyKind) -> Result<Self> {
        let columns: Vec<Column> = headers
            .iter()
            .map(|name| Column::new_empty(name.as_str().into(), &DataType::String))
            .collect();
        let df = DataFrame::new(columns).map_err(|e| rejected(strategy, e))?;
        let mut table = Self::from_frame(df)?;
        table.strategy = strategy;
        Ok(table)
    }

    /// Lazy plan over the table, including [`ROW_NUMBER_COLUMN`].
    pub fn lazy(&self) -> LazyFrame {
        match &self.source {
            Source::Memory(df) => df.clone().lazy(),
            Source::Disk { scan, .. } => scan.clone(),
        }
    }

    /// Data row count captured at load.
    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    /// Data column names in header order, without the row-identity column.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|column| column == name)
    }

    pub fn strategy(&self) -> LoadStrategyKind {
        self.strategy
    }
}

impl fmt::Debug for TableHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableHandle")
            .field("columns", &self.columns)
            .field("row_count", &self.row_count)
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

fn data_columns<'a>(names: impl Iterator<Item = &'a str>) -> Result<Vec<String>> {
    let mut columns = Vec::new();
    for name in names {
        if name == ROW_NUMBER_COLUMN {
            return Err(IngestError::DuplicateHeader {
                column: name.to_string(),
            });
        }
        columns.push(name.to_string());
    }
    Ok(columns)
}

pub(crate) fn rejected(strategy: LoadStrategyKind, err: PolarsError) -> IngestError {
    IngestError::EngineRejected {
        strategy,
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_gets_one_based_row_numbers() {
        let df = df! { "id" => ["a", "b", "c"] }.unwrap();
        let table = TableHandle::from_frame(df).unwrap();
        assert_eq!(table.row_count(), 3);
        assert_eq!(table.columns(), &["id".to_string()]);

        let collected = table.lazy().collect().unwrap();
        let rows = collected
            .column(ROW_NUMBER_COLUMN)
            .unwrap()
            .cast(&DataType::UInt64)
            .unwrap();
        let rows: Vec<Option<u64>> = rows.u64().unwrap().into_iter().collect();
        assert_eq!(rows, vec![Some(1), Some(2), Some(3)]);
    }

    #[test]
    fn reserved_column_name_is_rejected() {
        let df = df! { ROW_NUMBER_COLUMN => ["x"] }.unwrap();
        assert!(TableHandle::from_frame(df).is_err());
    }

    #[test]
    fn empty_table_keeps_headers() {
        let headers = vec!["a".to_string(), "b".to_string()];
        let table = TableHandle::empty(&headers, LoadStrategyKind::DiskBacked).unwrap();
        assert_eq!(table.row_count(), 0);
        assert_eq!(table.strategy(), LoadStrategyKind::DiskBacked);
        assert!(table.has_column("b"));
    }
}
