//! In-memory and disk-backed load strategies.

use std::io::{Cursor, Write};
use std::path::PathBuf;

use polars::prelude::*;
use tracing::{debug, trace};

use cohort_model::LoadStrategyKind;

use crate::error::{IngestError, Result};
use crate::table::{TableHandle, rejected};

/// Decoded text whose shape has already been checked.
#[derive(Debug, Clone)]
pub struct PreparedCsv {
    pub text: String,
    /// Normalized header names, in file order.
    pub headers: Vec<String>,
    pub row_count: u64,
    pub delimiter: u8,
}

/// A way of turning prepared text into a [`TableHandle`].
pub trait LoadStrategy: Send + Sync {
    fn kind(&self) -> LoadStrategyKind;

    fn load(&self, csv: &PreparedCsv) -> Result<TableHandle>;
}

/// Parses the whole text into a [`DataFrame`].
///
/// Rejects frames whose estimated size exceeds `memory_budget_bytes`.
#[derive(Debug, Clone)]
pub struct InMemoryStrategy {
    memory_budget_bytes: u64,
}

impl InMemoryStrategy {
    pub fn new(memory_budget_bytes: u64) -> Self {
        Self {
            memory_budget_bytes,
        }
    }
}

impl LoadStrategy for InMemoryStrategy {
    fn kind(&self) -> LoadStrategyKind {
        LoadStrategyKind::InMemory
    }

    fn load(&self, csv: &PreparedCsv) -> Result<TableHandle> {
        if csv.row_count == 0 {
            return TableHandle::empty(&csv.headers, self.kind());
        }
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(0))
            .map_parse_options(|options| options.with_separator(csv.delimiter))
            .into_reader_with_file_handle(Cursor::new(csv.text.as_bytes()))
            .finish()
            .map_err(|e| rejected(self.kind(), e))?;
        check_row_count(self.kind(), df.height() as u64, csv.row_count)?;

        let estimated = df.estimated_size() as u64;
        trace!(estimated, budget = self.memory_budget_bytes, "in-memory frame size");
        if estimated > self.memory_budget_bytes {
            return Err(IngestError::EngineRejected {
                strategy: self.kind(),
                message: format!(
                    "frame needs {estimated} bytes, budget is {} bytes",
                    self.memory_budget_bytes
                ),
            });
        }

        let df = rename_positional(df, &csv.headers).map_err(|e| rejected(self.kind(), e))?;
        TableHandle::from_frame(df)
    }
}

/// Spills text to a temp file and scans it lazily with low-memory settings.
#[derive(Debug, Clone, Default)]
pub struct DiskBackedStrategy {
    spill_dir: Option<PathBuf>,
}

impl DiskBackedStrategy {
    pub fn new(spill_dir: Option<PathBuf>) -> Self {
        Self { spill_dir }
    }

    fn spill(&self, text: &str) -> Result<tempfile::NamedTempFile> {
        let dir = self.spill_dir.clone().unwrap_or_else(std::env::temp_dir);
        let io_err = |source| IngestError::Spill {
            dir: dir.clone(),
            source,
        };
        let mut file = tempfile::Builder::new()
            .prefix("cohort-spill-")
            .suffix(".csv")
            .tempfile_in(&dir)
            .map_err(io_err)?;
        file.write_all(text.as_bytes()).map_err(io_err)?;
        file.flush().map_err(io_err)?;
        debug!(path = %file.path().display(), bytes = text.len(), "wrote spill file");
        Ok(file)
    }
}

impl LoadStrategy for DiskBackedStrategy {
    fn kind(&self) -> LoadStrategyKind {
        LoadStrategyKind::DiskBacked
    }

    fn load(&self, csv: &PreparedCsv) -> Result<TableHandle> {
        if csv.row_count == 0 {
            return TableHandle::empty(&csv.headers, self.kind());
        }
        let spill = self.spill(&csv.text)?;
        let path = spill.path().to_string_lossy().into_owned();
        let mut scan = LazyCsvReader::new(PlPath::new(&path))
            .with_has_header(true)
            .with_infer_schema_length(Some(0))
            .with_separator(csv.delimiter)
            .with_low_memory(true)
            .finish()
            .map_err(|e| rejected(self.kind(), e))?;

        let schema = scan
            .collect_schema()
            .map_err(|e| rejected(self.kind(), e))?;
        if schema.len() != csv.headers.len() {
            return Err(IngestError::EngineRejected {
                strategy: self.kind(),
                message: format!(
                    "scan found {} columns, header has {}",
                    schema.len(),
                    csv.headers.len()
                ),
            });
        }
        let renamed: Vec<Expr> = schema
            .iter_names()
            .zip(&csv.headers)
            .map(|(engine_name, header)| col(engine_name.clone()).alias(header.as_str()))
            .collect();
        let scan = scan.select(renamed);

        let counted = scan
            .clone()
            .select([len().cast(DataType::UInt64).alias("rows")])
            .collect()
            .and_then(|df| Ok(df.column("rows")?.u64()?.get(0).unwrap_or(0)))
            .map_err(|e| rejected(self.kind(), e))?;
        check_row_count(self.kind(), counted, csv.row_count)?;

        Ok(TableHandle::from_scan(
            scan,
            spill,
            csv.headers.clone(),
            csv.row_count,
        ))
    }
}

/// The engine must see exactly the rows the shape scan counted.
fn check_row_count(strategy: LoadStrategyKind, loaded: u64, scanned: u64) -> Result<()> {
    if loaded == scanned {
        return Ok(());
    }
    Err(IngestError::EngineRejected {
        strategy,
        message: format!("engine read {loaded} rows, shape scan found {scanned}"),
    })
}

/// Give columns the normalized header names, by position.
fn rename_positional(df: DataFrame, headers: &[String]) -> PolarsResult<DataFrame> {
    if df.width() != headers.len() {
        return Err(PolarsError::ShapeMismatch(
            format!(
                "parsed {} columns, header has {}",
                df.width(),
                headers.len()
            )
            .into(),
        ));
    }
    let columns: Vec<Column> = df
        .take_columns()
        .into_iter()
        .zip(headers)
        .map(|(mut column, header)| {
            column.rename(header.as_str().into());
            column
        })
        .collect();
    DataFrame::new(columns)
}
