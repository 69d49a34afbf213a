//! Load orchestration: decode, shape scan, strategy selection and fallback.

use tracing::{info, warn};

use cohort_model::{Definition, LoadStrategyKind};

use crate::decode::decode;
use crate::error::{IngestError, Result};
use crate::policy::{IngestOptions, SelectionReason};
use crate::shape::scan_shape;
use crate::strategy::{DiskBackedStrategy, InMemoryStrategy, LoadStrategy, PreparedCsv};
use crate::table::TableHandle;
use crate::upload::RawUpload;

/// A table plus how it was loaded.
#[derive(Debug, Clone)]
pub struct LoadedTable {
    pub table: TableHandle,
    pub reason: SelectionReason,
    /// Set when the in-memory engine rejected the input.
    pub fell_back: bool,
    pub encoding: &'static str,
}

impl LoadedTable {
    pub fn strategy(&self) -> LoadStrategyKind {
        self.table.strategy()
    }
}

/// Turns raw uploads into tables for one set of options.
#[derive(Debug, Clone)]
pub struct Loader {
    options: IngestOptions,
    in_memory: InMemoryStrategy,
    disk_backed: DiskBackedStrategy,
}

impl Loader {
    pub fn new(options: IngestOptions) -> Self {
        let in_memory = InMemoryStrategy::new(options.policy.memory_budget_bytes);
        let disk_backed = DiskBackedStrategy::new(options.spill_dir.clone());
        Self {
            options,
            in_memory,
            disk_backed,
        }
    }

    pub fn options(&self) -> &IngestOptions {
        &self.options
    }

    /// Load `upload` as a table declared by `definition`.
    ///
    /// Malformed input aborts the whole load; no row is dropped or coerced.
    pub fn load(&self, upload: &RawUpload, definition: &Definition) -> Result<LoadedTable> {
        if upload.is_empty() {
            return Err(IngestError::EmptyInput);
        }
        let delimiter = self.options.delimiter_byte()?;
        let decoded = decode(
            &upload.bytes,
            &upload.encoding,
            upload.bom_detected,
            delimiter,
        )?;
        let shape = scan_shape(&decoded.text, delimiter)?;

        if let Some(missing) = definition
            .column_names()
            .find(|name| !shape.headers.iter().any(|header| header == name))
        {
            return Err(IngestError::MissingColumn {
                column: missing.to_string(),
            });
        }

        let csv = PreparedCsv {
            text: decoded.text,
            headers: shape.headers,
            row_count: shape.row_count,
            delimiter,
        };
        let (kind, reason) = self.options.policy.select(upload.len());
        let (table, fell_back) = match kind {
            LoadStrategyKind::InMemory => match self.in_memory.load(&csv) {
                Ok(table) => (table, false),
                Err(err) if err.triggers_fallback() => {
                    warn!(
                        file_type = %definition.file_type,
                        error = %err,
                        "in-memory load rejected, retrying disk-backed"
                    );
                    (self.disk_backed.load(&csv)?, true)
                }
                Err(err) => return Err(err),
            },
            LoadStrategyKind::DiskBacked => (self.disk_backed.load(&csv)?, false),
        };

        info!(
            file_type = %definition.file_type,
            rows = table.row_count(),
            strategy = %table.strategy(),
            fell_back,
            "table loaded"
        );
        Ok(LoadedTable {
            table,
            reason,
            fell_back,
            encoding: decoded.encoding,
        })
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new(IngestOptions::default())
    }
}
