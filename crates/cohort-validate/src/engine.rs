//! Column-parallel validation of a loaded table.

use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, error};

use cohort_ingest::{LoadedTable, TableHandle};
use cohort_model::{ColumnDefinition, ColumnReport, Definition, FileValidationReport};

use crate::checks::Validator;
use crate::error::{Result, ValidatorError};
use crate::options::ValidateOptions;
use crate::stats::column_stats;

/// Runs validators over tables with a dedicated, bounded worker pool.
#[derive(Debug)]
pub struct ValidationEngine {
    options: ValidateOptions,
    pool: rayon::ThreadPool,
}

impl ValidationEngine {
    pub fn new(options: ValidateOptions) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.max_parallel_columns.max(1))
            .thread_name(|index| format!("cohort-validate-{index}"))
            .build()
            .map_err(|e| ValidatorError::ThreadPool(e.to_string()))?;
        Ok(Self { options, pool })
    }

    pub fn options(&self) -> &ValidateOptions {
        &self.options
    }

    /// Validate one declared column.
    pub fn validate_column(
        &self,
        table: &TableHandle,
        column: &ColumnDefinition,
    ) -> Result<ColumnReport> {
        let results = Validator::for_column(column)
            .iter()
            .map(|validator| validator.validate(table, &column.name, &self.options))
            .collect::<Result<Vec<_>>>()?;
        Ok(ColumnReport {
            column: column.name.clone(),
            results,
        })
    }

    /// Validate every declared column. Reports come back in definition order.
    pub fn validate_table(
        &self,
        table: &TableHandle,
        definition: &Definition,
    ) -> Result<Vec<ColumnReport>> {
        let started = Instant::now();
        let reports = self.pool.install(|| {
            definition
                .columns
                .par_iter()
                .map(|column| self.validate_column(table, column))
                .collect::<Result<Vec<_>>>()
        });
        match &reports {
            Ok(reports) => debug!(
                file_type = %definition.file_type,
                columns = reports.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "validated table"
            ),
            Err(err) => error!(
                file_type = %definition.file_type,
                error = %err,
                "validator failed"
            ),
        }
        reports
    }

    /// Column results and statistics for a loaded file. Cross-file warnings start empty.
    pub fn report(
        &self,
        loaded: &LoadedTable,
        definition: &Definition,
    ) -> Result<FileValidationReport> {
        let columns = self.validate_table(&loaded.table, definition)?;
        let stats = column_stats(&loaded.table, definition)?;
        Ok(FileValidationReport {
            file_type: definition.file_type.clone(),
            row_count: loaded.table.row_count(),
            strategy: loaded.strategy(),
            fell_back: loaded.fell_back,
            columns,
            stats,
            warnings: Vec::new(),
        })
    }
}

/// Validate `table` against `definition` with a one-off engine.
pub fn validate_table(
    table: &TableHandle,
    definition: &Definition,
    options: &ValidateOptions,
) -> Result<Vec<ColumnReport>> {
    ValidationEngine::new(options.clone())?.validate_table(table, definition)
}
