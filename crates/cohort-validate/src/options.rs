use serde::{Deserialize, Serialize};

/// Bounds applied to every validator run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidateOptions {
    /// Distinct offending values kept per result.
    pub max_catalog_entries: usize,
    /// Offending rows sampled per result, in row order.
    pub max_sample_rows: usize,
    /// Columns validated concurrently.
    pub max_parallel_columns: usize,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        Self {
            max_catalog_entries: 100,
            max_sample_rows: 50,
            max_parallel_columns: 4,
        }
    }
}
