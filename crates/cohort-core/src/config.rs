//! Engine configuration.
//!
//! Loaded from TOML. Every key is optional and falls back to its default:
//!
//! ```toml
//! [ingest]
//! in_memory_ceiling_bytes = 67108864
//! memory_budget_bytes = 536870912
//! expansion_factor = 4.0
//! delimiter = ","
//!
//! [validation]
//! max_catalog_entries = 100
//! max_sample_rows = 50
//! max_parallel_columns = 4
//!
//! [submission]
//! patient_file_type = "patient"
//! patient_id_column = "patient_id"
//! max_patient_ids = 5000000
//! max_warning_ids = 20
//! max_concurrent_loads = 2
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use cohort_ingest::IngestOptions;
use cohort_validate::ValidateOptions;

use crate::error::ConfigError;

/// Submission lifecycle settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmissionOptions {
    /// File type that establishes the patient identifier universe.
    pub patient_file_type: String,
    /// Identifier column used when a definition does not name one.
    pub patient_id_column: String,
    pub max_patient_ids: usize,
    /// Unknown identifiers sampled into a cross-file warning.
    pub max_warning_ids: usize,
    pub max_concurrent_loads: usize,
}

impl Default for SubmissionOptions {
    fn default() -> Self {
        Self {
            patient_file_type: "patient".to_string(),
            patient_id_column: "patient_id".to_string(),
            max_patient_ids: 5_000_000,
            max_warning_ids: 20,
            max_concurrent_loads: 2,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub ingest: IngestOptions,
    pub validation: ValidateOptions,
    pub submission: SubmissionOptions,
}

impl EngineConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents).map_err(|source| ConfigError::Toml {
            path: "<inline>".into(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        let config: Self = toml::from_str(&contents).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        tracing::info!(path = %path.display(), "loaded engine configuration");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let policy = &self.ingest.policy;
        if policy.in_memory_ceiling_bytes == 0 {
            return Err(ConfigError::invalid("ingest.in_memory_ceiling_bytes must be positive"));
        }
        if policy.memory_budget_bytes == 0 {
            return Err(ConfigError::invalid("ingest.memory_budget_bytes must be positive"));
        }
        if !(policy.expansion_factor.is_finite() && policy.expansion_factor > 0.0) {
            return Err(ConfigError::invalid(format!(
                "ingest.expansion_factor must be a positive number, got {}",
                policy.expansion_factor
            )));
        }
        self.ingest
            .delimiter_byte()
            .map_err(|e| ConfigError::invalid(format!("ingest.delimiter: {e}")))?;

        let validation = &self.validation;
        for (key, value) in [
            ("validation.max_catalog_entries", validation.max_catalog_entries),
            ("validation.max_sample_rows", validation.max_sample_rows),
            ("validation.max_parallel_columns", validation.max_parallel_columns),
            ("submission.max_patient_ids", self.submission.max_patient_ids),
            ("submission.max_warning_ids", self.submission.max_warning_ids),
            ("submission.max_concurrent_loads", self.submission.max_concurrent_loads),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid(format!("{key} must be positive")));
            }
        }
        if self.submission.patient_file_type.trim().is_empty() {
            return Err(ConfigError::invalid("submission.patient_file_type must not be blank"));
        }
        if self.submission.patient_id_column.trim().is_empty() {
            return Err(ConfigError::invalid("submission.patient_id_column must not be blank"));
        }
        Ok(())
    }
}
