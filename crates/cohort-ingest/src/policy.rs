//! Load strategy selection.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use cohort_model::LoadStrategyKind;

use crate::error::{IngestError, Result};

/// Inputs larger than this go straight to the disk-backed strategy. Default: 64 MiB
pub const DEFAULT_IN_MEMORY_CEILING_BYTES: u64 = 64 * 1024 * 1024;

/// Memory the in-memory strategy may use for one table. Default: 512 MiB
pub const DEFAULT_MEMORY_BUDGET_BYTES: u64 = 512 * 1024 * 1024;

/// Ratio of in-memory table size to raw input size.
pub const DEFAULT_EXPANSION_FACTOR: f64 = 4.0;

/// Thresholds deciding between the in-memory and disk-backed strategies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadPolicy {
    pub in_memory_ceiling_bytes: u64,
    pub memory_budget_bytes: u64,
    pub expansion_factor: f64,
}

impl Default for LoadPolicy {
    fn default() -> Self {
        Self {
            in_memory_ceiling_bytes: DEFAULT_IN_MEMORY_CEILING_BYTES,
            memory_budget_bytes: DEFAULT_MEMORY_BUDGET_BYTES,
            expansion_factor: DEFAULT_EXPANSION_FACTOR,
        }
    }
}

/// Why a strategy was picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionReason {
    WithinBounds,
    SizeCeiling,
    MemoryBudget,
}

impl LoadPolicy {
    /// Estimated in-memory footprint of an input of `size_bytes`.
    pub fn estimated_bytes(&self, size_bytes: u64) -> u64 {
        (size_bytes as f64 * self.expansion_factor).ceil() as u64
    }

    pub fn select(&self, size_bytes: u64) -> (LoadStrategyKind, SelectionReason) {
        let selection = if size_bytes > self.in_memory_ceiling_bytes {
            (LoadStrategyKind::DiskBacked, SelectionReason::SizeCeiling)
        } else if self.estimated_bytes(size_bytes) > self.memory_budget_bytes {
            (LoadStrategyKind::DiskBacked, SelectionReason::MemoryBudget)
        } else {
            (LoadStrategyKind::InMemory, SelectionReason::WithinBounds)
        };
        debug!(
            size_bytes,
            strategy = %selection.0,
            reason = ?selection.1,
            "selected load strategy"
        );
        selection
    }
}

/// Options for loading one upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestOptions {
    #[serde(flatten)]
    pub policy: LoadPolicy,
    /// Directory for disk-backed spill files. System temp dir when unset.
    pub spill_dir: Option<PathBuf>,
    pub delimiter: char,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            policy: LoadPolicy::default(),
            spill_dir: None,
            delimiter: ',',
        }
    }
}

impl IngestOptions {
    pub fn with_spill_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spill_dir = Some(dir.into());
        self
    }

    pub fn with_policy(mut self, policy: LoadPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Delimiter as a single byte.
    pub fn delimiter_byte(&self) -> Result<u8> {
        if self.delimiter.is_ascii() && !matches!(self.delimiter, '"' | '\n' | '\r') {
            Ok(self.delimiter as u8)
        } else {
            Err(IngestError::InvalidDelimiter(self.delimiter))
        }
    }
}
