//! Patient identifier extraction and cross-file checks.

use std::collections::BTreeSet;

use polars::prelude::*;

use cohort_ingest::TableHandle;
use cohort_model::CrossFileWarning;

use crate::error::{Result, ValidatorError};

const ID: &str = "id";

/// Distinct trimmed identifiers of `column`. Nulls and blanks are skipped.
pub fn extract_ids(table: &TableHandle, column: &str) -> Result<BTreeSet<String>> {
    if !table.has_column(column) {
        return Err(ValidatorError::MissingColumn {
            column: column.to_string(),
        });
    }
    let df = table
        .lazy()
        .select([col(column).str().strip_chars(lit(NULL)).alias(ID)])
        .filter(col(ID).is_not_null().and(col(ID).neq(lit(""))))
        .unique(None, UniqueKeepStrategy::Any)
        .collect()
        .map_err(ValidatorError::query(column))?;
    let ids = df.column(ID)?.str()?;
    Ok(ids.into_iter().flatten().map(str::to_string).collect())
}

/// Warn about identifiers of a file that the patient universe does not contain.
///
/// Returns `None` when every identifier is known. The sample is the first
/// `max_sample` unknown identifiers in sorted order.
pub fn check_ids(
    ids: &BTreeSet<String>,
    universe: &BTreeSet<String>,
    column: &str,
    max_sample: usize,
) -> Option<CrossFileWarning> {
    let unknown: Vec<&String> = ids.difference(universe).collect();
    if unknown.is_empty() {
        return None;
    }
    let unknown_count = unknown.len() as u64;
    let message = if unknown_count == 1 {
        format!("1 identifier in column '{column}' is not in the patient file")
    } else {
        format!("{unknown_count} identifiers in column '{column}' are not in the patient file")
    };
    Some(CrossFileWarning {
        column: column.to_string(),
        unknown_count,
        sample: unknown
            .into_iter()
            .take(max_sample)
            .cloned()
            .collect(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn known_ids_produce_no_warning() {
        assert!(check_ids(&set(&["P1"]), &set(&["P1", "P2"]), "patient_id", 5).is_none());
    }

    #[test]
    fn unknown_ids_are_sampled_in_order() {
        let warning =
            check_ids(&set(&["P9", "P1", "P4", "P7"]), &set(&["P1"]), "patient_id", 2).unwrap();
        assert_eq!(warning.unknown_count, 3);
        assert_eq!(warning.sample, vec!["P4".to_string(), "P7".to_string()]);
        assert_eq!(
            warning.message,
            "3 identifiers in column 'patient_id' are not in the patient file"
        );
    }
}
