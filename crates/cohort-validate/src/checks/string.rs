//! Free-text columns: length and pattern.

use polars::prelude::*;

use super::Offense;
use crate::util::{present, trimmed};

pub(crate) fn offenses(
    column: &str,
    max_length: Option<u32>,
    anchored_pattern: Option<String>,
) -> Vec<Offense> {
    let mut offenses = Vec::new();
    if let Some(max) = max_length {
        offenses.push(Offense::new(
            "too_long",
            format!("value longer than {max} characters"),
            format!("values longer than {max} characters"),
            trimmed(column).str().len_chars().gt(lit(max)),
        ));
    }
    if let Some(pattern) = anchored_pattern {
        offenses.push(Offense::new(
            "pattern_mismatch",
            "value not matching pattern",
            "values not matching pattern",
            present(column).and(trimmed(column).str().contains(lit(pattern), false).not()),
        ));
    }
    offenses
}
