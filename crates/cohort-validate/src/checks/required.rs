//! Presence check: null cells and cells blank after trimming.

use polars::prelude::*;

use super::Offense;
use crate::util::trimmed;

pub(crate) fn offenses(column: &str) -> Vec<Offense> {
    vec![
        Offense::new("null", "null value", "null values", col(column).is_null()),
        Offense::new(
            "empty_string",
            "empty string",
            "empty strings",
            trimmed(column).eq(lit("")),
        ),
    ]
}
