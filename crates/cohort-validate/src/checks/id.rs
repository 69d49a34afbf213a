//! Identifier columns: presence, format and uniqueness.

use polars::prelude::*;

use super::Offense;
use crate::util::{present, trimmed};

pub(crate) fn offenses(column: &str, anchored_pattern: Option<String>, unique: bool) -> Vec<Offense> {
    let mut offenses = vec![Offense::new(
        "missing",
        "missing identifier",
        "missing identifiers",
        present(column).not(),
    )];
    if let Some(pattern) = anchored_pattern {
        offenses.push(Offense::new(
            "pattern_mismatch",
            "identifier not matching pattern",
            "identifiers not matching pattern",
            present(column).and(trimmed(column).str().contains(lit(pattern), false).not()),
        ));
    }
    if unique {
        // Every occurrence of a repeated identifier is offending.
        offenses.push(Offense::new(
            "duplicate",
            "duplicate identifier",
            "duplicate identifiers",
            present(column).and(
                trimmed(column)
                    .len()
                    .over([trimmed(column)])
                    .gt(lit(1)),
            ),
        ));
    }
    offenses
}
