use polars::prelude::*;

use super::Offense;
use crate::util::{is_one_of, present, trimmed};

/// `tokens` must already be lowercase.
pub(crate) fn offenses(column: &str, tokens: &[String]) -> Vec<Offense> {
    let lowered = trimmed(column).str().to_lowercase();
    vec![Offense::new(
        "not_boolean",
        "unrecognized boolean value",
        "unrecognized boolean values",
        present(column).and(is_one_of(lowered, tokens).not()),
    )]
}
