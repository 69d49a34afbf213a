//! Enumerated columns.

use polars::prelude::*;

use super::Offense;
use crate::util::{is_one_of, present, trimmed};

pub(crate) fn offenses(column: &str, allowed_values: &[String], case_sensitive: bool) -> Vec<Offense> {
    let member = if case_sensitive {
        is_one_of(trimmed(column), allowed_values)
    } else {
        let lowered: Vec<String> = allowed_values
            .iter()
            .map(|value| value.to_lowercase())
            .collect();
        is_one_of(trimmed(column).str().to_lowercase(), &lowered)
    };
    vec![Offense::new(
        "not_allowed",
        "value not in allowed values",
        "values not in allowed values",
        present(column).and(member.not()),
    )]
}
