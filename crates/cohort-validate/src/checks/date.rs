//! Date columns parsed with a strftime format.

use chrono::NaiveDate;
use polars::prelude::*;

use super::Offense;
use crate::util::{present, trimmed};

pub(crate) fn offenses(
    column: &str,
    format: &str,
    min_date: Option<NaiveDate>,
    max_date: Option<NaiveDate>,
) -> Vec<Offense> {
    let parsed = trimmed(column).str().to_date(StrptimeOptions {
        format: Some(format.into()),
        strict: false,
        exact: true,
        cache: true,
    });

    let mut offenses = vec![Offense::new(
        "unparseable",
        format!("unparseable date (expected {format})"),
        format!("unparseable dates (expected {format})"),
        present(column).and(parsed.clone().is_null()),
    )];
    if let Some(min) = min_date {
        offenses.push(Offense::new(
            "before_min",
            format!("date before {min}"),
            format!("dates before {min}"),
            parsed.clone().lt(lit(min)),
        ));
    }
    if let Some(max) = max_date {
        offenses.push(Offense::new(
            "after_max",
            format!("date after {max}"),
            format!("dates after {max}"),
            parsed.gt(lit(max)),
        ));
    }
    offenses
}
