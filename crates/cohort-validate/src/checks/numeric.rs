//! Numeric columns: parseability, integrality and bounds.

use polars::prelude::*;

use super::Offense;
use crate::util::{present, trimmed};

/// Integral text, allowing a zero fraction such as `4.0`.
const INTEGER_PATTERN: &str = r"^[+-]?\d+(\.0*)?$";

pub(crate) fn offenses(
    column: &str,
    min: Option<f64>,
    max: Option<f64>,
    integer_only: bool,
) -> Vec<Offense> {
    // Non-strict cast: unparseable text becomes null. NaN and infinities
    // parse but are not numbers a column can hold, so they are nulled too.
    let parsed = trimmed(column).cast(DataType::Float64);
    let value = when(parsed.clone().is_finite())
        .then(parsed)
        .otherwise(lit(NULL));

    let mut offenses = vec![Offense::new(
        "non_numeric",
        "non-numeric value",
        "non-numeric values",
        present(column).and(value.clone().is_null()),
    )];
    if integer_only {
        offenses.push(Offense::new(
            "non_integer",
            "non-integer value",
            "non-integer values",
            value.clone().is_not_null().and(
                trimmed(column)
                    .str()
                    .contains(lit(INTEGER_PATTERN), false)
                    .not(),
            ),
        ));
    }
    if let Some(min) = min {
        offenses.push(Offense::new(
            "below_min",
            format!("value below minimum {min}"),
            format!("values below minimum {min}"),
            value.clone().lt(lit(min)),
        ));
    }
    if let Some(max) = max {
        offenses.push(Offense::new(
            "above_max",
            format!("value above maximum {max}"),
            format!("values above maximum {max}"),
            value.gt(lit(max)),
        ));
    }
    offenses
}
