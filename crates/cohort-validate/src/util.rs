//! Expression helpers shared by the checks.

use polars::prelude::*;

/// Column value with surrounding whitespace removed.
pub fn trimmed(column: &str) -> Expr {
    col(column).str().strip_chars(lit(NULL))
}

/// Non-null and not blank after trimming.
pub fn present(column: &str) -> Expr {
    trimmed(column).is_not_null().and(trimmed(column).neq(lit("")))
}

/// True when `expr` equals one of `values`. Null stays null.
pub fn is_one_of(expr: Expr, values: &[String]) -> Expr {
    values
        .iter()
        .map(|value| expr.clone().eq(lit(value.clone())))
        .reduce(|acc, next| acc.or(next))
        .unwrap_or_else(|| lit(false))
}

/// Pattern wrapped so it must match the whole value.
pub fn anchored(pattern: &str) -> String {
    format!("^(?:{pattern})$")
}

/// Join message parts as "a", "a and b" or "a, b and c".
pub fn join_parts(parts: &[String]) -> String {
    match parts {
        [] => String::new(),
        [only] => only.clone(),
        [head @ .., last] => format!("{} and {last}", head.join(", ")),
    }
}
