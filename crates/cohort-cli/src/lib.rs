//! CLI library components for cohort submission validation.

pub mod cli;
pub mod commands;
pub mod logging;
