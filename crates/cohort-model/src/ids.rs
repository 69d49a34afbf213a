#![deny(unsafe_code)]

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ModelError;

/// Natural key of a submission: one cohort reporting for one period.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubmissionKey {
    cohort: String,
    period: String,
}

impl SubmissionKey {
    pub fn new(cohort: impl Into<String>, period: impl Into<String>) -> Result<Self, ModelError> {
        let cohort = cohort.into();
        let period = period.into();
        if cohort.trim().is_empty() {
            return Err(ModelError::InvalidCohort(cohort));
        }
        if period.trim().is_empty() {
            return Err(ModelError::InvalidPeriod(period));
        }
        Ok(Self {
            cohort: cohort.trim().to_string(),
            period: period.trim().to_string(),
        })
    }

    pub fn cohort(&self) -> &str {
        &self.cohort
    }

    pub fn period(&self) -> &str {
        &self.period
    }
}

impl fmt::Display for SubmissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.cohort, self.period)
    }
}

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "-{}"), self.0)
            }
        }
    };
}

numeric_id!(
    /// Surrogate identifier of a submission.
    SubmissionId,
    "sub"
);
numeric_id!(
    /// Identifier of one versioned file upload.
    FileId,
    "file"
);
numeric_id!(
    /// Identifier of a background load-and-validate task.
    TaskId,
    "task"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submission_key_trims_and_rejects_blank() {
        let key = SubmissionKey::new(" north ", "2024-Q1").unwrap();
        assert_eq!(key.cohort(), "north");
        assert_eq!(key.to_string(), "north/2024-Q1");
        assert!(SubmissionKey::new("  ", "2024-Q1").is_err());
        assert!(SubmissionKey::new("north", "").is_err());
    }

    #[test]
    fn ids_render_with_prefix() {
        assert_eq!(FileId::new(7).to_string(), "file-7");
        assert_eq!(TaskId::new(3).get(), 3);
    }
}
