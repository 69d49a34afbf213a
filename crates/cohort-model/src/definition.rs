//! Column definitions for submission file types.
//!
//! A [`Definition`] is the declared schema of one file type: an ordered list
//! of columns, each with a declared [`ColumnType`], a required flag and the
//! parameters its type validator needs. Definitions are checked once when
//! they are loaded, so validators can assume well-formed parameters.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// Default strftime format for date columns.
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

/// Tokens accepted by boolean columns when none are configured.
pub const DEFAULT_TRUE_VALUES: &[&str] = &["true", "yes", "y", "1"];
pub const DEFAULT_FALSE_VALUES: &[&str] = &["false", "no", "n", "0"];

/// Declared type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Numeric,
    Integer,
    Date,
    Boolean,
    Enum,
    Id,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::String => "string",
            ColumnType::Numeric => "numeric",
            ColumnType::Integer => "integer",
            ColumnType::Date => "date",
            ColumnType::Boolean => "boolean",
            ColumnType::Enum => "enum",
            ColumnType::Id => "id",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters consumed by the type validators. Unused fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationParams {
    /// Maximum length in characters (string).
    pub max_length: Option<u32>,
    /// Regular expression every value must match (string, id).
    pub pattern: Option<String>,
    /// Inclusive lower bound (numeric).
    pub min: Option<f64>,
    /// Inclusive upper bound (numeric).
    pub max: Option<f64>,
    /// Reject fractional values (numeric).
    pub integer_only: bool,
    /// strftime format of the raw values (date).
    pub date_format: Option<String>,
    pub min_date: Option<NaiveDate>,
    pub max_date: Option<NaiveDate>,
    /// Allowed values (enum).
    pub allowed_values: Vec<String>,
    /// Whether enum matching is case-sensitive. Defaults to true.
    pub case_sensitive: Option<bool>,
    /// Accepted boolean tokens, compared case-insensitively.
    pub true_values: Vec<String>,
    pub false_values: Vec<String>,
    /// Whether identifiers must be unique (id). Defaults to true.
    pub unique: Option<bool>,
}

impl ValidationParams {
    pub fn date_format(&self) -> &str {
        self.date_format.as_deref().unwrap_or(DEFAULT_DATE_FORMAT)
    }

    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive.unwrap_or(true)
    }

    pub fn unique(&self) -> bool {
        self.unique.unwrap_or(true)
    }

    /// Lowercased boolean tokens, falling back to the defaults.
    pub fn boolean_tokens(&self) -> Vec<String> {
        let mut tokens: Vec<String> = if self.true_values.is_empty() && self.false_values.is_empty()
        {
            DEFAULT_TRUE_VALUES
                .iter()
                .chain(DEFAULT_FALSE_VALUES)
                .map(|token| (*token).to_string())
                .collect()
        } else {
            self.true_values
                .iter()
                .chain(&self.false_values)
                .map(|token| token.trim().to_lowercase())
                .collect()
        };
        tokens.sort();
        tokens.dedup();
        tokens
    }
}

/// One declared column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub params: ValidationParams,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            required: false,
            params: ValidationParams::default(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_params(mut self, params: ValidationParams) -> Self {
        self.params = params;
        self
    }

    fn check(&self) -> Result<()> {
        let params = &self.params;
        if let Some(pattern) = &params.pattern {
            Regex::new(pattern).map_err(|e| ModelError::InvalidPattern {
                column: self.name.clone(),
                message: e.to_string(),
            })?;
        }
        if let (Some(min), Some(max)) = (params.min, params.max)
            && min > max
        {
            return Err(self.invalid(format!("min {min} is greater than max {max}")));
        }
        if let (Some(min), Some(max)) = (params.min_date, params.max_date)
            && min > max
        {
            return Err(self.invalid(format!("min_date {min} is after max_date {max}")));
        }
        if params.max_length == Some(0) {
            return Err(self.invalid("max_length must be positive".to_string()));
        }
        if self.column_type == ColumnType::Enum && params.allowed_values.is_empty() {
            return Err(self.invalid("enum columns need allowed_values".to_string()));
        }
        Ok(())
    }

    fn invalid(&self, reason: String) -> ModelError {
        ModelError::InvalidParams {
            column: self.name.clone(),
            reason,
        }
    }
}

/// Declared schema of one file type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    pub file_type: String,
    /// Column carrying patient identifiers, when it differs from the default.
    #[serde(default)]
    pub id_column: Option<String>,
    pub columns: Vec<ColumnDefinition>,
}

impl Definition {
    pub fn new(file_type: impl Into<String>, columns: Vec<ColumnDefinition>) -> Self {
        Self {
            file_type: file_type.into(),
            id_column: None,
            columns,
        }
    }

    pub fn with_id_column(mut self, column: impl Into<String>) -> Self {
        self.id_column = Some(column.into());
        self
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.name.as_str())
    }

    /// Resolve the identifier column, using `default` when none is declared.
    pub fn id_column_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.id_column.as_deref().unwrap_or(default)
    }

    /// Check names and parameters. Called once when definitions are loaded.
    pub fn validate(&self) -> Result<()> {
        if self.file_type.trim().is_empty() {
            return Err(ModelError::InvalidFileType(self.file_type.clone()));
        }
        if self.columns.is_empty() {
            return Err(ModelError::EmptyDefinition {
                file_type: self.file_type.clone(),
            });
        }
        let mut seen = BTreeSet::new();
        for (position, column) in self.columns.iter().enumerate() {
            if column.name.trim().is_empty() {
                return Err(ModelError::BlankColumn {
                    file_type: self.file_type.clone(),
                    position,
                });
            }
            if !seen.insert(column.name.as_str()) {
                return Err(ModelError::DuplicateColumn {
                    file_type: self.file_type.clone(),
                    column: column.name.clone(),
                });
            }
            column.check()?;
        }
        if let Some(id_column) = &self.id_column
            && !seen.contains(id_column.as_str())
        {
            return Err(ModelError::UnknownIdColumn {
                file_type: self.file_type.clone(),
                column: id_column.clone(),
            });
        }
        Ok(())
    }
}

/// All definitions known to the engine, keyed by file type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DefinitionSet {
    definitions: BTreeMap<String, Definition>,
}

impl DefinitionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and add a definition. File types must be unique.
    pub fn insert(&mut self, definition: Definition) -> Result<()> {
        definition.validate()?;
        if self.definitions.contains_key(&definition.file_type) {
            return Err(ModelError::DuplicateFileType(definition.file_type));
        }
        self.definitions
            .insert(definition.file_type.clone(), definition);
        Ok(())
    }

    pub fn from_definitions(definitions: impl IntoIterator<Item = Definition>) -> Result<Self> {
        let mut set = Self::new();
        for definition in definitions {
            set.insert(definition)?;
        }
        Ok(set)
    }

    pub fn get(&self, file_type: &str) -> Option<&Definition> {
        self.definitions.get(file_type)
    }

    pub fn contains(&self, file_type: &str) -> bool {
        self.definitions.contains_key(file_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Definition> {
        self.definitions.values()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
