//! Loading definition documents from disk.
//!
//! A definition file is JSON or TOML and holds either one definition or a
//! list under `definitions`. A directory is read file by file in name order;
//! files with other extensions are skipped.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use cohort_model::{Definition, DefinitionSet};

use crate::error::ConfigError;

#[derive(Deserialize)]
#[serde(untagged)]
enum DefinitionDocument {
    Many { definitions: Vec<Definition> },
    One(Definition),
}

impl DefinitionDocument {
    fn into_vec(self) -> Vec<Definition> {
        match self {
            DefinitionDocument::Many { definitions } => definitions,
            DefinitionDocument::One(definition) => vec![definition],
        }
    }
}

#[derive(Clone, Copy)]
enum Format {
    Json,
    Toml,
}

fn format_of(path: &Path) -> Option<Format> {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => Some(Format::Json),
        Some("toml") => Some(Format::Toml),
        _ => None,
    }
}

/// Load and check every definition under `path`, a file or a directory.
pub fn load_definitions(path: &Path) -> Result<DefinitionSet, ConfigError> {
    let files = if path.is_dir() {
        definition_files(path)?
    } else {
        vec![path.to_path_buf()]
    };

    let mut set = DefinitionSet::new();
    for file in &files {
        for definition in read_file(file)? {
            debug!(path = %file.display(), file_type = %definition.file_type, "loaded definition");
            set.insert(definition).map_err(|source| ConfigError::Definition {
                path: file.clone(),
                source,
            })?;
        }
    }
    info!(path = %path.display(), definitions = set.len(), "loaded definitions");
    Ok(set)
}

fn definition_files(dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let entries = std::fs::read_dir(dir).map_err(|e| ConfigError::io(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| ConfigError::io(dir, e))?.path();
        if path.is_file() && format_of(&path).is_some() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn read_file(path: &Path) -> Result<Vec<Definition>, ConfigError> {
    let format = format_of(path).ok_or_else(|| ConfigError::UnsupportedFormat {
        path: path.to_path_buf(),
    })?;
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
    let document: DefinitionDocument = match format {
        Format::Json => serde_json::from_str(&contents).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?,
        Format::Toml => toml::from_str(&contents).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })?,
    };
    Ok(document.into_vec())
}
