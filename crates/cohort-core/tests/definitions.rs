//! Tests for loading definition files from disk.

use std::fs;

use cohort_core::{ConfigError, EngineConfig, load_definitions};
use cohort_model::ColumnType;

const PATIENT_JSON: &str = r#"{
    "file_type": "patient",
    "columns": [
        {"name": "patient_id", "type": "id", "required": true},
        {"name": "birth_date", "type": "date", "params": {"min_date": "1900-01-01"}}
    ]
}"#;

const LAB_TOML: &str = r#"
[[definitions]]
file_type = "lab"
id_column = "subject"

[[definitions.columns]]
name = "subject"
type = "string"
required = true

[[definitions.columns]]
name = "result"
type = "numeric"
params = { min = 0.0, max = 500.0 }

[[definitions]]
file_type = "vitals"

[[definitions.columns]]
name = "patient_id"
type = "string"
"#;

#[test]
fn loads_a_directory_of_mixed_formats() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("patient.json"), PATIENT_JSON).unwrap();
    fs::write(dir.path().join("others.toml"), LAB_TOML).unwrap();
    fs::write(dir.path().join("README.md"), "ignored").unwrap();

    let set = load_definitions(dir.path()).unwrap();
    assert_eq!(set.len(), 3);
    let lab = set.get("lab").unwrap();
    assert_eq!(lab.id_column_or("patient_id"), "subject");
    assert_eq!(lab.columns[1].params.max, Some(500.0));
    let patient = set.get("patient").unwrap();
    assert_eq!(patient.columns[1].column_type, ColumnType::Date);
    assert!(set.contains("vitals"));
}

#[test]
fn loads_a_single_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("patient.json");
    fs::write(&path, PATIENT_JSON).unwrap();
    let set = load_definitions(&path).unwrap();
    assert_eq!(set.len(), 1);
}

#[test]
fn duplicate_file_types_across_files_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.json"), PATIENT_JSON).unwrap();
    fs::write(dir.path().join("b.json"), PATIENT_JSON).unwrap();
    let err = load_definitions(dir.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Definition { .. }));
    assert!(err.to_string().contains("b.json"));
}

#[test]
fn invalid_definition_names_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.json");
    fs::write(
        &path,
        r#"{"file_type": "lab", "columns": [{"name": "unit", "type": "enum"}]}"#,
    )
    .unwrap();
    let err = load_definitions(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Definition { .. }));
}

#[test]
fn unsupported_extension_and_bad_syntax() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = dir.path().join("defs.yaml");
    fs::write(&yaml, "file_type: lab").unwrap();
    assert!(matches!(
        load_definitions(&yaml),
        Err(ConfigError::UnsupportedFormat { .. })
    ));

    let broken = dir.path().join("broken.json");
    fs::write(&broken, "{not json").unwrap();
    assert!(matches!(
        load_definitions(&broken),
        Err(ConfigError::Json { .. })
    ));

    assert!(matches!(
        load_definitions(&dir.path().join("missing.json")),
        Err(ConfigError::Io { .. })
    ));
}

#[test]
fn config_file_round_trips_through_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("engine.toml");
    fs::write(
        &path,
        "[validation]\nmax_catalog_entries = 10\n\n[submission]\nmax_warning_ids = 5\n",
    )
    .unwrap();
    let config = EngineConfig::load(&path).unwrap();
    assert_eq!(config.validation.max_catalog_entries, 10);
    assert_eq!(config.submission.max_warning_ids, 5);
    assert_eq!(config.submission.patient_file_type, "patient");

    let written = toml::to_string(&config).unwrap();
    assert_eq!(EngineConfig::from_toml_str(&written).unwrap(), config);
}
