//! Tests for the per-submission state machine.

use std::sync::Arc;

use chrono::Utc;

use cohort_core::{
    Completion, ExtractedIds, LoadSuccess, PreconditionError, SubmissionOptions, SubmissionState,
    SubmitError, UploadPlan, UploadRequest,
};
use cohort_model::{
    ColumnDefinition, ColumnType, Definition, DefinitionSet, FileId, FileValidationReport,
    LoadStrategyKind, SubmissionId, SubmissionKey, SubmissionStatus, TaskId, TaskState,
};

fn definitions() -> Arc<DefinitionSet> {
    let patient = Definition::new(
        "patient",
        vec![
            ColumnDefinition::new("patient_id", ColumnType::Id).required(),
            ColumnDefinition::new("age", ColumnType::Integer),
        ],
    );
    let lab = Definition::new(
        "lab",
        vec![
            ColumnDefinition::new("patient_id", ColumnType::String).required(),
            ColumnDefinition::new("result", ColumnType::Numeric),
        ],
    );
    Arc::new(DefinitionSet::from_definitions([patient, lab]).unwrap())
}

fn report(file_type: &str) -> FileValidationReport {
    FileValidationReport {
        file_type: file_type.to_string(),
        row_count: 3,
        strategy: LoadStrategyKind::InMemory,
        fell_back: false,
        columns: Vec::new(),
        stats: Vec::new(),
        warnings: Vec::new(),
    }
}

fn success(file_type: &str, ids: &[&str]) -> LoadSuccess {
    LoadSuccess {
        report: report(file_type),
        identifiers: Some(ExtractedIds {
            column: "patient_id".to_string(),
            ids: ids.iter().map(|id| id.to_string()).collect(),
        }),
    }
}

struct Harness {
    state: SubmissionState,
    options: SubmissionOptions,
    next_id: u64,
}

impl Harness {
    fn new() -> Self {
        Self::with_options(SubmissionOptions::default())
    }

    fn with_options(options: SubmissionOptions) -> Self {
        let key = SubmissionKey::new("cohort-a", "2024-Q1").unwrap();
        Self {
            state: SubmissionState::new(SubmissionId::new(1), key, definitions(), Utc::now()),
            options,
            next_id: 0,
        }
    }

    fn upload(&mut self, file_type: &str) -> Result<UploadPlan, PreconditionError> {
        self.next_id += 1;
        let request = UploadRequest {
            file_type: file_type.to_string(),
            actor: "uploader".to_string(),
            content_hash: String::new(),
            size_bytes: 10,
        };
        self.state.begin_upload(
            request,
            FileId::new(self.next_id),
            TaskId::new(self.next_id),
            &self.options,
            Utc::now(),
        )
    }

    fn finish(&mut self, plan: &UploadPlan, outcome: Result<LoadSuccess, SubmitError>) -> Completion {
        assert!(self.state.start_task(plan.task_id).unwrap());
        self.state
            .complete_task(plan.task_id, outcome, &self.options, Utc::now())
            .unwrap()
    }

    fn status(&self) -> SubmissionStatus {
        self.state.submission().status
    }

    fn file_state(&self, file_id: FileId) -> TaskState {
        self.state.submission().file(file_id).unwrap().state
    }
}

// --- Preconditions ---

#[test]
fn non_patient_file_needs_patient_first() {
    let mut harness = Harness::new();
    let err = harness.upload("lab").unwrap_err();
    assert!(matches!(err, PreconditionError::PatientFileRequired { .. }));
    assert!(harness.state.submission().files.is_empty());
    assert_eq!(harness.status(), SubmissionStatus::Draft);
}

#[test]
fn unknown_file_type_is_rejected() {
    let mut harness = Harness::new();
    let err = harness.upload("imaging").unwrap_err();
    assert_eq!(
        err,
        PreconditionError::UnknownFileType {
            file_type: "imaging".to_string()
        }
    );
}

#[test]
fn queued_patient_file_unlocks_other_types() {
    let mut harness = Harness::new();
    harness.upload("patient").unwrap();
    assert!(harness.upload("lab").is_ok());
}

#[test]
fn failed_patient_file_does_not_unlock_other_types() {
    let mut harness = Harness::new();
    let plan = harness.upload("patient").unwrap();
    let completion = harness.finish(
        &plan,
        Err(SubmitError::TaskAborted("worker crashed".to_string())),
    );
    assert_eq!(completion.state, TaskState::Failed);
    assert!(matches!(
        harness.upload("lab"),
        Err(PreconditionError::PatientFileRequired { .. })
    ));
}

// --- Versions and supersession ---

#[test]
fn versions_increase_per_file_type() {
    let mut harness = Harness::new();
    let first = harness.upload("patient").unwrap();
    harness.finish(&first, Ok(success("patient", &["P1"])));
    let second = harness.upload("patient").unwrap();
    let lab = harness.upload("lab").unwrap();
    assert_eq!(first.version, 1);
    assert_eq!(second.version, 2);
    assert_eq!(lab.version, 1);
    assert!(second.superseded.is_empty());
}

#[test]
fn new_version_supersedes_in_flight_task() {
    let mut harness = Harness::new();
    let first = harness.upload("patient").unwrap();
    assert!(harness.state.start_task(first.task_id).unwrap());

    let second = harness.upload("patient").unwrap();
    assert_eq!(second.superseded, vec![first.task_id]);
    assert_eq!(harness.state.task_state(first.task_id), Some(TaskState::Superseded));

    // The late result of the first run is discarded.
    let late = harness
        .state
        .complete_task(
            first.task_id,
            Ok(success("patient", &["OLD"])),
            &harness.options,
            Utc::now(),
        )
        .unwrap();
    assert!(late.discarded());
    assert_eq!(harness.file_state(first.file_id), TaskState::Superseded);
    assert!(harness.state.submission().extracted_patient_ids.is_none());

    harness.finish(&second, Ok(success("patient", &["P1", "P2"])));
    let universe = harness.state.submission().extracted_patient_ids.clone().unwrap();
    assert_eq!(universe.source_file, second.file_id);
    assert_eq!(universe.source_version, 2);
    assert!(universe.contains("P2"));
    assert!(!universe.contains("OLD"));
}

#[test]
fn queued_task_superseded_before_start_does_not_run() {
    let mut harness = Harness::new();
    let first = harness.upload("patient").unwrap();
    harness.upload("patient").unwrap();
    assert!(!harness.state.start_task(first.task_id).unwrap());
    assert_eq!(harness.state.task_state(first.task_id), Some(TaskState::Superseded));
}

#[test]
fn completed_versions_are_not_superseded() {
    let mut harness = Harness::new();
    let first = harness.upload("patient").unwrap();
    harness.finish(&first, Ok(success("patient", &["P1"])));
    harness.upload("patient").unwrap();
    assert_eq!(harness.file_state(first.file_id), TaskState::Completed);
}

#[test]
fn queued_task_cannot_complete() {
    let mut harness = Harness::new();
    let plan = harness.upload("patient").unwrap();
    let err = harness
        .state
        .complete_task(plan.task_id, Ok(success("patient", &["P1"])), &harness.options, Utc::now())
        .unwrap_err();
    assert!(matches!(err, SubmitError::TaskAborted(_)));
}

// --- Patient identifiers ---

#[test]
fn identifier_limit_fails_patient_file() {
    let options = SubmissionOptions {
        max_patient_ids: 2,
        ..SubmissionOptions::default()
    };
    let mut harness = Harness::with_options(options);
    let plan = harness.upload("patient").unwrap();
    let completion = harness.finish(&plan, Ok(success("patient", &["P1", "P2", "P3"])));

    assert_eq!(completion.state, TaskState::Failed);
    let file = harness.state.submission().file(plan.file_id).unwrap();
    assert!(file.failure.as_deref().unwrap().contains("limit is 2"));
    assert!(file.report.is_none());
    assert!(harness.state.submission().extracted_patient_ids.is_none());
}

#[test]
fn patient_file_without_identifier_column_fails() {
    let mut harness = Harness::new();
    let plan = harness.upload("patient").unwrap();
    let completion = harness.finish(
        &plan,
        Ok(LoadSuccess {
            report: report("patient"),
            identifiers: None,
        }),
    );
    assert_eq!(completion.state, TaskState::Failed);
    let failure = harness.state.submission().file(plan.file_id).unwrap().failure.clone();
    assert!(failure.unwrap().contains("patient_id"));
}

#[test]
fn unknown_identifiers_produce_a_warning() {
    let mut harness = Harness::new();
    let patient = harness.upload("patient").unwrap();
    harness.finish(&patient, Ok(success("patient", &["P1", "P2"])));

    let lab = harness.upload("lab").unwrap();
    let completion = harness.finish(&lab, Ok(success("lab", &["P1", "P3", "P4"])));
    assert_eq!(completion.state, TaskState::Completed);

    let report = harness
        .state
        .submission()
        .file(lab.file_id)
        .unwrap()
        .report
        .clone()
        .unwrap();
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].unknown_count, 2);
    assert_eq!(report.warnings[0].sample, vec!["P3", "P4"]);
}

#[test]
fn new_patient_version_rechecks_siblings() {
    let mut harness = Harness::new();
    let patient = harness.upload("patient").unwrap();
    harness.finish(&patient, Ok(success("patient", &["P1"])));
    let lab = harness.upload("lab").unwrap();
    harness.finish(&lab, Ok(success("lab", &["P1", "P2"])));
    let warnings = |harness: &Harness| {
        harness
            .state
            .submission()
            .file(lab.file_id)
            .and_then(|file| file.report.as_ref())
            .map(|report| report.warnings.len())
    };
    assert_eq!(warnings(&harness), Some(1));

    let patient_v2 = harness.upload("patient").unwrap();
    let completion = harness.finish(&patient_v2, Ok(success("patient", &["P1", "P2"])));
    assert_eq!(completion.rechecked, vec![lab.file_id]);
    assert_eq!(warnings(&harness), Some(0));
}

// --- Acknowledgment and status ---

#[test]
fn status_follows_uploads_and_acknowledgments() {
    let mut harness = Harness::new();
    assert_eq!(harness.status(), SubmissionStatus::Draft);

    let patient = harness.upload("patient").unwrap();
    let change = patient.status_change.unwrap();
    assert_eq!(change.to_string(), "draft -> in_progress");
    harness.finish(&patient, Ok(success("patient", &["P1"])));
    let lab = harness.upload("lab").unwrap();
    harness.finish(&lab, Ok(success("lab", &["P1"])));
    assert_eq!(harness.status(), SubmissionStatus::InProgress);

    let first = harness
        .state
        .acknowledge(patient.file_id, "reviewer", None, Utc::now())
        .unwrap();
    assert!(first.changed);
    assert_eq!(first.status, SubmissionStatus::InProgress);
    assert!(first.status_change.is_none());

    let second = harness
        .state
        .acknowledge(lab.file_id, "reviewer", Some("looks fine".to_string()), Utc::now())
        .unwrap();
    assert_eq!(second.status, SubmissionStatus::Completed);
    assert_eq!(second.status_change.unwrap().from, SubmissionStatus::InProgress);
    let lab_file = harness.state.submission().file(lab.file_id).unwrap();
    assert_eq!(lab_file.acknowledged_by.as_deref(), Some("reviewer"));
    assert_eq!(lab_file.comment.as_deref(), Some("looks fine"));

    // A new version reopens the submission.
    let lab_v2 = harness.upload("lab").unwrap();
    assert_eq!(lab_v2.status_change.unwrap().to, SubmissionStatus::InProgress);
}

#[test]
fn acknowledging_twice_is_a_no_op() {
    let mut harness = Harness::new();
    let plan = harness.upload("patient").unwrap();
    harness.finish(&plan, Ok(success("patient", &["P1"])));
    harness
        .state
        .acknowledge(plan.file_id, "reviewer", None, Utc::now())
        .unwrap();
    let again = harness
        .state
        .acknowledge(plan.file_id, "someone-else", None, Utc::now())
        .unwrap();
    assert!(!again.changed);
    assert_eq!(again.status, SubmissionStatus::Completed);
    let file = harness.state.submission().file(plan.file_id).unwrap();
    assert_eq!(file.acknowledged_by.as_deref(), Some("reviewer"));
}

#[test]
fn acknowledgment_preconditions() {
    let mut harness = Harness::new();
    let queued = harness.upload("patient").unwrap();
    assert!(matches!(
        harness.state.acknowledge(queued.file_id, "r", None, Utc::now()),
        Err(PreconditionError::NotCompleted {
            state: TaskState::Queued,
            ..
        })
    ));

    let current = harness.upload("patient").unwrap();
    assert!(matches!(
        harness.state.acknowledge(queued.file_id, "r", None, Utc::now()),
        Err(PreconditionError::StaleVersion { version: 1, .. })
    ));

    harness.finish(&current, Err(SubmitError::TaskAborted("boom".to_string())));
    assert_eq!(
        harness.state.acknowledge(current.file_id, "r", None, Utc::now()),
        Err(PreconditionError::LoadFailed {
            file_id: current.file_id
        })
    );

    assert_eq!(
        harness.state.acknowledge(FileId::new(999), "r", None, Utc::now()),
        Err(PreconditionError::UnknownFile(FileId::new(999)))
    );
}

#[test]
fn older_completed_version_is_stale() {
    let mut harness = Harness::new();
    let first = harness.upload("patient").unwrap();
    harness.finish(&first, Ok(success("patient", &["P1"])));
    let second = harness.upload("patient").unwrap();
    harness.finish(&second, Ok(success("patient", &["P1"])));

    let err = harness
        .state
        .acknowledge(first.file_id, "r", None, Utc::now())
        .unwrap_err();
    assert!(matches!(err, PreconditionError::StaleVersion { .. }));
    assert!(err.suggestion().unwrap().contains("latest version"));
}

#[test]
fn failed_new_version_keeps_previous_acknowledgment() {
    let mut harness = Harness::new();
    let first = harness.upload("patient").unwrap();
    harness.finish(&first, Ok(success("patient", &["P1"])));
    harness
        .state
        .acknowledge(first.file_id, "r", None, Utc::now())
        .unwrap();
    assert_eq!(harness.status(), SubmissionStatus::Completed);

    let second = harness.upload("patient").unwrap();
    assert_eq!(harness.status(), SubmissionStatus::InProgress);
    let completion = harness.finish(&second, Err(SubmitError::TaskAborted("boom".to_string())));
    assert_eq!(completion.status_change.unwrap().to, SubmissionStatus::Completed);
}
