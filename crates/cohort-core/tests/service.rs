//! End-to-end tests of the submission service.

use std::sync::Arc;
use std::time::Duration;

use cohort_core::{
    AuditEventKind, EngineConfig, MemoryAuditSink, PreconditionError, SubmissionService,
    SubmitError, UploadReceipt,
};
use cohort_ingest::RawUpload;
use cohort_model::{
    ColumnDefinition, ColumnType, Definition, DefinitionSet, SubmissionKey, SubmissionStatus,
    TaskId, TaskState, ValidationParams,
};

const PATIENTS: &str = "patient_id,age\nP1,34\nP2,51\nP3,47\n";

fn patient_definition() -> Definition {
    Definition::new(
        "patient",
        vec![
            ColumnDefinition::new("patient_id", ColumnType::Id).required(),
            ColumnDefinition::new("age", ColumnType::Integer).with_params(ValidationParams {
                min: Some(0.0),
                max: Some(120.0),
                ..ValidationParams::default()
            }),
        ],
    )
}

fn lab_definition() -> Definition {
    Definition::new(
        "lab",
        vec![
            ColumnDefinition::new("patient_id", ColumnType::String).required(),
            ColumnDefinition::new("result", ColumnType::Numeric),
        ],
    )
}

fn definitions() -> DefinitionSet {
    DefinitionSet::from_definitions([patient_definition(), lab_definition()]).unwrap()
}

fn service() -> (SubmissionService, Arc<MemoryAuditSink>) {
    let audit = Arc::new(MemoryAuditSink::new());
    let service =
        SubmissionService::new(EngineConfig::default(), definitions(), audit.clone()).unwrap();
    (service, audit)
}

fn key() -> SubmissionKey {
    SubmissionKey::new("cohort-a", "2024-Q1").unwrap()
}

async fn settle(service: &SubmissionService, task_id: TaskId) -> TaskState {
    tokio::time::timeout(Duration::from_secs(30), service.wait_for_task(task_id))
        .await
        .expect("task did not finish in time")
        .unwrap()
}

async fn upload_and_settle(
    service: &SubmissionService,
    file_type: &str,
    contents: &str,
) -> (UploadReceipt, TaskState) {
    let receipt = service
        .upload(&key(), file_type, RawUpload::utf8(contents), "uploader")
        .await
        .unwrap();
    let state = settle(service, receipt.task_id).await;
    (receipt, state)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn non_patient_upload_first_is_rejected_but_creates_a_draft() {
    let (service, audit) = service();
    let err = service
        .upload(&key(), "lab", RawUpload::utf8("patient_id,result\nP1,1\n"), "uploader")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SubmitError::Precondition(PreconditionError::PatientFileRequired { .. })
    ));
    assert!(err.is_precondition());
    let draft = service.submission(&key()).await.unwrap();
    assert_eq!(draft.status, SubmissionStatus::Draft);
    assert!(draft.files.is_empty());
    assert!(service.pending_acknowledgment(&key()).await.unwrap().is_empty());
    assert!(audit.events().is_empty());

    // The draft accepts the patient file afterwards.
    let (receipt, state) = upload_and_settle(&service, "patient", PATIENTS).await;
    assert_eq!(state, TaskState::Completed);
    assert_eq!(receipt.submission_id, draft.id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_file_type_is_rejected() {
    let (service, _) = service();
    let err = service
        .upload(&key(), "imaging", RawUpload::utf8("a\n1\n"), "uploader")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SubmitError::Precondition(PreconditionError::UnknownFileType { .. })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn receipt_is_queued_and_hash_is_recorded() {
    let (service, _) = service();
    let receipt = service
        .upload(&key(), "patient", RawUpload::utf8(PATIENTS), "uploader")
        .await
        .unwrap();
    assert_eq!(receipt.state, TaskState::Queued);
    assert_eq!(receipt.version, 1);
    assert_eq!(service.status(&key()).await, Some(SubmissionStatus::InProgress));

    assert_eq!(settle(&service, receipt.task_id).await, TaskState::Completed);
    let file = service.file(receipt.file_id).await.unwrap();
    assert_eq!(file.content_hash, cohort_core::content_hash(PATIENTS.as_bytes()));
    assert_eq!(file.content_hash.len(), 64);
    assert_eq!(file.size_bytes, PATIENTS.len() as u64);
    assert_eq!(file.uploaded_by, "uploader");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn full_lifecycle_reaches_completed_and_reopens() {
    let (service, audit) = service();

    let (patient, state) = upload_and_settle(&service, "patient", PATIENTS).await;
    assert_eq!(state, TaskState::Completed);
    let report = service.file(patient.file_id).await.unwrap().report.unwrap();
    assert!(report.is_valid());
    assert_eq!(report.row_count, 3);
    let submission = service.submission(&key()).await.unwrap();
    assert_eq!(submission.extracted_patient_ids.unwrap().len(), 3);

    let (lab, state) =
        upload_and_settle(&service, "lab", "patient_id,result\nP1,4.2\nP9,3.1\n").await;
    assert_eq!(state, TaskState::Completed);
    let lab_report = service.file(lab.file_id).await.unwrap().report.unwrap();
    assert_eq!(lab_report.warnings.len(), 1);
    assert_eq!(lab_report.warnings[0].sample, vec!["P9"]);

    let pending = service.pending_acknowledgment(&key()).await.unwrap();
    assert_eq!(pending.len(), 2);
    assert_eq!(service.status(&key()).await, Some(SubmissionStatus::InProgress));

    service
        .acknowledge(patient.file_id, "reviewer", None)
        .await
        .unwrap();
    let last = service
        .acknowledge(lab.file_id, "reviewer", Some("P9 expected".to_string()))
        .await
        .unwrap();
    assert_eq!(last.status, SubmissionStatus::Completed);
    assert!(service.pending_acknowledgment(&key()).await.unwrap().is_empty());

    let (lab_v2, _) = upload_and_settle(&service, "lab", "patient_id,result\nP1,4.4\n").await;
    assert_eq!(lab_v2.version, 2);
    assert_eq!(service.status(&key()).await, Some(SubmissionStatus::InProgress));
    assert_eq!(service.versions(&key(), "lab").await.unwrap().len(), 2);

    let transitions: Vec<String> = audit
        .events_of(AuditEventKind::StatusChanged)
        .into_iter()
        .filter_map(|event| event.detail)
        .collect();
    assert_eq!(
        transitions,
        vec![
            "draft -> in_progress",
            "in_progress -> completed",
            "completed -> in_progress"
        ]
    );
    assert_eq!(audit.events_of(AuditEventKind::UploadAccepted).len(), 3);
    assert_eq!(audit.events_of(AuditEventKind::ValidationCompleted).len(), 3);
    let acks = audit.events_of(AuditEventKind::FileAcknowledged);
    assert_eq!(acks.len(), 2);
    assert!(acks.iter().all(|event| event.actor == "reviewer"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn invalid_values_still_complete() {
    let (service, _) = service();
    let (receipt, state) =
        upload_and_settle(&service, "patient", "patient_id,age\nP1,34\nP2,abc\nP2,200\n").await;
    assert_eq!(state, TaskState::Completed);

    let report = service.file(receipt.file_id).await.unwrap().report.unwrap();
    assert!(!report.is_valid());
    let failing: Vec<(&str, &str)> = report
        .invalid_results()
        .map(|result| (result.column.as_str(), result.validator.as_str()))
        .collect();
    assert_eq!(failing, vec![("patient_id", "id"), ("age", "numeric")]);

    let ack = service.acknowledge(receipt.file_id, "reviewer", None).await.unwrap();
    assert_eq!(ack.status, SubmissionStatus::Completed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_file_fails_and_cannot_be_acknowledged() {
    let (service, audit) = service();
    let (receipt, state) =
        upload_and_settle(&service, "patient", "patient_id,age\nP1,34,extra\n").await;
    assert_eq!(state, TaskState::Failed);

    let file = service.file(receipt.file_id).await.unwrap();
    assert!(file.failure.is_some());
    assert!(file.report.is_none());
    assert_eq!(service.status(&key()).await, Some(SubmissionStatus::Draft));

    let err = service
        .acknowledge(receipt.file_id, "reviewer", None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SubmitError::Precondition(PreconditionError::LoadFailed { .. })
    ));
    let completed = audit.events_of(AuditEventKind::ValidationCompleted);
    assert_eq!(completed[0].detail.as_deref(), Some("failed"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_declared_column_fails_the_load() {
    let (service, _) = service();
    let (receipt, state) = upload_and_settle(&service, "patient", "patient_id\nP1\n").await;
    assert_eq!(state, TaskState::Failed);
    let failure = service.file(receipt.file_id).await.unwrap().failure.unwrap();
    assert!(failure.contains("age"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn rapid_reupload_keeps_latest_version() {
    let (service, _) = service();
    let first = service
        .upload(&key(), "patient", RawUpload::utf8("patient_id,age\nOLD,1\n"), "uploader")
        .await
        .unwrap();
    let second = service
        .upload(&key(), "patient", RawUpload::utf8(PATIENTS), "uploader")
        .await
        .unwrap();

    let first_state = settle(&service, first.task_id).await;
    assert!(matches!(
        first_state,
        TaskState::Superseded | TaskState::Completed
    ));
    assert_eq!(settle(&service, second.task_id).await, TaskState::Completed);

    let submission = service.submission(&key()).await.unwrap();
    let effective = submission.effective_file("patient").unwrap();
    assert_eq!(effective.id, second.file_id);
    let universe = submission.extracted_patient_ids.unwrap();
    assert_eq!(universe.source_file, second.file_id);
    assert!(!universe.contains("OLD"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_acknowledgments_apply_once() {
    let (service, audit) = service();
    let (receipt, _) = upload_and_settle(&service, "patient", PATIENTS).await;
    let file_id = receipt.file_id;

    let handles: Vec<_> = (0..8)
        .map(|idx| {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .acknowledge(file_id, &format!("reviewer-{idx}"), None)
                    .await
            })
        })
        .collect();
    let mut changed = 0;
    for handle in handles {
        let ack = handle.await.unwrap().unwrap();
        assert_eq!(ack.status, SubmissionStatus::Completed);
        if ack.changed {
            changed += 1;
        }
    }
    assert_eq!(changed, 1);
    assert_eq!(audit.events_of(AuditEventKind::FileAcknowledged).len(), 1);
    let completions: Vec<_> = audit
        .events_of(AuditEventKind::StatusChanged)
        .into_iter()
        .filter(|event| event.detail.as_deref() == Some("in_progress -> completed"))
        .collect();
    assert_eq!(completions.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_acknowledgments_of_distinct_files_are_all_kept() {
    let sibling = |file_type: &str| {
        Definition::new(
            file_type,
            vec![ColumnDefinition::new("patient_id", ColumnType::String).required()],
        )
    };
    let siblings = ["lab", "vitals", "adverse_event", "medication"];
    let definitions = DefinitionSet::from_definitions(
        std::iter::once(patient_definition()).chain(siblings.iter().map(|t| sibling(*t))),
    )
    .unwrap();
    let audit = Arc::new(MemoryAuditSink::new());
    let service =
        SubmissionService::new(EngineConfig::default(), definitions, audit.clone()).unwrap();

    let (patient, _) = upload_and_settle(&service, "patient", PATIENTS).await;
    let mut file_ids = vec![patient.file_id];
    for file_type in siblings {
        let (receipt, state) =
            upload_and_settle(&service, file_type, "patient_id\nP1\nP2\n").await;
        assert_eq!(state, TaskState::Completed);
        file_ids.push(receipt.file_id);
    }
    assert_eq!(
        service.pending_acknowledgment(&key()).await.unwrap().len(),
        file_ids.len()
    );

    let handles: Vec<_> = file_ids
        .iter()
        .copied()
        .map(|file_id| {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .acknowledge(file_id, "reviewer", Some("checked".to_string()))
                    .await
            })
        })
        .collect();
    for handle in handles {
        let ack = handle.await.unwrap().unwrap();
        assert!(ack.changed);
    }

    assert_eq!(
        audit.events_of(AuditEventKind::FileAcknowledged).len(),
        file_ids.len()
    );
    let submission = service.submission(&key()).await.unwrap();
    assert!(submission.files.iter().all(|file| file.acknowledged));
    assert_eq!(submission.status, SubmissionStatus::Completed);
    assert!(service.pending_acknowledgment(&key()).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn queries_on_unknown_ids() {
    let (service, _) = service();
    assert!(service.status(&key()).await.is_none());
    assert!(matches!(
        service.pending_acknowledgment(&key()).await,
        Err(SubmitError::Precondition(PreconditionError::UnknownSubmission(_)))
    ));
    assert!(matches!(
        service.wait_for_task(TaskId::new(42)).await,
        Err(SubmitError::UnknownTask(_))
    ));
    assert!(service.task_state(TaskId::new(42)).await.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn definitions_are_pinned_per_submission() {
    let audit = Arc::new(MemoryAuditSink::new());
    let only_patient = DefinitionSet::from_definitions([patient_definition()]).unwrap();
    let service = SubmissionService::new(EngineConfig::default(), only_patient, audit).unwrap();

    let early = SubmissionKey::new("cohort-a", "2024-Q1").unwrap();
    let receipt = service
        .upload(&early, "patient", RawUpload::utf8(PATIENTS), "uploader")
        .await
        .unwrap();
    settle(&service, receipt.task_id).await;

    service.set_definitions(definitions()).await;

    let err = service
        .upload(&early, "lab", RawUpload::utf8("patient_id,result\nP1,1\n"), "uploader")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SubmitError::Precondition(PreconditionError::UnknownFileType { .. })
    ));

    let late = SubmissionKey::new("cohort-a", "2024-Q2").unwrap();
    let receipt = service
        .upload(&late, "patient", RawUpload::utf8(PATIENTS), "uploader")
        .await
        .unwrap();
    settle(&service, receipt.task_id).await;
    assert!(
        service
            .upload(&late, "lab", RawUpload::utf8("patient_id,result\nP1,1\n"), "uploader")
            .await
            .is_ok()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn task_events_are_published() {
    let (service, _) = service();
    let mut events = service.subscribe();
    let receipt = service
        .upload(&key(), "patient", RawUpload::utf8(PATIENTS), "uploader")
        .await
        .unwrap();
    let event = tokio::time::timeout(Duration::from_secs(30), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.task_id, receipt.task_id);
    assert_eq!(event.file_id, receipt.file_id);
    assert_eq!(event.state, TaskState::Completed);
}

#[test]
fn invalid_config_is_rejected() {
    let mut config = EngineConfig::default();
    config.submission.max_concurrent_loads = 0;
    let result = SubmissionService::new(config, definitions(), Arc::new(MemoryAuditSink::new()));
    assert!(matches!(result, Err(SubmitError::Config(_))));
}
