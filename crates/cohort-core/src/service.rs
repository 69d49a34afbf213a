//! Asynchronous submission service.
//!
//! Uploads are accepted immediately and return a receipt; loading and
//! validation run in the background on the blocking pool, bounded by
//! `max_concurrent_loads`. Callers observe completion by polling
//! [`SubmissionService::task_state`] or by waiting on task events.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, RwLock, Semaphore, broadcast};
use tracing::{debug, error, info};

use cohort_ingest::{Loader, RawUpload};
use cohort_model::{
    Definition, DefinitionSet, FileId, Submission, SubmissionFile, SubmissionId, SubmissionKey,
    SubmissionStatus, TaskId, TaskState,
};
use cohort_validate::{ValidationEngine, extract_ids};

use crate::audit::{AuditEvent, AuditEventKind, AuditSink};
use crate::config::EngineConfig;
use crate::error::{PreconditionError, Result, SubmitError};
use crate::state::{
    Acknowledgment, ExtractedIds, LoadSuccess, StatusChange, SubmissionState, UploadRequest,
};

/// Actor recorded for events the service produces on its own.
pub const SYSTEM_ACTOR: &str = "system";

const EVENT_CAPACITY: usize = 256;

/// Returned when an upload is accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub submission_id: SubmissionId,
    pub file_id: FileId,
    pub task_id: TaskId,
    pub version: u32,
    pub state: TaskState,
}

/// Published whenever a task changes state after it was queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskEvent {
    pub submission_id: SubmissionId,
    pub task_id: TaskId,
    pub file_id: FileId,
    pub state: TaskState,
}

type Entry = Arc<Mutex<SubmissionState>>;

struct Inner {
    config: EngineConfig,
    definitions: RwLock<Arc<DefinitionSet>>,
    loader: Loader,
    engine: ValidationEngine,
    audit: Arc<dyn AuditSink>,
    submissions: RwLock<HashMap<SubmissionKey, Entry>>,
    files: RwLock<HashMap<FileId, Entry>>,
    tasks: RwLock<HashMap<TaskId, Entry>>,
    next_id: AtomicU64,
    load_permits: Arc<Semaphore>,
    events: broadcast::Sender<TaskEvent>,
}

/// Entry point for submissions. Cheap to clone.
#[derive(Clone)]
pub struct SubmissionService {
    inner: Arc<Inner>,
}

impl SubmissionService {
    pub fn new(
        config: EngineConfig,
        definitions: DefinitionSet,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self> {
        config.validate()?;
        let engine = ValidationEngine::new(config.validation.clone())?;
        let loader = Loader::new(config.ingest.clone());
        let load_permits = Arc::new(Semaphore::new(config.submission.max_concurrent_loads));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                definitions: RwLock::new(Arc::new(definitions)),
                loader,
                engine,
                audit,
                submissions: RwLock::new(HashMap::new()),
                files: RwLock::new(HashMap::new()),
                tasks: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                load_permits,
                events,
            }),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub async fn definitions(&self) -> Arc<DefinitionSet> {
        Arc::clone(&*self.inner.definitions.read().await)
    }

    /// Replace the definitions used by submissions created from now on.
    pub async fn set_definitions(&self, definitions: DefinitionSet) {
        *self.inner.definitions.write().await = Arc::new(definitions);
    }

    // === Commands ===

    /// Accept a new version of `file_type` and queue it for loading.
    pub async fn upload(
        &self,
        key: &SubmissionKey,
        file_type: &str,
        upload: RawUpload,
        actor: &str,
    ) -> Result<UploadReceipt> {
        let options = &self.inner.config.submission;
        let entry = self.entry_for_upload(key).await;
        let request = UploadRequest {
            file_type: file_type.to_string(),
            actor: actor.to_string(),
            content_hash: content_hash(&upload.bytes),
            size_bytes: upload.len(),
        };
        let file_id = FileId::new(self.inner.next_id());
        let task_id = TaskId::new(self.inner.next_id());

        let (receipt, definition, id_column) = {
            let mut state = entry.lock().await;
            let plan = state.begin_upload(request, file_id, task_id, options, Utc::now())?;
            let definition = state.definitions().get(file_type).cloned().ok_or_else(|| {
                PreconditionError::UnknownFileType {
                    file_type: file_type.to_string(),
                }
            })?;
            let id_column = state.id_column(file_type, options);
            let submission_id = state.submission().id;

            self.inner.audit.record(
                AuditEvent::new(AuditEventKind::UploadAccepted, actor, submission_id, Some(file_id))
                    .with_detail(format!("{file_type} v{}", plan.version)),
            );
            self.inner
                .record_status_change(actor, submission_id, plan.status_change);
            for superseded in &plan.superseded {
                if let Some(file_id) = state.task_file(*superseded) {
                    self.inner.publish(TaskEvent {
                        submission_id,
                        task_id: *superseded,
                        file_id,
                        state: TaskState::Superseded,
                    });
                }
            }
            info!(
                submission = %submission_id,
                %file_id,
                file_type,
                version = plan.version,
                bytes = upload.len(),
                "upload accepted"
            );
            (
                UploadReceipt {
                    submission_id,
                    file_id,
                    task_id,
                    version: plan.version,
                    state: TaskState::Queued,
                },
                definition,
                id_column,
            )
        };

        self.inner.files.write().await.insert(file_id, Arc::clone(&entry));
        self.inner.tasks.write().await.insert(task_id, Arc::clone(&entry));

        let inner = Arc::clone(&self.inner);
        let submission_id = receipt.submission_id;
        tokio::spawn(async move {
            inner
                .run_task(entry, submission_id, task_id, definition, id_column, upload)
                .await;
        });
        Ok(receipt)
    }

    /// Acknowledge a completed file version.
    pub async fn acknowledge(
        &self,
        file_id: FileId,
        actor: &str,
        comment: Option<String>,
    ) -> Result<Acknowledgment> {
        let entry = self
            .inner
            .files
            .read()
            .await
            .get(&file_id)
            .cloned()
            .ok_or(PreconditionError::UnknownFile(file_id))?;

        let mut state = entry.lock().await;
        let acknowledgment = state.acknowledge(file_id, actor, comment, Utc::now())?;
        let submission_id = state.submission().id;
        if acknowledgment.changed {
            self.inner.audit.record(AuditEvent::new(
                AuditEventKind::FileAcknowledged,
                actor,
                submission_id,
                Some(file_id),
            ));
            info!(submission = %submission_id, %file_id, actor, "file acknowledged");
        }
        self.inner
            .record_status_change(actor, submission_id, acknowledgment.status_change);
        Ok(acknowledgment)
    }

    // === Queries ===

    pub async fn submission(&self, key: &SubmissionKey) -> Option<Submission> {
        let entry = self.inner.submissions.read().await.get(key).cloned()?;
        let state = entry.lock().await;
        Some(state.submission().clone())
    }

    pub async fn status(&self, key: &SubmissionKey) -> Option<SubmissionStatus> {
        self.submission(key).await.map(|submission| submission.status)
    }

    /// Completed effective files still waiting for acknowledgment.
    pub async fn pending_acknowledgment(&self, key: &SubmissionKey) -> Result<Vec<SubmissionFile>> {
        let submission = self.existing(key).await?;
        Ok(submission
            .pending_acknowledgment()
            .into_iter()
            .cloned()
            .collect())
    }

    /// Every version of `file_type`, oldest first.
    pub async fn versions(&self, key: &SubmissionKey, file_type: &str) -> Result<Vec<SubmissionFile>> {
        let submission = self.existing(key).await?;
        Ok(submission.versions(file_type).cloned().collect())
    }

    pub async fn file(&self, file_id: FileId) -> Option<SubmissionFile> {
        let entry = self.inner.files.read().await.get(&file_id).cloned()?;
        let state = entry.lock().await;
        state.submission().file(file_id).cloned()
    }

    pub async fn task_state(&self, task_id: TaskId) -> Option<TaskState> {
        let entry = self.inner.tasks.read().await.get(&task_id).cloned()?;
        let state = entry.lock().await;
        state.task_state(task_id)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.inner.events.subscribe()
    }

    /// Wait until `task_id` reaches a terminal state.
    pub async fn wait_for_task(&self, task_id: TaskId) -> Result<TaskState> {
        let mut events = self.subscribe();
        loop {
            match self.task_state(task_id).await {
                None => return Err(SubmitError::UnknownTask(task_id)),
                Some(state) if state.is_terminal() => return Ok(state),
                Some(_) => {}
            }
            match events.recv().await {
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => {
                    return Err(SubmitError::TaskAborted("task events closed".to_string()));
                }
            }
        }
    }

    async fn existing(&self, key: &SubmissionKey) -> Result<Submission> {
        self.submission(key)
            .await
            .ok_or_else(|| PreconditionError::UnknownSubmission(key.to_string()).into())
    }

    /// Existing submission for `key`, or a new draft pinned to the current definitions.
    ///
    /// The draft is created on the first attempt even if the upload itself is
    /// then rejected.
    async fn entry_for_upload(&self, key: &SubmissionKey) -> Entry {
        let existing = self.inner.submissions.read().await.get(key).cloned();
        if let Some(entry) = existing {
            return entry;
        }
        let mut submissions = self.inner.submissions.write().await;
        if let Some(entry) = submissions.get(key) {
            return Arc::clone(entry);
        }
        let definitions = self.definitions().await;
        let state = SubmissionState::new(
            SubmissionId::new(self.inner.next_id()),
            key.clone(),
            definitions,
            Utc::now(),
        );
        info!(submission = %state.submission().id, key = %key, "created submission");
        let entry = Arc::new(Mutex::new(state));
        submissions.insert(key.clone(), Arc::clone(&entry));
        entry
    }
}

impl Inner {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn record_status_change(
        &self,
        actor: &str,
        submission_id: SubmissionId,
        change: Option<StatusChange>,
    ) {
        if let Some(change) = change {
            info!(submission = %submission_id, from = %change.from, to = %change.to, "status changed");
            self.audit.record(
                AuditEvent::new(AuditEventKind::StatusChanged, actor, submission_id, None)
                    .with_detail(change.to_string()),
            );
        }
    }

    fn publish(&self, event: TaskEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    async fn run_task(
        self: Arc<Self>,
        entry: Entry,
        submission_id: SubmissionId,
        task_id: TaskId,
        definition: Definition,
        id_column: String,
        upload: RawUpload,
    ) {
        let permit = Arc::clone(&self.load_permits).acquire_owned().await.ok();

        let started = entry.lock().await.start_task(task_id);
        match started {
            Ok(true) => {
                debug!(submission = %submission_id, %task_id, "task running");
            }
            Ok(false) => {
                debug!(submission = %submission_id, %task_id, "task superseded before start");
                return;
            }
            Err(err) => {
                error!(submission = %submission_id, %task_id, error = %err, "task could not start");
                return;
            }
        }

        let worker = Arc::clone(&self);
        let outcome = tokio::task::spawn_blocking(move || {
            worker.run_pipeline(&definition, &id_column, &upload)
        })
        .await
        .unwrap_or_else(|e| Err(SubmitError::TaskAborted(e.to_string())));
        drop(permit);

        let mut state = entry.lock().await;
        let completion =
            match state.complete_task(task_id, outcome, &self.config.submission, Utc::now()) {
                Ok(completion) => completion,
                Err(err) => {
                    error!(submission = %submission_id, %task_id, error = %err, "task could not complete");
                    return;
                }
            };
        if completion.discarded() {
            return;
        }

        let detail = match state
            .submission()
            .file(completion.file_id)
            .and_then(|file| file.report.as_ref())
        {
            Some(report) if report.is_valid() => format!("{}; valid", completion.state),
            Some(_) => format!("{}; invalid values found", completion.state),
            None => completion.state.to_string(),
        };
        self.audit.record(
            AuditEvent::new(
                AuditEventKind::ValidationCompleted,
                SYSTEM_ACTOR,
                submission_id,
                Some(completion.file_id),
            )
            .with_detail(detail),
        );
        self.record_status_change(SYSTEM_ACTOR, submission_id, completion.status_change);
        info!(
            submission = %submission_id,
            file_id = %completion.file_id,
            state = %completion.state,
            rechecked = completion.rechecked.len(),
            "task finished"
        );
        self.publish(TaskEvent {
            submission_id,
            task_id,
            file_id: completion.file_id,
            state: completion.state,
        });
    }

    /// Load, validate and extract identifiers. Runs on the blocking pool.
    fn run_pipeline(
        &self,
        definition: &Definition,
        id_column: &str,
        upload: &RawUpload,
    ) -> Result<LoadSuccess> {
        let loaded = self.loader.load(upload, definition)?;
        let report = self.engine.report(&loaded, definition)?;
        let identifiers = if loaded.table.has_column(id_column) {
            Some(ExtractedIds {
                column: id_column.to_string(),
                ids: extract_ids(&loaded.table, id_column)?,
            })
        } else {
            None
        };
        Ok(LoadSuccess {
            report,
            identifiers,
        })
    }
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
