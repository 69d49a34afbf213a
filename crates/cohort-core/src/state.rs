//! Per-submission state machine.
//!
//! Everything here is synchronous and operates on one [`SubmissionState`];
//! the service holds it behind a per-submission lock, so every method runs
//! serialized with every other mutation of the same submission.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use cohort_model::{
    DefinitionSet, FileId, FileValidationReport, PatientIdUniverse, Submission, SubmissionFile,
    SubmissionId, SubmissionKey, SubmissionStatus, TaskId, TaskState,
};
use cohort_validate::check_ids;

use crate::config::SubmissionOptions;
use crate::error::{PreconditionError, SubmitError};

/// Status before and after a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub from: SubmissionStatus,
    pub to: SubmissionStatus,
}

impl std::fmt::Display for StatusChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

/// Identifier values read from one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedIds {
    pub column: String,
    pub ids: BTreeSet<String>,
}

/// What a finished pipeline produced.
#[derive(Debug, Clone)]
pub struct LoadSuccess {
    pub report: FileValidationReport,
    /// `None` when the file has no identifier column.
    pub identifiers: Option<ExtractedIds>,
}

/// Metadata of an accepted upload.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub file_type: String,
    pub actor: String,
    pub content_hash: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPlan {
    pub file_id: FileId,
    pub task_id: TaskId,
    pub version: u32,
    /// In-flight tasks of older versions that were superseded.
    pub superseded: Vec<TaskId>,
    pub status_change: Option<StatusChange>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub task_id: TaskId,
    pub file_id: FileId,
    /// Final task state. `Superseded` means the result was discarded.
    pub state: TaskState,
    pub status_change: Option<StatusChange>,
    /// Sibling files whose cross-file warnings were recomputed.
    pub rechecked: Vec<FileId>,
}

impl Completion {
    pub fn discarded(&self) -> bool {
        self.state == TaskState::Superseded
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acknowledgment {
    pub file_id: FileId,
    /// False when the file was already acknowledged.
    pub changed: bool,
    pub status: SubmissionStatus,
    pub status_change: Option<StatusChange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TaskRecord {
    file_id: FileId,
    state: TaskState,
}

/// A submission plus the bookkeeping its lifecycle needs.
#[derive(Debug, Clone)]
pub struct SubmissionState {
    submission: Submission,
    /// Definitions pinned at creation.
    definitions: Arc<DefinitionSet>,
    tasks: BTreeMap<TaskId, TaskRecord>,
    /// Identifier sets of completed non-patient files, for re-checks.
    sibling_ids: BTreeMap<FileId, ExtractedIds>,
}

impl SubmissionState {
    pub fn new(
        id: SubmissionId,
        key: SubmissionKey,
        definitions: Arc<DefinitionSet>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            submission: Submission::new(id, key, now),
            definitions,
            tasks: BTreeMap::new(),
            sibling_ids: BTreeMap::new(),
        }
    }

    pub fn submission(&self) -> &Submission {
        &self.submission
    }

    pub fn definitions(&self) -> &Arc<DefinitionSet> {
        &self.definitions
    }

    pub fn task_state(&self, task_id: TaskId) -> Option<TaskState> {
        self.tasks.get(&task_id).map(|task| task.state)
    }

    /// File version a task loads.
    pub fn task_file(&self, task_id: TaskId) -> Option<FileId> {
        self.tasks.get(&task_id).map(|task| task.file_id)
    }

    pub fn task_ids(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.tasks.keys().copied()
    }

    /// Check that `file_type` may be uploaded now.
    pub fn check_upload(
        &self,
        file_type: &str,
        options: &SubmissionOptions,
    ) -> Result<(), PreconditionError> {
        if !self.definitions.contains(file_type) {
            return Err(PreconditionError::UnknownFileType {
                file_type: file_type.to_string(),
            });
        }
        let patient_type = options.patient_file_type.as_str();
        if file_type != patient_type
            && !self
                .submission
                .versions(patient_type)
                .any(|file| file.state != TaskState::Failed)
        {
            return Err(PreconditionError::PatientFileRequired {
                file_type: file_type.to_string(),
                patient_file_type: patient_type.to_string(),
            });
        }
        Ok(())
    }

    /// Record a new version of a file type and queue its task.
    ///
    /// In-flight tasks of older versions of the same type are superseded.
    pub fn begin_upload(
        &mut self,
        request: UploadRequest,
        file_id: FileId,
        task_id: TaskId,
        options: &SubmissionOptions,
        now: DateTime<Utc>,
    ) -> Result<UploadPlan, PreconditionError> {
        self.check_upload(&request.file_type, options)?;

        let mut superseded = Vec::new();
        for (id, task) in self.tasks.iter_mut() {
            if task.state.is_terminal() {
                continue;
            }
            let Some(file) = self.submission.file_mut(task.file_id) else {
                continue;
            };
            if file.file_type == request.file_type {
                task.state = TaskState::Superseded;
                file.state = TaskState::Superseded;
                superseded.push(*id);
            }
        }
        if !superseded.is_empty() {
            debug!(
                submission = %self.submission.id,
                file_type = %request.file_type,
                tasks = ?superseded,
                "superseded in-flight tasks"
            );
        }

        let version = self.submission.latest_version(&request.file_type) + 1;
        self.submission.files.push(SubmissionFile {
            id: file_id,
            submission_id: self.submission.id,
            file_type: request.file_type,
            version,
            state: TaskState::Queued,
            acknowledged: false,
            acknowledged_by: None,
            acknowledged_at: None,
            comment: None,
            failure: None,
            report: None,
            uploaded_by: request.actor,
            uploaded_at: now,
            content_hash: request.content_hash,
            size_bytes: request.size_bytes,
        });
        self.tasks.insert(
            task_id,
            TaskRecord {
                file_id,
                state: TaskState::Queued,
            },
        );

        Ok(UploadPlan {
            file_id,
            task_id,
            version,
            superseded,
            status_change: self.refresh(now),
        })
    }

    /// Move a queued task to running. Returns false if it was superseded meanwhile.
    pub fn start_task(&mut self, task_id: TaskId) -> Result<bool, SubmitError> {
        let task = self
            .tasks
            .get_mut(&task_id)
            .ok_or(SubmitError::UnknownTask(task_id))?;
        if !task.state.can_transition_to(TaskState::Running) {
            return Ok(false);
        }
        task.state = TaskState::Running;
        if let Some(file) = self.submission.file_mut(task.file_id) {
            file.state = TaskState::Running;
        }
        Ok(true)
    }

    /// Apply the outcome of a pipeline run.
    ///
    /// A superseded task is discarded without touching its file. A patient
    /// file that completes replaces the identifier universe and re-checks
    /// every sibling file against it.
    pub fn complete_task(
        &mut self,
        task_id: TaskId,
        outcome: Result<LoadSuccess, SubmitError>,
        options: &SubmissionOptions,
        now: DateTime<Utc>,
    ) -> Result<Completion, SubmitError> {
        let task = *self
            .tasks
            .get(&task_id)
            .ok_or(SubmitError::UnknownTask(task_id))?;
        let file_id = task.file_id;

        if task.state == TaskState::Superseded {
            debug!(submission = %self.submission.id, %task_id, %file_id, "discarded superseded result");
            return Ok(Completion {
                task_id,
                file_id,
                state: TaskState::Superseded,
                status_change: None,
                rechecked: Vec::new(),
            });
        }
        if task.state != TaskState::Running {
            return Err(SubmitError::TaskAborted(format!(
                "task {task_id} is {} and cannot complete",
                task.state
            )));
        }

        let file_type = self
            .submission
            .file(file_id)
            .map(|file| file.file_type.clone())
            .ok_or(PreconditionError::UnknownFile(file_id))?;
        let is_patient = file_type == options.patient_file_type;

        let outcome = outcome.and_then(|success| {
            if is_patient {
                self.patient_universe(file_id, &success, options)
                    .map(|universe| (success, Some(universe)))
            } else {
                Ok((success, None))
            }
        });

        let mut rechecked = Vec::new();
        let state = match outcome {
            Ok((mut success, universe)) => {
                if let Some(universe) = universe {
                    self.submission.extracted_patient_ids = Some(universe);
                    rechecked = self.recheck_siblings(options);
                } else if let Some(identifiers) = success.identifiers.take() {
                    if let Some(warning) = self.cross_check(&identifiers, options) {
                        warn!(
                            submission = %self.submission.id,
                            %file_id,
                            file_type = %file_type,
                            unknown = warning.unknown_count,
                            "identifiers missing from the patient file"
                        );
                        success.report.warnings.push(warning);
                    }
                    self.sibling_ids.insert(file_id, identifiers);
                }
                if let Some(file) = self.submission.file_mut(file_id) {
                    file.report = Some(success.report);
                    file.failure = None;
                }
                TaskState::Completed
            }
            Err(err) => {
                tracing::error!(
                    submission = %self.submission.id,
                    %file_id,
                    file_type = %file_type,
                    error = %err,
                    "load failed"
                );
                if let Some(file) = self.submission.file_mut(file_id) {
                    file.failure = Some(err.to_string());
                }
                TaskState::Failed
            }
        };

        self.set_task_state(task_id, state);
        Ok(Completion {
            task_id,
            file_id,
            state,
            status_change: self.refresh(now),
            rechecked,
        })
    }

    /// Acknowledge a completed, current file version.
    pub fn acknowledge(
        &mut self,
        file_id: FileId,
        actor: &str,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Acknowledgment, PreconditionError> {
        let file = self
            .submission
            .file(file_id)
            .ok_or(PreconditionError::UnknownFile(file_id))?;
        match file.state {
            TaskState::Completed => {}
            TaskState::Failed => return Err(PreconditionError::LoadFailed { file_id }),
            TaskState::Superseded => return Err(stale(file)),
            state => return Err(PreconditionError::NotCompleted { file_id, state }),
        }
        let is_effective = self
            .submission
            .effective_file(&file.file_type)
            .is_some_and(|effective| effective.id == file_id);
        if !is_effective {
            return Err(stale(file));
        }

        if file.acknowledged {
            return Ok(Acknowledgment {
                file_id,
                changed: false,
                status: self.submission.status,
                status_change: None,
            });
        }

        if let Some(file) = self.submission.file_mut(file_id) {
            file.acknowledged = true;
            file.acknowledged_by = Some(actor.to_string());
            file.acknowledged_at = Some(now);
            file.comment = comment;
        }
        let status_change = self.refresh(now);
        Ok(Acknowledgment {
            file_id,
            changed: true,
            status: self.submission.status,
            status_change,
        })
    }

    fn set_task_state(&mut self, task_id: TaskId, state: TaskState) {
        if let Some(task) = self.tasks.get_mut(&task_id) {
            task.state = state;
            if let Some(file) = self.submission.file_mut(task.file_id) {
                file.state = state;
            }
        }
    }

    fn refresh(&mut self, now: DateTime<Utc>) -> Option<StatusChange> {
        self.submission
            .refresh_status(now)
            .map(|from| StatusChange {
                from,
                to: self.submission.status,
            })
    }

    fn patient_universe(
        &self,
        file_id: FileId,
        success: &LoadSuccess,
        options: &SubmissionOptions,
    ) -> Result<PatientIdUniverse, SubmitError> {
        let version = self
            .submission
            .file(file_id)
            .map(|file| file.version)
            .unwrap_or_default();
        let identifiers =
            success
                .identifiers
                .as_ref()
                .ok_or_else(|| SubmitError::MissingIdentifierColumn {
                    column: self.id_column(&options.patient_file_type, options),
                })?;
        if identifiers.ids.len() > options.max_patient_ids {
            return Err(SubmitError::IdentifierLimit {
                count: identifiers.ids.len(),
                limit: options.max_patient_ids,
            });
        }
        Ok(PatientIdUniverse {
            ids: identifiers.ids.clone(),
            source_file: file_id,
            source_version: version,
        })
    }

    /// Identifier column of `file_type`.
    pub fn id_column(&self, file_type: &str, options: &SubmissionOptions) -> String {
        self.definitions
            .get(file_type)
            .map(|definition| definition.id_column_or(&options.patient_id_column))
            .unwrap_or(&options.patient_id_column)
            .to_string()
    }

    fn cross_check(
        &self,
        identifiers: &ExtractedIds,
        options: &SubmissionOptions,
    ) -> Option<cohort_model::CrossFileWarning> {
        let universe = self.submission.extracted_patient_ids.as_ref()?;
        check_ids(
            &identifiers.ids,
            &universe.ids,
            &identifiers.column,
            options.max_warning_ids,
        )
    }

    fn recheck_siblings(&mut self, options: &SubmissionOptions) -> Vec<FileId> {
        let mut rechecked = Vec::new();
        let sibling_ids = std::mem::take(&mut self.sibling_ids);
        for (file_id, identifiers) in &sibling_ids {
            let warning = self.cross_check(identifiers, options);
            let Some(file) = self.submission.file_mut(*file_id) else {
                continue;
            };
            if file.state != TaskState::Completed {
                continue;
            }
            if let Some(report) = file.report.as_mut() {
                report.warnings = warning.into_iter().collect();
                rechecked.push(*file_id);
            }
        }
        self.sibling_ids = sibling_ids;
        rechecked
    }
}

fn stale(file: &SubmissionFile) -> PreconditionError {
    PreconditionError::StaleVersion {
        file_id: file.id,
        file_type: file.file_type.clone(),
        version: file.version,
    }
}
