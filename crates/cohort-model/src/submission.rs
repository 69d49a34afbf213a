//! Submission and per-file records.
//!
//! The status of a submission is never stored independently of its files:
//! [`derive_status`] recomputes it from the effective file versions after
//! every mutation.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{FileId, SubmissionId, SubmissionKey};
use crate::result::FileValidationReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Draft,
    InProgress,
    Completed,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Draft => "draft",
            SubmissionStatus::InProgress => "in_progress",
            SubmissionStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of a load-and-validate task, mirrored onto its file version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Queued,
    Running,
    Completed,
    Failed,
    Superseded,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Superseded
        )
    }

    pub fn can_transition_to(&self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (TaskState::Queued, TaskState::Running)
                | (TaskState::Queued, TaskState::Superseded)
                | (TaskState::Running, TaskState::Completed)
                | (TaskState::Running, TaskState::Failed)
                | (TaskState::Running, TaskState::Superseded)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Queued => "queued",
            TaskState::Running => "running",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Superseded => "superseded",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One versioned upload of a file type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionFile {
    pub id: FileId,
    pub submission_id: SubmissionId,
    pub file_type: String,
    pub version: u32,
    pub state: TaskState,
    pub acknowledged: bool,
    pub acknowledged_by: Option<String>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub comment: Option<String>,
    /// Reason the load failed, when `state` is `Failed`.
    pub failure: Option<String>,
    pub report: Option<FileValidationReport>,
    pub uploaded_by: String,
    pub uploaded_at: DateTime<Utc>,
    /// Lowercase hex SHA-256 of the raw upload bytes.
    pub content_hash: String,
    pub size_bytes: u64,
}

impl SubmissionFile {
    /// Whether this version can stand for its file type.
    pub fn is_live(&self) -> bool {
        !matches!(self.state, TaskState::Failed | TaskState::Superseded)
    }
}

/// Identifier set established by the patient file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientIdUniverse {
    pub ids: BTreeSet<String>,
    pub source_file: FileId,
    pub source_version: u32,
}

impl PatientIdUniverse {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    pub key: SubmissionKey,
    pub extracted_patient_ids: Option<PatientIdUniverse>,
    pub status: SubmissionStatus,
    /// Every version of every file type, in creation order.
    pub files: Vec<SubmissionFile>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Submission {
    pub fn new(id: SubmissionId, key: SubmissionKey, now: DateTime<Utc>) -> Self {
        Self {
            id,
            key,
            extracted_patient_ids: None,
            status: SubmissionStatus::Draft,
            files: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn file(&self, id: FileId) -> Option<&SubmissionFile> {
        self.files.iter().find(|file| file.id == id)
    }

    pub fn file_mut(&mut self, id: FileId) -> Option<&mut SubmissionFile> {
        self.files.iter_mut().find(|file| file.id == id)
    }

    /// Highest version ever created for `file_type`, or 0.
    pub fn latest_version(&self, file_type: &str) -> u32 {
        self.files
            .iter()
            .filter(|file| file.file_type == file_type)
            .map(|file| file.version)
            .max()
            .unwrap_or(0)
    }

    /// All versions of `file_type`, oldest first.
    pub fn versions<'a>(&'a self, file_type: &'a str) -> impl Iterator<Item = &'a SubmissionFile> {
        self.files
            .iter()
            .filter(move |file| file.file_type == file_type)
    }

    pub fn effective_files(&self) -> Vec<&SubmissionFile> {
        effective_files(&self.files)
    }

    /// Effective file of `file_type`, if any.
    pub fn effective_file(&self, file_type: &str) -> Option<&SubmissionFile> {
        self.files
            .iter()
            .filter(|file| file.file_type == file_type && file.is_live())
            .max_by_key(|file| file.version)
    }

    /// Completed effective files that still wait for acknowledgment.
    pub fn pending_acknowledgment(&self) -> Vec<&SubmissionFile> {
        self.effective_files()
            .into_iter()
            .filter(|file| file.state == TaskState::Completed && !file.acknowledged)
            .collect()
    }

    /// Recompute and store the status. Returns the previous status when it changed.
    pub fn refresh_status(&mut self, now: DateTime<Utc>) -> Option<SubmissionStatus> {
        let previous = self.status;
        self.status = derive_status(&self.files);
        self.updated_at = now;
        (previous != self.status).then_some(previous)
    }
}

/// Highest live version per file type, ordered by file type.
pub fn effective_files(files: &[SubmissionFile]) -> Vec<&SubmissionFile> {
    let mut by_type: BTreeMap<&str, &SubmissionFile> = BTreeMap::new();
    for file in files.iter().filter(|file| file.is_live()) {
        by_type
            .entry(file.file_type.as_str())
            .and_modify(|current| {
                if file.version > current.version {
                    *current = file;
                }
            })
            .or_insert(file);
    }
    by_type.into_values().collect()
}

/// Status as a total function of the files.
///
/// No effective file means draft; any effective file that is not acknowledged
/// (including queued or running versions) means in progress; otherwise completed.
pub fn derive_status(files: &[SubmissionFile]) -> SubmissionStatus {
    let effective = effective_files(files);
    if effective.is_empty() {
        SubmissionStatus::Draft
    } else if effective.iter().any(|file| !file.acknowledged) {
        SubmissionStatus::InProgress
    } else {
        SubmissionStatus::Completed
    }
}
